// src/models.rs
use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use crate::error::{ApiError, ApiResult};

// ==================== PREPARED SOLUTION ====================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Solution {
    pub id: i64,
    pub preparation_date: NaiveDateTime,
    pub internal_code: String,
    pub brand: String,
    pub name: String,
    pub base_quantity: Option<Decimal>,
    pub final_volume: Decimal,
    pub lot: Option<String>,
    pub concentration_obtained: String,
    pub reagent_id: String,
    pub expiry_date: Option<NaiveDate>,
    pub row_version: i64,
    /// Derived on read, never stored.
    pub is_expired: bool,
}

/// Raw row shape as persisted. Quantities travel as canonical decimal
/// strings (see db.rs) and are parsed into `Decimal` on the way out.
#[derive(Debug, sqlx::FromRow)]
pub struct SolutionRow {
    pub id: i64,
    pub preparation_date: NaiveDateTime,
    pub internal_code: String,
    pub brand: String,
    pub name: String,
    pub base_quantity: Option<String>,
    pub final_volume: String,
    pub lot: Option<String>,
    pub concentration_obtained: String,
    pub reagent_id: String,
    pub expiry_date: Option<NaiveDate>,
    pub row_version: i64,
}

impl SolutionRow {
    pub fn into_solution(self) -> ApiResult<Solution> {
        self.into_solution_at(Local::now().date_naive())
    }

    pub fn into_solution_at(self, today: NaiveDate) -> ApiResult<Solution> {
        let base_quantity = self.base_quantity.as_deref().map(parse_decimal).transpose()?;
        let final_volume = parse_decimal(&self.final_volume)?;
        let expired = is_expired(self.expiry_date, today);

        Ok(Solution {
            id: self.id,
            preparation_date: self.preparation_date,
            internal_code: self.internal_code,
            brand: self.brand,
            name: self.name,
            base_quantity,
            final_volume,
            lot: self.lot,
            concentration_obtained: self.concentration_obtained,
            reagent_id: self.reagent_id,
            expiry_date: self.expiry_date,
            row_version: self.row_version,
            is_expired: expired,
        })
    }
}

fn parse_decimal(raw: &str) -> ApiResult<Decimal> {
    Decimal::from_str(raw).map_err(|e| {
        ApiError::InternalServerError(format!("Corrupt decimal value '{}': {}", raw, e))
    })
}

pub fn is_expired(expiry_date: Option<NaiveDate>, today: NaiveDate) -> bool {
    matches!(expiry_date, Some(date) if date < today)
}

/// Quantities are accepted at up to 4 fractional digits; anything finer is
/// rounded half-away-from-zero on the way in.
pub fn quantize(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

// ==================== DAY BOUNDS ====================

/// Inclusive lower bound of a day filter.
pub fn day_start(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Exclusive upper bound of a day filter: start of the following day.
/// Comparing inclusively against 23:59:59 would drop same-day records
/// carrying a later time-of-day fraction.
pub fn day_end_exclusive(date: NaiveDate) -> NaiveDateTime {
    date.checked_add_days(Days::new(1))
        .unwrap_or(NaiveDate::MAX)
        .and_time(NaiveTime::MIN)
}

// ==================== REQUEST DTOS ====================

// deny_unknown_fields keeps the accepted field set an explicit allow-list:
// a payload naming anything outside the schema is rejected outright.

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateSolutionRequest {
    /// Defaults to today when unset.
    pub preparation_date: Option<NaiveDate>,

    #[validate(length(min = 1, max = 30, message = "Internal code must be between 1 and 30 characters"))]
    pub internal_code: String,

    #[validate(length(min = 1, max = 60, message = "Brand must be between 1 and 60 characters"))]
    pub brand: String,

    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,

    pub base_quantity: Option<Decimal>,

    pub final_volume: Decimal,

    #[validate(length(max = 30, message = "Lot cannot exceed 30 characters"))]
    pub lot: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Concentration obtained must be between 1 and 50 characters"))]
    pub concentration_obtained: String,

    #[validate(length(min = 1, max = 60, message = "Reagent id must be between 1 and 60 characters"))]
    pub reagent_id: String,

    pub expiry_date: Option<NaiveDate>,
}

impl CreateSolutionRequest {
    /// Derive-based field checks plus the decimal range rules. Runs before
    /// any store mutation.
    pub fn validate_all(&self) -> ApiResult<()> {
        self.validate()?;
        if let Some(quantity) = self.base_quantity {
            crate::error::validate_base_quantity(quantity)?;
        }
        crate::error::validate_final_volume(self.final_volume)?;
        Ok(())
    }

    pub fn effective_preparation_date(&self) -> NaiveDateTime {
        day_start(self.preparation_date.unwrap_or_else(|| Local::now().date_naive()))
    }
}

/// Full-record replace. `row_version` must match the version read by the
/// editor; a mismatch means another writer got there first.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateSolutionRequest {
    pub preparation_date: NaiveDate,

    #[validate(length(min = 1, max = 30, message = "Internal code must be between 1 and 30 characters"))]
    pub internal_code: String,

    #[validate(length(min = 1, max = 60, message = "Brand must be between 1 and 60 characters"))]
    pub brand: String,

    #[validate(length(min = 1, max = 120, message = "Name must be between 1 and 120 characters"))]
    pub name: String,

    pub base_quantity: Option<Decimal>,

    pub final_volume: Decimal,

    #[validate(length(max = 30, message = "Lot cannot exceed 30 characters"))]
    pub lot: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Concentration obtained must be between 1 and 50 characters"))]
    pub concentration_obtained: String,

    #[validate(length(min = 1, max = 60, message = "Reagent id must be between 1 and 60 characters"))]
    pub reagent_id: String,

    pub expiry_date: Option<NaiveDate>,

    pub row_version: i64,
}

impl UpdateSolutionRequest {
    pub fn validate_all(&self) -> ApiResult<()> {
        self.validate()?;
        if let Some(quantity) = self.base_quantity {
            crate::error::validate_base_quantity(quantity)?;
        }
        crate::error::validate_final_volume(self.final_volume)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_bounds() {
        let day = date(2025, 9, 20);
        assert_eq!(day_start(day).to_string(), "2025-09-20 00:00:00");
        assert_eq!(day_end_exclusive(day).to_string(), "2025-09-21 00:00:00");
    }

    #[test]
    fn test_is_expired_strictly_before_today() {
        let today = date(2025, 9, 20);
        assert!(is_expired(Some(date(2025, 9, 19)), today));
        assert!(!is_expired(Some(date(2025, 9, 20)), today));
        assert!(!is_expired(Some(date(2025, 9, 21)), today));
        assert!(!is_expired(None, today));
    }

    #[test]
    fn test_quantize_half_away_from_zero() {
        let v = Decimal::from_str("1.00005").unwrap();
        assert_eq!(quantize(v).to_string(), "1.0001");
        let v = Decimal::from_str("-1.00005").unwrap();
        assert_eq!(quantize(v).to_string(), "-1.0001");
        let v = Decimal::from_str("10.5").unwrap();
        assert_eq!(quantize(v).to_string(), "10.5");
    }

    #[test]
    fn test_row_conversion_parses_decimals() {
        let row = SolutionRow {
            id: 7,
            preparation_date: day_start(date(2025, 9, 1)),
            internal_code: "X".to_string(),
            brand: "Merck".to_string(),
            name: "NaOH 0.1 N".to_string(),
            base_quantity: Some("10.5".to_string()),
            final_volume: "1000".to_string(),
            lot: None,
            concentration_obtained: "0.0998 N".to_string(),
            reagent_id: "R-44".to_string(),
            expiry_date: Some(date(2025, 8, 31)),
            row_version: 0,
        };

        let solution = row.into_solution_at(date(2025, 9, 1)).unwrap();
        assert_eq!(solution.base_quantity, Some(Decimal::from_str("10.5").unwrap()));
        assert_eq!(solution.final_volume, Decimal::from_str("1000").unwrap());
        assert!(solution.is_expired);
    }

    #[test]
    fn test_row_conversion_rejects_corrupt_decimal() {
        let row = SolutionRow {
            id: 1,
            preparation_date: day_start(date(2025, 9, 1)),
            internal_code: "X".to_string(),
            brand: "b".to_string(),
            name: "n".to_string(),
            base_quantity: Some("not-a-number".to_string()),
            final_volume: "1".to_string(),
            lot: None,
            concentration_obtained: "c".to_string(),
            reagent_id: "r".to_string(),
            expiry_date: None,
            row_version: 0,
        };
        assert!(row.into_solution_at(date(2025, 9, 1)).is_err());
    }

    #[test]
    fn test_create_request_rejects_zero_volume() {
        let request = CreateSolutionRequest {
            preparation_date: Some(date(2025, 9, 1)),
            internal_code: "X".to_string(),
            brand: "Merck".to_string(),
            name: "NaOH 0.1 N".to_string(),
            base_quantity: None,
            final_volume: Decimal::ZERO,
            lot: None,
            concentration_obtained: "0.1 N".to_string(),
            reagent_id: "R-44".to_string(),
            expiry_date: None,
        };
        assert!(request.validate_all().is_err());
    }

    #[test]
    fn test_create_request_rejects_overlong_code() {
        let request = CreateSolutionRequest {
            preparation_date: None,
            internal_code: "X".repeat(31),
            brand: "Merck".to_string(),
            name: "NaOH 0.1 N".to_string(),
            base_quantity: None,
            final_volume: Decimal::ONE,
            lot: None,
            concentration_obtained: "0.1 N".to_string(),
            reagent_id: "R-44".to_string(),
            expiry_date: None,
        };
        assert!(request.validate_all().is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let payload = r#"{
            "internal_code": "X",
            "brand": "Merck",
            "name": "NaOH",
            "final_volume": "100",
            "concentration_obtained": "0.1 N",
            "reagent_id": "R-44",
            "is_admin": true
        }"#;
        let parsed: Result<CreateSolutionRequest, _> = serde_json::from_str(payload);
        assert!(parsed.is_err());
    }
}
