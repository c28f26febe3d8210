// src/balance.rs - Balance report: quantity of base substance consumed for
// an internal code over a date window.
use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};
use crate::models::{day_end_exclusive, day_start, quantize};

pub const DEFAULT_WINDOW_DAYS: u64 = 30;

/// How the sum over `base_quantity` is executed.
///
/// SQLite-class engines cannot aggregate decimals exactly server-side, so
/// there the matching rows are fetched and summed in decimal arithmetic
/// here. Engines with exact server-side aggregation sum in the store.
/// Both paths apply the same final rounding and must produce identical
/// results for the same data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumStrategy {
    ClientSide,
    InStore,
}

impl SumStrategy {
    pub fn for_database_url(url: &str) -> Self {
        if url.contains("sqlite") {
            SumStrategy::ClientSide
        } else {
            SumStrategy::InStore
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceReport {
    pub internal_code: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub records: i64,
    pub total_used: Decimal,
}

/// One matching record in export column order.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceRow {
    pub preparation_date: NaiveDateTime,
    pub internal_code: String,
    pub name: String,
    pub base_quantity: Option<Decimal>,
}

pub fn default_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let from = today.checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS)).unwrap_or(today);
    (from, today)
}

/// Trims the code and fills in the last-30-days default window.
pub fn normalize_query(
    code: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ApiResult<(String, NaiveDate, NaiveDate)> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ApiError::ValidationError("Internal code is required".to_string()));
    }

    let today = Local::now().date_naive();
    let (default_from, default_to) = default_window(today);
    Ok((code.to_string(), from.unwrap_or(default_from), to.unwrap_or(default_to)))
}

pub async fn compute_balance(
    pool: &SqlitePool,
    code: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    strategy: SumStrategy,
) -> ApiResult<BalanceReport> {
    let (code, from, to) = normalize_query(code, from, to)?;
    let lower = day_start(from);
    let upper = day_end_exclusive(to);

    let records: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM solutions
         WHERE internal_code = ? AND preparation_date >= ? AND preparation_date < ?",
    )
    .bind(&code)
    .bind(lower)
    .bind(upper)
    .fetch_one(pool)
    .await?;

    let total = match strategy {
        SumStrategy::ClientSide => sum_client_side(pool, &code, lower, upper).await?,
        SumStrategy::InStore => sum_in_store(pool, &code, lower, upper).await?,
    };

    Ok(BalanceReport {
        internal_code: code,
        from,
        to,
        records: records.0,
        // Rounded once, after summation (half away from zero, 4 dp).
        total_used: quantize(total),
    })
}

async fn sum_client_side(
    pool: &SqlitePool,
    code: &str,
    lower: NaiveDateTime,
    upper: NaiveDateTime,
) -> ApiResult<Decimal> {
    let quantities: Vec<(Option<String>,)> = sqlx::query_as(
        "SELECT base_quantity FROM solutions
         WHERE internal_code = ? AND preparation_date >= ? AND preparation_date < ?",
    )
    .bind(code)
    .bind(lower)
    .bind(upper)
    .fetch_all(pool)
    .await?;

    let mut total = Decimal::ZERO;
    for (quantity,) in quantities {
        if let Some(raw) = quantity {
            let value = Decimal::from_str(&raw).map_err(|e| {
                ApiError::InternalServerError(format!("Corrupt decimal value '{}': {}", raw, e))
            })?;
            total += value;
        }
    }

    Ok(total)
}

async fn sum_in_store(
    pool: &SqlitePool,
    code: &str,
    lower: NaiveDateTime,
    upper: NaiveDateTime,
) -> ApiResult<Decimal> {
    let total: (f64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(CAST(base_quantity AS REAL)), 0)
         FROM solutions
         WHERE internal_code = ? AND preparation_date >= ? AND preparation_date < ?",
    )
    .bind(code)
    .bind(lower)
    .bind(upper)
    .fetch_one(pool)
    .await?;

    Decimal::try_from(total.0)
        .map_err(|e| ApiError::InternalServerError(format!("Sum overflowed decimal range: {}", e)))
}

/// The matching records for the detail export, oldest first (export order
/// differs from the listing screen).
pub async fn matching_rows(
    pool: &SqlitePool,
    code: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> ApiResult<Vec<BalanceRow>> {
    let raw: Vec<(NaiveDateTime, String, String, Option<String>)> = sqlx::query_as(
        "SELECT preparation_date, internal_code, name, base_quantity
         FROM solutions
         WHERE internal_code = ? AND preparation_date >= ? AND preparation_date < ?
         ORDER BY preparation_date ASC, id ASC",
    )
    .bind(code)
    .bind(day_start(from))
    .bind(day_end_exclusive(to))
    .fetch_all(pool)
    .await?;

    raw.into_iter()
        .map(|(preparation_date, internal_code, name, base_quantity)| {
            let base_quantity = base_quantity
                .map(|raw| {
                    Decimal::from_str(&raw).map_err(|e| {
                        ApiError::InternalServerError(format!("Corrupt decimal value '{}': {}", raw, e))
                    })
                })
                .transpose()?;
            Ok(BalanceRow { preparation_date, internal_code, name, base_quantity })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::CreateSolutionRequest;
    use crate::store;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        pool
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed(pool: &SqlitePool, code: &str, day: NaiveDate, base: Option<&str>) {
        let request = CreateSolutionRequest {
            preparation_date: Some(day),
            internal_code: code.to_string(),
            brand: "Merck".to_string(),
            name: "NaOH 0.1 N".to_string(),
            base_quantity: base.map(|b| Decimal::from_str(b).unwrap()),
            final_volume: Decimal::from_str("1000").unwrap(),
            lot: None,
            concentration_obtained: "0.0998 N".to_string(),
            reagent_id: "R-44".to_string(),
            expiry_date: None,
        };
        store::insert(pool, &request).await.unwrap();
    }

    #[actix_rt::test]
    async fn test_blank_code_is_rejected_before_any_query() {
        let pool = test_pool().await;
        for code in ["", "   "] {
            let err = compute_balance(&pool, code, None, None, SumStrategy::ClientSide)
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::ValidationError(_)));
        }
    }

    #[actix_rt::test]
    async fn test_balance_scenario_counts_and_sums() {
        let pool = test_pool().await;
        seed(&pool, "X", date(2025, 9, 1), Some("10.5")).await;
        seed(&pool, "X", date(2025, 9, 15), None).await;
        seed(&pool, "Y", date(2025, 9, 30), Some("5")).await;

        let report = compute_balance(
            &pool,
            "X",
            Some(date(2025, 9, 1)),
            Some(date(2025, 9, 30)),
            SumStrategy::ClientSide,
        )
        .await
        .unwrap();

        assert_eq!(report.records, 2);
        assert_eq!(report.total_used, Decimal::from_str("10.5").unwrap());
    }

    #[actix_rt::test]
    async fn test_code_is_trimmed() {
        let pool = test_pool().await;
        seed(&pool, "X", date(2025, 9, 1), Some("3")).await;

        let report = compute_balance(
            &pool,
            "  X  ",
            Some(date(2025, 9, 1)),
            Some(date(2025, 9, 1)),
            SumStrategy::ClientSide,
        )
        .await
        .unwrap();
        assert_eq!(report.records, 1);
    }

    #[actix_rt::test]
    async fn test_engine_parity_on_drift_prone_values() {
        let pool = test_pool().await;
        // Ten times 0.1 sums to exactly 1 in decimal but drifts in binary
        // floating point, which is what the in-store path goes through.
        for _ in 0..10 {
            seed(&pool, "X", date(2025, 9, 5), Some("0.1")).await;
        }
        seed(&pool, "X", date(2025, 9, 6), Some("10.5")).await;
        seed(&pool, "X", date(2025, 9, 7), None).await;

        let from = Some(date(2025, 9, 1));
        let to = Some(date(2025, 9, 30));

        let client = compute_balance(&pool, "X", from, to, SumStrategy::ClientSide)
            .await
            .unwrap();
        let in_store = compute_balance(&pool, "X", from, to, SumStrategy::InStore)
            .await
            .unwrap();

        assert_eq!(client.total_used, Decimal::from_str("11.5").unwrap());
        let diff = (client.total_used - in_store.total_used).abs();
        assert!(diff <= Decimal::from_str("0.0001").unwrap());
        assert_eq!(client.records, in_store.records);
    }

    #[actix_rt::test]
    async fn test_empty_window_sums_to_zero() {
        let pool = test_pool().await;
        let report = compute_balance(
            &pool,
            "X",
            Some(date(2025, 1, 1)),
            Some(date(2025, 1, 31)),
            SumStrategy::ClientSide,
        )
        .await
        .unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(report.total_used, Decimal::ZERO);
    }

    #[actix_rt::test]
    async fn test_matching_rows_oldest_first() {
        let pool = test_pool().await;
        seed(&pool, "X", date(2025, 9, 15), Some("2")).await;
        seed(&pool, "X", date(2025, 9, 1), Some("1")).await;
        seed(&pool, "Y", date(2025, 9, 10), Some("9")).await;

        let rows = matching_rows(&pool, "X", date(2025, 9, 1), date(2025, 9, 30))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].preparation_date < rows[1].preparation_date);
    }

    #[test]
    fn test_default_window_is_thirty_days() {
        let today = date(2025, 10, 1);
        let (from, to) = default_window(today);
        assert_eq!(from, date(2025, 9, 1));
        assert_eq!(to, today);
    }

    #[test]
    fn test_strategy_selection_by_url() {
        assert_eq!(SumStrategy::for_database_url("sqlite:preplab.db"), SumStrategy::ClientSide);
        assert_eq!(
            SumStrategy::for_database_url("postgres://app@db/preplab"),
            SumStrategy::InStore
        );
    }
}
