use actix_web::{HttpResponse, ResponseError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    ValidationError(String),
    /// Edit or delete raced with another writer. Surfaced as 409, never retried here.
    Conflict(String),
    /// The backing store is unreachable or failed mid-statement.
    StoreUnavailable(sqlx::Error),
    /// Export rendering failed. The response carries a generic message,
    /// the underlying detail goes to the log only.
    RenderError(String),
    InternalServerError(String),
    AuthError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::StoreUnavailable(err) => write!(f, "Store Unavailable: {}", err),
            ApiError::RenderError(_) => write!(f, "Render Error: report generation failed"),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        if let ApiError::RenderError(detail) = self {
            log::error!("Report rendering failed: {}", detail);
        }

        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::Conflict(_) => HttpResponse::Conflict().json(error_response),
            ApiError::StoreUnavailable(_) => HttpResponse::ServiceUnavailable().json(error_response),
            ApiError::RenderError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Record not found".to_string()),
            other => ApiError::StoreUnavailable(other),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

// Domain-specific constructors
impl ApiError {
    pub fn solution_not_found(id: i64) -> Self {
        ApiError::NotFound(format!("Prepared solution with id {} not found", id))
    }

    pub fn concurrent_modification(id: i64) -> Self {
        ApiError::Conflict(format!(
            "Prepared solution {} was modified or deleted by another user; reload and retry",
            id
        ))
    }
}

// Quantity validation shared by create and edit paths. Checked before any
// store mutation so a rejected request leaves no side effects.

const QUANTITY_MAX: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

pub fn validate_base_quantity(quantity: Decimal) -> Result<(), ApiError> {
    if quantity < Decimal::ZERO {
        return Err(ApiError::ValidationError(
            "Base quantity cannot be negative".to_string(),
        ));
    }
    if quantity > QUANTITY_MAX {
        return Err(ApiError::ValidationError(
            "Base quantity must be at most 1000000".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_final_volume(volume: Decimal) -> Result<(), ApiError> {
    if volume <= Decimal::ZERO {
        return Err(ApiError::ValidationError(
            "Final volume must be greater than zero".to_string(),
        ));
    }
    if volume > QUANTITY_MAX {
        return Err(ApiError::ValidationError(
            "Final volume must be at most 1000000".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_final_volume_bounds() {
        assert!(validate_final_volume(Decimal::ZERO).is_err());
        assert!(validate_final_volume(Decimal::from_str("-1").unwrap()).is_err());
        assert!(validate_final_volume(Decimal::from_str("0.01").unwrap()).is_ok());
        assert!(validate_final_volume(Decimal::from_str("1000000").unwrap()).is_ok());
        assert!(validate_final_volume(Decimal::from_str("1000000.0001").unwrap()).is_err());
    }

    #[test]
    fn test_base_quantity_bounds() {
        assert!(validate_base_quantity(Decimal::ZERO).is_ok());
        assert!(validate_base_quantity(Decimal::from_str("-0.0001").unwrap()).is_err());
        assert!(validate_base_quantity(Decimal::from_str("999999.9999").unwrap()).is_ok());
        assert!(validate_base_quantity(Decimal::from_str("1000001").unwrap()).is_err());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
