//! Uniform error taxonomy (§7). Every handler returns `ApiResult<T>`;
//! background workers keep using `eyre::Result` the way the teacher's
//! watcher/writer/confirmation loops do.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The uniform error taxonomy from §7, surfaced as `{error, code?}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationError>),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// A domain rule rejected the request outright (insufficient balance,
    /// pool inactive, stake locked, ...). Carries a stable machine-readable
    /// `code` so clients can branch without parsing the message.
    #[error("domain rejection [{code}]: {message}")]
    DomainRejection { code: &'static str, message: String },

    /// RPC/DB transient failure; the caller should have already retried
    /// internally per §7 — reaching the HTTP boundary means retries were
    /// exhausted, so this still surfaces as a 503.
    #[error(transparent)]
    TransientExternal(#[from] eyre::Error),

    #[error("internal invariant violated")]
    Fatal,
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::TransientExternal(e.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<ValidationError>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "validation failed".to_string(),
                    code: None,
                    fields: Some(fields),
                },
            ),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "unauthenticated".to_string(),
                    code: None,
                    fields: None,
                },
            ),
            ApiError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    error: msg,
                    code: None,
                    fields: None,
                },
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: msg,
                    code: None,
                    fields: None,
                },
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    error: msg,
                    code: None,
                    fields: None,
                },
            ),
            ApiError::RateLimited { retry_after_secs } => {
                let mut resp = Json(ErrorBody {
                    error: "rate limited".to_string(),
                    code: None,
                    fields: None,
                })
                .into_response();
                *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                resp.headers_mut().insert(
                    "Retry-After",
                    retry_after_secs.to_string().parse().unwrap(),
                );
                return resp;
            }
            ApiError::DomainRejection { code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: message,
                    code: Some(code),
                    fields: None,
                },
            ),
            ApiError::TransientExternal(err) => {
                tracing::error!(error = %err, "transient external failure reached HTTP boundary");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        error: "temporarily unavailable".to_string(),
                        code: None,
                        fields: None,
                    },
                )
            }
            ApiError::Fatal => {
                tracing::error!("fatal invariant violation");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "internal error".to_string(),
                        code: None,
                        fields: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Stable domain rejection codes referenced by §8's scenarios and by clients.
pub mod codes {
    pub const STAKE_LOCKED: &str = "STAKE_LOCKED";
    pub const POOL_INACTIVE: &str = "POOL_INACTIVE";
    pub const POOL_CAPACITY_EXCEEDED: &str = "POOL_CAPACITY_EXCEEDED";
    pub const STAKE_BELOW_MINIMUM: &str = "STAKE_BELOW_MINIMUM";
    pub const STAKE_ABOVE_MAXIMUM: &str = "STAKE_ABOVE_MAXIMUM";
    pub const INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";
    pub const POSITION_NOT_ACTIVE: &str = "POSITION_NOT_ACTIVE";
    pub const WITHDRAWAL_AMOUNT_TOO_SMALL: &str = "WITHDRAWAL_AMOUNT_TOO_SMALL";
    pub const INVALID_STATE_TRANSITION: &str = "INVALID_STATE_TRANSITION";
    pub const TWO_FACTOR_REQUIRED: &str = "TWO_FACTOR_REQUIRED";
    pub const ADMIN_REQUIRES_TWO_FACTOR: &str = "ADMIN_REQUIRES_TWO_FACTOR";
    pub const ASSET_INACTIVE: &str = "ASSET_INACTIVE";
}
