use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use reqwest::StatusCode;
use thiserror::Error;

/// Precondition failures raised by the ledger and watchlist stores.
/// None of these leave a store partially mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Sign in required")]
    AuthRequired,
    #[error("Insufficient virtual cash: need ${required:.2}, have ${available:.2}")]
    InsufficientFunds { required: f64, available: f64 },
    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: u32, held: u32 },
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

/// Failures reported by the upstream market-data, news and AI providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("rate limited")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("provider rejected credentials")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("provider overloaded")]
    Overloaded,
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            GatewayError::Parse(value.to_string())
        } else {
            GatewayError::Network(value.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Cloud store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("local store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("local store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid access token: {0}")]
    InvalidToken(String),
    #[error("invalid token subject: {0}")]
    InvalidSubject(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(sqlx::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found")]
    NotFound,
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("External error: {0}")]
    External(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            AppError::RateLimited => {
                let mut headers = HeaderMap::new();
                headers.insert("Retry-After", HeaderValue::from_static("60"));
                (StatusCode::TOO_MANY_REQUESTS, headers, "Rate limited").into_response()
            },
            AppError::External(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg).into_response(),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response(),
            AppError::Ledger(err) => {
                let status = match &err {
                    LedgerError::AuthRequired => StatusCode::UNAUTHORIZED,
                    LedgerError::InsufficientFunds { .. } | LedgerError::InsufficientShares { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    LedgerError::InvalidOrder(_) => StatusCode::BAD_REQUEST,
                };
                (status, err.to_string()).into_response()
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        AppError::Db(value)
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}

impl From<SessionError> for AppError {
    fn from(_: SessionError) -> Self {
        AppError::Unauthorized
    }
}

impl From<GatewayError> for AppError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::RateLimited | GatewayError::QuotaExceeded => AppError::RateLimited,
            GatewayError::NotFound(_) => AppError::NotFound,
            other => AppError::External(other.to_string()),
        }
    }
}
