use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::Request;
use serde_json::json;

/// Domain error kinds, matching the taxonomy in the platform's error design:
/// configuration, provider connection/auth/transient/message/fatal, validation,
/// permission, rate-limit, lockout, not-found, conflict, upstream-timeout.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider connection error: {0}")]
    ProviderConnection(String),

    #[error("provider authentication error: {0}")]
    ProviderAuth(String),

    #[error("provider transient error: {0}")]
    ProviderTransient(String),

    #[error("provider message error: {0}")]
    ProviderMessage(String),

    #[error("provider fatal error: {0}")]
    ProviderFatal(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("permission denied")]
    Permission,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("account locked until {locked_until}")]
    AccountLocked {
        locked_until: chrono::DateTime<chrono::Utc>,
        retry_after_secs: u64,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl AppError {
    fn status(&self) -> Status {
        match self {
            AppError::Configuration(_) | AppError::Validation(_) => Status::BadRequest,
            AppError::ProviderConnection(_) => Status::ServiceUnavailable,
            AppError::ProviderAuth(_) => Status::Unauthorized,
            AppError::ProviderTransient(_) | AppError::ProviderMessage(_) => Status::BadGateway,
            AppError::ProviderFatal(_) => Status::InternalServerError,
            AppError::Permission => Status::Forbidden,
            AppError::RateLimited { .. } => Status::TooManyRequests,
            AppError::AccountLocked { .. } => Status::Locked,
            AppError::NotFound(_) => Status::NotFound,
            AppError::Conflict(_) => Status::Conflict,
            AppError::UpstreamTimeout(_) => Status::GatewayTimeout,
            AppError::Database(_) => Status::InternalServerError,
            AppError::Upstream(_) => Status::BadGateway,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let mut body = json!({ "detail": self.to_string() });

        if let AppError::RateLimited { retry_after_secs } = &self {
            body["retry_after_secs"] = json!(retry_after_secs);
        }
        if let AppError::AccountLocked { locked_until, retry_after_secs } = &self {
            body["locked_until"] = json!(locked_until.to_rfc3339());
            body["retry_after_secs"] = json!(retry_after_secs);
        }

        tracing::warn!(error = %self, status = %status, "request failed");

        let mut response = Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .finalize();

        if let AppError::RateLimited { retry_after_secs } = &self {
            response.set_raw_header("Retry-After", retry_after_secs.to_string());
        }
        if let AppError::AccountLocked { retry_after_secs, .. } = &self {
            response.set_raw_header("Retry-After", retry_after_secs.to_string());
        }

        Ok(response)
    }
}

pub type AppResult<T> = Result<T, AppError>;
