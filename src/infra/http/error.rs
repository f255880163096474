use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::PipelineError;
use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const NOT_FOUND: &str = "not_found";
    pub const NOT_CONNECTED: &str = "not_connected";
    pub const COOLDOWN: &str = "cooldown";
    pub const DUPLICATE: &str = "duplicate";
    pub const PLATFORM: &str = "platform_error";
    pub const REPO: &str = "repo_error";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint: None,
            retry_after: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "service token required",
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    fn cooldown(report_type: &str, retry_after_secs: u64) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::COOLDOWN,
            format!("sync for `{report_type}` is cooling down"),
        )
        .with_hint(format!("retry after {retry_after_secs} seconds"));
        err.retry_after = Some(retry_after_secs);
        err
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotConnected { platform } => Self::new(
                StatusCode::UNAUTHORIZED,
                codes::NOT_CONNECTED,
                format!("no active connection for platform `{platform}`"),
            ),
            PipelineError::Disconnected { platform } => Self::new(
                StatusCode::UNAUTHORIZED,
                codes::NOT_CONNECTED,
                format!("connection for platform `{platform}` was removed"),
            ),
            PipelineError::Cooldown {
                report_type,
                retry_after_secs,
            } => Self::cooldown(report_type, retry_after_secs),
            PipelineError::Validation { message } => Self::bad_request(message),
            PipelineError::Configuration { message } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, codes::INTERNAL, message)
            }
            PipelineError::Crypto(err) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::INTERNAL,
                err.to_string(),
            ),
            PipelineError::Adapter(err) => {
                Self::new(StatusCode::BAD_GATEWAY, codes::PLATFORM, err.to_string())
            }
            PipelineError::Repo(err) => match err {
                RepoError::NotFound => Self::not_found("resource not found"),
                RepoError::Duplicate { constraint } => Self::new(
                    StatusCode::CONFLICT,
                    codes::DUPLICATE,
                    format!("duplicate record violates `{constraint}`"),
                ),
                other => Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    codes::REPO,
                    other.to_string(),
                ),
            },
            PipelineError::Domain(err) => match err {
                DomainError::NotFound { entity } => {
                    Self::not_found(format!("{entity} not found"))
                }
                other => Self::bad_request(other.to_string()),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}
