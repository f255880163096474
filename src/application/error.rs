use thiserror::Error;

use crate::application::adapters::AdapterError;
use crate::application::repos::RepoError;
use crate::application::vault::CryptoError;
use crate::config::LoadError;
use crate::domain::error::DomainError;
use crate::domain::types::Platform;
use crate::infra::error::InfraError;

/// Error taxonomy of the publishing pipeline.
///
/// Propagation policy: per-post failures inside a dispatch run are caught and
/// converted into status transitions; sync failures abort the platform's
/// transaction and surface here; everything else bubbles to the HTTP layer.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No active connection for the platform; the OAuth handshake never
    /// happened or the account disconnected.
    #[error("no active connection for platform `{platform}`")]
    NotConnected { platform: Platform },

    /// The connection vanished between load and token persistence.
    #[error("connection for platform `{platform}` was disconnected mid-operation")]
    Disconnected { platform: Platform },

    /// Sync requested before the cooldown window elapsed. No state change.
    #[error("sync for `{report_type}` is cooling down, retry in {retry_after_secs}s")]
    Cooldown {
        report_type: &'static str,
        retry_after_secs: u64,
    },

    /// Unknown platform identifier or missing adapter registration. Fatal,
    /// never retried.
    #[error("platform configuration error: {message}")]
    Configuration { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Top-level process error for the binary entrypoints.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{message}")]
    Unexpected { message: String },
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }
}
