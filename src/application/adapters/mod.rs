//! Platform adapter contract and registry.
//!
//! One adapter per platform implements the capability set: publish a post,
//! refresh an OAuth token pair, fetch engagement metrics. The wire protocol
//! behind each adapter is deliberately opaque; adapters add platforms by
//! adding variants here, never by extending a conditional chain elsewhere.

mod media;
mod paged;
mod text;
mod video;

pub use media::InstagramAdapter;
pub use paged::FacebookAdapter;
pub use text::XAdapter;
pub use video::YoutubeAdapter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::error::PipelineError;
use crate::config::PlatformsSettings;
use crate::domain::types::Platform;

/// Decrypted credential material handed to an adapter for one call.
/// Lives only on the stack; never cached, logged, or persisted.
#[derive(Debug, Clone)]
pub struct PlatformCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub page_id: Option<String>,
}

/// Result of a credential refresh. `refresh_token` is `None` when the
/// platform does not rotate refresh tokens; callers keep the previous one.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_secs: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub body: &'a str,
    pub media_url: Option<&'a str>,
}

/// Engagement numbers for one published post, as reported by the platform.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub external_post_id: String,
    pub body: String,
    pub media_url: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub impressions: i64,
    pub posted_at: OffsetDateTime,
}

/// Channel-level counters, where the platform exposes them.
#[derive(Debug, Clone, Copy)]
pub struct ChannelMetrics {
    pub followers: i64,
    pub impressions: i64,
}

#[derive(Debug, Clone)]
pub struct MetricsBatch {
    pub posts: Vec<MetricRecord>,
    pub channel: Option<ChannelMetrics>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The platform rejected the access token. The dispatcher responds with
    /// one refresh-and-retry; everything else treats this as terminal.
    #[error("platform rejected the access token")]
    StaleCredentials,
    #[error("platform rejected the request: {message}")]
    Rejected { message: String },
    #[error("transport failure talking to the platform: {message}")]
    Transport { message: String },
    #[error("platform response was malformed: {message}")]
    Payload { message: String },
}

impl AdapterError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn payload(message: impl Into<String>) -> Self {
        Self::Payload {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

/// Capability set implemented once per platform.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish content, returning the platform-assigned post id.
    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: PublishRequest<'_>,
    ) -> Result<String, AdapterError>;

    /// Exchange the refresh token for a fresh pair. Idempotent in effect:
    /// safe to call while the current token is still valid, and safe to call
    /// more than once.
    async fn refresh_credentials(&self, refresh_token: &str) -> Result<TokenPair, AdapterError>;

    /// Pull recent posts and their engagement counters since the cutoff.
    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        since: OffsetDateTime,
    ) -> Result<MetricsBatch, AdapterError>;
}

/// Adapter lookup by platform identifier. A missing registration is a
/// configuration error, not a runtime adapter failure.
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build the production registry with every supported platform wired to
    /// its configured endpoint.
    pub fn from_settings(settings: &PlatformsSettings, client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(XAdapter::new(
            client.clone(),
            settings.x.base_url.clone(),
        )));
        registry.register(Arc::new(FacebookAdapter::new(
            client.clone(),
            settings.facebook.base_url.clone(),
        )));
        registry.register(Arc::new(InstagramAdapter::new(
            client.clone(),
            settings.instagram.base_url.clone(),
        )));
        registry.register(Arc::new(YoutubeAdapter::new(
            client,
            settings.youtube.base_url.clone(),
        )));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>, PipelineError> {
        self.adapters.get(&platform).cloned().ok_or_else(|| {
            PipelineError::configuration(format!("no adapter registered for platform `{platform}`"))
        })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared response triage for the HTTP-backed adapters: 401 means the access
/// token went stale; any other non-success status is a rejection carrying the
/// response body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(AdapterError::StaleCredentials);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::rejected(format!("{status}: {body}")))
}
