//! Persisted records. Field layouts mirror the migration schema.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{Platform, PostStatus};

/// Stored OAuth credential set for one (account, platform) pair.
///
/// Token columns hold vault ciphertext, never plaintext. At most one active
/// row per (account, platform); disconnecting deletes the row.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub platform: Platform,
    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: String,
    pub token_expires_at: Option<OffsetDateTime>,
    pub page_id: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One unit of future publication, created by the external composer.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledPostRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub platform: Platform,
    pub body: String,
    pub media_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    pub status: PostStatus,
    /// Platform-assigned id, populated only after a successful publish.
    pub external_post_id: Option<String>,
    pub likes: i64,
    pub shares: i64,
    pub impressions: i64,
    pub failure_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Upserted metric record keyed by (account, platform, external post id).
///
/// Write target of the sync engine and read source for aggregate reporting.
/// Legitimately overwritten many times.
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalPostRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub platform: Platform,
    pub external_post_id: String,
    pub body: String,
    pub media_url: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub impressions: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub posted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub synced_at: OffsetDateTime,
}

/// Per-channel aggregate figures, one row per (account, platform).
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStatsRecord {
    pub account_id: Uuid,
    pub platform: Platform,
    pub followers: i64,
    pub reach: i64,
    pub engagement_rate: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub synced_at: OffsetDateTime,
}

