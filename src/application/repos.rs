//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    ChannelStatsRecord, ConnectionRecord, HistoricalPostRecord, ScheduledPostRecord,
};
use crate::domain::types::{Platform, PostStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct UpsertConnectionParams {
    pub account_id: Uuid,
    pub platform: Platform,
    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: String,
    pub token_expires_at: Option<OffsetDateTime>,
    pub page_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateConnectionTokensParams {
    pub connection_id: Uuid,
    pub access_token_ciphertext: String,
    pub refresh_token_ciphertext: String,
    pub token_expires_at: Option<OffsetDateTime>,
}

#[async_trait]
pub trait ConnectionsRepo: Send + Sync {
    async fn find_connection(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ConnectionRecord>, RepoError>;

    async fn upsert_connection(
        &self,
        params: UpsertConnectionParams,
    ) -> Result<ConnectionRecord, RepoError>;

    /// Replace the stored token pair in one atomic write. Returns `false`
    /// when the connection no longer exists (disconnected mid-operation);
    /// the caller must treat that as a credential error, never re-create.
    async fn update_connection_tokens(
        &self,
        params: UpdateConnectionTokensParams,
    ) -> Result<bool, RepoError>;

    async fn delete_connection(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<bool, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateScheduledPostParams {
    pub account_id: Uuid,
    pub platform: Platform,
    pub body: String,
    pub media_url: Option<String>,
    pub scheduled_at: OffsetDateTime,
}

#[async_trait]
pub trait ScheduledPostsRepo: Send + Sync {
    async fn create_post(
        &self,
        params: CreateScheduledPostParams,
    ) -> Result<ScheduledPostRecord, RepoError>;

    async fn find_post(&self, id: Uuid) -> Result<Option<ScheduledPostRecord>, RepoError>;

    async fn list_posts(
        &self,
        account_id: Uuid,
        status: Option<PostStatus>,
    ) -> Result<Vec<ScheduledPostRecord>, RepoError>;

    /// Posts with status `scheduled` whose `scheduled_at` is at or before
    /// `now`, oldest first.
    async fn list_due_posts(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ScheduledPostRecord>, RepoError>;

    /// Transition `scheduled -> posted`, recording the platform-assigned id
    /// and zeroing metric fields. Guarded on the current status; returns
    /// `false` when another run already moved the post.
    async fn mark_posted(
        &self,
        id: Uuid,
        external_post_id: &str,
        posted_at: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    /// Transition `scheduled -> failed` with the reason. Guarded on the
    /// current status like [`Self::mark_posted`].
    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, RepoError>;

    /// Move `scheduled_at` only, and only while status is still `scheduled`.
    async fn reschedule(&self, id: Uuid, scheduled_at: OffsetDateTime) -> Result<bool, RepoError>;

    /// Manual retry path: `failed -> scheduled` with a fresh timestamp,
    /// clearing the failure reason.
    async fn retry_failed(&self, id: Uuid, scheduled_at: OffsetDateTime)
    -> Result<bool, RepoError>;

    async fn delete_post(&self, id: Uuid, account_id: Uuid) -> Result<bool, RepoError>;
}

/// One upsert-ready metric item produced by a platform adapter.
#[derive(Debug, Clone)]
pub struct HistoricalUpsert {
    pub external_post_id: String,
    pub body: String,
    pub media_url: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub impressions: i64,
    pub posted_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ChannelStatsUpsert {
    /// `None` keeps the previously stored follower count.
    pub followers: Option<i64>,
    pub reach: i64,
    pub engagement_rate: f64,
}

/// Everything a successful sync pass writes. Persisted atomically: either the
/// whole batch lands (items, channel stats, completion marker, scheduled-post
/// metric snapshots) or none of it does.
#[derive(Debug, Clone)]
pub struct SyncBatch {
    pub account_id: Uuid,
    pub platform: Platform,
    pub report_type: String,
    pub items: Vec<HistoricalUpsert>,
    pub channel: ChannelStatsUpsert,
    pub completed_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncBatchOutcome {
    pub items_upserted: u64,
    pub channel_stats_updated: bool,
}

#[async_trait]
pub trait SyncRepo: Send + Sync {
    /// Completion time of the most recent successful sync for the report
    /// type, if any. Drives the cooldown precondition.
    async fn last_completed_sync(
        &self,
        account_id: Uuid,
        report_type: &str,
    ) -> Result<Option<OffsetDateTime>, RepoError>;

    /// Apply a whole sync batch in a single transaction.
    async fn record_sync_batch(&self, batch: SyncBatch) -> Result<SyncBatchOutcome, RepoError>;

    async fn list_historical_posts(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Vec<HistoricalPostRecord>, RepoError>;

    async fn channel_stats(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ChannelStatsRecord>, RepoError>;
}
