//! Metrics sync: pull engagement counters from a platform and fold them into
//! local history, at most once per cooldown window.

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::application::adapters::{AdapterError, AdapterRegistry, MetricsBatch};
use crate::application::credentials::ConnectionService;
use crate::application::error::PipelineError;
use crate::application::repos::{ChannelStatsUpsert, HistoricalUpsert, SyncBatch, SyncRepo};
use crate::config::SyncSettings;
use crate::domain::entities::{ChannelStatsRecord, HistoricalPostRecord};
use crate::domain::types::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub items_upserted: u64,
    pub channel_stats_updated: bool,
}

pub struct SyncEngine {
    sync: Arc<dyn SyncRepo>,
    connections: Arc<ConnectionService>,
    registry: Arc<AdapterRegistry>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        sync: Arc<dyn SyncRepo>,
        connections: Arc<ConnectionService>,
        registry: Arc<AdapterRegistry>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            sync,
            connections,
            registry,
            settings,
        }
    }

    fn cooldown_secs(&self, report_type: &str) -> u64 {
        self.settings
            .cooldown_overrides
            .get(report_type)
            .copied()
            .unwrap_or(self.settings.cooldown_secs)
    }

    /// Run one sync pass for (account, platform). Fails fast inside the
    /// cooldown window without touching any state.
    pub async fn sync(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<SyncReport, PipelineError> {
        let report_type = platform.report_type();
        let now = OffsetDateTime::now_utc();

        if let Some(last) = self.sync.last_completed_sync(account_id, report_type).await? {
            let cooldown = Duration::seconds(self.cooldown_secs(report_type) as i64);
            let elapsed = now - last;
            if elapsed < cooldown {
                let retry_after_secs = (cooldown - elapsed).whole_seconds().max(1) as u64;
                return Err(PipelineError::Cooldown {
                    report_type,
                    retry_after_secs,
                });
            }
        }

        let mut connection = self.connections.resolve(account_id, platform).await?;
        let adapter = self.registry.get(platform)?;

        // Refresh ahead of the fetch when the stored token is known-expired.
        if connection.is_expired(now) {
            let pair = adapter
                .refresh_credentials(&connection.credentials.refresh_token)
                .await?;
            connection.credentials = self.connections.persist_refreshed(&connection, pair).await?;
            metrics::counter!("outpost_token_refreshes_total").increment(1);
        }

        let since = now - Duration::days(i64::from(self.settings.lookback_days));
        let batch = match adapter.fetch_metrics(&connection.credentials, since).await {
            Ok(batch) => batch,
            Err(AdapterError::StaleCredentials) => {
                let pair = adapter
                    .refresh_credentials(&connection.credentials.refresh_token)
                    .await?;
                let credentials = self.connections.persist_refreshed(&connection, pair).await?;
                metrics::counter!("outpost_token_refreshes_total").increment(1);
                adapter.fetch_metrics(&credentials, since).await?
            }
            Err(err) => return Err(err.into()),
        };

        let channel = derive_channel_stats(&batch);
        let items = batch
            .posts
            .into_iter()
            .map(|record| HistoricalUpsert {
                external_post_id: record.external_post_id,
                body: record.body,
                media_url: record.media_url,
                likes: record.likes,
                comments: record.comments,
                shares: record.shares,
                impressions: record.impressions,
                posted_at: record.posted_at,
            })
            .collect::<Vec<_>>();

        let outcome = self
            .sync
            .record_sync_batch(SyncBatch {
                account_id,
                platform,
                report_type: report_type.to_string(),
                items,
                channel,
                completed_at: OffsetDateTime::now_utc(),
            })
            .await?;

        metrics::counter!("outpost_metrics_synced_total").increment(outcome.items_upserted);
        info!(
            target = "application::sync",
            account_id = %account_id,
            platform = %platform,
            items = outcome.items_upserted,
            "metrics sync completed"
        );

        Ok(SyncReport {
            items_upserted: outcome.items_upserted,
            channel_stats_updated: outcome.channel_stats_updated,
        })
    }

    pub async fn list_history(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Vec<HistoricalPostRecord>, PipelineError> {
        Ok(self.sync.list_historical_posts(account_id, platform).await?)
    }

    pub async fn channel_stats(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ChannelStatsRecord>, PipelineError> {
        Ok(self.sync.channel_stats(account_id, platform).await?)
    }
}

/// Reach prefers the channel-level impression counter; platforms without one
/// fall back to the sum of per-post impressions. Engagement rate is total
/// interactions over total impressions, zero when nothing was seen.
fn derive_channel_stats(batch: &MetricsBatch) -> ChannelStatsUpsert {
    let post_impressions: i64 = batch.posts.iter().map(|p| p.impressions).sum();
    let interactions: i64 = batch
        .posts
        .iter()
        .map(|p| p.likes + p.comments + p.shares)
        .sum();

    let reach = batch
        .channel
        .map(|c| c.impressions)
        .unwrap_or(post_impressions);
    let engagement_rate = if post_impressions > 0 {
        interactions as f64 / post_impressions as f64
    } else {
        0.0
    };

    ChannelStatsUpsert {
        followers: batch.channel.map(|c| c.followers),
        reach,
        engagement_rate,
    }
}
