use sqlx::{query, query_as, query_scalar};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, SyncBatch, SyncBatchOutcome, SyncRepo};
use crate::domain::entities::{ChannelStatsRecord, HistoricalPostRecord};
use crate::domain::types::Platform;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct HistoricalPostRow {
    id: Uuid,
    account_id: Uuid,
    platform: Platform,
    external_post_id: String,
    body: String,
    media_url: Option<String>,
    likes: i64,
    comments: i64,
    shares: i64,
    impressions: i64,
    posted_at: OffsetDateTime,
    synced_at: OffsetDateTime,
}

impl From<HistoricalPostRow> for HistoricalPostRecord {
    fn from(row: HistoricalPostRow) -> Self {
        HistoricalPostRecord {
            id: row.id,
            account_id: row.account_id,
            platform: row.platform,
            external_post_id: row.external_post_id,
            body: row.body,
            media_url: row.media_url,
            likes: row.likes,
            comments: row.comments,
            shares: row.shares,
            impressions: row.impressions,
            posted_at: row.posted_at,
            synced_at: row.synced_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChannelStatsRow {
    account_id: Uuid,
    platform: Platform,
    followers: i64,
    reach: i64,
    engagement_rate: f64,
    synced_at: OffsetDateTime,
}

impl From<ChannelStatsRow> for ChannelStatsRecord {
    fn from(row: ChannelStatsRow) -> Self {
        ChannelStatsRecord {
            account_id: row.account_id,
            platform: row.platform,
            followers: row.followers,
            reach: row.reach,
            engagement_rate: row.engagement_rate,
            synced_at: row.synced_at,
        }
    }
}

#[async_trait::async_trait]
impl SyncRepo for PostgresRepositories {
    async fn last_completed_sync(
        &self,
        account_id: Uuid,
        report_type: &str,
    ) -> Result<Option<OffsetDateTime>, RepoError> {
        query_scalar::<_, OffsetDateTime>(
            "SELECT completed_at FROM sync_runs \
             WHERE account_id = $1 AND report_type = $2 \
             ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(account_id)
        .bind(report_type)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    /// The whole batch lands in one transaction: historical upserts, the
    /// channel stats row, metric snapshots on matching published posts, and
    /// the completion marker that arms the cooldown.
    async fn record_sync_batch(&self, batch: SyncBatch) -> Result<SyncBatchOutcome, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let mut items_upserted = 0u64;

        for item in &batch.items {
            query(
                "INSERT INTO historical_posts \
                     (id, account_id, platform, external_post_id, body, media_url, \
                      likes, comments, shares, impressions, posted_at, synced_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                 ON CONFLICT (account_id, platform, external_post_id) DO UPDATE SET \
                     body = EXCLUDED.body, \
                     media_url = EXCLUDED.media_url, \
                     likes = EXCLUDED.likes, \
                     comments = EXCLUDED.comments, \
                     shares = EXCLUDED.shares, \
                     impressions = EXCLUDED.impressions, \
                     synced_at = EXCLUDED.synced_at",
            )
            .bind(Uuid::new_v4())
            .bind(batch.account_id)
            .bind(batch.platform)
            .bind(&item.external_post_id)
            .bind(&item.body)
            .bind(&item.media_url)
            .bind(item.likes)
            .bind(item.comments)
            .bind(item.shares)
            .bind(item.impressions)
            .bind(item.posted_at)
            .bind(batch.completed_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            items_upserted += 1;

            // Mirror fresh counters onto the calendar entry that produced
            // the post, when there is one.
            query(
                "UPDATE scheduled_posts SET \
                     likes = $4, shares = $5, impressions = $6, updated_at = $7 \
                 WHERE account_id = $1 AND platform = $2 \
                   AND external_post_id = $3 AND status = 'posted'",
            )
            .bind(batch.account_id)
            .bind(batch.platform)
            .bind(&item.external_post_id)
            .bind(item.likes)
            .bind(item.shares)
            .bind(item.impressions)
            .bind(batch.completed_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        query(
            "INSERT INTO channel_stats \
                 (account_id, platform, followers, reach, engagement_rate, synced_at) \
             VALUES ($1, $2, COALESCE($3, 0), $4, $5, $6) \
             ON CONFLICT (account_id, platform) DO UPDATE SET \
                 followers = COALESCE($3, channel_stats.followers), \
                 reach = EXCLUDED.reach, \
                 engagement_rate = EXCLUDED.engagement_rate, \
                 synced_at = EXCLUDED.synced_at",
        )
        .bind(batch.account_id)
        .bind(batch.platform)
        .bind(batch.channel.followers)
        .bind(batch.channel.reach)
        .bind(batch.channel.engagement_rate)
        .bind(batch.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        query(
            "INSERT INTO sync_runs (id, account_id, report_type, items_upserted, completed_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(batch.account_id)
        .bind(&batch.report_type)
        .bind(items_upserted as i64)
        .bind(batch.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(SyncBatchOutcome {
            items_upserted,
            channel_stats_updated: true,
        })
    }

    async fn list_historical_posts(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Vec<HistoricalPostRecord>, RepoError> {
        let rows = query_as::<_, HistoricalPostRow>(
            "SELECT id, account_id, platform, external_post_id, body, media_url, \
                    likes, comments, shares, impressions, posted_at, synced_at \
             FROM historical_posts \
             WHERE account_id = $1 AND platform = $2 \
             ORDER BY posted_at DESC",
        )
        .bind(account_id)
        .bind(platform)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn channel_stats(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ChannelStatsRecord>, RepoError> {
        let row = query_as::<_, ChannelStatsRow>(
            "SELECT account_id, platform, followers, reach, engagement_rate, synced_at \
             FROM channel_stats \
             WHERE account_id = $1 AND platform = $2",
        )
        .bind(account_id)
        .bind(platform)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }
}
