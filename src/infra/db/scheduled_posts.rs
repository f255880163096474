use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateScheduledPostParams, RepoError, ScheduledPostsRepo};
use crate::domain::entities::ScheduledPostRecord;
use crate::domain::types::{Platform, PostStatus};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct ScheduledPostRow {
    id: Uuid,
    account_id: Uuid,
    platform: Platform,
    body: String,
    media_url: Option<String>,
    scheduled_at: OffsetDateTime,
    status: PostStatus,
    external_post_id: Option<String>,
    likes: i64,
    shares: i64,
    impressions: i64,
    failure_reason: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ScheduledPostRow> for ScheduledPostRecord {
    fn from(row: ScheduledPostRow) -> Self {
        ScheduledPostRecord {
            id: row.id,
            account_id: row.account_id,
            platform: row.platform,
            body: row.body,
            media_url: row.media_url,
            scheduled_at: row.scheduled_at,
            status: row.status,
            external_post_id: row.external_post_id,
            likes: row.likes,
            shares: row.shares,
            impressions: row.impressions,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const POST_COLUMNS: &str = "id, account_id, platform, body, media_url, scheduled_at, status, \
     external_post_id, likes, shares, impressions, failure_reason, created_at, updated_at";

#[async_trait::async_trait]
impl ScheduledPostsRepo for PostgresRepositories {
    async fn create_post(
        &self,
        params: CreateScheduledPostParams,
    ) -> Result<ScheduledPostRecord, RepoError> {
        let row = query_as::<_, ScheduledPostRow>(&format!(
            "INSERT INTO scheduled_posts \
                 (id, account_id, platform, body, media_url, scheduled_at, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 'scheduled', $7, $7) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(params.account_id)
        .bind(params.platform)
        .bind(params.body)
        .bind(params.media_url)
        .bind(params.scheduled_at)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<ScheduledPostRecord>, RepoError> {
        let row = query_as::<_, ScheduledPostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM scheduled_posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_posts(
        &self,
        account_id: Uuid,
        status: Option<PostStatus>,
    ) -> Result<Vec<ScheduledPostRecord>, RepoError> {
        let rows = match status {
            Some(status) => {
                query_as::<_, ScheduledPostRow>(&format!(
                    "SELECT {POST_COLUMNS} FROM scheduled_posts \
                     WHERE account_id = $1 AND status = $2 \
                     ORDER BY scheduled_at"
                ))
                .bind(account_id)
                .bind(status)
                .fetch_all(self.pool())
                .await
            }
            None => {
                query_as::<_, ScheduledPostRow>(&format!(
                    "SELECT {POST_COLUMNS} FROM scheduled_posts \
                     WHERE account_id = $1 \
                     ORDER BY scheduled_at"
                ))
                .bind(account_id)
                .fetch_all(self.pool())
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_due_posts(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ScheduledPostRecord>, RepoError> {
        let rows = query_as::<_, ScheduledPostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM scheduled_posts \
             WHERE status = 'scheduled' AND scheduled_at <= $1 \
             ORDER BY scheduled_at \
             LIMIT $2"
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_posted(
        &self,
        id: Uuid,
        external_post_id: &str,
        posted_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET \
                 status = 'posted', \
                 external_post_id = $2, \
                 likes = 0, shares = 0, impressions = 0, \
                 failure_reason = NULL, \
                 updated_at = $3 \
             WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .bind(external_post_id)
        .bind(posted_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET \
                 status = 'failed', \
                 failure_reason = $2, \
                 updated_at = $3 \
             WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .bind(reason)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reschedule(&self, id: Uuid, scheduled_at: OffsetDateTime) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET scheduled_at = $2, updated_at = $3 \
             WHERE id = $1 AND status = 'scheduled'",
        )
        .bind(id)
        .bind(scheduled_at)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn retry_failed(
        &self,
        id: Uuid,
        scheduled_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE scheduled_posts SET \
                 status = 'scheduled', \
                 scheduled_at = $2, \
                 failure_reason = NULL, \
                 updated_at = $3 \
             WHERE id = $1 AND status = 'failed'",
        )
        .bind(id)
        .bind(scheduled_at)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&self, id: Uuid, account_id: Uuid) -> Result<bool, RepoError> {
        let result =
            sqlx::query("DELETE FROM scheduled_posts WHERE id = $1 AND account_id = $2")
                .bind(id)
                .bind(account_id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
