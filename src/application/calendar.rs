//! Calendar mutations over scheduled posts.
//!
//! Everything here is account-scoped and status-guarded: a mutation only
//! applies while the post is in the state the caller saw, so a dispatch run
//! racing a reschedule can never double-publish or revive a published post.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::error::PipelineError;
use crate::application::repos::{CreateScheduledPostParams, ScheduledPostsRepo};
use crate::domain::entities::ScheduledPostRecord;
use crate::domain::error::DomainError;
use crate::domain::types::{Platform, PostStatus};

#[derive(Debug, Clone)]
pub struct CreatePostInput {
    pub account_id: Uuid,
    pub platform: Platform,
    pub body: String,
    pub media_url: Option<String>,
    pub scheduled_at: OffsetDateTime,
}

pub struct CalendarService {
    posts: Arc<dyn ScheduledPostsRepo>,
}

impl CalendarService {
    pub fn new(posts: Arc<dyn ScheduledPostsRepo>) -> Self {
        Self { posts }
    }

    pub async fn create_post(
        &self,
        input: CreatePostInput,
    ) -> Result<ScheduledPostRecord, PipelineError> {
        if input.body.trim().is_empty() {
            return Err(PipelineError::validation("post body must not be empty"));
        }
        if input.platform.requires_media() && input.media_url.is_none() {
            return Err(PipelineError::validation(format!(
                "platform `{}` requires a media attachment",
                input.platform
            )));
        }
        if input.scheduled_at <= OffsetDateTime::now_utc() {
            return Err(PipelineError::validation(
                "scheduled_at must be in the future",
            ));
        }

        let record = self
            .posts
            .create_post(CreateScheduledPostParams {
                account_id: input.account_id,
                platform: input.platform,
                body: input.body,
                media_url: input.media_url,
                scheduled_at: input.scheduled_at,
            })
            .await?;

        info!(
            target = "application::calendar",
            post_id = %record.id,
            platform = %record.platform,
            "post scheduled"
        );
        Ok(record)
    }

    pub async fn list_posts(
        &self,
        account_id: Uuid,
        status: Option<PostStatus>,
    ) -> Result<Vec<ScheduledPostRecord>, PipelineError> {
        Ok(self.posts.list_posts(account_id, status).await?)
    }

    /// Move a scheduled post to a new future time. Rejected once the post has
    /// left the `scheduled` state, even if dispatch moved it mid-request.
    pub async fn reschedule(
        &self,
        account_id: Uuid,
        post_id: Uuid,
        scheduled_at: OffsetDateTime,
    ) -> Result<ScheduledPostRecord, PipelineError> {
        if scheduled_at <= OffsetDateTime::now_utc() {
            return Err(PipelineError::validation(
                "scheduled_at must be in the future",
            ));
        }

        let record = self.find_owned(account_id, post_id).await?;
        if record.status != PostStatus::Scheduled {
            return Err(PipelineError::validation(format!(
                "post is `{}`, only scheduled posts can be rescheduled",
                record.status
            )));
        }

        let moved = self.posts.reschedule(post_id, scheduled_at).await?;
        if !moved {
            // Dispatch won the race between our read and this write.
            return Err(PipelineError::validation(
                "post left the scheduled state before the move applied",
            ));
        }

        info!(
            target = "application::calendar",
            post_id = %post_id,
            "post rescheduled"
        );
        self.find_owned(account_id, post_id).await
    }

    /// Put a failed post back on the calendar at a new time, clearing the
    /// recorded failure reason.
    pub async fn retry_failed(
        &self,
        account_id: Uuid,
        post_id: Uuid,
        scheduled_at: OffsetDateTime,
    ) -> Result<ScheduledPostRecord, PipelineError> {
        if scheduled_at <= OffsetDateTime::now_utc() {
            return Err(PipelineError::validation(
                "scheduled_at must be in the future",
            ));
        }

        let record = self.find_owned(account_id, post_id).await?;
        if record.status != PostStatus::Failed {
            return Err(PipelineError::validation(format!(
                "post is `{}`, only failed posts can be retried",
                record.status
            )));
        }

        let retried = self.posts.retry_failed(post_id, scheduled_at).await?;
        if !retried {
            return Err(PipelineError::validation(
                "post left the failed state before the retry applied",
            ));
        }

        info!(
            target = "application::calendar",
            post_id = %post_id,
            "failed post rescheduled"
        );
        self.find_owned(account_id, post_id).await
    }

    pub async fn delete_post(&self, account_id: Uuid, post_id: Uuid) -> Result<(), PipelineError> {
        let deleted = self.posts.delete_post(post_id, account_id).await?;
        if !deleted {
            return Err(DomainError::not_found("scheduled post").into());
        }
        info!(
            target = "application::calendar",
            post_id = %post_id,
            "post deleted"
        );
        Ok(())
    }

    async fn find_owned(
        &self,
        account_id: Uuid,
        post_id: Uuid,
    ) -> Result<ScheduledPostRecord, PipelineError> {
        let record = self
            .posts
            .find_post(post_id)
            .await?
            .filter(|record| record.account_id == account_id)
            .ok_or_else(|| DomainError::not_found("scheduled post"))?;
        Ok(record)
    }
}
