//! JSON handlers for the API surface.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::calendar::CreatePostInput;
use crate::application::credentials::ConnectParams;
use crate::domain::entities::{ChannelStatsRecord, HistoricalPostRecord, ScheduledPostRecord};
use crate::domain::types::{Platform, PostStatus};

use super::error::ApiError;
use super::middleware::AccountId;
use super::state::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, ApiError> {
    if let Some(db) = state.db.as_ref() {
        db.health_check().await.map_err(|err| {
            ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                super::error::codes::REPO,
                format!("database unreachable: {err}"),
            )
        })?;
    }
    Ok(Json(HealthResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub platform: Platform,
    pub body: String,
    pub media_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
}

pub async fn create_post(
    State(state): State<ApiState>,
    account: AccountId,
    Json(request): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<ScheduledPostRecord>), ApiError> {
    let record = state
        .calendar
        .create_post(CreatePostInput {
            account_id: account.0,
            platform: request.platform,
            body: request.body,
            media_url: request.media_url,
            scheduled_at: request.scheduled_at,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    pub status: Option<PostStatus>,
}

pub async fn list_posts(
    State(state): State<ApiState>,
    account: AccountId,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<Vec<ScheduledPostRecord>>, ApiError> {
    let posts = state.calendar.list_posts(account.0, query.status).await?;
    Ok(Json(posts))
}

pub async fn delete_post(
    State(state): State<ApiState>,
    account: AccountId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.calendar.delete_post(account.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ScheduleChangeRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
}

pub async fn reschedule_post(
    State(state): State<ApiState>,
    account: AccountId,
    Path(id): Path<Uuid>,
    Json(request): Json<ScheduleChangeRequest>,
) -> Result<Json<ScheduledPostRecord>, ApiError> {
    let record = state
        .calendar
        .reschedule(account.0, id, request.scheduled_at)
        .await?;
    Ok(Json(record))
}

pub async fn retry_post(
    State(state): State<ApiState>,
    account: AccountId,
    Path(id): Path<Uuid>,
    Json(request): Json<ScheduleChangeRequest>,
) -> Result<Json<ScheduledPostRecord>, ApiError> {
    let record = state
        .calendar
        .retry_failed(account.0, id, request.scheduled_at)
        .await?;
    Ok(Json(record))
}

#[derive(Debug, Serialize)]
pub struct DispatchRunResponse {
    pub processed: u64,
    pub published: u64,
    pub failed: u64,
}

/// Manual dispatch trigger, same pass the cron worker runs.
pub async fn run_dispatch(
    State(state): State<ApiState>,
) -> Result<Json<DispatchRunResponse>, ApiError> {
    let outcome = state.dispatcher.run().await?;
    Ok(Json(DispatchRunResponse {
        processed: outcome.processed,
        published: outcome.published,
        failed: outcome.failed,
    }))
}

#[derive(Debug, Serialize)]
pub struct SyncRunResponse {
    pub items_upserted: u64,
    pub channel_stats_updated: bool,
}

pub async fn run_sync(
    State(state): State<ApiState>,
    account: AccountId,
    Path(platform): Path<Platform>,
) -> Result<Json<SyncRunResponse>, ApiError> {
    let report = state.sync.sync(account.0, platform).await?;
    Ok(Json(SyncRunResponse {
        items_upserted: report.items_upserted,
        channel_stats_updated: report.channel_stats_updated,
    }))
}

pub async fn list_history(
    State(state): State<ApiState>,
    account: AccountId,
    Path(platform): Path<Platform>,
) -> Result<Json<Vec<HistoricalPostRecord>>, ApiError> {
    let posts = state.sync.list_history(account.0, platform).await?;
    Ok(Json(posts))
}

pub async fn channel_stats(
    State(state): State<ApiState>,
    account: AccountId,
    Path(platform): Path<Platform>,
) -> Result<Json<ChannelStatsRecord>, ApiError> {
    let stats = state
        .sync
        .channel_stats(account.0, platform)
        .await?
        .ok_or_else(|| ApiError::not_found("no channel stats synced yet"))?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct PutConnectionRequest {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub token_expires_at: Option<OffsetDateTime>,
    pub page_id: Option<String>,
}

/// Store the outcome of a completed OAuth handshake. The handshake itself is
/// owned by the frontend; this endpoint only persists its result.
pub async fn put_connection(
    State(state): State<ApiState>,
    account: AccountId,
    Path(platform): Path<Platform>,
    Json(request): Json<PutConnectionRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .connections
        .connect(ConnectParams {
            account_id: account.0,
            platform,
            access_token: request.access_token,
            refresh_token: request.refresh_token,
            token_expires_at: request.token_expires_at,
            page_id: request.page_id,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_connection(
    State(state): State<ApiState>,
    account: AccountId,
    Path(platform): Path<Platform>,
) -> Result<StatusCode, ApiError> {
    state.connections.disconnect(account.0, platform).await?;
    Ok(StatusCode::NO_CONTENT)
}
