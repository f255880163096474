//! YouTube adapter: two-step upload (open a resumable session, then push the
//! video source into it) plus channel-level statistics.

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{
    AdapterError, ChannelMetrics, MetricRecord, MetricsBatch, PlatformAdapter,
    PlatformCredentials, PublishRequest, TokenPair, ensure_success,
};
use crate::domain::types::Platform;

pub struct YoutubeAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl YoutubeAdapter {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Deserialize)]
struct UploadedVideo {
    id: String,
}

#[derive(Deserialize)]
struct RefreshedToken {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct VideoListing {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    id: String,
    snippet: VideoSnippet,
    statistics: VideoStatistics,
}

#[derive(Deserialize)]
struct VideoSnippet {
    #[serde(default)]
    description: String,
    #[serde(rename = "publishedAt")]
    published_at: String,
}

// Counters arrive as decimal strings on this API.
#[derive(Deserialize)]
struct VideoStatistics {
    #[serde(rename = "viewCount", default)]
    view_count: String,
    #[serde(rename = "likeCount", default)]
    like_count: String,
    #[serde(rename = "commentCount", default)]
    comment_count: String,
}

#[derive(Deserialize)]
struct ChannelListing {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    statistics: ChannelStatistics,
}

#[derive(Deserialize)]
struct ChannelStatistics {
    #[serde(rename = "subscriberCount", default)]
    subscriber_count: String,
    #[serde(rename = "viewCount", default)]
    view_count: String,
}

fn parse_counter(value: &str) -> i64 {
    value.parse().unwrap_or(0)
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: PublishRequest<'_>,
    ) -> Result<String, AdapterError> {
        let media_url = request
            .media_url
            .ok_or_else(|| AdapterError::rejected("youtube requires a video attachment"))?;

        // Step one: open a resumable upload session for the metadata.
        let initiate = self
            .client
            .post(format!("{}/upload/videos", self.base_url))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&credentials.access_token)
            .json(&serde_json::json!({
                "snippet": { "description": request.body },
                "status": { "privacyStatus": "public" },
            }))
            .send()
            .await?;
        let initiate = ensure_success(initiate).await?;
        let session_url = initiate
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| AdapterError::payload("upload session missing Location header"))?;

        // Step two: push the video source into the session.
        let upload = self
            .client
            .put(session_url)
            .bearer_auth(&credentials.access_token)
            .json(&serde_json::json!({ "source_url": media_url }))
            .send()
            .await?;
        let uploaded: UploadedVideo = ensure_success(upload).await?.json().await?;
        Ok(uploaded.id)
    }

    async fn refresh_credentials(&self, refresh_token: &str) -> Result<TokenPair, AdapterError> {
        let response = self
            .client
            .post(format!("{}/oauth2/token", self.base_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let refreshed: RefreshedToken = ensure_success(response).await?.json().await?;
        Ok(TokenPair {
            access_token: refreshed.access_token,
            // Google refresh tokens are long-lived and not rotated.
            refresh_token: None,
            expires_in_secs: refreshed.expires_in,
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        since: OffsetDateTime,
    ) -> Result<MetricsBatch, AdapterError> {
        let published_after = since
            .format(&Rfc3339)
            .map_err(|err| AdapterError::payload(err.to_string()))?;

        let response = self
            .client
            .get(format!("{}/videos", self.base_url))
            .bearer_auth(&credentials.access_token)
            .query(&[
                ("mine", "true"),
                ("part", "snippet,statistics"),
                ("publishedAfter", published_after.as_str()),
            ])
            .send()
            .await?;
        let listing: VideoListing = ensure_success(response).await?.json().await?;

        let mut posts = Vec::with_capacity(listing.items.len());
        for item in listing.items {
            let posted_at = OffsetDateTime::parse(&item.snippet.published_at, &Rfc3339)
                .map_err(|err| AdapterError::payload(format!("bad publishedAt: {err}")))?;
            posts.push(MetricRecord {
                external_post_id: item.id,
                body: item.snippet.description,
                media_url: None,
                likes: parse_counter(&item.statistics.like_count),
                comments: parse_counter(&item.statistics.comment_count),
                shares: 0,
                impressions: parse_counter(&item.statistics.view_count),
                posted_at,
            });
        }

        let channel_response = self
            .client
            .get(format!("{}/channels", self.base_url))
            .bearer_auth(&credentials.access_token)
            .query(&[("mine", "true"), ("part", "statistics")])
            .send()
            .await?;
        let channels: ChannelListing = ensure_success(channel_response).await?.json().await?;
        let channel = channels.items.first().map(|item| ChannelMetrics {
            followers: parse_counter(&item.statistics.subscriber_count),
            impressions: parse_counter(&item.statistics.view_count),
        });

        Ok(MetricsBatch { posts, channel })
    }
}
