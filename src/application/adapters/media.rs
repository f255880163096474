//! Instagram adapter: every post requires a media attachment; publishing goes
//! through a media container that is then published in a second call.

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{
    AdapterError, MetricRecord, MetricsBatch, PlatformAdapter, PlatformCredentials,
    PublishRequest, TokenPair, ensure_success,
};
use crate::domain::types::Platform;

pub struct InstagramAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl InstagramAdapter {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Deserialize)]
struct MediaContainer {
    id: String,
}

#[derive(Deserialize)]
struct RefreshedToken {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct MediaListing {
    #[serde(default)]
    data: Vec<MediaItem>,
}

#[derive(Deserialize)]
struct MediaItem {
    id: String,
    #[serde(default)]
    caption: String,
    media_url: Option<String>,
    timestamp: String,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    comments_count: i64,
    #[serde(default)]
    impressions: i64,
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: PublishRequest<'_>,
    ) -> Result<String, AdapterError> {
        let media_url = request
            .media_url
            .ok_or_else(|| AdapterError::rejected("instagram requires a media attachment"))?;

        let container_response = self
            .client
            .post(format!("{}/me/media", self.base_url))
            .json(&serde_json::json!({
                "image_url": media_url,
                "caption": request.body,
                "access_token": credentials.access_token,
            }))
            .send()
            .await?;
        let container: MediaContainer = ensure_success(container_response).await?.json().await?;

        let publish_response = self
            .client
            .post(format!("{}/me/media_publish", self.base_url))
            .json(&serde_json::json!({
                "creation_id": container.id,
                "access_token": credentials.access_token,
            }))
            .send()
            .await?;
        let published: MediaContainer = ensure_success(publish_response).await?.json().await?;
        Ok(published.id)
    }

    async fn refresh_credentials(&self, refresh_token: &str) -> Result<TokenPair, AdapterError> {
        let response = self
            .client
            .get(format!("{}/refresh_access_token", self.base_url))
            .query(&[
                ("grant_type", "ig_refresh_token"),
                ("access_token", refresh_token),
            ])
            .send()
            .await?;
        let refreshed: RefreshedToken = ensure_success(response).await?.json().await?;
        Ok(TokenPair {
            access_token: refreshed.access_token,
            refresh_token: None,
            expires_in_secs: refreshed.expires_in,
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        since: OffsetDateTime,
    ) -> Result<MetricsBatch, AdapterError> {
        let since_unix = since.unix_timestamp().to_string();
        let response = self
            .client
            .get(format!("{}/me/media", self.base_url))
            .query(&[
                ("access_token", credentials.access_token.as_str()),
                ("since", since_unix.as_str()),
                (
                    "fields",
                    "caption,media_url,timestamp,like_count,comments_count,impressions",
                ),
            ])
            .send()
            .await?;
        let listing: MediaListing = ensure_success(response).await?.json().await?;

        let mut posts = Vec::with_capacity(listing.data.len());
        for item in listing.data {
            let posted_at = OffsetDateTime::parse(&item.timestamp, &Rfc3339)
                .map_err(|err| AdapterError::payload(format!("bad timestamp: {err}")))?;
            posts.push(MetricRecord {
                external_post_id: item.id,
                body: item.caption,
                media_url: item.media_url,
                likes: item.like_count,
                comments: item.comments_count,
                // Instagram has no share counter on this surface.
                shares: 0,
                impressions: item.impressions,
                posted_at,
            });
        }

        Ok(MetricsBatch {
            posts,
            channel: None,
        })
    }
}
