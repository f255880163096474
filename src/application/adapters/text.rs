//! X adapter: the simple text-post platform.

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{
    AdapterError, MetricRecord, MetricsBatch, PlatformAdapter, PlatformCredentials,
    PublishRequest, TokenPair, ensure_success,
};
use crate::domain::types::Platform;

pub struct XAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl XAdapter {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[derive(Deserialize)]
struct CreatedTweet {
    data: CreatedTweetData,
}

#[derive(Deserialize)]
struct CreatedTweetData {
    id: String,
}

#[derive(Deserialize)]
struct RefreshedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TweetListing {
    #[serde(default)]
    data: Vec<TweetItem>,
}

#[derive(Deserialize)]
struct TweetItem {
    id: String,
    text: String,
    created_at: String,
    public_metrics: TweetMetrics,
}

#[derive(Deserialize)]
struct TweetMetrics {
    like_count: i64,
    reply_count: i64,
    retweet_count: i64,
    #[serde(default)]
    impression_count: i64,
}

#[async_trait]
impl PlatformAdapter for XAdapter {
    fn platform(&self) -> Platform {
        Platform::X
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: PublishRequest<'_>,
    ) -> Result<String, AdapterError> {
        // Media is optional here; a link is carried inline in the text.
        let text = match request.media_url {
            Some(url) => format!("{} {url}", request.body),
            None => request.body.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .bearer_auth(&credentials.access_token)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        let created: CreatedTweet = ensure_success(response).await?.json().await?;
        Ok(created.data.id)
    }

    async fn refresh_credentials(&self, refresh_token: &str) -> Result<TokenPair, AdapterError> {
        let response = self
            .client
            .post(format!("{}/2/oauth2/token", self.base_url))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;
        let refreshed: RefreshedToken = ensure_success(response).await?.json().await?;
        Ok(TokenPair {
            access_token: refreshed.access_token,
            // X rotates refresh tokens on every exchange.
            refresh_token: refreshed.refresh_token,
            expires_in_secs: refreshed.expires_in,
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        since: OffsetDateTime,
    ) -> Result<MetricsBatch, AdapterError> {
        let start_time = since
            .format(&Rfc3339)
            .map_err(|err| AdapterError::payload(err.to_string()))?;
        let response = self
            .client
            .get(format!("{}/2/users/me/tweets", self.base_url))
            .bearer_auth(&credentials.access_token)
            .query(&[
                ("tweet.fields", "public_metrics,created_at"),
                ("start_time", start_time.as_str()),
            ])
            .send()
            .await?;
        let listing: TweetListing = ensure_success(response).await?.json().await?;

        let mut posts = Vec::with_capacity(listing.data.len());
        for item in listing.data {
            let posted_at = OffsetDateTime::parse(&item.created_at, &Rfc3339)
                .map_err(|err| AdapterError::payload(format!("bad created_at: {err}")))?;
            posts.push(MetricRecord {
                external_post_id: item.id,
                body: item.text,
                media_url: None,
                likes: item.public_metrics.like_count,
                comments: item.public_metrics.reply_count,
                shares: item.public_metrics.retweet_count,
                impressions: item.public_metrics.impression_count,
                posted_at,
            });
        }

        // X exposes no channel-level counters on this surface; reach is
        // derived from the per-post impressions downstream.
        Ok(MetricsBatch {
            posts,
            channel: None,
        })
    }
}
