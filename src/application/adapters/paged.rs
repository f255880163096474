//! Facebook adapter: publishes on behalf of a selected page, so every call
//! needs the secondary page id stored on the connection.

use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{
    AdapterError, ChannelMetrics, MetricRecord, MetricsBatch, PlatformAdapter,
    PlatformCredentials, PublishRequest, TokenPair, ensure_success,
};
use crate::domain::types::Platform;

pub struct FacebookAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl FacebookAdapter {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    fn page_id<'a>(credentials: &'a PlatformCredentials) -> Result<&'a str, AdapterError> {
        credentials
            .page_id
            .as_deref()
            .ok_or_else(|| AdapterError::rejected("facebook connection has no page selected"))
    }
}

#[derive(Deserialize)]
struct CreatedPagePost {
    id: String,
}

#[derive(Deserialize)]
struct ExchangedToken {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct PagePostListing {
    #[serde(default)]
    data: Vec<PagePostItem>,
}

#[derive(Deserialize)]
struct PagePostItem {
    id: String,
    #[serde(default)]
    message: String,
    created_time: String,
    #[serde(default)]
    likes: i64,
    #[serde(default)]
    comments: i64,
    #[serde(default)]
    shares: i64,
    #[serde(default)]
    impressions: i64,
}

#[derive(Deserialize)]
struct PageProfile {
    #[serde(default)]
    followers_count: i64,
    #[serde(default)]
    impressions: i64,
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(
        &self,
        credentials: &PlatformCredentials,
        request: PublishRequest<'_>,
    ) -> Result<String, AdapterError> {
        let page_id = Self::page_id(credentials)?;
        let mut payload = serde_json::json!({
            "message": request.body,
            "access_token": credentials.access_token,
        });
        if let Some(url) = request.media_url {
            payload["link"] = serde_json::Value::String(url.to_string());
        }

        let response = self
            .client
            .post(format!("{}/{page_id}/feed", self.base_url))
            .json(&payload)
            .send()
            .await?;
        let created: CreatedPagePost = ensure_success(response).await?.json().await?;
        Ok(created.id)
    }

    async fn refresh_credentials(&self, refresh_token: &str) -> Result<TokenPair, AdapterError> {
        // Long-lived token exchange; Facebook does not rotate the exchange
        // token, so the stored refresh token stays in place.
        let response = self
            .client
            .get(format!("{}/oauth/access_token", self.base_url))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("fb_exchange_token", refresh_token),
            ])
            .send()
            .await?;
        let exchanged: ExchangedToken = ensure_success(response).await?.json().await?;
        Ok(TokenPair {
            access_token: exchanged.access_token,
            refresh_token: None,
            expires_in_secs: exchanged.expires_in,
        })
    }

    async fn fetch_metrics(
        &self,
        credentials: &PlatformCredentials,
        since: OffsetDateTime,
    ) -> Result<MetricsBatch, AdapterError> {
        let page_id = Self::page_id(credentials)?;
        let since_unix = since.unix_timestamp().to_string();

        let response = self
            .client
            .get(format!("{}/{page_id}/posts", self.base_url))
            .query(&[
                ("access_token", credentials.access_token.as_str()),
                ("since", since_unix.as_str()),
                (
                    "fields",
                    "message,created_time,likes,comments,shares,impressions",
                ),
            ])
            .send()
            .await?;
        let listing: PagePostListing = ensure_success(response).await?.json().await?;

        let mut posts = Vec::with_capacity(listing.data.len());
        for item in listing.data {
            let posted_at = OffsetDateTime::parse(&item.created_time, &Rfc3339)
                .map_err(|err| AdapterError::payload(format!("bad created_time: {err}")))?;
            posts.push(MetricRecord {
                external_post_id: item.id,
                body: item.message,
                media_url: None,
                likes: item.likes,
                comments: item.comments,
                shares: item.shares,
                impressions: item.impressions,
                posted_at,
            });
        }

        let profile_response = self
            .client
            .get(format!("{}/{page_id}", self.base_url))
            .query(&[
                ("access_token", credentials.access_token.as_str()),
                ("fields", "followers_count,impressions"),
            ])
            .send()
            .await?;
        let profile: PageProfile = ensure_success(profile_response).await?.json().await?;

        Ok(MetricsBatch {
            posts,
            channel: Some(ChannelMetrics {
                followers: profile.followers_count,
                impressions: profile.impressions,
            }),
        })
    }
}
