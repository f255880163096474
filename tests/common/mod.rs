//! Shared in-memory fakes for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use time::OffsetDateTime;
use uuid::Uuid;

use outpost::application::adapters::{
    AdapterError, AdapterRegistry, MetricsBatch, PlatformAdapter, PlatformCredentials,
    PublishRequest, TokenPair,
};
use outpost::application::calendar::CalendarService;
use outpost::application::credentials::ConnectionService;
use outpost::application::dispatch::Dispatcher;
use outpost::application::repos::{
    ConnectionsRepo, CreateScheduledPostParams, RepoError, ScheduledPostsRepo, SyncBatch,
    SyncBatchOutcome, SyncRepo, UpdateConnectionTokensParams, UpsertConnectionParams,
};
use outpost::application::sync::SyncEngine;
use outpost::application::vault::CredentialVault;
use outpost::config::SyncSettings;
use outpost::domain::entities::{
    ChannelStatsRecord, ConnectionRecord, HistoricalPostRecord, ScheduledPostRecord,
};
use outpost::domain::types::{Platform, PostStatus};

/// In-memory stand-in for the Postgres repositories, honoring the same
/// guarded-transition semantics.
#[derive(Default)]
pub struct InMemoryStore {
    pub connections: Mutex<Vec<ConnectionRecord>>,
    pub posts: Mutex<Vec<ScheduledPostRecord>>,
    pub historical: Mutex<Vec<HistoricalPostRecord>>,
    pub channel: Mutex<HashMap<(Uuid, Platform), ChannelStatsRecord>>,
    pub sync_marks: Mutex<HashMap<(Uuid, String), OffsetDateTime>>,
}

impl InMemoryStore {
    pub fn post_status(&self, id: Uuid) -> Option<PostStatus> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.status)
    }
}

#[async_trait]
impl ConnectionsRepo for InMemoryStore {
    async fn find_connection(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ConnectionRecord>, RepoError> {
        Ok(self
            .connections
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.account_id == account_id && c.platform == platform)
            .cloned())
    }

    async fn upsert_connection(
        &self,
        params: UpsertConnectionParams,
    ) -> Result<ConnectionRecord, RepoError> {
        let mut connections = self.connections.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        if let Some(existing) = connections
            .iter_mut()
            .find(|c| c.account_id == params.account_id && c.platform == params.platform)
        {
            existing.access_token_ciphertext = params.access_token_ciphertext;
            existing.refresh_token_ciphertext = params.refresh_token_ciphertext;
            existing.token_expires_at = params.token_expires_at;
            existing.page_id = params.page_id;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let record = ConnectionRecord {
            id: Uuid::new_v4(),
            account_id: params.account_id,
            platform: params.platform,
            access_token_ciphertext: params.access_token_ciphertext,
            refresh_token_ciphertext: params.refresh_token_ciphertext,
            token_expires_at: params.token_expires_at,
            page_id: params.page_id,
            created_at: now,
            updated_at: now,
        };
        connections.push(record.clone());
        Ok(record)
    }

    async fn update_connection_tokens(
        &self,
        params: UpdateConnectionTokensParams,
    ) -> Result<bool, RepoError> {
        let mut connections = self.connections.lock().unwrap();
        match connections
            .iter_mut()
            .find(|c| c.id == params.connection_id)
        {
            Some(record) => {
                record.access_token_ciphertext = params.access_token_ciphertext;
                record.refresh_token_ciphertext = params.refresh_token_ciphertext;
                record.token_expires_at = params.token_expires_at;
                record.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_connection(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<bool, RepoError> {
        let mut connections = self.connections.lock().unwrap();
        let before = connections.len();
        connections.retain(|c| !(c.account_id == account_id && c.platform == platform));
        Ok(connections.len() < before)
    }
}

#[async_trait]
impl ScheduledPostsRepo for InMemoryStore {
    async fn create_post(
        &self,
        params: CreateScheduledPostParams,
    ) -> Result<ScheduledPostRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let record = ScheduledPostRecord {
            id: Uuid::new_v4(),
            account_id: params.account_id,
            platform: params.platform,
            body: params.body,
            media_url: params.media_url,
            scheduled_at: params.scheduled_at,
            status: PostStatus::Scheduled,
            external_post_id: None,
            likes: 0,
            shares: 0,
            impressions: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.posts.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn find_post(&self, id: Uuid) -> Result<Option<ScheduledPostRecord>, RepoError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn list_posts(
        &self,
        account_id: Uuid,
        status: Option<PostStatus>,
    ) -> Result<Vec<ScheduledPostRecord>, RepoError> {
        let mut posts: Vec<_> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.account_id == account_id)
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        posts.sort_by_key(|p| p.scheduled_at);
        Ok(posts)
    }

    async fn list_due_posts(
        &self,
        now: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<ScheduledPostRecord>, RepoError> {
        let mut due: Vec<_> = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|p| p.scheduled_at);
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn mark_posted(
        &self,
        id: Uuid,
        external_post_id: &str,
        posted_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut posts = self.posts.lock().unwrap();
        match posts
            .iter_mut()
            .find(|p| p.id == id && p.status == PostStatus::Scheduled)
        {
            Some(post) => {
                post.status = PostStatus::Posted;
                post.external_post_id = Some(external_post_id.to_string());
                post.likes = 0;
                post.shares = 0;
                post.impressions = 0;
                post.failure_reason = None;
                post.updated_at = posted_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<bool, RepoError> {
        let mut posts = self.posts.lock().unwrap();
        match posts
            .iter_mut()
            .find(|p| p.id == id && p.status == PostStatus::Scheduled)
        {
            Some(post) => {
                post.status = PostStatus::Failed;
                post.failure_reason = Some(reason.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reschedule(&self, id: Uuid, scheduled_at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut posts = self.posts.lock().unwrap();
        match posts
            .iter_mut()
            .find(|p| p.id == id && p.status == PostStatus::Scheduled)
        {
            Some(post) => {
                post.scheduled_at = scheduled_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn retry_failed(
        &self,
        id: Uuid,
        scheduled_at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut posts = self.posts.lock().unwrap();
        match posts
            .iter_mut()
            .find(|p| p.id == id && p.status == PostStatus::Failed)
        {
            Some(post) => {
                post.status = PostStatus::Scheduled;
                post.scheduled_at = scheduled_at;
                post.failure_reason = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_post(&self, id: Uuid, account_id: Uuid) -> Result<bool, RepoError> {
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|p| !(p.id == id && p.account_id == account_id));
        Ok(posts.len() < before)
    }
}

#[async_trait]
impl SyncRepo for InMemoryStore {
    async fn last_completed_sync(
        &self,
        account_id: Uuid,
        report_type: &str,
    ) -> Result<Option<OffsetDateTime>, RepoError> {
        Ok(self
            .sync_marks
            .lock()
            .unwrap()
            .get(&(account_id, report_type.to_string()))
            .copied())
    }

    async fn record_sync_batch(&self, batch: SyncBatch) -> Result<SyncBatchOutcome, RepoError> {
        let mut historical = self.historical.lock().unwrap();
        let mut items_upserted = 0u64;
        for item in &batch.items {
            match historical.iter_mut().find(|h| {
                h.account_id == batch.account_id
                    && h.platform == batch.platform
                    && h.external_post_id == item.external_post_id
            }) {
                Some(existing) => {
                    existing.likes = item.likes;
                    existing.comments = item.comments;
                    existing.shares = item.shares;
                    existing.impressions = item.impressions;
                    existing.synced_at = batch.completed_at;
                }
                None => historical.push(HistoricalPostRecord {
                    id: Uuid::new_v4(),
                    account_id: batch.account_id,
                    platform: batch.platform,
                    external_post_id: item.external_post_id.clone(),
                    body: item.body.clone(),
                    media_url: item.media_url.clone(),
                    likes: item.likes,
                    comments: item.comments,
                    shares: item.shares,
                    impressions: item.impressions,
                    posted_at: item.posted_at,
                    synced_at: batch.completed_at,
                }),
            }
            items_upserted += 1;

            let mut posts = self.posts.lock().unwrap();
            if let Some(post) = posts.iter_mut().find(|p| {
                p.account_id == batch.account_id
                    && p.platform == batch.platform
                    && p.status == PostStatus::Posted
                    && p.external_post_id.as_deref() == Some(item.external_post_id.as_str())
            }) {
                post.likes = item.likes;
                post.shares = item.shares;
                post.impressions = item.impressions;
            }
        }

        let mut channel = self.channel.lock().unwrap();
        let entry = channel
            .entry((batch.account_id, batch.platform))
            .or_insert_with(|| ChannelStatsRecord {
                account_id: batch.account_id,
                platform: batch.platform,
                followers: 0,
                reach: 0,
                engagement_rate: 0.0,
                synced_at: batch.completed_at,
            });
        if let Some(followers) = batch.channel.followers {
            entry.followers = followers;
        }
        entry.reach = batch.channel.reach;
        entry.engagement_rate = batch.channel.engagement_rate;
        entry.synced_at = batch.completed_at;

        self.sync_marks
            .lock()
            .unwrap()
            .insert((batch.account_id, batch.report_type), batch.completed_at);

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
        let mut posts: Vec<_> = self
            .historical
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.account_id == account_id && h.platform == platform)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        Ok(posts)
    }

    async fn channel_stats(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ChannelStatsRecord>, RepoError> {
        Ok(self
            .channel
            .lock()
            .unwrap()
            .get(&(account_id, platform))
            .cloned())
    }
}

/// Adapter that always publishes and serves a fixed metrics batch.
pub struct StaticAdapter {
    pub platform: Platform,
    pub batch: MetricsBatch,
}

impl StaticAdapter {
    pub fn new(platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            batch: MetricsBatch {
                posts: Vec::new(),
                channel: None,
            },
        })
    }

    pub fn with_batch(platform: Platform, batch: MetricsBatch) -> Arc<Self> {
        Arc::new(Self { platform, batch })
    }
}

#[async_trait]
impl PlatformAdapter for StaticAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(
        &self,
        _credentials: &PlatformCredentials,
        _request: PublishRequest<'_>,
    ) -> Result<String, AdapterError> {
        Ok(format!("ext-{}", Uuid::new_v4()))
    }

    async fn refresh_credentials(&self, _refresh_token: &str) -> Result<TokenPair, AdapterError> {
        Ok(TokenPair {
            access_token: "fresh-access".to_string(),
            refresh_token: None,
            expires_in_secs: Some(3600),
        })
    }

    async fn fetch_metrics(
        &self,
        _credentials: &PlatformCredentials,
        _since: OffsetDateTime,
    ) -> Result<MetricsBatch, AdapterError> {
        Ok(self.batch.clone())
    }
}

pub fn test_vault() -> Arc<CredentialVault> {
    let key = URL_SAFE_NO_PAD.encode([42u8; 32]);
    Arc::new(CredentialVault::from_base64_key(&key).unwrap())
}

pub fn sync_settings() -> SyncSettings {
    SyncSettings {
        cooldown_secs: 900,
        cooldown_overrides: HashMap::from([("youtube_metrics".to_string(), 86_400)]),
        lookback_days: 30,
    }
}

pub struct TestServices {
    pub store: Arc<InMemoryStore>,
    pub connections: Arc<ConnectionService>,
    pub calendar: Arc<CalendarService>,
    pub dispatcher: Arc<Dispatcher>,
    pub sync: Arc<SyncEngine>,
}

pub fn build_services(adapters: Vec<Arc<dyn PlatformAdapter>>) -> TestServices {
    let store = Arc::new(InMemoryStore::default());
    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    let registry = Arc::new(registry);

    let connections = Arc::new(ConnectionService::new(store.clone(), test_vault()));
    let calendar = Arc::new(CalendarService::new(store.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        connections.clone(),
        registry.clone(),
        4,
        50,
    ));
    let sync = Arc::new(SyncEngine::new(
        store.clone(),
        connections.clone(),
        registry,
        sync_settings(),
    ));

    TestServices {
        store,
        connections,
        calendar,
        dispatcher,
        sync,
    }
}
