//! Dispatch pass: drain due posts and publish each through its platform
//! adapter, isolating failures per post.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::adapters::{AdapterError, AdapterRegistry, PublishRequest};
use crate::application::credentials::ConnectionService;
use crate::application::error::PipelineError;
use crate::application::repos::ScheduledPostsRepo;
use crate::domain::entities::ScheduledPostRecord;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub processed: u64,
    pub published: u64,
    pub failed: u64,
}

pub struct Dispatcher {
    posts: Arc<dyn ScheduledPostsRepo>,
    connections: Arc<ConnectionService>,
    registry: Arc<AdapterRegistry>,
    concurrency: usize,
    batch_size: u32,
}

impl Dispatcher {
    pub fn new(
        posts: Arc<dyn ScheduledPostsRepo>,
        connections: Arc<ConnectionService>,
        registry: Arc<AdapterRegistry>,
        concurrency: usize,
        batch_size: u32,
    ) -> Self {
        Self {
            posts,
            connections,
            registry,
            concurrency,
            batch_size,
        }
    }

    /// One dispatch pass over everything currently due. Batches bound memory
    /// and concurrency, not the pass: batches are drained until nothing that
    /// was due at the start of the pass is still `scheduled`. Safe to run
    /// concurrently with itself: status-guarded transitions make sure each
    /// post is published at most once.
    pub async fn run(&self) -> Result<DispatchOutcome, PipelineError> {
        let now = OffsetDateTime::now_utc();
        let mut outcome = DispatchOutcome::default();
        let mut previous_ids: Vec<Uuid> = Vec::new();

        loop {
            let due = self.posts.list_due_posts(now, self.batch_size).await?;
            if due.is_empty() {
                break;
            }

            let ids: Vec<Uuid> = due.iter().map(|post| post.id).collect();
            if ids == previous_ids {
                // Every post in the batch failed to leave `scheduled`
                // (transition writes are erroring). Stop instead of spinning;
                // the next pass picks them up again.
                warn!(
                    target = "application::dispatch",
                    stuck = ids.len(),
                    "due posts did not transition, ending the pass"
                );
                break;
            }

            let drained = due.len();
            info!(
                target = "application::dispatch",
                due = drained,
                "dispatch batch started"
            );

            let batch = stream::iter(due)
                .map(|post| self.process(post))
                .buffer_unordered(self.concurrency)
                .fold(DispatchOutcome::default(), |mut acc, published| async move {
                    acc.processed += 1;
                    if published {
                        acc.published += 1;
                    } else {
                        acc.failed += 1;
                    }
                    acc
                })
                .await;

            outcome.processed += batch.processed;
            outcome.published += batch.published;
            outcome.failed += batch.failed;

            if drained < self.batch_size as usize {
                break;
            }
            previous_ids = ids;
        }

        if outcome.processed > 0 {
            metrics::counter!("outpost_posts_published_total").increment(outcome.published);
            metrics::counter!("outpost_posts_failed_total").increment(outcome.failed);
            info!(
                target = "application::dispatch",
                processed = outcome.processed,
                published = outcome.published,
                failed = outcome.failed,
                "dispatch pass finished"
            );
        }
        Ok(outcome)
    }

    /// Publish one post, converting every error into a `failed` transition so
    /// the rest of the batch is unaffected. Returns whether the post ended up
    /// published.
    async fn process(&self, post: ScheduledPostRecord) -> bool {
        let post_id = post.id;
        let platform = post.platform;
        match self.publish_post(&post).await {
            Ok(external_post_id) => {
                match self
                    .posts
                    .mark_posted(post_id, &external_post_id, OffsetDateTime::now_utc())
                    .await
                {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!(
                            target = "application::dispatch",
                            post_id = %post_id,
                            "post left the scheduled state mid-publish, keeping the winner's record"
                        );
                        false
                    }
                    Err(err) => {
                        error!(
                            target = "application::dispatch",
                            post_id = %post_id,
                            error = %err,
                            "published but could not record the transition"
                        );
                        false
                    }
                }
            }
            Err(err) => {
                warn!(
                    target = "application::dispatch",
                    post_id = %post_id,
                    platform = %platform,
                    error = %err,
                    "publish failed"
                );
                if let Err(mark_err) = self.mark_failed(post_id, &err.to_string()).await {
                    error!(
                        target = "application::dispatch",
                        post_id = %post_id,
                        error = %mark_err,
                        "could not record publish failure"
                    );
                }
                false
            }
        }
    }

    async fn mark_failed(&self, post_id: Uuid, reason: &str) -> Result<(), PipelineError> {
        self.posts.mark_failed(post_id, reason).await?;
        Ok(())
    }

    /// Resolve credentials and publish. A stale-credential signal triggers a
    /// refresh, a persisted token pair, and exactly one retry; any other
    /// error is terminal for this attempt.
    async fn publish_post(&self, post: &ScheduledPostRecord) -> Result<String, PipelineError> {
        let adapter = self.registry.get(post.platform)?;
        let connection = self.connections.resolve(post.account_id, post.platform).await?;
        let request = PublishRequest {
            body: &post.body,
            media_url: post.media_url.as_deref(),
        };

        match adapter.publish(&connection.credentials, request).await {
            Ok(external_post_id) => Ok(external_post_id),
            Err(AdapterError::StaleCredentials) => {
                info!(
                    target = "application::dispatch",
                    post_id = %post.id,
                    platform = %post.platform,
                    "access token rejected, refreshing"
                );
                let pair = adapter
                    .refresh_credentials(&connection.credentials.refresh_token)
                    .await?;
                let credentials = self.connections.persist_refreshed(&connection, pair).await?;
                metrics::counter!("outpost_token_refreshes_total").increment(1);
                Ok(adapter.publish(&credentials, request).await?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use crate::application::adapters::{
        MetricsBatch, PlatformAdapter, PlatformCredentials, TokenPair,
    };
    use crate::application::repos::{
        ConnectionsRepo, CreateScheduledPostParams, RepoError, UpdateConnectionTokensParams,
        UpsertConnectionParams,
    };
    use crate::application::vault::CredentialVault;
    use crate::domain::entities::ConnectionRecord;
    use crate::domain::types::{Platform, PostStatus};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    struct StubPostsRepo {
        posts: Mutex<Vec<ScheduledPostRecord>>,
    }

    impl StubPostsRepo {
        fn new(posts: Vec<ScheduledPostRecord>) -> Arc<Self> {
            Arc::new(Self {
                posts: Mutex::new(posts),
            })
        }

        fn status_of(&self, id: Uuid) -> PostStatus {
            self.posts
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .unwrap()
                .status
        }

        fn failure_reason_of(&self, id: Uuid) -> Option<String> {
            self.posts
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .unwrap()
                .failure_reason
                .clone()
        }
    }

    #[async_trait]
    impl ScheduledPostsRepo for StubPostsRepo {
        async fn create_post(
            &self,
            _params: CreateScheduledPostParams,
        ) -> Result<ScheduledPostRecord, RepoError> {
            unimplemented!("not used by dispatch")
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
            _account_id: Uuid,
            _status: Option<PostStatus>,
        ) -> Result<Vec<ScheduledPostRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn list_due_posts(
            &self,
            now: OffsetDateTime,
            limit: u32,
        ) -> Result<Vec<ScheduledPostRecord>, RepoError> {
            Ok(self
                .posts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_at <= now)
                .take(limit as usize)
                .cloned()
                .collect())
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
                    post.scheduled_at = posted_at;
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

        async fn reschedule(
            &self,
            _id: Uuid,
            _scheduled_at: OffsetDateTime,
        ) -> Result<bool, RepoError> {
            Ok(false)
        }

        async fn retry_failed(
            &self,
            _id: Uuid,
            _scheduled_at: OffsetDateTime,
        ) -> Result<bool, RepoError> {
            Ok(false)
        }

        async fn delete_post(&self, _id: Uuid, _account_id: Uuid) -> Result<bool, RepoError> {
            Ok(false)
        }
    }

    struct StubConnectionsRepo {
        record: Mutex<Option<ConnectionRecord>>,
    }

    #[async_trait]
    impl ConnectionsRepo for StubConnectionsRepo {
        async fn find_connection(
            &self,
            account_id: Uuid,
            platform: Platform,
        ) -> Result<Option<ConnectionRecord>, RepoError> {
            let record = self.record.lock().unwrap().clone();
            Ok(record.filter(|r| r.account_id == account_id && r.platform == platform))
        }

        async fn upsert_connection(
            &self,
            _params: UpsertConnectionParams,
        ) -> Result<ConnectionRecord, RepoError> {
            unimplemented!("not used by dispatch")
        }

        async fn update_connection_tokens(
            &self,
            params: UpdateConnectionTokensParams,
        ) -> Result<bool, RepoError> {
            let mut guard = self.record.lock().unwrap();
            match guard.as_mut() {
                Some(record) if record.id == params.connection_id => {
                    record.access_token_ciphertext = params.access_token_ciphertext;
                    record.refresh_token_ciphertext = params.refresh_token_ciphertext;
                    record.token_expires_at = params.token_expires_at;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn delete_connection(
            &self,
            _account_id: Uuid,
            _platform: Platform,
        ) -> Result<bool, RepoError> {
            Ok(false)
        }
    }

    enum PublishBehavior {
        Succeed,
        Reject,
        StaleThenSucceed,
        AlwaysStale,
    }

    struct ScriptedAdapter {
        behavior: PublishBehavior,
        publish_calls: AtomicU64,
        refresh_calls: AtomicU64,
    }

    impl ScriptedAdapter {
        fn new(behavior: PublishBehavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                publish_calls: AtomicU64::new(0),
                refresh_calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl PlatformAdapter for ScriptedAdapter {
        fn platform(&self) -> Platform {
            Platform::X
        }

        async fn publish(
            &self,
            credentials: &PlatformCredentials,
            _request: PublishRequest<'_>,
        ) -> Result<String, AdapterError> {
            let call = self.publish_calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                PublishBehavior::Succeed => Ok("ext-1".to_string()),
                PublishBehavior::Reject => Err(AdapterError::rejected("body too long")),
                PublishBehavior::AlwaysStale => Err(AdapterError::StaleCredentials),
                PublishBehavior::StaleThenSucceed => {
                    if call == 0 {
                        Err(AdapterError::StaleCredentials)
                    } else {
                        assert_eq!(credentials.access_token, "fresh-access");
                        Ok("ext-2".to_string())
                    }
                }
            }
        }

        async fn refresh_credentials(
            &self,
            _refresh_token: &str,
        ) -> Result<TokenPair, AdapterError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            Ok(TokenPair {
                access_token: "fresh-access".to_string(),
                refresh_token: Some("fresh-refresh".to_string()),
                expires_in_secs: Some(3600),
            })
        }

        async fn fetch_metrics(
            &self,
            _credentials: &PlatformCredentials,
            _since: OffsetDateTime,
        ) -> Result<MetricsBatch, AdapterError> {
            unimplemented!("not used by dispatch")
        }
    }

    fn vault() -> Arc<CredentialVault> {
        let key = URL_SAFE_NO_PAD.encode([7u8; 32]);
        Arc::new(CredentialVault::from_base64_key(&key).unwrap())
    }

    fn due_post(account_id: Uuid) -> ScheduledPostRecord {
        let now = OffsetDateTime::now_utc();
        ScheduledPostRecord {
            id: Uuid::new_v4(),
            account_id,
            platform: Platform::X,
            body: "hello".to_string(),
            media_url: None,
            scheduled_at: now - time::Duration::minutes(1),
            status: PostStatus::Scheduled,
            external_post_id: None,
            likes: 0,
            shares: 0,
            impressions: 0,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn connection(account_id: Uuid, vault: &CredentialVault) -> ConnectionRecord {
        let now = OffsetDateTime::now_utc();
        ConnectionRecord {
            id: Uuid::new_v4(),
            account_id,
            platform: Platform::X,
            access_token_ciphertext: vault.encrypt("stale-access").unwrap(),
            refresh_token_ciphertext: vault.encrypt("old-refresh").unwrap(),
            token_expires_at: None,
            page_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn dispatcher(
        posts: Arc<StubPostsRepo>,
        connections: Arc<StubConnectionsRepo>,
        adapter: Arc<ScriptedAdapter>,
    ) -> Dispatcher {
        let vault = vault();
        let mut registry = AdapterRegistry::new();
        registry.register(adapter);
        Dispatcher::new(
            posts,
            Arc::new(ConnectionService::new(connections, vault)),
            Arc::new(registry),
            4,
            50,
        )
    }

    #[tokio::test]
    async fn publishes_due_posts_and_records_external_id() {
        let vault = vault();
        let account_id = Uuid::new_v4();
        let post = due_post(account_id);
        let post_id = post.id;
        let posts = StubPostsRepo::new(vec![post]);
        let connections = Arc::new(StubConnectionsRepo {
            record: Mutex::new(Some(connection(account_id, &vault))),
        });
        let adapter = ScriptedAdapter::new(PublishBehavior::Succeed);

        let outcome = dispatcher(posts.clone(), connections, adapter)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(posts.status_of(post_id), PostStatus::Posted);
    }

    #[tokio::test]
    async fn one_run_drains_every_due_post_across_batches() {
        let vault = vault();
        let account_id = Uuid::new_v4();
        let first = due_post(account_id);
        let second = due_post(account_id);
        let first_id = first.id;
        let second_id = second.id;
        let posts = StubPostsRepo::new(vec![first, second]);
        let connections = Arc::new(StubConnectionsRepo {
            record: Mutex::new(Some(connection(account_id, &vault))),
        });
        let mut registry = AdapterRegistry::new();
        registry.register(ScriptedAdapter::new(PublishBehavior::Succeed));
        let dispatcher = Dispatcher::new(
            posts.clone(),
            Arc::new(ConnectionService::new(connections, vault)),
            Arc::new(registry),
            4,
            1,
        );

        let outcome = dispatcher.run().await.unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.published, 2);
        assert_eq!(posts.status_of(first_id), PostStatus::Posted);
        assert_eq!(posts.status_of(second_id), PostStatus::Posted);
    }

    #[tokio::test]
    async fn one_bad_post_does_not_stop_the_batch() {
        let vault = vault();
        let account_id = Uuid::new_v4();
        let connected = due_post(account_id);
        let orphan = due_post(Uuid::new_v4());
        let connected_id = connected.id;
        let orphan_id = orphan.id;
        let posts = StubPostsRepo::new(vec![orphan, connected]);
        let connections = Arc::new(StubConnectionsRepo {
            record: Mutex::new(Some(connection(account_id, &vault))),
        });
        let adapter = ScriptedAdapter::new(PublishBehavior::Succeed);

        let outcome = dispatcher(posts.clone(), connections, adapter)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.published, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(posts.status_of(connected_id), PostStatus::Posted);
        assert_eq!(posts.status_of(orphan_id), PostStatus::Failed);
        assert!(
            posts
                .failure_reason_of(orphan_id)
                .unwrap()
                .contains("no active connection")
        );
    }

    #[tokio::test]
    async fn stale_credentials_trigger_one_refresh_and_retry() {
        let vault = vault();
        let account_id = Uuid::new_v4();
        let post = due_post(account_id);
        let post_id = post.id;
        let posts = StubPostsRepo::new(vec![post]);
        let connections = Arc::new(StubConnectionsRepo {
            record: Mutex::new(Some(connection(account_id, &vault))),
        });
        let adapter = ScriptedAdapter::new(PublishBehavior::StaleThenSucceed);

        let outcome = dispatcher(posts.clone(), connections.clone(), adapter.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.published, 1);
        assert_eq!(posts.status_of(post_id), PostStatus::Posted);
        assert_eq!(adapter.publish_calls.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 1);

        // The rotated pair must be the one stored now.
        let stored = connections.record.lock().unwrap().clone().unwrap();
        assert_eq!(vault.decrypt(&stored.access_token_ciphertext).unwrap(), "fresh-access");
        assert_eq!(vault.decrypt(&stored.refresh_token_ciphertext).unwrap(), "fresh-refresh");
    }

    #[tokio::test]
    async fn still_stale_after_refresh_fails_the_post_without_looping() {
        let vault = vault();
        let account_id = Uuid::new_v4();
        let post = due_post(account_id);
        let post_id = post.id;
        let posts = StubPostsRepo::new(vec![post]);
        let connections = Arc::new(StubConnectionsRepo {
            record: Mutex::new(Some(connection(account_id, &vault))),
        });
        let adapter = ScriptedAdapter::new(PublishBehavior::AlwaysStale);

        let outcome = dispatcher(posts.clone(), connections, adapter.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        assert_eq!(posts.status_of(post_id), PostStatus::Failed);
        assert_eq!(adapter.publish_calls.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_is_terminal_and_keeps_the_reason() {
        let vault = vault();
        let account_id = Uuid::new_v4();
        let post = due_post(account_id);
        let post_id = post.id;
        let posts = StubPostsRepo::new(vec![post]);
        let connections = Arc::new(StubConnectionsRepo {
            record: Mutex::new(Some(connection(account_id, &vault))),
        });
        let adapter = ScriptedAdapter::new(PublishBehavior::Reject);

        dispatcher(posts.clone(), connections, adapter.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(posts.status_of(post_id), PostStatus::Failed);
        assert!(
            posts
                .failure_reason_of(post_id)
                .unwrap()
                .contains("body too long")
        );
        assert_eq!(adapter.publish_calls.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.refresh_calls.load(Ordering::SeqCst), 0);
    }
}
