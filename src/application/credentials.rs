//! Connection lifecycle: load-decrypt-use-reencrypt-store, per operation.
//!
//! There is deliberately no plaintext token cache. Every pipeline operation
//! resolves the stored ciphertext, decrypts for the duration of the outbound
//! call, and re-encrypts before anything is persisted.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::adapters::{PlatformCredentials, TokenPair};
use crate::application::error::PipelineError;
use crate::application::repos::{
    ConnectionsRepo, UpdateConnectionTokensParams, UpsertConnectionParams,
};
use crate::application::vault::CredentialVault;
use crate::domain::types::Platform;

/// A resolved connection with decrypted credentials, valid for one operation.
pub struct ActiveConnection {
    pub connection_id: Uuid,
    pub account_id: Uuid,
    pub platform: Platform,
    pub credentials: PlatformCredentials,
    pub token_expires_at: Option<OffsetDateTime>,
}

impl ActiveConnection {
    /// Whether the stored access token has passed its recorded expiry.
    /// Connections without an expiry are assumed valid until the platform
    /// says otherwise.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.token_expires_at.is_some_and(|expiry| expiry <= now)
    }
}

/// Inbound OAuth handshake result, persisted on behalf of the external flow.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub account_id: Uuid,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: Option<OffsetDateTime>,
    pub page_id: Option<String>,
}

pub struct ConnectionService {
    connections: Arc<dyn ConnectionsRepo>,
    vault: Arc<CredentialVault>,
}

impl ConnectionService {
    pub fn new(connections: Arc<dyn ConnectionsRepo>, vault: Arc<CredentialVault>) -> Self {
        Self { connections, vault }
    }

    /// Load and decrypt the connection for (account, platform).
    pub async fn resolve(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<ActiveConnection, PipelineError> {
        let record = self
            .connections
            .find_connection(account_id, platform)
            .await?
            .ok_or(PipelineError::NotConnected { platform })?;

        let access_token = self.vault.decrypt(&record.access_token_ciphertext)?;
        let refresh_token = self.vault.decrypt(&record.refresh_token_ciphertext)?;

        Ok(ActiveConnection {
            connection_id: record.id,
            account_id: record.account_id,
            platform: record.platform,
            credentials: PlatformCredentials {
                access_token,
                refresh_token,
                page_id: record.page_id,
            },
            token_expires_at: record.token_expires_at,
        })
    }

    /// Re-encrypt and persist a refreshed token pair, last-write-wins, in one
    /// guarded write. When the platform did not rotate the refresh token the
    /// previous one is kept. Returns the credentials to use for the retried
    /// call, only after the write has landed.
    pub async fn persist_refreshed(
        &self,
        connection: &ActiveConnection,
        pair: TokenPair,
    ) -> Result<PlatformCredentials, PipelineError> {
        let refresh_token = pair
            .refresh_token
            .unwrap_or_else(|| connection.credentials.refresh_token.clone());
        let token_expires_at = pair
            .expires_in_secs
            .map(|secs| OffsetDateTime::now_utc() + time::Duration::seconds(secs));

        let access_ciphertext = self.vault.encrypt(&pair.access_token)?;
        let refresh_ciphertext = self.vault.encrypt(&refresh_token)?;

        let updated = self
            .connections
            .update_connection_tokens(UpdateConnectionTokensParams {
                connection_id: connection.connection_id,
                access_token_ciphertext: access_ciphertext,
                refresh_token_ciphertext: refresh_ciphertext,
                token_expires_at,
            })
            .await?;
        if !updated {
            // The account disconnected while the refresh was in flight.
            // Never resurrect credentials for a disconnected platform.
            return Err(PipelineError::Disconnected {
                platform: connection.platform,
            });
        }

        info!(
            target = "application::credentials",
            platform = %connection.platform,
            account_id = %connection.account_id,
            "persisted refreshed token pair"
        );

        Ok(PlatformCredentials {
            access_token: pair.access_token,
            refresh_token,
            page_id: connection.credentials.page_id.clone(),
        })
    }

    /// Persist the outcome of a completed OAuth handshake. Upsert keeps the
    /// at-most-one-connection-per-(account, platform) invariant.
    pub async fn connect(&self, params: ConnectParams) -> Result<(), PipelineError> {
        if params.platform.requires_page_id() && params.page_id.is_none() {
            return Err(PipelineError::validation(format!(
                "platform `{}` requires a page id",
                params.platform
            )));
        }

        let access_ciphertext = self.vault.encrypt(&params.access_token)?;
        let refresh_ciphertext = self.vault.encrypt(&params.refresh_token)?;

        self.connections
            .upsert_connection(UpsertConnectionParams {
                account_id: params.account_id,
                platform: params.platform,
                access_token_ciphertext: access_ciphertext,
                refresh_token_ciphertext: refresh_ciphertext,
                token_expires_at: params.token_expires_at,
                page_id: params.page_id,
            })
            .await?;

        info!(
            target = "application::credentials",
            platform = %params.platform,
            account_id = %params.account_id,
            "connection stored"
        );
        Ok(())
    }

    pub async fn disconnect(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<(), PipelineError> {
        let deleted = self.connections.delete_connection(account_id, platform).await?;
        if !deleted {
            return Err(PipelineError::NotConnected { platform });
        }
        info!(
            target = "application::credentials",
            platform = %platform,
            account_id = %account_id,
            "connection removed"
        );
        Ok(())
    }
}
