use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ConnectionsRepo, RepoError, UpdateConnectionTokensParams, UpsertConnectionParams,
};
use crate::domain::entities::ConnectionRecord;
use crate::domain::types::Platform;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(Debug, sqlx::FromRow)]
struct ConnectionRow {
    id: Uuid,
    account_id: Uuid,
    platform: Platform,
    access_token_ciphertext: String,
    refresh_token_ciphertext: String,
    token_expires_at: Option<OffsetDateTime>,
    page_id: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ConnectionRow> for ConnectionRecord {
    fn from(row: ConnectionRow) -> Self {
        ConnectionRecord {
            id: row.id,
            account_id: row.account_id,
            platform: row.platform,
            access_token_ciphertext: row.access_token_ciphertext,
            refresh_token_ciphertext: row.refresh_token_ciphertext,
            token_expires_at: row.token_expires_at,
            page_id: row.page_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const CONNECTION_COLUMNS: &str = "id, account_id, platform, access_token_ciphertext, \
     refresh_token_ciphertext, token_expires_at, page_id, created_at, updated_at";

#[async_trait::async_trait]
impl ConnectionsRepo for PostgresRepositories {
    async fn find_connection(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<Option<ConnectionRecord>, RepoError> {
        let row = query_as::<_, ConnectionRow>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections \
             WHERE account_id = $1 AND platform = $2"
        ))
        .bind(account_id)
        .bind(platform)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn upsert_connection(
        &self,
        params: UpsertConnectionParams,
    ) -> Result<ConnectionRecord, RepoError> {
        let row = query_as::<_, ConnectionRow>(&format!(
            "INSERT INTO connections \
                 (id, account_id, platform, access_token_ciphertext, \
                  refresh_token_ciphertext, token_expires_at, page_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             ON CONFLICT (account_id, platform) DO UPDATE SET \
                 access_token_ciphertext = EXCLUDED.access_token_ciphertext, \
                 refresh_token_ciphertext = EXCLUDED.refresh_token_ciphertext, \
                 token_expires_at = EXCLUDED.token_expires_at, \
                 page_id = EXCLUDED.page_id, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {CONNECTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(params.account_id)
        .bind(params.platform)
        .bind(params.access_token_ciphertext)
        .bind(params.refresh_token_ciphertext)
        .bind(params.token_expires_at)
        .bind(params.page_id)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_connection_tokens(
        &self,
        params: UpdateConnectionTokensParams,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE connections SET \
                 access_token_ciphertext = $2, \
                 refresh_token_ciphertext = $3, \
                 token_expires_at = $4, \
                 updated_at = $5 \
             WHERE id = $1",
        )
        .bind(params.connection_id)
        .bind(params.access_token_ciphertext)
        .bind(params.refresh_token_ciphertext)
        .bind(params.token_expires_at)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_connection(
        &self,
        account_id: Uuid,
        platform: Platform,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM connections WHERE account_id = $1 AND platform = $2")
            .bind(account_id)
            .bind(platform)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
