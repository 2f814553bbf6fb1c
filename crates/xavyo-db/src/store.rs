//! Read interfaces over the configuration store.
//!
//! The host identity server's generic configuration (OAuth clients) and the
//! WS-Federation relying-party configuration are two separate read
//! interfaces. A caller needing both in one consistent view opens a
//! [`PgReadView`], which serves both from a single repeatable-read
//! transaction.

use crate::error::DbError;
use crate::models::{OAuthClient, RelyingParty};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

/// Host identity server configuration.
#[async_trait]
pub trait ClientConfigurationStore: Send + Sync {
    /// Look up an OAuth client by its public client id.
    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, DbError>;
}

/// WS-Federation relying-party configuration.
#[async_trait]
pub trait RelyingPartyConfigurationStore: Send + Sync {
    /// Exact, case-sensitive realm lookup.
    async fn find_relying_party(&self, realm: &str) -> Result<Option<RelyingParty>, DbError>;
}

/// Pool-backed configuration store. Each call runs in its own statement.
#[derive(Debug, Clone)]
pub struct PgConfigurationStore {
    pool: PgPool,
}

impl PgConfigurationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Open a read-only snapshot shared by both read interfaces.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the transaction cannot be started.
    pub async fn read_view(&self) -> Result<PgReadView, DbError> {
        let mut tx = self.pool.begin().await.map_err(DbError::from_query)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(DbError::from_query)?;
        Ok(PgReadView { tx: Mutex::new(tx) })
    }
}

#[async_trait]
impl ClientConfigurationStore for PgConfigurationStore {
    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, DbError> {
        OAuthClient::find_by_client_id(&self.pool, client_id)
            .await
            .map_err(DbError::from_query)
    }
}

#[async_trait]
impl RelyingPartyConfigurationStore for PgConfigurationStore {
    async fn find_relying_party(&self, realm: &str) -> Result<Option<RelyingParty>, DbError> {
        RelyingParty::find_by_realm(&self.pool, realm)
            .await
            .map_err(DbError::from_query)
    }
}

/// A repeatable-read, read-only transaction serving both read interfaces.
pub struct PgReadView {
    tx: Mutex<Transaction<'static, Postgres>>,
}

impl PgReadView {
    /// End the snapshot. Dropping the view has the same effect.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the rollback fails.
    pub async fn finish(self) -> Result<(), DbError> {
        self.tx
            .into_inner()
            .rollback()
            .await
            .map_err(DbError::from_query)
    }
}

#[async_trait]
impl ClientConfigurationStore for PgReadView {
    async fn find_client(&self, client_id: &str) -> Result<Option<OAuthClient>, DbError> {
        let mut tx = self.tx.lock().await;
        OAuthClient::find_by_client_id(&mut **tx, client_id)
            .await
            .map_err(DbError::from_query)
    }
}

#[async_trait]
impl RelyingPartyConfigurationStore for PgReadView {
    async fn find_relying_party(&self, realm: &str) -> Result<Option<RelyingParty>, DbError> {
        let mut tx = self.tx.lock().await;
        RelyingParty::find_by_realm(&mut **tx, realm)
            .await
            .map_err(DbError::from_query)
    }
}
