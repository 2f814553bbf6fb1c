//! Read-only view of the host identity server's OAuth clients.
//!
//! The table is owned and migrated by the host; this crate only reads the
//! columns it needs to keep token audiences unambiguous.

use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OAuthClient {
    pub id: Uuid,
    pub client_id: String,
    pub name: String,
    pub is_active: bool,
}

impl OAuthClient {
    pub async fn find_by_client_id<'e, E>(
        executor: E,
        client_id: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Self>(
            "SELECT id, client_id, name, is_active FROM oauth_clients WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(executor)
        .await
    }
}
