use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

use crate::identity::{Identity, IdentityLookup, LookupError};

#[derive(Clone)]
pub struct IdentityStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    uuid: String,
    email: String,
    profile: String,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        let profile = serde_json::from_str(&row.profile).unwrap_or_else(|e| {
            warn!(uuid = %row.uuid, error = %e, "Ignoring unreadable identity profile");
            serde_json::Map::new()
        });
        Self {
            uuid: row.uuid,
            email: row.email,
            profile,
        }
    }
}

impl IdentityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an identity with a freshly generated subject id.
    pub async fn create(
        &self,
        email: &str,
        profile: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Identity, sqlx::Error> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let profile_json = serde_json::Value::Object(profile.clone()).to_string();

        sqlx::query("INSERT INTO identities (uuid, email, profile) VALUES (?, ?, ?)")
            .bind(&uuid)
            .bind(email)
            .bind(profile_json)
            .execute(&self.pool)
            .await?;

        Ok(Identity {
            uuid,
            email: email.to_string(),
            profile,
        })
    }

    /// Get an identity by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> =
            sqlx::query_as("SELECT uuid, email, profile FROM identities WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Identity::from))
    }

    /// Find identities by subject id. Fetches at most two rows, enough to
    /// tell a unique match from an ambiguous one.
    pub async fn find_by_uuid(&self, uuid: &str) -> Result<Vec<Identity>, sqlx::Error> {
        let rows: Vec<IdentityRow> =
            sqlx::query_as("SELECT uuid, email, profile FROM identities WHERE uuid = ? LIMIT 2")
                .bind(uuid)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Identity::from).collect())
    }

    /// Delete an identity by subject id.
    pub async fn delete(&self, uuid: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM identities WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl IdentityLookup for IdentityStore {
    async fn find_by_subject(&self, subject: &str) -> Result<Vec<Identity>, LookupError> {
        self.find_by_uuid(subject)
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))
    }
}
