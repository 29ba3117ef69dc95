//! User profile persistence.
//!
//! Profiles are keyed by the identity provider's subject id (`sub`).
//! A profile row is created at sign-up, or lazily by the first persona
//! selection for users who signed up elsewhere.

use sqlx::Row;

use crate::db::Database;
use crate::error::StoreError;
use crate::models::{Persona, UserProfile};

#[derive(Debug, Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a profile for a freshly created identity.
    ///
    /// Re-creating an existing identity refreshes its email and metadata.
    pub async fn create_user(
        &self,
        identity_id: &str,
        email: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO users (identity_id, email, metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(identity_id) DO UPDATE SET
                email = excluded.email,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(identity_id)
        .bind(email)
        .bind(serde_json::to_string(metadata)?)
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        tracing::info!(identity_id, "stored user profile");
        Ok(())
    }

    pub async fn get_user(&self, identity_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query(
            "SELECT identity_id, email, selected_character, metadata_json FROM users WHERE identity_id = ?",
        )
        .bind(identity_id)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let selected: Option<String> = row.try_get("selected_character")?;
        let metadata_json: String = row.try_get("metadata_json")?;

        Ok(Some(UserProfile {
            identity_id: row.try_get("identity_id")?,
            email: row.try_get("email")?,
            // Unrecognised stored values read as unset
            selected_character: selected.and_then(|s| s.parse().ok()),
            metadata: serde_json::from_str(&metadata_json)?,
        }))
    }

    /// Record the user's persona, creating the profile if needed.
    pub async fn choose_character(&self, identity_id: &str, persona: Persona) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO users (identity_id, selected_character, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(identity_id) DO UPDATE SET
                selected_character = excluded.selected_character,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(identity_id)
        .bind(persona.as_str())
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        tracing::info!(identity_id, persona = persona.as_str(), "selected character");
        Ok(())
    }
}
