//! PostgreSQL database operations

use lexicon_core::SyncState;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::models::*;

const WORD_COLUMNS: &str = "id, dictionary_id, text, definition, examples, added_by_email, \
                            added_by_display_name, created_at, likes, difficulties";

/// Database wrapper with connection pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL and create connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a pool that connects on first use
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(database_url)?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // === User Repository ===

    /// Create a user. Returns `None` when the email is already registered.
    pub async fn create_user(
        &self,
        email: &str,
        display_name: &str,
        token_hash: &str,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, display_name, token_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING email, display_name, token_hash, created_at, last_seen_at
            "#,
        )
        .bind(email)
        .bind(display_name)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Look up a user by token hash and bump `last_seen_at`.
    pub async fn touch_user_by_token(&self, token_hash: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET last_seen_at = NOW()
            WHERE token_hash = $1
            RETURNING email, display_name, token_hash, created_at, last_seen_at
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // === Dictionary Repository ===

    /// Create a dictionary with `owner_email` as its owner.
    pub async fn create_dictionary(&self, name: &str, owner_email: &str) -> Result<SharedDictionary> {
        let dictionary = SharedDictionary::new(name, owner_email);
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, DbDictionary>(
            r#"
            INSERT INTO dictionaries (id, name, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, name, created_at
            "#,
        )
        .bind(dictionary.id)
        .bind(&dictionary.name)
        .bind(dictionary.created_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO collaborators (dictionary_id, email, role)
            VALUES ($1, $2, 'owner')
            "#,
        )
        .bind(row.id)
        .bind(owner_email)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(build_dictionary(
            row,
            vec![DbCollaborator {
                email: owner_email.to_string(),
                role: Role::Owner.as_str().to_string(),
            }],
        ))
    }

    /// Dictionaries `email` collaborates on, newest first.
    pub async fn list_dictionaries(&self, email: &str) -> Result<Vec<DictionarySummary>> {
        let dictionaries = sqlx::query_as::<_, DictionarySummary>(
            r#"
            SELECT d.id, d.name, c.role, d.created_at
            FROM dictionaries d
            JOIN collaborators c ON c.dictionary_id = d.id
            WHERE c.email = $1
            ORDER BY d.created_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        Ok(dictionaries)
    }

    /// Dictionary metadata with its collaborator map.
    pub async fn get_dictionary(&self, dictionary_id: Uuid) -> Result<Option<SharedDictionary>> {
        let row = sqlx::query_as::<_, DbDictionary>(
            "SELECT id, name, created_at FROM dictionaries WHERE id = $1",
        )
        .bind(dictionary_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let collaborators = sqlx::query_as::<_, DbCollaborator>(
            "SELECT email, role FROM collaborators WHERE dictionary_id = $1",
        )
        .bind(dictionary_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(build_dictionary(row, collaborators)))
    }

    /// Full dictionary state: metadata plus every word, oldest first.
    pub async fn get_dictionary_state(&self, dictionary_id: Uuid) -> Result<Option<DictionaryState>> {
        let Some(dictionary) = self.get_dictionary(dictionary_id).await? else {
            return Ok(None);
        };

        let words = sqlx::query_as::<_, DbSharedWord>(&format!(
            "SELECT {WORD_COLUMNS} FROM shared_words WHERE dictionary_id = $1 ORDER BY created_at, id"
        ))
        .bind(dictionary_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(DictionaryState {
            dictionary,
            words: words.into_iter().map(DbSharedWord::into_shared_word).collect(),
        }))
    }

    /// Delete a dictionary; collaborators and words go with it.
    pub async fn delete_dictionary(&self, dictionary_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dictionaries WHERE id = $1")
            .bind(dictionary_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // === Collaborator Repository ===

    /// Insert or update a collaborator. The owner row is never touched.
    pub async fn set_collaborator(&self, dictionary_id: Uuid, email: &str, role: Role) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collaborators (dictionary_id, email, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (dictionary_id, email)
            DO UPDATE SET role = EXCLUDED.role
            WHERE collaborators.role <> 'owner'
            "#,
        )
        .bind(dictionary_id)
        .bind(email)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn remove_collaborator(&self, dictionary_id: Uuid, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM collaborators
            WHERE dictionary_id = $1 AND email = $2 AND role <> 'owner'
            "#,
        )
        .bind(dictionary_id)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // === Shared Word Repository ===

    pub async fn insert_word(
        &self,
        dictionary_id: Uuid,
        draft: &WordDraft,
        author_email: &str,
        author_display_name: &str,
    ) -> Result<SharedWord> {
        let word = sqlx::query_as::<_, DbSharedWord>(&format!(
            r#"
            INSERT INTO shared_words (id, dictionary_id, text, definition, examples,
                                      added_by_email, added_by_display_name)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {WORD_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(dictionary_id)
        .bind(draft.text.trim())
        .bind(draft.definition.trim())
        .bind(Json(&draft.examples))
        .bind(author_email)
        .bind(author_display_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(word.into_shared_word())
    }

    /// Replace the editable content of a word. Likes and difficulties are kept.
    pub async fn update_word(&self, dictionary_id: Uuid, word_id: Uuid, draft: &WordDraft) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shared_words
            SET text = $3, definition = $4, examples = $5
            WHERE id = $1 AND dictionary_id = $2
            "#,
        )
        .bind(word_id)
        .bind(dictionary_id)
        .bind(draft.text.trim())
        .bind(draft.definition.trim())
        .bind(Json(&draft.examples))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_word(&self, dictionary_id: Uuid, word_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shared_words WHERE id = $1 AND dictionary_id = $2")
            .bind(word_id)
            .bind(dictionary_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Write one key of a word's per-user maps in a single statement, leaving every other key
    /// as it is in the row at write time.
    pub async fn apply_field_update(
        &self,
        dictionary_id: Uuid,
        word_id: Uuid,
        update: &FieldUpdate,
    ) -> Result<bool> {
        let query = match update {
            FieldUpdate::SetDifficulty { email, score } => sqlx::query(
                r#"
                UPDATE shared_words
                SET difficulties = jsonb_set(difficulties, ARRAY[$3], to_jsonb($4::INT), true)
                WHERE id = $1 AND dictionary_id = $2
                "#,
            )
            .bind(word_id)
            .bind(dictionary_id)
            .bind(email)
            .bind(*score),
            FieldUpdate::SetLike { email, liked: true } => sqlx::query(
                r#"
                UPDATE shared_words
                SET likes = jsonb_set(likes, ARRAY[$3], 'true'::JSONB, true)
                WHERE id = $1 AND dictionary_id = $2
                "#,
            )
            .bind(word_id)
            .bind(dictionary_id)
            .bind(email),
            FieldUpdate::SetLike { email, liked: false } => sqlx::query(
                r#"
                UPDATE shared_words
                SET likes = likes - $3::TEXT
                WHERE id = $1 AND dictionary_id = $2
                "#,
            )
            .bind(word_id)
            .bind(dictionary_id)
            .bind(email),
        };

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // === Private Word Repository ===

    pub async fn list_private_words(&self, owner_email: &str) -> Result<Vec<Word>> {
        let rows: Vec<(Json<Word>,)> = sqlx::query_as(
            r#"
            SELECT body
            FROM private_words
            WHERE owner_email = $1
            ORDER BY updated_at
            "#,
        )
        .bind(owner_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(body,)| body.0).collect())
    }

    /// Store the pushed copy of a private word. The server copy is always `Synced`.
    pub async fn upsert_private_word(&self, owner_email: &str, word: &Word) -> Result<()> {
        let mut word = word.clone();
        word.sync_state = SyncState::Synced;

        sqlx::query(
            r#"
            INSERT INTO private_words (owner_email, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_email, id)
            DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
            "#,
        )
        .bind(owner_email)
        .bind(word.id)
        .bind(Json(&word))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_private_word(&self, owner_email: &str, word_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM private_words WHERE owner_email = $1 AND id = $2")
            .bind(owner_email)
            .bind(word_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
