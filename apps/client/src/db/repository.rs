//! Repository pattern for database access.

use crate::db::error::DbError;
use chrono::{DateTime, Utc};
use lexicon_core::types::{QuizSession, QuizType, SyncState, Word};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use uuid::Uuid;

type Result<T> = std::result::Result<T, DbError>;

const WORD_COLUMNS: &str = "id, text, definitions, examples, tags, difficulty_score, attempt_count, \
     is_favorite, language_code, created_at, updated_at, sync_state";

const SESSION_COLUMNS: &str = "id, quiz_type, score, correct_answers, total_items, duration_seconds, \
     accuracy, item_ids, correct_item_ids, timestamp";

/// Repository for private word operations.
pub trait WordRepository {
    fn get_word(&self, id: Uuid) -> Result<Option<Word>>;
    fn list_words(&self) -> Result<Vec<Word>>;
    /// Insert or replace a word. The stored copy is always marked dirty.
    fn save_word(&self, word: &Word) -> Result<()>;
    /// Store a new score, bump the attempt count and mark the word dirty.
    fn record_attempt(&self, id: Uuid, score: i32) -> Result<Word>;
    /// Delete a word and queue the delete for the backend.
    fn delete_word(&self, id: Uuid) -> Result<bool>;
}

/// Local sync state.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LocalSyncState {
    pub last_sync_at: Option<String>,
    pub pending_changes: i64,
}

/// Account credentials.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LocalAccount {
    pub token: String,
    pub email: String,
}

/// Repository for sync operations.
pub trait SyncRepository {
    /// Words whose latest local change has not been acknowledged.
    fn get_dirty_words(&self) -> Result<Vec<Word>>;
    fn mark_push_pending(&self, id: Uuid) -> Result<bool>;
    /// Only succeeds while the word is still push-pending, so edits made during a push survive.
    fn mark_synced(&self, id: Uuid, synced_at: DateTime<Utc>) -> Result<bool>;
    fn revert_push_pending(&self, id: Uuid) -> Result<bool>;
    /// Return pushes interrupted by a crash to the dirty state.
    fn reset_interrupted_pushes(&self) -> Result<usize>;
    /// Apply words pulled from the backend. Dirty and deleted words keep their local version.
    fn upsert_words_from_sync(&self, words: &[Word]) -> Result<usize>;
    fn get_pending_deletes(&self) -> Result<Vec<Uuid>>;
    fn clear_pending_delete(&self, id: Uuid) -> Result<()>;
    fn get_sync_state(&self) -> Result<LocalSyncState>;
    fn update_sync_state(&self, last_sync_at: &str) -> Result<()>;
    fn get_account(&self) -> Result<Option<LocalAccount>>;
    fn save_account(&self, token: &str, email: &str) -> Result<()>;
}

/// Repository for quiz session history.
pub trait SessionRepository {
    fn save_session(&self, session: &QuizSession) -> Result<()>;
    fn get_session(&self, id: Uuid) -> Result<Option<QuizSession>>;
    /// Most recent sessions first.
    fn list_sessions(&self, limit: usize) -> Result<Vec<QuizSession>>;
}

/// SQLite implementation of repositories.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open database at path, creating if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    /// Open in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self { conn };
        repo.initialize()?;
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(super::schema::SCHEMA)?;
        self.conn.execute_batch(super::schema::INIT_SYNC_STATE)?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![super::schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    fn row_to_word(row: &rusqlite::Row) -> rusqlite::Result<Word> {
        let sync_state: String = row.get(11)?;
        Ok(Word {
            id: parse_uuid(0, row.get(0)?)?,
            text: row.get(1)?,
            definitions: parse_json(2, row.get(2)?)?,
            examples: parse_json(3, row.get(3)?)?,
            tags: parse_json(4, row.get(4)?)?,
            difficulty_score: row.get(5)?,
            attempt_count: row.get(6)?,
            is_favorite: row.get(7)?,
            language_code: row.get(8)?,
            created_at: parse_timestamp(9, row.get(9)?)?,
            updated_at: parse_timestamp(10, row.get(10)?)?,
            sync_state: SyncState::from_str(&sync_state)
                .ok_or_else(|| invalid(11, format!("unknown sync state: {sync_state}")))?,
        })
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<QuizSession> {
        let quiz_type: String = row.get(1)?;
        let duration: i64 = row.get(5)?;
        Ok(QuizSession {
            id: parse_uuid(0, row.get(0)?)?,
            quiz_type: QuizType::from_str(&quiz_type)
                .ok_or_else(|| invalid(1, format!("unknown quiz type: {quiz_type}")))?,
            score: row.get(2)?,
            correct_answers: row.get(3)?,
            total_items: row.get(4)?,
            duration_seconds: u64::try_from(duration)
                .map_err(|_| invalid(5, format!("negative duration: {duration}")))?,
            accuracy: row.get(6)?,
            item_ids: parse_json(7, row.get(7)?)?,
            correct_item_ids: parse_json(8, row.get(8)?)?,
            timestamp: parse_timestamp(9, row.get(9)?)?,
        })
    }

    fn words_where(&self, filter: &str) -> Result<Vec<Word>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORD_COLUMNS} FROM words {filter} ORDER BY created_at, id"
        ))?;
        let words = stmt
            .query_map([], Self::row_to_word)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(words)
    }
}

impl WordRepository for SqliteRepository {
    fn get_word(&self, id: Uuid) -> Result<Option<Word>> {
        self.conn
            .query_row(
                &format!("SELECT {WORD_COLUMNS} FROM words WHERE id = ?1"),
                params![id.to_string()],
                Self::row_to_word,
            )
            .optional()
            .map_err(Into::into)
    }

    fn list_words(&self) -> Result<Vec<Word>> {
        self.words_where("")
    }

    fn save_word(&self, word: &Word) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO words (id, text, definitions, examples, tags, difficulty_score,
                 attempt_count, is_favorite, language_code, created_at, updated_at, sync_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'local_dirty')",
            params![
                word.id.to_string(),
                word.text,
                to_json(&word.definitions)?,
                to_json(&word.examples)?,
                to_json(&word.tags)?,
                word.difficulty_score,
                word.attempt_count,
                word.is_favorite,
                word.language_code,
                word.created_at.to_rfc3339(),
                word.updated_at.to_rfc3339(),
            ],
        )?;
        self.conn.execute(
            "DELETE FROM pending_deletes WHERE word_id = ?1",
            params![word.id.to_string()],
        )?;
        Ok(())
    }

    fn record_attempt(&self, id: Uuid, score: i32) -> Result<Word> {
        let changed = self.conn.execute(
            "UPDATE words SET difficulty_score = ?1, attempt_count = attempt_count + 1,
                 sync_state = 'local_dirty'
             WHERE id = ?2",
            params![score, id.to_string()],
        )?;
        if changed == 0 {
            return Err(DbError::WordNotFound(id));
        }
        self.get_word(id)?.ok_or(DbError::WordNotFound(id))
    }

    fn delete_word(&self, id: Uuid) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let deleted = tx.execute("DELETE FROM words WHERE id = ?1", params![id.to_string()])?;
        if deleted > 0 {
            tx.execute(
                "INSERT OR REPLACE INTO pending_deletes (word_id, deleted_at) VALUES (?1, ?2)",
                params![id.to_string(), Utc::now().to_rfc3339()],
            )?;
        }
        tx.commit()?;
        Ok(deleted > 0)
    }
}

impl SyncRepository for SqliteRepository {
    fn get_dirty_words(&self) -> Result<Vec<Word>> {
        self.words_where("WHERE sync_state != 'synced'")
    }

    fn mark_push_pending(&self, id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE words SET sync_state = 'push_pending' WHERE id = ?1 AND sync_state = 'local_dirty'",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn mark_synced(&self, id: Uuid, synced_at: DateTime<Utc>) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE words SET sync_state = 'synced', updated_at = ?1
             WHERE id = ?2 AND sync_state = 'push_pending'",
            params![synced_at.to_rfc3339(), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn revert_push_pending(&self, id: Uuid) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE words SET sync_state = 'local_dirty' WHERE id = ?1 AND sync_state = 'push_pending'",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn reset_interrupted_pushes(&self) -> Result<usize> {
        let changed = self.conn.execute(
            "UPDATE words SET sync_state = 'local_dirty' WHERE sync_state = 'push_pending'",
            [],
        )?;
        Ok(changed)
    }

    fn upsert_words_from_sync(&self, words: &[Word]) -> Result<usize> {
        let mut count = 0;
        for word in words {
            let id = word.id.to_string();
            let tombstoned: Option<i64> = self
                .conn
                .query_row(
                    "SELECT 1 FROM pending_deletes WHERE word_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            if tombstoned.is_some() {
                continue;
            }

            count += self.conn.execute(
                "INSERT INTO words (id, text, definitions, examples, tags, difficulty_score,
                     attempt_count, is_favorite, language_code, created_at, updated_at, sync_state)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'synced')
                 ON CONFLICT(id) DO UPDATE SET
                     text = excluded.text,
                     definitions = excluded.definitions,
                     examples = excluded.examples,
                     tags = excluded.tags,
                     difficulty_score = excluded.difficulty_score,
                     attempt_count = excluded.attempt_count,
                     is_favorite = excluded.is_favorite,
                     language_code = excluded.language_code,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     sync_state = 'synced'
                 WHERE words.sync_state = 'synced'",
                params![
                    id,
                    word.text,
                    to_json(&word.definitions)?,
                    to_json(&word.examples)?,
                    to_json(&word.tags)?,
                    word.difficulty_score,
                    word.attempt_count,
                    word.is_favorite,
                    word.language_code,
                    word.created_at.to_rfc3339(),
                    word.updated_at.to_rfc3339(),
                ],
            )?;
        }
        Ok(count)
    }

    fn get_pending_deletes(&self) -> Result<Vec<Uuid>> {
        let mut stmt = self
            .conn
            .prepare("SELECT word_id FROM pending_deletes ORDER BY deleted_at")?;
        let ids = stmt
            .query_map([], |row| parse_uuid(0, row.get(0)?))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn clear_pending_delete(&self, id: Uuid) -> Result<()> {
        self.conn.execute(
            "DELETE FROM pending_deletes WHERE word_id = ?1",
            params![id.to_string()],
        )?;
        Ok(())
    }

    fn get_sync_state(&self) -> Result<LocalSyncState> {
        self.conn
            .query_row(
                "SELECT last_sync_at,
                     (SELECT COUNT(*) FROM words WHERE sync_state != 'synced')
                         + (SELECT COUNT(*) FROM pending_deletes)
                 FROM sync_state WHERE id = 1",
                [],
                |row| {
                    Ok(LocalSyncState {
                        last_sync_at: row.get(0)?,
                        pending_changes: row.get(1)?,
                    })
                },
            )
            .map_err(Into::into)
    }

    fn update_sync_state(&self, last_sync_at: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE sync_state SET last_sync_at = ?1 WHERE id = 1",
            params![last_sync_at],
        )?;
        Ok(())
    }

    fn get_account(&self) -> Result<Option<LocalAccount>> {
        self.conn
            .query_row("SELECT token, email FROM local_account LIMIT 1", [], |row| {
                Ok(LocalAccount {
                    token: row.get(0)?,
                    email: row.get(1)?,
                })
            })
            .optional()
            .map_err(Into::into)
    }

    fn save_account(&self, token: &str, email: &str) -> Result<()> {
        // Clear existing and insert new
        self.conn.execute("DELETE FROM local_account", [])?;
        self.conn.execute(
            "INSERT INTO local_account (token, email) VALUES (?1, ?2)",
            params![token, email],
        )?;
        Ok(())
    }
}

impl SessionRepository for SqliteRepository {
    fn save_session(&self, session: &QuizSession) -> Result<()> {
        let duration = i64::try_from(session.duration_seconds)
            .map_err(|_| DbError::InvalidData(format!("duration too large: {}", session.duration_seconds)))?;
        self.conn.execute(
            &format!("INSERT INTO quiz_sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
            params![
                session.id.to_string(),
                session.quiz_type.as_str(),
                session.score,
                session.correct_answers,
                session.total_items,
                duration,
                session.accuracy,
                to_json(&session.item_ids)?,
                to_json(&session.correct_item_ids)?,
                session.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, id: Uuid) -> Result<Option<QuizSession>> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM quiz_sessions WHERE id = ?1"),
                params![id.to_string()],
                Self::row_to_session,
            )
            .optional()
            .map_err(Into::into)
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<QuizSession>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM quiz_sessions ORDER BY timestamp DESC LIMIT ?1"
        ))?;
        let sessions = stmt
            .query_map(params![limit], Self::row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }
}

fn invalid(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn parse_uuid(column: usize, value: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_timestamp(column: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_json<T: DeserializeOwned>(column: usize, value: String) -> rusqlite::Result<T> {
    serde_json::from_str(&value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| DbError::InvalidData(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn repo() -> SqliteRepository {
        SqliteRepository::open_in_memory().unwrap()
    }

    fn session(quiz_type: QuizType, minutes_ago: i64) -> QuizSession {
        QuizSession {
            id: Uuid::new_v4(),
            quiz_type,
            score: 3,
            correct_answers: 1,
            total_items: 2,
            duration_seconds: 42,
            accuracy: 0.5,
            item_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            correct_item_ids: vec![],
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn saved_word_reads_back_dirty() {
        let repo = repo();
        let mut word = Word::new("Hund", "dog", "de");
        word.examples.push("Der Hund bellt.".to_string());
        word.sync_state = SyncState::Synced;
        repo.save_word(&word).unwrap();

        let stored = repo.get_word(word.id).unwrap().unwrap();
        assert_eq!(stored.text, "Hund");
        assert_eq!(stored.examples, vec!["Der Hund bellt.".to_string()]);
        assert_eq!(stored.sync_state, SyncState::LocalDirty);
    }

    #[test]
    fn record_attempt_bumps_count_and_dirties() {
        let repo = repo();
        let word = Word::new("Katze", "cat", "de");
        repo.save_word(&word).unwrap();
        repo.mark_push_pending(word.id).unwrap();
        repo.mark_synced(word.id, Utc::now()).unwrap();

        let updated = repo.record_attempt(word.id, 5).unwrap();
        assert_eq!(updated.difficulty_score, 5);
        assert_eq!(updated.attempt_count, 1);
        assert_eq!(updated.sync_state, SyncState::LocalDirty);
    }

    #[test]
    fn record_attempt_on_missing_word_fails() {
        let repo = repo();
        let id = Uuid::new_v4();
        assert!(matches!(repo.record_attempt(id, 5), Err(DbError::WordNotFound(missing)) if missing == id));
    }

    #[test]
    fn edit_during_push_is_not_marked_synced() {
        let repo = repo();
        let word = Word::new("Baum", "tree", "de");
        repo.save_word(&word).unwrap();

        assert!(repo.mark_push_pending(word.id).unwrap());
        repo.record_attempt(word.id, -2).unwrap();
        assert!(!repo.mark_synced(word.id, Utc::now()).unwrap());

        let dirty = repo.get_dirty_words().unwrap();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].sync_state, SyncState::LocalDirty);
    }

    #[test]
    fn interrupted_pushes_return_to_dirty() {
        let repo = repo();
        let word = Word::new("Haus", "house", "de");
        repo.save_word(&word).unwrap();
        repo.mark_push_pending(word.id).unwrap();

        assert_eq!(repo.reset_interrupted_pushes().unwrap(), 1);
        assert_eq!(
            repo.get_word(word.id).unwrap().unwrap().sync_state,
            SyncState::LocalDirty
        );
    }

    #[test]
    fn pulled_words_do_not_overwrite_dirty_ones() {
        let repo = repo();
        let mut local = Word::new("Maus", "mouse", "de");
        repo.save_word(&local).unwrap();

        local.definitions = vec!["computer mouse".to_string()];
        let remote_only = Word::new("Vogel", "bird", "de");
        let applied = repo
            .upsert_words_from_sync(&[local.clone(), remote_only.clone()])
            .unwrap();

        assert_eq!(applied, 1);
        assert_eq!(repo.get_word(local.id).unwrap().unwrap().definitions, vec!["mouse".to_string()]);
        assert_eq!(
            repo.get_word(remote_only.id).unwrap().unwrap().sync_state,
            SyncState::Synced
        );
    }

    #[test]
    fn delete_queues_tombstone_and_blocks_resurrection() {
        let repo = repo();
        let word = Word::new("Fisch", "fish", "de");
        repo.save_word(&word).unwrap();

        assert!(repo.delete_word(word.id).unwrap());
        assert!(!repo.delete_word(word.id).unwrap());
        assert_eq!(repo.get_pending_deletes().unwrap(), vec![word.id]);

        assert_eq!(repo.upsert_words_from_sync(&[word.clone()]).unwrap(), 0);
        assert!(repo.get_word(word.id).unwrap().is_none());

        repo.clear_pending_delete(word.id).unwrap();
        assert!(repo.get_pending_deletes().unwrap().is_empty());
    }

    #[test]
    fn sync_state_counts_pending_changes() {
        let repo = repo();
        let a = Word::new("eins", "one", "de");
        let b = Word::new("zwei", "two", "de");
        repo.save_word(&a).unwrap();
        repo.save_word(&b).unwrap();
        repo.delete_word(b.id).unwrap();

        let state = repo.get_sync_state().unwrap();
        assert_eq!(state.pending_changes, 2);
        assert_eq!(state.last_sync_at, None);

        repo.update_sync_state("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(
            repo.get_sync_state().unwrap().last_sync_at.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn sessions_list_newest_first() {
        let repo = repo();
        let older = session(QuizType::Spelling, 30);
        let newer = session(QuizType::Sentence, 5);
        repo.save_session(&older).unwrap();
        repo.save_session(&newer).unwrap();

        let listed = repo.list_sessions(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].item_ids, older.item_ids);
        assert_eq!(repo.get_session(older.id).unwrap().unwrap().quiz_type, QuizType::Spelling);
    }

    #[test]
    fn account_is_replaced() {
        let repo = repo();
        repo.save_account("first", "ana@example.com").unwrap();
        repo.save_account("second", "ana@example.com").unwrap();
        assert_eq!(repo.get_account().unwrap().unwrap().token, "second");
    }
}
