//! SQLite schema definitions.

/// Current schema version for migrations.
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema for local SQLite database.
pub const SCHEMA: &str = r#"
-- Account credentials issued by the backend
CREATE TABLE IF NOT EXISTS local_account (
    token TEXT PRIMARY KEY,
    email TEXT NOT NULL
);

-- Private words, list columns stored as JSON arrays
CREATE TABLE IF NOT EXISTS words (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    definitions TEXT NOT NULL DEFAULT '[]',
    examples TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    difficulty_score INTEGER NOT NULL DEFAULT 0,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    language_code TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_state TEXT NOT NULL DEFAULT 'local_dirty'
);

-- Deletes not yet acknowledged by the backend
CREATE TABLE IF NOT EXISTS pending_deletes (
    word_id TEXT PRIMARY KEY,
    deleted_at TEXT NOT NULL
);

-- Completed and abandoned quiz runs
CREATE TABLE IF NOT EXISTS quiz_sessions (
    id TEXT PRIMARY KEY,
    quiz_type TEXT NOT NULL,
    score INTEGER NOT NULL,
    correct_answers INTEGER NOT NULL,
    total_items INTEGER NOT NULL,
    duration_seconds INTEGER NOT NULL,
    accuracy REAL NOT NULL,
    item_ids TEXT NOT NULL DEFAULT '[]',
    correct_item_ids TEXT NOT NULL DEFAULT '[]',
    timestamp TEXT NOT NULL
);

-- Sync metadata
CREATE TABLE IF NOT EXISTS sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_sync_at TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_words_sync_state ON words(sync_state);
CREATE INDEX IF NOT EXISTS idx_quiz_sessions_timestamp ON quiz_sessions(timestamp);
"#;

/// Initialize sync state if not exists.
pub const INIT_SYNC_STATE: &str = r#"
INSERT OR IGNORE INTO sync_state (id) VALUES (1);
"#;
