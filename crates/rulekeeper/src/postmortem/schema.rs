//! `SQLite` schema for the postmortem store.

/// SQL statement to create the postmortems table.
pub const CREATE_POSTMORTEMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS postmortems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    title TEXT,
    notes TEXT NOT NULL,
    what_happened TEXT,
    expected TEXT,
    severity TEXT NOT NULL DEFAULT 'medium',
    files TEXT NOT NULL DEFAULT '[]',
    content_hash TEXT NOT NULL,
    analysis TEXT,
    analyzed_at TEXT
)
";

/// Index for per-project listings, newest first.
pub const CREATE_PROJECT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_postmortems_project ON postmortems(project_path, created_at DESC)
";

/// Index on `content_hash` for deduplication.
pub const CREATE_HASH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_postmortems_hash ON postmortems(content_hash)
";

/// Key-value table holding the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_POSTMORTEMS_TABLE,
    CREATE_PROJECT_INDEX,
    CREATE_HASH_INDEX,
    CREATE_METADATA_TABLE,
];
