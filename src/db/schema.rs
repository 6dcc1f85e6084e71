/// Schema for the cache generations, their entries and the pending sync queue.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per named cache generation
CREATE TABLE IF NOT EXISTS cache_generations (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by the hash of method + URL
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_name TEXT NOT NULL,
    entry_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, entry_key),
    FOREIGN KEY (cache_name) REFERENCES cache_generations(name) ON DELETE CASCADE
);

-- Offline writes waiting for connectivity, drained in id order
CREATE TABLE IF NOT EXISTS pending_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
