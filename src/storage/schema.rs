use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables (drops existing tables first to ensure clean state)
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS allocations;
        DROP TABLE IF EXISTS stack_frames;
        DROP TABLE IF EXISTS frames;
        DROP TABLE IF EXISTS memory_snapshots;
        DROP TABLE IF EXISTS meta;

        CREATE TABLE meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Process memory over time
        CREATE TABLE memory_snapshots (
            timestamp_ms INTEGER NOT NULL,
            resident_bytes INTEGER NOT NULL,
            heap_bytes INTEGER NOT NULL
        );

        CREATE INDEX idx_snapshots_time ON memory_snapshots(timestamp_ms);

        -- Unique frames (function, file, line) - normalized
        CREATE TABLE frames (
            id INTEGER PRIMARY KEY,
            function TEXT NOT NULL,
            file TEXT NOT NULL,
            line INTEGER NOT NULL,
            UNIQUE(function, file, line)
        );

        -- Call stacks; depth 0 is the innermost frame
        CREATE TABLE stack_frames (
            stack_id INTEGER NOT NULL,
            depth INTEGER NOT NULL,
            frame_id INTEGER NOT NULL,
            PRIMARY KEY (stack_id, depth),
            FOREIGN KEY (frame_id) REFERENCES frames(id)
        );

        -- Allocations aggregated per (time, thread, stack)
        CREATE TABLE allocations (
            id INTEGER PRIMARY KEY,
            timestamp_ms INTEGER NOT NULL,
            thread TEXT NOT NULL,
            size INTEGER NOT NULL,
            n_allocations INTEGER NOT NULL DEFAULT 1,
            stack_id INTEGER NOT NULL
        );

        CREATE INDEX idx_allocations_time ON allocations(timestamp_ms);
        "#,
    )
}

/// Set a metadata key
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        [key, value],
    )?;
    Ok(())
}

/// Get a metadata key
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
}

pub(crate) trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
