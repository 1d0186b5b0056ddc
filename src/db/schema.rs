//! SQL DDL for the SQLite vector index.
//!
//! Defines the `collections` registry, the shared `points` payload table, the
//! `payload_indexes` registry, and `schema_meta`. Each collection additionally
//! owns a `vec_<name>` vec0 virtual table, created on demand by
//! [`create_vec_table`]. All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// The schema version that the current binary writes.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL CHECK(dimension > 0),
    distance TEXT NOT NULL DEFAULT 'cosine' CHECK(distance IN ('cosine')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS points (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (collection, id)
);

CREATE TABLE IF NOT EXISTS payload_indexes (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    field TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (collection, field)
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all shared tables. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Name of the vec0 table backing a collection. `collection` must already be validated.
pub fn vec_table(collection: &str) -> String {
    format!("vec_{collection}")
}

/// Name of the expression index backing a payload index. Both parts must be validated.
pub fn payload_index_name(collection: &str, field: &str) -> String {
    format!("idx_points_{collection}_{field}")
}

/// Create the vec0 virtual table for a collection. Idempotent.
pub fn create_vec_table(
    conn: &Connection,
    collection: &str,
    dimension: usize,
) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING vec0(\n    id TEXT PRIMARY KEY,\n    embedding FLOAT[{dimension}]\n);",
        vec_table(collection)
    ))
}

/// Create an expression index over `json_extract(payload, '$.<field>')`. Idempotent.
pub fn create_payload_index(
    conn: &Connection,
    collection: &str,
    field: &str,
) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON points(collection, json_extract(payload, '$.{field}'));",
        payload_index_name(collection, field)
    ))
}
