pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the index database at the given path, with sqlite-vec
/// loaded and the shared schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    configure(&conn)?;

    tracing::info!(path = %path.display(), "index database initialized");
    Ok(conn)
}

/// Open an in-memory index database. Its contents vanish with the process.
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    configure(&conn)?;
    tracing::debug!("in-memory index database initialized");
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    schema::init_schema(conn).context("failed to initialize schema")?;
    Ok(())
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            std::mem::size_of_val(embedding),
        )
    }
}

/// Convert an L2 distance between unit vectors to cosine similarity.
///
/// For unit vectors, `||a - b||² = 2 - 2·cos(a, b)`.
pub fn l2_to_cosine(distance: f64) -> f64 {
    1.0 - (distance * distance) / 2.0
}
