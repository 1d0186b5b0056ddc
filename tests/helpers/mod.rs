#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use vigil::config::VigilConfig;
use vigil::embedding::hashing::HashingEmbeddingProvider;
use vigil::embedding::EmbeddingProvider;
use vigil::index::sqlite::SqliteVectorIndex;
use vigil::index::VectorIndex;
use vigil::session::{Coordinator, Session};

/// Deterministic offline embedder: identical text embeds identically.
pub fn test_embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbeddingProvider::new(384, 8000))
}

/// Fresh in-memory sqlite-vec index.
pub fn test_index() -> Arc<SqliteVectorIndex> {
    Arc::new(SqliteVectorIndex::open_in_memory().unwrap())
}

/// Coordinator over the hashing embedder and an in-memory index. The index is
/// returned as well so tests can inspect collections directly.
pub fn test_coordinator() -> (Coordinator, Arc<SqliteVectorIndex>) {
    test_coordinator_with(VigilConfig::default())
}

pub fn test_coordinator_with(config: VigilConfig) -> (Coordinator, Arc<SqliteVectorIndex>) {
    let index = test_index();
    let shared: Arc<dyn VectorIndex> = index.clone();
    (Coordinator::new(config, test_embedder(), shared), index)
}

/// A project directory holding one source file modified `minutes_ago`.
pub fn project_dir(minutes_ago: u64) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "src/main.rs", "fn main() {}\n", minutes_ago);
    dir
}

/// Write `rel` under `root` and backdate its mtime by `minutes_ago`.
pub fn write_file(root: &Path, rel: &str, contents: &str, minutes_ago: u64) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
    let mtime = SystemTime::now() - Duration::from_secs(minutes_ago * 60);
    filetime::set_file_mtime(&path, filetime::FileTime::from_system_time(mtime)).unwrap();
}

/// Start a session named `id` rooted at `root`.
pub async fn start(coordinator: &Coordinator, id: &str, root: &Path) -> Arc<Session> {
    coordinator.start_session(id, root).await.unwrap()
}
