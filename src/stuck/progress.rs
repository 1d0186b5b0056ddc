//! File-level progress: the most recent modification time under a project root.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

/// Latest mtime of any file under `root`, skipping directories named in
/// `ignored` (the root itself is never skipped). `None` when the walk finds no
/// readable files.
pub fn latest_modification(root: &Path, ignored: &[String]) -> Option<SystemTime> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() > 0 && e.file_type().is_dir() {
                if let Some(name) = e.file_name().to_str() {
                    return !ignored.iter().any(|d| d == name);
                }
            }
            true
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
}

/// Async wrapper running the walk on the blocking pool.
pub async fn scan_latest_modification(
    root: PathBuf,
    ignored: Vec<String>,
) -> Option<DateTime<Utc>> {
    let result =
        tokio::task::spawn_blocking(move || latest_modification(&root, &ignored)).await;
    match result {
        Ok(latest) => latest.map(DateTime::<Utc>::from),
        Err(e) => {
            tracing::warn!(error = %e, "directory scan task failed");
            None
        }
    }
}
