//! Embedded vector index on SQLite + sqlite-vec.
//!
//! Each collection is a row in `collections` plus its own `vec_<name>` vec0
//! table; payloads live as JSON in the shared `points` table. Vectors are
//! L2-normalized on write and query, so vec0's L2 distance converts exactly to
//! cosine similarity. All SQLite work runs under `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{is_valid_identifier, Payload, PayloadFilter, Point, ScoredPoint, VectorIndex};
use crate::db::{self, embedding_to_bytes, l2_to_cosine, schema};
use crate::embedding::{is_zero_vector, l2_normalize};
use crate::error::{Result, VigilError};

/// Upper bound on `k` for a single vec0 KNN query.
const MAX_KNN: usize = 4096;

pub struct SqliteVectorIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = db::open_database(path).map_err(VigilError::index)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = db::open_memory_database().map_err(VigilError::index)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-initialized connection (see [`db::open_database`]).
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| VigilError::index(format!("index task failed: {e}")))?
        .map_err(VigilError::index)
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| Ok(collection_dimension(conn, &name)?.is_some()))
            .await
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let name = name.to_string();
        self.with_conn(move |conn| create_collection(conn, &name, dimension))
            .await
    }

    async fn ensure_payload_index(&self, name: &str, field: &str) -> Result<()> {
        let (name, field) = (name.to_string(), field.to_string());
        self.with_conn(move |conn| ensure_payload_index(conn, &name, &field))
            .await
    }

    async fn upsert(&self, name: &str, point: Point) -> Result<()> {
        let name = name.to_string();
        self.with_conn(move |conn| upsert(conn, &name, &point)).await
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        let name = name.to_string();
        let vector = vector.to_vec();
        let filter = filter.cloned();
        self.with_conn(move |conn| search(conn, &name, &vector, limit, filter.as_ref()))
            .await
    }

    async fn scroll(
        &self,
        name: &str,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let name = name.to_string();
        let filter = filter.clone();
        self.with_conn(move |conn| scroll(conn, &name, &filter, limit))
            .await
    }

    async fn count(&self, name: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        let name = name.to_string();
        let filter = filter.cloned();
        self.with_conn(move |conn| count(conn, &name, filter.as_ref()))
            .await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_conn(move |conn| delete_collection(conn, &name))
            .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// ── Synchronous operations ───────────────────────────────────────────────────

fn check_identifier(kind: &str, name: &str) -> anyhow::Result<()> {
    if !is_valid_identifier(name) {
        bail!("invalid {kind} name {name:?}: only [a-z0-9_] allowed");
    }
    Ok(())
}

/// Dimension of a collection, or `None` if it does not exist.
fn collection_dimension(conn: &Connection, name: &str) -> anyhow::Result<Option<usize>> {
    let dim: Option<i64> = conn
        .query_row(
            "SELECT dimension FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(dim.map(|d| d as usize))
}

fn require_collection(conn: &Connection, name: &str) -> anyhow::Result<usize> {
    collection_dimension(conn, name)?.with_context(|| format!("collection not found: {name}"))
}

fn create_collection(conn: &mut Connection, name: &str, dimension: usize) -> anyhow::Result<()> {
    check_identifier("collection", name)?;
    anyhow::ensure!(dimension > 0, "collection dimension must be > 0");

    if let Some(existing) = collection_dimension(conn, name)? {
        anyhow::ensure!(
            existing == dimension,
            "collection {name} exists with dimension {existing}, requested {dimension}"
        );
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO collections (name, dimension, created_at) VALUES (?1, ?2, ?3)",
        params![name, dimension as i64, chrono::Utc::now().to_rfc3339()],
    )?;
    schema::create_vec_table(&tx, name, dimension)?;
    tx.commit()?;

    tracing::debug!(collection = name, dimension, "collection created");
    Ok(())
}

fn ensure_payload_index(conn: &mut Connection, name: &str, field: &str) -> anyhow::Result<()> {
    check_identifier("field", field)?;
    require_collection(conn, name)?;

    schema::create_payload_index(conn, name, field)?;
    conn.execute(
        "INSERT OR IGNORE INTO payload_indexes (collection, field, created_at) VALUES (?1, ?2, ?3)",
        params![name, field, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert(conn: &mut Connection, name: &str, point: &Point) -> anyhow::Result<()> {
    let dimension = require_collection(conn, name)?;
    anyhow::ensure!(
        point.vector.len() == dimension,
        "vector has {} dimensions, collection {name} expects {dimension}",
        point.vector.len()
    );

    // A zero vector has no direction; stored as-is it would score 0.5 against
    // every query under the L2-to-cosine mapping.
    anyhow::ensure!(
        !is_zero_vector(&point.vector),
        "point {} has a zero vector and cannot be indexed",
        point.id
    );
    let vector = l2_normalize(&point.vector);
    let payload = serde_json::to_string(&point.payload)?;
    let vec_table = schema::vec_table(name);

    // vec0 has no upsert; replace by delete + insert inside one transaction.
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM points WHERE collection = ?1 AND id = ?2",
        params![name, point.id],
    )?;
    tx.execute(
        &format!("DELETE FROM {vec_table} WHERE id = ?1"),
        params![point.id],
    )?;
    tx.execute(
        "INSERT INTO points (collection, id, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name, point.id, payload, chrono::Utc::now().to_rfc3339()],
    )?;
    tx.execute(
        &format!("INSERT INTO {vec_table} (id, embedding) VALUES (?1, ?2)"),
        params![point.id, embedding_to_bytes(&vector)],
    )?;
    tx.commit()?;
    Ok(())
}

fn search(
    conn: &Connection,
    name: &str,
    vector: &[f32],
    limit: usize,
    filter: Option<&PayloadFilter>,
) -> anyhow::Result<Vec<ScoredPoint>> {
    let dimension = require_collection(conn, name)?;
    anyhow::ensure!(
        vector.len() == dimension,
        "query vector has {} dimensions, collection {name} expects {dimension}",
        vector.len()
    );
    if limit == 0 || is_zero_vector(vector) {
        return Ok(Vec::new());
    }

    // With a payload filter, rank the whole collection and filter afterwards.
    let k = match filter {
        Some(_) => count(conn, name, None)? as usize,
        None => limit,
    }
    .min(MAX_KNN);
    if k == 0 {
        return Ok(Vec::new());
    }

    let query = l2_normalize(vector);
    let sql = format!(
        "WITH knn AS ( \
             SELECT id, distance FROM {} WHERE embedding MATCH ?1 AND k = ?2 \
         ) \
         SELECT knn.id, knn.distance, points.payload FROM knn \
         JOIN points ON points.collection = ?3 AND points.id = knn.id \
         ORDER BY knn.distance",
        schema::vec_table(name)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![embedding_to_bytes(&query), k as i64, name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::with_capacity(limit);
    for (id, distance, payload_json) in rows {
        let payload = parse_payload(&payload_json)?;
        if let Some(f) = filter {
            if !matches_filter(&payload, f) {
                continue;
            }
        }
        results.push(ScoredPoint {
            id,
            score: l2_to_cosine(distance),
            payload,
        });
        if results.len() >= limit {
            break;
        }
    }
    Ok(results)
}

fn scroll(
    conn: &Connection,
    name: &str,
    filter: &PayloadFilter,
    limit: usize,
) -> anyhow::Result<Vec<ScoredPoint>> {
    check_identifier("field", &filter.key)?;
    require_collection(conn, name)?;

    let sql = format!(
        "SELECT id, payload FROM points \
         WHERE collection = ?1 AND json_extract(payload, '$.{}') = ?2 \
         ORDER BY created_at, rowid LIMIT ?3",
        filter.key
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![name, filter.value, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, payload_json)| {
            Ok(ScoredPoint {
                id,
                score: 1.0,
                payload: parse_payload(&payload_json)?,
            })
        })
        .collect()
}

fn count(conn: &Connection, name: &str, filter: Option<&PayloadFilter>) -> anyhow::Result<u64> {
    require_collection(conn, name)?;
    let n: i64 = match filter {
        Some(f) => {
            check_identifier("field", &f.key)?;
            conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM points WHERE collection = ?1 AND json_extract(payload, '$.{}') = ?2",
                    f.key
                ),
                params![name, f.value],
                |row| row.get(0),
            )?
        }
        None => conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?,
    };
    Ok(n as u64)
}

fn delete_collection(conn: &mut Connection, name: &str) -> anyhow::Result<()> {
    check_identifier("collection", name)?;

    let fields: Vec<String> = conn
        .prepare("SELECT field FROM payload_indexes WHERE collection = ?1")?
        .query_map(params![name], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let tx = conn.transaction()?;
    for field in &fields {
        tx.execute_batch(&format!(
            "DROP INDEX IF EXISTS {};",
            schema::payload_index_name(name, field)
        ))?;
    }
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", schema::vec_table(name)))?;
    let removed = tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
    tx.commit()?;

    if removed == 0 {
        tracing::debug!(collection = name, "delete_collection: already absent");
    } else {
        tracing::debug!(collection = name, "collection deleted");
    }
    Ok(())
}

fn parse_payload(json: &str) -> anyhow::Result<Payload> {
    serde_json::from_str(json).context("stored payload is not a JSON object")
}

fn matches_filter(payload: &Payload, filter: &PayloadFilter) -> bool {
    payload.get(&filter.key).and_then(|v| v.as_str()) == Some(filter.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_index() -> SqliteVectorIndex {
        SqliteVectorIndex::open_in_memory().unwrap()
    }

    fn unit(dim: usize, at: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[at] = 1.0;
        v
    }

    fn point(id: &str, vector: Vec<f32>, kind: &str) -> Point {
        let payload = json!({"type": kind, "content": id});
        Point {
            id: id.to_string(),
            vector,
            payload: payload.as_object().unwrap().clone(),
        }
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() {
        let index = test_index();
        assert!(!index.collection_exists("demo").await.unwrap());
        index.create_collection("demo", 8).await.unwrap();
        index.create_collection("demo", 8).await.unwrap();
        assert!(index.collection_exists("demo").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_collection_dimension_mismatch_fails() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        let err = index.create_collection("demo", 16).await.unwrap_err();
        assert_eq!(err.kind(), "vector_index_error");
    }

    #[tokio::test]
    async fn test_invalid_collection_name_rejected() {
        let index = test_index();
        assert!(index.create_collection("bad name", 8).await.is_err());
    }

    #[tokio::test]
    async fn test_search_returns_nearest_first() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        index.upsert("demo", point("a", unit(8, 0), "decision")).await.unwrap();
        index.upsert("demo", point("b", unit(8, 3), "decision")).await.unwrap();

        let results = index.search("demo", &unit(8, 0), 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert!(results[1].score.abs() < 1e-4, "orthogonal vectors score ~0");
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_point() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        index.upsert("demo", point("a", unit(8, 0), "decision")).await.unwrap();
        index.upsert("demo", point("a", unit(8, 1), "blocker")).await.unwrap();

        assert_eq!(index.count("demo", None).await.unwrap(), 1);
        let results = index.search("demo", &unit(8, 1), 1, None).await.unwrap();
        assert_eq!(results[0].payload["type"], "blocker");
    }

    #[tokio::test]
    async fn test_search_with_filter() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        index.upsert("demo", point("a", unit(8, 0), "decision")).await.unwrap();
        index.upsert("demo", point("b", unit(8, 1), "blocker")).await.unwrap();

        let filter = PayloadFilter::new("type", "blocker");
        let results = index
            .search("demo", &unit(8, 0), 5, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[tokio::test]
    async fn test_scroll_and_count_by_payload_field() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        index.ensure_payload_index("demo", "type").await.unwrap();
        index.ensure_payload_index("demo", "type").await.unwrap();
        for i in 0..3 {
            index
                .upsert("demo", point(&format!("b{i}"), unit(8, i), "blocker"))
                .await
                .unwrap();
        }
        index.upsert("demo", point("d", unit(8, 5), "decision")).await.unwrap();

        let filter = PayloadFilter::new("type", "blocker");
        let blockers = index.scroll("demo", &filter, 100).await.unwrap();
        assert_eq!(blockers.len(), 3);
        assert!(blockers.iter().all(|p| p.score == 1.0));
        assert_eq!(index.count("demo", Some(&filter)).await.unwrap(), 3);
        assert_eq!(index.count("demo", None).await.unwrap(), 4);

        let capped = index.scroll("demo", &filter, 2).await.unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        assert!(index.upsert("demo", point("a", unit(4, 0), "decision")).await.is_err());
        assert!(index.search("demo", &unit(4, 0), 1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_vector_never_matches() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        index.upsert("demo", point("a", unit(8, 0), "decision")).await.unwrap();

        let err = index
            .upsert("demo", point("z", vec![0.0; 8], "decision"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("zero vector"));
        assert_eq!(index.count("demo", None).await.unwrap(), 1);

        // An orthogonal query scores 0, not the 0.5 a stored zero vector would get.
        let hits = index.search("demo", &unit(8, 1), 5, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score.abs() < 1e-6);

        assert!(index.search("demo", &[0.0; 8], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_collection_is_idempotent() {
        let index = test_index();
        index.create_collection("demo", 8).await.unwrap();
        index.ensure_payload_index("demo", "type").await.unwrap();
        index.upsert("demo", point("a", unit(8, 0), "decision")).await.unwrap();

        index.delete_collection("demo").await.unwrap();
        assert!(!index.collection_exists("demo").await.unwrap());
        index.delete_collection("demo").await.unwrap();
        index.delete_collection("never_existed").await.unwrap();

        // Recreating starts empty.
        index.create_collection("demo", 8).await.unwrap();
        assert_eq!(index.count("demo", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_operations_on_missing_collection_fail() {
        let index = test_index();
        assert!(index.search("missing", &unit(8, 0), 1, None).await.is_err());
        assert!(index.count("missing", None).await.is_err());
    }
}
