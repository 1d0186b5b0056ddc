//! Qdrant vector index over the REST API.
//!
//! - `GET    /collections/{name}` existence (404 = absent)
//! - `PUT    /collections/{name}` create with cosine distance
//! - `PUT    /collections/{name}/index` keyword payload index
//! - `PUT    /collections/{name}/points?wait=true` upsert
//! - `POST   /collections/{name}/points/search|scroll|count`
//! - `DELETE /collections/{name}` (404 = success)
//!
//! Auth is the optional `api-key` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Payload, PayloadFilter, Point, ScoredPoint, VectorIndex};
use crate::config::IndexConfig;
use crate::error::{Result, VigilError};

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ApiPoint {
    id: Value,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ApiPoint>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

pub struct QdrantVectorIndex {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantVectorIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base_url = config
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| VigilError::config("qdrant index backend requires a url (QDRANT_URL)"))?
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VigilError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send a request; `Ok(None)` on 404, error on any other non-2xx status.
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Option<reqwest::Response>> {
        let response = builder
            .send()
            .await
            .map_err(|e| VigilError::index(format!("qdrant request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VigilError::index(format!(
                "qdrant returned HTTP {}: {body}",
                status.as_u16()
            )));
        }
        Ok(Some(response))
    }

    /// Like [`Self::send`], but a 404 is an error (the collection is missing).
    async fn send_expect(
        &self,
        builder: reqwest::RequestBuilder,
        collection: &str,
    ) -> Result<reqwest::Response> {
        self.send(builder)
            .await?
            .ok_or_else(|| VigilError::index(format!("collection not found: {collection}")))
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| VigilError::index(format!("invalid qdrant response: {e}")))?;
        Ok(parsed.result)
    }
}

fn filter_body(filter: &PayloadFilter) -> Value {
    json!({
        "must": [{ "key": filter.key, "match": { "value": filter.value } }]
    })
}

fn search_body(vector: &[f32], limit: usize, filter: Option<&PayloadFilter>) -> Value {
    let mut body = json!({
        "vector": vector,
        "limit": limit,
        "with_payload": true,
    });
    if let Some(f) = filter {
        body["filter"] = filter_body(f);
    }
    body
}

fn scroll_body(filter: &PayloadFilter, limit: usize) -> Value {
    json!({
        "filter": filter_body(filter),
        "limit": limit,
        "with_payload": true,
        "with_vector": false,
    })
}

fn count_body(filter: Option<&PayloadFilter>) -> Value {
    let mut body = json!({ "exact": true });
    if let Some(f) = filter {
        body["filter"] = filter_body(f);
    }
    body
}

/// Qdrant returns point ids as either strings (UUIDs) or unsigned integers.
fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_scored(point: ApiPoint, default_score: f64) -> ScoredPoint {
    ScoredPoint {
        id: point_id(&point.id),
        score: point.score.unwrap_or(default_score),
        payload: point.payload.unwrap_or_default(),
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let path = format!("/collections/{name}");
        Ok(self.send(self.request(Method::GET, &path)).await?.is_some())
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            return Ok(());
        }
        let body = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
        let path = format!("/collections/{name}");
        self.send_expect(self.request(Method::PUT, &path).json(&body), name)
            .await?;
        tracing::debug!(collection = name, dimension, "qdrant collection created");
        Ok(())
    }

    async fn ensure_payload_index(&self, name: &str, field: &str) -> Result<()> {
        let body = json!({ "field_name": field, "field_schema": "keyword" });
        let path = format!("/collections/{name}/index");
        self.send_expect(self.request(Method::PUT, &path).json(&body), name)
            .await?;
        Ok(())
    }

    async fn upsert(&self, name: &str, point: Point) -> Result<()> {
        let body = json!({
            "points": [{ "id": point.id, "vector": point.vector, "payload": point.payload }]
        });
        let path = format!("/collections/{name}/points?wait=true");
        self.send_expect(self.request(Method::PUT, &path).json(&body), name)
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<ScoredPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let path = format!("/collections/{name}/points/search");
        let body = search_body(vector, limit, filter);
        let response = self
            .send_expect(self.request(Method::POST, &path).json(&body), name)
            .await?;
        let points: Vec<ApiPoint> = Self::parse(response).await?;
        Ok(points.into_iter().map(|p| to_scored(p, 0.0)).collect())
    }

    async fn scroll(
        &self,
        name: &str,
        filter: &PayloadFilter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let path = format!("/collections/{name}/points/scroll");
        let body = scroll_body(filter, limit);
        let response = self
            .send_expect(self.request(Method::POST, &path).json(&body), name)
            .await?;
        let result: ScrollResult = Self::parse(response).await?;
        Ok(result.points.into_iter().map(|p| to_scored(p, 1.0)).collect())
    }

    async fn count(&self, name: &str, filter: Option<&PayloadFilter>) -> Result<u64> {
        let path = format!("/collections/{name}/points/count");
        let body = count_body(filter);
        let response = self
            .send_expect(self.request(Method::POST, &path).json(&body), name)
            .await?;
        let result: CountResult = Self::parse(response).await?;
        Ok(result.count)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let path = format!("/collections/{name}");
        if self.send(self.request(Method::DELETE, &path)).await?.is_none() {
            tracing::debug!(collection = name, "delete_collection: already absent");
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "qdrant"
    }
}
