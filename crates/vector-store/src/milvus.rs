//! Milvus backend over the v2 RESTful API.
//!
//! Every call is a `POST {base}/v2/vectordb/<resource>/<verb>` with a JSON body
//! and answers with `{ "code": 0, "data": ... }`. Any other code is surfaced as
//! [`StoreError::Remote`].

use crate::backend::{Endpoint, StoreBackend, StoreSession};
use crate::error::{Result, StoreError};
use crate::types::{CollectionSchema, Hit, IndexSpec, SearchParams, ID_FIELD, VECTOR_FIELD};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

const API_PREFIX: &str = "/v2/vectordb";
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(200);
const LOADED: &str = "LoadStateLoaded";

#[derive(Debug, Clone)]
pub struct MilvusRestBackend {
    db_name: Option<String>,
    load_poll_interval: Duration,
}

impl Default for MilvusRestBackend {
    fn default() -> Self {
        Self {
            db_name: None,
            load_poll_interval: LOAD_POLL_INTERVAL,
        }
    }
}

impl MilvusRestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// How often `load` re-reads the load state while waiting.
    #[must_use]
    pub fn with_load_poll_interval(mut self, interval: Duration) -> Self {
        self.load_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_database(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }
}

#[async_trait]
impl StoreBackend for MilvusRestBackend {
    async fn connect(&self, alias: &str, endpoint: &Endpoint) -> Result<Box<dyn StoreSession>> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()?;
        let session = MilvusSession {
            alias: alias.to_string(),
            client,
            base_url: endpoint.base_url(),
            db_name: self.db_name.clone(),
            load_timeout: endpoint.timeout,
            load_poll_interval: self.load_poll_interval,
        };
        // Cheap round-trip so an unreachable server fails here rather than mid-batch.
        session.call("/collections/list", json!({})).await?;
        Ok(Box::new(session))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    topks: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
struct RestHit {
    id: i64,
    distance: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchData {
    Nested(Vec<Vec<RestHit>>),
    Flat(Vec<RestHit>),
}

struct MilvusSession {
    alias: String,
    client: reqwest::Client,
    base_url: String,
    db_name: Option<String>,
    load_timeout: Duration,
    load_poll_interval: Duration,
}

impl MilvusSession {
    async fn call(&self, path: &str, body: Value) -> Result<Envelope> {
        let body = with_db_name(body, self.db_name.as_deref());
        let url = format!("{}{API_PREFIX}{path}", self.base_url);
        log::trace!("[{}] POST {url}", self.alias);

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Remote {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {status} from {url}"),
            });
        }

        let envelope: Envelope = response.json().await?;
        if envelope.code != 0 && envelope.code != 200 {
            return Err(StoreError::Remote {
                code: envelope.code,
                message: envelope.message.unwrap_or_default(),
            });
        }
        Ok(envelope)
    }

    async fn load_state(&self, collection: &str) -> Result<String> {
        let envelope = self
            .call(
                "/collections/get_load_state",
                json!({ "collectionName": collection }),
            )
            .await?;
        envelope
            .data
            .get("loadState")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Protocol("get_load_state: missing loadState".to_string()))
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        let envelope = self
            .call("/indexes/list", json!({ "collectionName": collection }))
            .await?;
        let names: Vec<String> = serde_json::from_value(envelope.data)?;
        Ok(names)
    }
}

#[async_trait]
impl StoreSession for MilvusSession {
    fn alias(&self) -> &str {
        &self.alias
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let envelope = self
            .call("/collections/has", json!({ "collectionName": name }))
            .await?;
        envelope
            .data
            .get("has")
            .and_then(Value::as_bool)
            .ok_or_else(|| StoreError::Protocol("collections/has: missing has flag".to_string()))
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        self.call("/collections/create", create_collection_body(schema))
            .await?;
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.call("/collections/drop", json!({ "collectionName": name }))
            .await?;
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionSchema> {
        let envelope = self
            .call("/collections/describe", json!({ "collectionName": name }))
            .await?;
        parse_described_schema(name, &envelope.data)
    }

    async fn insert(&self, collection: &str, ids: &[i64], vectors: &[Vec<f32>]) -> Result<usize> {
        if ids.len() != vectors.len() {
            return Err(StoreError::Protocol(format!(
                "insert got {} ids but {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        let envelope = self
            .call("/entities/insert", insert_body(collection, ids, vectors))
            .await?;
        let count = envelope
            .data
            .get("insertCount")
            .and_then(Value::as_u64)
            .map_or(ids.len(), |n| n as usize);
        Ok(count)
    }

    async fn is_loaded(&self, collection: &str) -> Result<bool> {
        Ok(self.load_state(collection).await? == LOADED)
    }

    /// Requests the load, then waits until the server reports it loaded.
    async fn load(&self, collection: &str) -> Result<()> {
        self.call("/collections/load", json!({ "collectionName": collection }))
            .await?;

        let started = Instant::now();
        loop {
            let state = self.load_state(collection).await?;
            if state == LOADED {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.load_timeout {
                return Err(StoreError::LoadTimeout {
                    collection: collection.to_string(),
                    state,
                    waited,
                });
            }
            log::debug!("[{}] {collection} is {state}, waiting", self.alias);
            tokio::time::sleep(self.load_poll_interval).await;
        }
    }

    async fn release(&self, collection: &str) -> Result<()> {
        self.call(
            "/collections/release",
            json!({ "collectionName": collection }),
        )
        .await?;
        Ok(())
    }

    async fn has_index(&self, collection: &str) -> Result<bool> {
        Ok(!self.index_names(collection).await?.is_empty())
    }

    async fn create_index(&self, collection: &str, field: &str, spec: &IndexSpec) -> Result<()> {
        self.call("/indexes/create", create_index_body(collection, field, spec))
            .await?;
        Ok(())
    }

    async fn drop_index(&self, collection: &str) -> Result<()> {
        let names = self.index_names(collection).await?;
        if names.is_empty() {
            return Err(StoreError::IndexNotFound(collection.to_string()));
        }
        for name in names {
            self.call(
                "/indexes/drop",
                json!({ "collectionName": collection, "indexName": name }),
            )
            .await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        field: &str,
        queries: &[Vec<f32>],
        top_k: usize,
        params: &SearchParams,
    ) -> Result<Vec<Vec<Hit>>> {
        let envelope = self
            .call(
                "/entities/search",
                search_body(collection, field, queries, top_k, params),
            )
            .await?;
        let data: SearchData = serde_json::from_value(envelope.data)?;
        split_hits(data, queries.len(), top_k, envelope.topks.as_deref())
    }

    fn disconnect(&self) -> Result<()> {
        // Stateless HTTP: nothing to tear down server-side; the client pool goes with `self`.
        log::trace!("[{}] session closed", self.alias);
        Ok(())
    }
}

fn with_db_name(mut body: Value, db_name: Option<&str>) -> Value {
    if let (Some(db), Some(obj)) = (db_name, body.as_object_mut()) {
        obj.insert("dbName".to_string(), Value::String(db.to_string()));
    }
    body
}

fn create_collection_body(schema: &CollectionSchema) -> Value {
    json!({
        "collectionName": schema.name,
        "description": schema.description,
        "schema": {
            "autoId": false,
            "enableDynamicField": false,
            "fields": [
                {
                    "fieldName": ID_FIELD,
                    "dataType": "Int64",
                    "isPrimary": true,
                },
                {
                    "fieldName": VECTOR_FIELD,
                    "dataType": "FloatVector",
                    "elementTypeParams": { "dim": schema.dimension.to_string() },
                },
            ],
        },
    })
}

fn insert_body(collection: &str, ids: &[i64], vectors: &[Vec<f32>]) -> Value {
    let rows: Vec<Value> = ids
        .iter()
        .zip(vectors)
        .map(|(id, vector)| json!({ ID_FIELD: id, VECTOR_FIELD: vector }))
        .collect();
    json!({ "collectionName": collection, "data": rows })
}

fn create_index_body(collection: &str, field: &str, spec: &IndexSpec) -> Value {
    let mut params = Map::new();
    params.insert("index_type".to_string(), json!(spec.index_type.as_str()));
    params.insert("nlist".to_string(), json!(spec.params.nlist));
    if let Some(m) = spec.params.m {
        params.insert("M".to_string(), json!(m));
    }
    if let Some(ef) = spec.params.ef_construction {
        params.insert("efConstruction".to_string(), json!(ef));
    }

    json!({
        "collectionName": collection,
        "indexParams": [{
            "fieldName": field,
            "indexName": field,
            "metricType": spec.metric.as_str(),
            "params": Value::Object(params),
        }],
    })
}

fn search_body(
    collection: &str,
    field: &str,
    queries: &[Vec<f32>],
    top_k: usize,
    params: &SearchParams,
) -> Value {
    let mut tuning = Map::new();
    tuning.insert("nprobe".to_string(), json!(params.nprobe));
    if let Some(ef) = params.ef {
        tuning.insert("ef".to_string(), json!(ef));
    }

    json!({
        "collectionName": collection,
        "data": queries,
        "annsField": field,
        "limit": top_k,
        "outputFields": [ID_FIELD],
        "searchParams": {
            "metricType": params.metric.as_str(),
            "params": Value::Object(tuning),
        },
    })
}

fn parse_described_schema(name: &str, data: &Value) -> Result<CollectionSchema> {
    let fields = data
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| StoreError::Protocol(format!("describe {name}: missing fields")))?;

    let vector_field = fields
        .iter()
        .find(|f| f.get("name").and_then(Value::as_str) == Some(VECTOR_FIELD))
        .ok_or_else(|| {
            StoreError::Protocol(format!("describe {name}: no {VECTOR_FIELD} field"))
        })?;

    let dimension = vector_field
        .get("params")
        .and_then(Value::as_array)
        .and_then(|params| {
            params
                .iter()
                .find(|p| p.get("key").and_then(Value::as_str) == Some("dim"))
        })
        .and_then(|p| p.get("value"))
        .and_then(|v| match v {
            Value::String(s) => s.parse::<usize>().ok(),
            Value::Number(n) => n.as_u64().map(|n| n as usize),
            _ => None,
        })
        .ok_or_else(|| StoreError::Protocol(format!("describe {name}: missing dim")))?;

    let mut schema = CollectionSchema::new(name, dimension);
    if let Some(description) = data.get("description").and_then(Value::as_str) {
        schema.description = description.to_string();
    }
    Ok(schema)
}

fn split_hits(
    data: SearchData,
    nq: usize,
    top_k: usize,
    topks: Option<&[usize]>,
) -> Result<Vec<Vec<Hit>>> {
    let convert = |hits: Vec<RestHit>| -> Vec<Hit> {
        hits.into_iter()
            .map(|h| Hit {
                id: h.id,
                score: h.distance,
            })
            .collect()
    };

    match data {
        // `[]` parses as nested; it means no query matched anything.
        SearchData::Nested(lists) if lists.is_empty() => Ok(vec![Vec::new(); nq]),
        SearchData::Nested(lists) => Ok(lists.into_iter().map(convert).collect()),
        SearchData::Flat(hits) if nq == 0 => {
            if hits.is_empty() {
                Ok(Vec::new())
            } else {
                Err(StoreError::Protocol(
                    "search returned hits for zero queries".to_string(),
                ))
            }
        }
        SearchData::Flat(hits) if nq == 1 => Ok(vec![convert(hits)]),
        SearchData::Flat(hits) => {
            let sizes: Vec<usize> = match topks {
                Some(topks) if topks.len() == nq && topks.iter().sum::<usize>() == hits.len() => {
                    topks.to_vec()
                }
                _ if hits.len() == nq * top_k => vec![top_k; nq],
                _ => {
                    return Err(StoreError::Protocol(format!(
                        "cannot split {} flat hits across {nq} queries",
                        hits.len()
                    )))
                }
            };
            let mut hits = hits.into_iter();
            Ok(sizes
                .into_iter()
                .map(|size| convert(hits.by_ref().take(size).collect()))
                .collect())
        }
    }
}
