//! Pinecone REST client.
//!
//! Collections map onto serverless indexes. Index management goes through the
//! control plane; vector operations go to the per-index data-plane host,
//! which is resolved once per collection and cached.

use crate::error::StoreError;
use crate::service::{CollectionSpec, Filter, IdPage, Metadata, Record, ScoredMatch, VectorService};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const SERVERLESS_CLOUD: &str = "aws";

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Control-plane base URL (index management).
    pub control_url: String,
    /// Serverless region new indexes are created in.
    pub region: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    name: String,
    #[serde(default)]
    host: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<ScoredMatch>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: BTreeMap<String, Record>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedId>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

pub struct PineconeService {
    agent: ureq::Agent,
    config: PineconeConfig,
    /// collection name → data-plane base URL
    hosts: Mutex<HashMap<String, String>>,
}

impl PineconeService {
    pub fn new(config: PineconeConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self {
            agent,
            config,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("Api-Key", &self.config.api_key)
            .set("X-Pinecone-API-Version", API_VERSION)
    }

    fn control(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{path}", self.config.control_url.trim_end_matches('/'));
        self.authorize(self.agent.request(method, &url))
    }

    fn data(&self, method: &str, collection: &str, path: &str) -> Result<ureq::Request, StoreError> {
        let base = self.host(collection)?;
        let url = format!("{base}{path}");
        Ok(self.authorize(self.agent.request(method, &url)))
    }

    /// Resolve (and cache) the data-plane host for `collection`.
    fn host(&self, collection: &str) -> Result<String, StoreError> {
        if let Some(host) = self.lock_hosts().get(collection) {
            return Ok(host.clone());
        }

        let description: IndexDescription = self
            .control("GET", &format!("/indexes/{collection}"))
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(404, _) => StoreError::CollectionNotFound(collection.to_string()),
                other => map_ureq("describe_index", other),
            })
            .and_then(|resp| decode("describe_index", resp))?;

        let host = description
            .host
            .filter(|h| !h.is_empty())
            .map(|h| normalize_host(&h))
            .ok_or_else(|| StoreError::Decode {
                op: "describe_index",
                message: format!("index {} has no host yet", description.name),
            })?;

        tracing::debug!(collection, %host, "resolved index host");
        self.lock_hosts().insert(collection.to_string(), host.clone());
        Ok(host)
    }

    fn lock_hosts(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn map_ureq(op: &'static str, err: ureq::Error) -> StoreError {
    match err {
        ureq::Error::Status(code, response) => StoreError::Status {
            op,
            code,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => StoreError::Transport {
            op,
            message: transport.to_string(),
        },
    }
}

fn decode<T: DeserializeOwned>(op: &'static str, response: ureq::Response) -> Result<T, StoreError> {
    response.into_json::<T>().map_err(|e| StoreError::decode(op, e))
}

fn send(op: &'static str, request: ureq::Request, body: &Value) -> Result<ureq::Response, StoreError> {
    request.send_json(body).map_err(|e| map_ureq(op, e))
}

fn create_index_body(spec: &CollectionSpec, region: &str) -> Value {
    json!({
        "name": spec.name,
        "dimension": spec.dimension,
        "metric": spec.metric,
        "spec": { "serverless": { "cloud": SERVERLESS_CLOUD, "region": region } },
    })
}

fn query_body(vector: &[f32], top_k: usize, filter: Option<&Filter>) -> Value {
    let mut body = json!({
        "vector": vector,
        "topK": top_k,
        "includeMetadata": true,
        "includeValues": false,
    });
    if let Some(filter) = filter {
        body["filter"] = filter.to_json();
    }
    body
}

fn upsert_body(records: &[Record]) -> Value {
    json!({ "vectors": records })
}

impl VectorService for PineconeService {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self
            .control("GET", "/indexes")
            .call()
            .map_err(|e| map_ureq("list_indexes", e))?;
        let list: IndexList = decode("list_indexes", response)?;

        let mut hosts = self.lock_hosts();
        for index in &list.indexes {
            if let Some(host) = index.host.as_deref().filter(|h| !h.is_empty()) {
                hosts.insert(index.name.clone(), normalize_host(host));
            }
        }
        Ok(list.indexes.into_iter().map(|i| i.name).collect())
    }

    fn create_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let body = create_index_body(spec, &self.config.region);
        match self.control("POST", "/indexes").send_json(&body) {
            Ok(_) => {
                tracing::info!(index = %spec.name, dimension = spec.dimension, metric = ?spec.metric, "created index");
                Ok(())
            }
            Err(ureq::Error::Status(409, _)) => {
                tracing::debug!(index = %spec.name, "index already exists");
                Ok(())
            }
            Err(e) => Err(map_ureq("create_index", e)),
        }
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredMatch>, StoreError> {
        let request = self.data("POST", collection, "/query")?;
        let response = send("query", request, &query_body(vector, top_k, filter))?;
        let parsed: QueryResponse = decode("query", response)?;
        Ok(parsed.matches)
    }

    fn upsert(&self, collection: &str, records: &[Record]) -> Result<(), StoreError> {
        let request = self.data("POST", collection, "/vectors/upsert")?;
        send("upsert", request, &upsert_body(records))?;
        Ok(())
    }

    fn update(&self, collection: &str, id: &str, metadata: &Metadata) -> Result<(), StoreError> {
        let request = self.data("POST", collection, "/vectors/update")?;
        send("update", request, &json!({ "id": id, "setMetadata": metadata }))?;
        Ok(())
    }

    fn delete(&self, collection: &str, filter: &Filter) -> Result<(), StoreError> {
        let request = self.data("POST", collection, "/vectors/delete")?;
        send("delete", request, &json!({ "filter": filter.to_json() }))?;
        Ok(())
    }

    fn fetch(&self, collection: &str, ids: &[String]) -> Result<BTreeMap<String, Record>, StoreError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let request = ids
            .iter()
            .fold(self.data("GET", collection, "/vectors/fetch")?, |req, id| {
                req.query("ids", id)
            });
        let response = request.call().map_err(|e| map_ureq("fetch", e))?;
        let parsed: FetchResponse = decode("fetch", response)?;
        Ok(parsed.vectors)
    }

    fn list_ids(
        &self,
        collection: &str,
        pagination_token: Option<&str>,
        limit: usize,
    ) -> Result<IdPage, StoreError> {
        let mut request = self
            .data("GET", collection, "/vectors/list")?
            .query("limit", &limit.to_string());
        if let Some(token) = pagination_token {
            request = request.query("paginationToken", token);
        }
        let response = request.call().map_err(|e| map_ureq("list", e))?;
        let parsed: ListResponse = decode("list", response)?;
        Ok(IdPage {
            ids: parsed.vectors.into_iter().map(|v| v.id).collect(),
            next: parsed.pagination.and_then(|p| p.next),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Metric;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("faces-abc.svc.pinecone.io"), "https://faces-abc.svc.pinecone.io");
        assert_eq!(normalize_host("http://localhost:5080/"), "http://localhost:5080");
    }

    #[test]
    fn test_create_index_body() {
        let spec = CollectionSpec {
            name: "face-and-name-data".into(),
            dimension: 7500,
            metric: Metric::Cosine,
        };
        let body = create_index_body(&spec, "us-east-1");
        assert_eq!(body["name"], "face-and-name-data");
        assert_eq!(body["dimension"], 7500);
        assert_eq!(body["metric"], "cosine");
        assert_eq!(body["spec"]["serverless"]["region"], "us-east-1");
        assert_eq!(body["spec"]["serverless"]["cloud"], "aws");
    }

    #[test]
    fn test_query_body_with_and_without_filter() {
        let plain = query_body(&[1.0, 2.0], 1, None);
        assert_eq!(plain["topK"], 1);
        assert_eq!(plain["includeMetadata"], true);
        assert!(plain.get("filter").is_none());

        let filter = Filter::eq("student_name", "A_B");
        let filtered = query_body(&[1.0, 2.0], 10, Some(&filter));
        assert_eq!(filtered["filter"]["student_name"]["$eq"], "A_B");
    }

    #[test]
    fn test_upsert_body_shape() {
        let mut metadata = Metadata::new();
        metadata.insert("roll_no".into(), Value::String("1".into()));
        let body = upsert_body(&[Record { id: "x".into(), values: vec![0.5], metadata }]);
        assert_eq!(body["vectors"][0]["id"], "x");
        assert_eq!(body["vectors"][0]["values"][0], 0.5);
        assert_eq!(body["vectors"][0]["metadata"]["roll_no"], "1");
    }

    #[test]
    fn test_decode_query_response() {
        let raw = r#"{"matches":[{"id":"a","score":0.93,"metadata":{"student_name":"A_B","roll_no":"1"}},{"id":"b","score":0.5}],"namespace":""}"#;
        let parsed: QueryResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.matches.len(), 2);
        assert_eq!(parsed.matches[0].metadata_str("student_name"), Some("A_B"));
        assert!(parsed.matches[1].metadata.is_empty());
    }

    #[test]
    fn test_decode_fetch_and_list_responses() {
        let raw = r#"{"vectors":{"A_B_01-01-2026":{"id":"A_B_01-01-2026","values":[1.0],"metadata":{"date":"01-01-2026"}}}}"#;
        let fetched: FetchResponse = serde_json::from_str(raw).unwrap();
        assert!(fetched.vectors.contains_key("A_B_01-01-2026"));

        let raw = r#"{"vectors":[{"id":"a"},{"id":"b"}],"pagination":{"next":"tok"}}"#;
        let listed: ListResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(listed.vectors.len(), 2);
        assert_eq!(listed.pagination.and_then(|p| p.next).as_deref(), Some("tok"));

        let listed: ListResponse = serde_json::from_str(r#"{"vectors":[]}"#).unwrap();
        assert!(listed.pagination.is_none());
    }

    #[test]
    fn test_decode_index_list() {
        let raw = r#"{"indexes":[{"name":"faces","host":"faces-1.svc.io","dimension":7500},{"name":"pending"}]}"#;
        let list: IndexList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.indexes.len(), 2);
        assert_eq!(list.indexes[0].host.as_deref(), Some("faces-1.svc.io"));
        assert!(list.indexes[1].host.is_none());
    }
}
