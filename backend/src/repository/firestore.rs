//! Cloud Firestore document collection
//!
//! Talks to the Firestore REST API (v1). Writes go through
//! `documents:commit` so `createdAt`/`updatedAt` are stamped with the
//! server's request time and existence preconditions make update/delete of
//! a missing document fail instead of upserting. Reads use `runQuery`
//! ordered by `createdAt` descending.
//!
//! REST has no streaming listener, so the change feed is driven by polling
//! the ordered query while at least one watcher is attached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use super::traits::{
    sort_newest_first, ChangeFeed, ChangeKind, CollectionEvent, DocumentCollection, FEED_CAPACITY,
};
use crate::config::FirestoreConfig;
use crate::domain::{Category, DataItem, ItemId, ItemPatch, NewItem};
use crate::error::{CollectionError, CollectionResult};

/// Firestore-backed collection
pub struct FirestoreCollection {
    inner: Arc<Inner>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    client: reqwest::Client,
    api_root: String,
    project_id: String,
    database: String,
    collection: String,
    api_key: Option<String>,
    poll_interval: Duration,
    changes: broadcast::Sender<CollectionEvent>,
}

impl FirestoreCollection {
    pub fn new(
        config: &FirestoreConfig,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> CollectionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                CollectionError::Unavailable(format!("failed to build http client: {e}"))
            })?;
        let (changes, _) = broadcast::channel(FEED_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                api_root: config.api_root.trim_end_matches('/').to_string(),
                project_id: config.project_id.clone(),
                database: config.database.clone(),
                collection: collection.into(),
                api_key: config.api_key.clone(),
                poll_interval: Duration::from_millis(config.poll_interval_ms),
                changes,
            }),
            poller: Mutex::new(None),
        })
    }
}

impl Inner {
    /// `projects/{p}/databases/{d}/documents`
    fn documents_path(&self) -> String {
        format!("projects/{}/databases/{}/documents", self.project_id, self.database)
    }

    fn document_name(&self, id: &ItemId) -> String {
        format!("{}/{}/{}", self.documents_path(), self.collection, id)
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/{}{suffix}", self.api_root, self.documents_path())
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.query(&[("key", key)]),
            None => builder,
        }
    }

    async fn commit(
        &self,
        body: serde_json::Value,
        id: &ItemId,
    ) -> CollectionResult<CommitResponse> {
        let response = self
            .request(reqwest::Method::POST, self.url(":commit"))
            .json(&body)
            .send()
            .await
            .map_err(transport_err)?;
        let response = check_status(response, Some(id)).await?;
        response
            .json::<CommitResponse>()
            .await
            .map_err(|e| CollectionError::Decode(e.to_string()))
    }

    async fn get(&self, id: &ItemId) -> CollectionResult<Option<DataItem>> {
        let url = format!("{}/{}", self.api_root, self.document_name(id));
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(transport_err)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document = check_status(response, None)
            .await?
            .json::<Document>()
            .await
            .map_err(|e| CollectionError::Decode(e.to_string()))?;
        decode_document(&document).map(Some)
    }

    async fn run_query(&self) -> CollectionResult<Vec<Document>> {
        let response = self
            .request(reqwest::Method::POST, self.url(":runQuery"))
            .json(&ordered_query(&self.collection))
            .send()
            .await
            .map_err(transport_err)?;
        let rows = check_status(response, None)
            .await?
            .json::<Vec<QueryRow>>()
            .await
            .map_err(|e| CollectionError::Decode(e.to_string()))?;
        Ok(rows.into_iter().filter_map(|row| row.document).collect())
    }

    fn notify(&self, kind: ChangeKind, id: &ItemId) {
        let _ = self.changes.send(CollectionEvent::Changed { kind, id: id.clone() });
    }
}

#[async_trait]
impl DocumentCollection for FirestoreCollection {
    fn name(&self) -> &str {
        &self.inner.collection
    }

    async fn insert(&self, item: &NewItem) -> CollectionResult<DataItem> {
        let id = ItemId::generate();
        let fields = item.normalized();
        let body = create_write(&self.inner.document_name(&id), &fields);

        let commit = self.inner.commit(body, &id).await?;
        // Both transforms resolve to the same request time
        let created_at = commit.first_transform_time()?;

        self.inner.notify(ChangeKind::Created, &id);
        Ok(fields.into_item(id, created_at))
    }

    async fn find(&self, id: &ItemId) -> CollectionResult<Option<DataItem>> {
        self.inner.get(id).await
    }

    async fn list_ordered(&self) -> CollectionResult<Vec<DataItem>> {
        let documents = self.inner.run_query().await?;
        let mut items = documents
            .iter()
            .map(decode_document)
            .collect::<CollectionResult<Vec<_>>>()?;
        sort_newest_first(&mut items);
        Ok(items)
    }

    async fn update(&self, id: &ItemId, patch: &ItemPatch) -> CollectionResult<()> {
        let body = update_write(&self.inner.document_name(id), &patch.normalized());
        // Committed means applied; nothing after this may report a failure
        self.inner.commit(body, id).await?;
        self.inner.notify(ChangeKind::Updated, id);
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> CollectionResult<()> {
        let body = json!({
            "writes": [{
                "delete": self.inner.document_name(id),
                "currentDocument": { "exists": true },
            }]
        });
        self.inner.commit(body, id).await?;
        self.inner.notify(ChangeKind::Deleted, id);
        Ok(())
    }

    async fn watch(&self) -> CollectionResult<ChangeFeed> {
        let feed = self.inner.changes.subscribe();

        let mut poller = self.poller.lock().await;
        let running = poller.as_ref().map(|task| !task.is_finished()).unwrap_or(false);
        if !running {
            let inner = Arc::clone(&self.inner);
            *poller = Some(tokio::spawn(poll_changes(inner)));
            tracing::debug!(collection = %self.inner.collection, "firestore poller started");
        }
        Ok(feed)
    }
}

impl Drop for FirestoreCollection {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.try_lock() {
            if let Some(task) = poller.take() {
                task.abort();
            }
        }
    }
}

/// Poll the ordered query and announce differences until nobody listens.
///
/// The first successful poll only sets the baseline, and a write may have
/// landed between a watcher's own read and that baseline, so it is announced
/// as a `Resync`.
async fn poll_changes(inner: Arc<Inner>) {
    let mut known: Option<HashMap<ItemId, String>> = None;

    loop {
        if inner.changes.receiver_count() == 0 {
            tracing::debug!(collection = %inner.collection, "firestore poller stopped");
            return;
        }

        match inner.run_query().await {
            Ok(documents) => {
                let current = fingerprint(&documents);
                match &known {
                    Some(previous) => {
                        for (kind, id) in diff_fingerprints(previous, &current) {
                            inner.notify(kind, &id);
                        }
                    }
                    None => {
                        let _ = inner.changes.send(CollectionEvent::Resync);
                    }
                }
                known = Some(current);
            }
            Err(err) => {
                tracing::warn!(
                    collection = %inner.collection,
                    error = %err,
                    "firestore poll failed"
                );
                let _ = inner.changes.send(CollectionEvent::Error(err.to_string()));
            }
        }

        tokio::time::sleep(inner.poll_interval).await;
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp_value: Option<String>,
}

impl FieldValue {
    fn string(value: &str) -> Self {
        Self {
            string_value: Some(value.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, FieldValue>,
    #[serde(default)]
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    #[serde(default)]
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    write_results: Vec<WriteResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteResult {
    #[serde(default)]
    transform_results: Vec<FieldValue>,
}

impl CommitResponse {
    fn first_transform_time(&self) -> CollectionResult<DateTime<Utc>> {
        let raw = self
            .write_results
            .first()
            .and_then(|result| result.transform_results.first())
            .and_then(|value| value.timestamp_value.as_deref())
            .ok_or_else(|| {
                CollectionError::Decode("commit returned no server timestamp".to_string())
            })?;
        parse_time(raw)
    }
}

fn server_time(field: &str) -> serde_json::Value {
    json!({ "fieldPath": field, "setToServerValue": "REQUEST_TIME" })
}

fn create_write(name: &str, item: &NewItem) -> serde_json::Value {
    json!({
        "writes": [{
            "update": {
                "name": name,
                "fields": {
                    "title": FieldValue::string(&item.title),
                    "description": FieldValue::string(&item.description),
                    "category": FieldValue::string(item.category.as_str()),
                },
            },
            "currentDocument": { "exists": false },
            "updateTransforms": [server_time("createdAt"), server_time("updatedAt")],
        }]
    })
}

fn update_write(name: &str, patch: &ItemPatch) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    if let Some(title) = &patch.title {
        fields.insert("title".into(), json!(FieldValue::string(title)));
    }
    if let Some(description) = &patch.description {
        fields.insert("description".into(), json!(FieldValue::string(description)));
    }
    if let Some(category) = patch.category {
        fields.insert("category".into(), json!(FieldValue::string(category.as_str())));
    }
    let mask: Vec<String> = fields.keys().cloned().collect();

    json!({
        "writes": [{
            "update": { "name": name, "fields": fields },
            "updateMask": { "fieldPaths": mask },
            "currentDocument": { "exists": true },
            "updateTransforms": [server_time("updatedAt")],
        }]
    })
}

fn ordered_query(collection: &str) -> serde_json::Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "orderBy": [{ "field": { "fieldPath": "createdAt" }, "direction": "DESCENDING" }],
        }
    })
}

fn decode_document(document: &Document) -> CollectionResult<DataItem> {
    let id = document
        .name
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| CollectionError::Decode(format!("bad document name '{}'", document.name)))?;

    let text = |field: &str| -> CollectionResult<String> {
        document
            .fields
            .get(field)
            .and_then(|value| value.string_value.clone())
            .ok_or_else(|| {
                CollectionError::Decode(format!("document {id} has no string field '{field}'"))
            })
    };
    let time = |field: &str| -> CollectionResult<DateTime<Utc>> {
        let raw = document
            .fields
            .get(field)
            .and_then(|value| value.timestamp_value.as_deref())
            .ok_or_else(|| {
                CollectionError::Decode(format!("document {id} has no timestamp '{field}'"))
            })?;
        parse_time(raw)
    };

    Ok(DataItem {
        id: ItemId::new(id),
        title: text("title")?,
        description: text("description")?,
        category: Category::from_stored(&text("category").unwrap_or_default()),
        created_at: time("createdAt")?,
        updated_at: time("updatedAt")?,
    })
}

fn parse_time(raw: &str) -> CollectionResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CollectionError::Decode(format!("bad timestamp '{raw}': {e}")))
}

/// id -> updateTime for every document
fn fingerprint(documents: &[Document]) -> HashMap<ItemId, String> {
    documents
        .iter()
        .filter_map(|doc| {
            let id = doc.name.rsplit('/').next()?;
            Some((ItemId::new(id), doc.update_time.clone().unwrap_or_default()))
        })
        .collect()
}

fn diff_fingerprints(
    previous: &HashMap<ItemId, String>,
    current: &HashMap<ItemId, String>,
) -> Vec<(ChangeKind, ItemId)> {
    let mut changes = Vec::new();
    for (id, stamp) in current {
        match previous.get(id) {
            None => changes.push((ChangeKind::Created, id.clone())),
            Some(old) if old != stamp => changes.push((ChangeKind::Updated, id.clone())),
            Some(_) => {}
        }
    }
    for id in previous.keys() {
        if !current.contains_key(id) {
            changes.push((ChangeKind::Deleted, id.clone()));
        }
    }
    changes
}

fn transport_err(err: reqwest::Error) -> CollectionError {
    CollectionError::Unavailable(err.to_string())
}

async fn check_status(
    response: reqwest::Response,
    id: Option<&ItemId>,
) -> CollectionResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => CollectionError::NotFound(id.clone()),
        (s, _) if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            CollectionError::Unavailable(format!("{status}: {body}"))
        }
        _ => CollectionError::Rejected(format!("{status}: {body}")),
    })
}
