//! Document-store contract and the intervention report collection on top of it.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::{Error, Result};

pub const REPORTS_COLLECTION: &str = "interventionReports";

pub type DocumentData = serde_json::Map<String, Value>;

/// A stored document: its id plus top-level fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: DocumentData,
}

impl Document {
    /// Fields with the document id folded in, the shape listeners receive.
    /// An `id` stored in the data itself takes precedence.
    pub fn to_json(&self) -> Value {
        let mut fields = self.data.clone();
        fields
            .entry("id")
            .or_insert_with(|| Value::String(self.id.clone()));
        Value::Object(fields)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json())?)
    }
}

/// Collection-oriented document database
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// Create a document with a store-assigned id.
    async fn create(&self, collection: &str, data: DocumentData) -> Result<String>;

    /// Write a document. With `merge`, only the given top-level fields are
    /// replaced; otherwise the whole document is.
    async fn set(&self, collection: &str, id: &str, data: DocumentData, merge: bool)
        -> Result<()>;

    /// All documents of a collection, ordered by id.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;
}

impl<T: DocumentStore> DocumentStore for &T {
    async fn create(&self, collection: &str, data: DocumentData) -> Result<String> {
        (**self).create(collection, data).await
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: DocumentData,
        merge: bool,
    ) -> Result<()> {
        (**self).set(collection, id, data, merge).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        (**self).list(collection).await
    }
}

type Collections = BTreeMap<String, BTreeMap<String, DocumentData>>;

#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<DocumentData> {
        self.lock().get(collection)?.get(id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, data: DocumentData) -> Result<String> {
        let id = Uuid::now_v7().simple().to_string();
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        Ok(id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: DocumentData,
        merge: bool,
    ) -> Result<()> {
        let mut collections = self.lock();
        let documents = collections.entry(collection.to_string()).or_default();
        match documents.get_mut(id) {
            Some(existing) if merge => existing.extend(data),
            _ => {
                documents.insert(id.to_string(), data);
            }
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .lock()
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Publish the full contents of `collection` whenever it changes.
///
/// The collection is polled every `interval`; the first snapshot is sent
/// immediately. Listing failures are logged and the previous snapshot kept.
/// Returns when `shutdown` fires or every receiver is gone.
pub async fn watch_collection<D: DocumentStore>(
    store: D,
    collection: &str,
    interval: Duration,
    sender: watch::Sender<Vec<Document>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last: Option<Vec<Document>> = None;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        match store.list(collection).await {
            Ok(documents) => {
                if last.as_ref() != Some(&documents) {
                    tracing::debug!(collection, count = documents.len(), "Collection snapshot changed");
                    if sender.send(documents.clone()).is_err() {
                        break;
                    }
                    last = Some(documents);
                }
            }
            Err(error) => {
                tracing::warn!(collection, %error, "Failed to list collection");
            }
        }
    }
    tracing::debug!(collection, "Collection listener stopped");
}

/// The intervention report collection of a document store
#[derive(Debug, Clone)]
pub struct ReportDocuments<D> {
    store: D,
}

impl<D: DocumentStore> ReportDocuments<D> {
    pub const fn new(store: D) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &D {
        &self.store
    }

    /// Save a new report document stamped with `createdAt` and `updatedAt`.
    /// Returns the generated document id.
    pub async fn save_report(&self, report: &impl Serialize) -> Result<String> {
        let mut data = to_document_data(report)?;
        let now = Value::String(Utc::now().to_rfc3339());
        data.insert("createdAt".to_string(), now.clone());
        data.insert("updatedAt".to_string(), now);

        match self.store.create(REPORTS_COLLECTION, data).await {
            Ok(id) => {
                tracing::info!(document_id = %id, "Saved report document");
                Ok(id)
            }
            Err(error) => {
                tracing::error!(%error, "Error saving report");
                Err(error)
            }
        }
    }

    /// Merge `updates` into a report document and refresh `updatedAt`.
    pub async fn update_report(&self, id: &str, updates: &impl Serialize) -> Result<()> {
        let mut data = to_document_data(updates)?;
        data.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        self.store
            .set(REPORTS_COLLECTION, id, data, true)
            .await
            .inspect_err(|error| tracing::error!(document_id = %id, %error, "Error updating report"))
    }

    pub async fn list_reports(&self) -> Result<Vec<Document>> {
        self.store.list(REPORTS_COLLECTION).await
    }

    /// Listen to the collection: returns the snapshot receiver and the
    /// listener future, which the caller drives until `shutdown` fires.
    pub fn subscribe(
        &self,
        interval: Duration,
        shutdown: oneshot::Receiver<()>,
    ) -> (watch::Receiver<Vec<Document>>, impl Future<Output = ()> + '_) {
        let (sender, receiver) = watch::channel(Vec::new());
        let listener = watch_collection(&self.store, REPORTS_COLLECTION, interval, sender, shutdown);
        (receiver, listener)
    }
}

fn to_document_data(value: &impl Serialize) -> Result<DocumentData> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::InvalidInput(format!(
            "document data must be an object, got {other}"
        ))),
    }
}
