//! Firestore document store over the REST API.
//!
//! Documents travel as typed values (`{"stringValue": "..."}` and friends),
//! converted to and from plain JSON at this boundary. Merge writes send an
//! `updateMask` naming each top-level field so untouched fields survive.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use crate::adapters::documents::{Document, DocumentData, DocumentStore};
use crate::adapters::{ensure_success, http_client};
use crate::config::FirestoreConfig;
use crate::{Error, Result};

const PAGE_SIZE: &str = "300";

static SIMPLE_FIELD_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex"));

#[derive(Clone)]
pub struct FirestoreDocumentStore {
    config: FirestoreConfig,
    id_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for FirestoreDocumentStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FirestoreDocumentStore")
            .field("config", &self.config)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl FirestoreDocumentStore {
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        Ok(Self {
            config,
            id_token: None,
            client: http_client()?,
        })
    }

    /// Authorize requests as a signed-in user instead of relying on open rules.
    #[must_use]
    pub fn with_id_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = crate::util::normalize_text_option(Some(token.into()));
        self
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{collection}", self.config.documents_url())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .query(&[("key", self.config.api_key.as_str())])
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

impl TryFrom<RawDocument> for Document {
    type Error = Error;

    fn try_from(raw: RawDocument) -> Result<Self> {
        let id = document_id(&raw.name)
            .ok_or_else(|| Error::Remote(format!("unexpected document name '{}'", raw.name)))?
            .to_string();
        Ok(Self {
            id,
            data: decode_fields(&raw.fields)?,
        })
    }
}

impl DocumentStore for FirestoreDocumentStore {
    async fn create(&self, collection: &str, data: DocumentData) -> Result<String> {
        let url = self.collection_url(collection);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "fields": encode_fields(&data) }))
            .send()
            .await?;
        let raw = ensure_success(response).await?.json::<RawDocument>().await?;
        let document = Document::try_from(raw)?;
        tracing::debug!(collection, document_id = %document.id, "Created document");
        Ok(document.id)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: DocumentData,
        merge: bool,
    ) -> Result<()> {
        let url = format!("{}/{id}", self.collection_url(collection));
        let mut request = self.request(reqwest::Method::PATCH, &url);
        if merge {
            let mask: Vec<(&str, String)> = data
                .keys()
                .map(|field| ("updateMask.fieldPaths", field_path(field)))
                .collect();
            request = request.query(&mask);
        }

        let response = request
            .json(&json!({ "fields": encode_fields(&data) }))
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(collection, document_id = %id, merge, "Wrote document");
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let url = self.collection_url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request(reqwest::Method::GET, &url)
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page = ensure_success(request.send().await?)
                .await?
                .json::<ListResponse>()
                .await?;
            for raw in page.documents {
                documents.push(Document::try_from(raw)?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }
}

/// Last segment of a full resource name
/// (`projects/p/databases/(default)/documents/col/ID`).
fn document_id(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Field paths that are not plain identifiers must be backquoted.
fn field_path(field: &str) -> String {
    if SIMPLE_FIELD_PATH.is_match(field) {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn encode_fields(data: &DocumentData) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => json!({ "integerValue": integer.to_string() }),
            None => json!({ "doubleValue": number.as_f64() }),
        },
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

fn decode_fields(fields: &Map<String, Value>) -> Result<DocumentData> {
    fields
        .iter()
        .map(|(key, value)| decode_value(value).map(|decoded| (key.clone(), decoded)))
        .collect()
}

fn decode_value(value: &Value) -> Result<Value> {
    let Some((kind, inner)) = value.as_object().and_then(|typed| typed.iter().next()) else {
        return Err(unsupported(value));
    };

    Ok(match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().ok_or_else(|| unsupported(value))?),
        "integerValue" => {
            let integer = match inner {
                Value::String(text) => text.parse::<i64>().ok(),
                other => other.as_i64(),
            }
            .ok_or_else(|| unsupported(value))?;
            Value::Number(integer.into())
        }
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" | "geoPointValue" => {
            inner.clone()
        }
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .transpose()?
                .unwrap_or_default(),
        ),
        _ => return Err(unsupported(value)),
    })
}

fn unsupported(value: &Value) -> Error {
    Error::Remote(format!("unsupported Firestore value: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::documents::ReportDocuments;
    use crate::config::BackendConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn values_encode_to_typed_form() {
        let data = json!({
            "brand": "Acme",
            "count": 3,
            "ratio": 0.5,
            "done": false,
            "next": null,
            "findings": ["a", "b"],
            "meta": { "site": "A" }
        });
        let encoded = Value::Object(encode_fields(data.as_object().unwrap()));

        assert_eq!(encoded["brand"], json!({ "stringValue": "Acme" }));
        assert_eq!(encoded["count"], json!({ "integerValue": "3" }));
        assert_eq!(encoded["ratio"], json!({ "doubleValue": 0.5 }));
        assert_eq!(encoded["next"], json!({ "nullValue": null }));
        assert_eq!(
            encoded["findings"],
            json!({ "arrayValue": { "values": [{ "stringValue": "a" }, { "stringValue": "b" }] } })
        );
        assert_eq!(
            encoded["meta"],
            json!({ "mapValue": { "fields": { "site": { "stringValue": "A" } } } })
        );
    }

    #[test]
    fn typed_values_decode_including_server_types() {
        let fields = json!({
            "createdAt": { "timestampValue": "2024-05-14T09:00:00Z" },
            "count": { "integerValue": "42" },
            "empty": { "arrayValue": {} },
            "nested": { "mapValue": { "fields": { "ok": { "booleanValue": true } } } }
        });
        let decoded = decode_fields(fields.as_object().unwrap()).unwrap();

        assert_eq!(
            Value::Object(decoded),
            json!({
                "createdAt": "2024-05-14T09:00:00Z",
                "count": 42,
                "empty": [],
                "nested": { "ok": true }
            })
        );
    }

    #[test]
    fn unknown_value_kind_is_an_error() {
        let fields = json!({ "x": { "mysteryValue": 1 } });
        assert!(decode_fields(fields.as_object().unwrap()).is_err());
    }

    #[test]
    fn document_names_resolve_to_ids() {
        assert_eq!(
            document_id("projects/p/databases/(default)/documents/interventionReports/abc123"),
            Some("abc123")
        );
        assert_eq!(document_id("projects/p/"), None);
    }

    #[test]
    fn field_paths_are_quoted_when_needed() {
        assert_eq!(field_path("updatedAt"), "updatedAt");
        assert_eq!(field_path("site name"), "`site name`");
        assert_eq!(field_path("a`b"), "`a\\`b`");
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "Requires Firebase env vars plus network access"]
    async fn firestore_report_save_update_list() {
        let _ = dotenvy::dotenv();

        let config = BackendConfig::from_env()
            .expect("backend env parsing should not error")
            .firestore
            .expect("Firestore config should be present");
        let reports = ReportDocuments::new(FirestoreDocumentStore::new(config).unwrap());

        let id = reports
            .save_report(&json!({ "taskId": "fieldsync-live-check", "status": "draft" }))
            .await
            .unwrap_or_else(|error| panic!("save failed: {error}"));
        reports
            .update_report(&id, &json!({ "status": "submitted" }))
            .await
            .unwrap();

        let documents = reports.list_reports().await.unwrap();
        let document = documents
            .iter()
            .find(|document| document.id == id)
            .expect("saved report should be listed");
        assert_eq!(document.data["status"], "submitted");
        assert_eq!(document.data["taskId"], "fieldsync-live-check");
    }
}
