//! Backend adapters: the Supabase tasks table and the report document store.

pub mod documents;
pub mod firestore;
pub mod supabase;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::util::compact_text;

pub use documents::{
    watch_collection, Document, DocumentData, DocumentStore, InMemoryDocumentStore,
    ReportDocuments, REPORTS_COLLECTION,
};
pub use firestore::FirestoreDocumentStore;
pub use supabase::SupabaseTaskTable;

const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<ApiErrorDetail>,
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorDetail {
    Text(String),
    Object { message: Option<String> },
}

/// Human-readable message for a failed backend response.
///
/// Understands PostgREST (`message`, `code`) and Google API
/// (`error.message`) bodies, falling back to the raw body.
fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let detail = payload.error.and_then(|error| match error {
            ApiErrorDetail::Text(message) => Some(message),
            ApiErrorDetail::Object { message } => message,
        });
        if let Some(message) = payload.message.or(detail) {
            return match payload.code {
                Some(serde_json::Value::String(code)) => {
                    format!("{} [{code}] ({})", message.trim(), status.as_u16())
                }
                _ => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

fn http_client() -> crate::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()?)
}

async fn ensure_success(response: reqwest::Response) -> crate::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(crate::Error::Remote(parse_api_error(status, &body)))
}
