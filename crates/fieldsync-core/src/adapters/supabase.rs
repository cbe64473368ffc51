//! Supabase (PostgREST) tasks table.

use crate::adapters::{ensure_success, http_client};
use crate::config::SupabaseConfig;
use crate::models::{Task, TaskId};
use crate::sync::RemoteTaskTable;
use crate::Result;

const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";

/// Tasks table reached over the PostgREST API.
///
/// Requests are authorized with the user's access token when one is set,
/// otherwise with the anon key.
#[derive(Clone)]
pub struct SupabaseTaskTable {
    config: SupabaseConfig,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for SupabaseTaskTable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseTaskTable")
            .field("config", &self.config)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl SupabaseTaskTable {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        Ok(Self {
            config,
            access_token: None,
            client: http_client()?,
        })
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = crate::util::normalize_text_option(Some(token.into()));
        self
    }

    pub const fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Every row of the table, ordered by date.
    pub async fn fetch_all(&self) -> Result<Vec<Task>> {
        let response = self
            .request(reqwest::Method::GET)
            .query(&[("select", "*"), ("order", "date.asc")])
            .send()
            .await?;
        let tasks = ensure_success(response).await?.json::<Vec<Task>>().await?;
        tracing::debug!(count = tasks.len(), table = %self.config.tasks_table, "Fetched remote tasks");
        Ok(tasks)
    }

    /// Delete one row by id.
    pub async fn delete(&self, id: &TaskId) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE)
            .query(&[("id", id_filter(id))])
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(task_id = %id, "Deleted remote task");
        Ok(())
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let bearer = self
            .access_token
            .as_deref()
            .unwrap_or(&self.config.anon_key);
        self.client
            .request(method, self.config.rest_url())
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .header(reqwest::header::ACCEPT, "application/json")
    }
}

impl RemoteTaskTable for SupabaseTaskTable {
    async fn upsert(&self, task: &Task) -> Result<()> {
        let response = self
            .request(reqwest::Method::POST)
            .header("Prefer", PREFER_UPSERT)
            .json(&[task])
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::debug!(task_id = %task.id, "Upserted remote task");
        Ok(())
    }
}

fn id_filter(id: &TaskId) -> String {
    format!("eq.{id}")
}
