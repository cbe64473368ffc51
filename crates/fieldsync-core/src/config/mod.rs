//! Backend configuration read from the process environment.
//!
//! Each backend is optional: when none of its variables are set it is simply
//! absent, but a half-configured backend is rejected so a typo does not
//! silently fall back to local-only mode.

use std::env;
use std::path::PathBuf;

use crate::sync::PushScope;
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
const ENV_SUPABASE_TASKS_TABLE: &str = "SUPABASE_TASKS_TABLE";
const ENV_FIREBASE_PROJECT_ID: &str = "FIREBASE_PROJECT_ID";
const ENV_FIREBASE_API_KEY: &str = "FIREBASE_API_KEY";
const ENV_PUSH_SCOPE: &str = "FIELDSYNC_PUSH_SCOPE";
const ENV_STATE_DIR: &str = "FIELDSYNC_STATE_DIR";

pub const DEFAULT_TASKS_TABLE: &str = "tasks";

/// Supabase project holding the tasks table.
#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project URL without trailing slash.
    pub url: String,
    /// Public anon key, sent as `apikey` on every request.
    pub anon_key: String,
    pub tasks_table: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("tasks_table", &self.tasks_table)
            .finish()
    }
}

impl SupabaseConfig {
    /// PostgREST endpoint of the tasks table.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.tasks_table)
    }
}

/// Firebase project holding the report documents.
#[derive(Clone, PartialEq, Eq)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: String,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl FirestoreConfig {
    /// REST root for documents of the default database.
    pub fn documents_url(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendConfig {
    pub supabase: Option<SupabaseConfig>,
    pub firestore: Option<FirestoreConfig>,
    pub push_scope: PushScope,
    /// Directory for the persisted report store; in-memory when unset.
    pub state_dir: Option<PathBuf>,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self> {
        parse_config(|key| env::var(key).ok())
    }
}

fn parse_config(lookup: impl Fn(&str) -> Option<String>) -> Result<BackendConfig> {
    let read = |key: &str| normalize_text_option(lookup(key));

    let supabase = match required_pair(
        "Supabase",
        (ENV_SUPABASE_URL, read(ENV_SUPABASE_URL)),
        (ENV_SUPABASE_ANON_KEY, read(ENV_SUPABASE_ANON_KEY)),
    )? {
        Some((url, anon_key)) => Some(SupabaseConfig {
            url: normalize_http_url(&url, ENV_SUPABASE_URL)?,
            anon_key,
            tasks_table: read(ENV_SUPABASE_TASKS_TABLE)
                .unwrap_or_else(|| DEFAULT_TASKS_TABLE.to_string()),
        }),
        None => None,
    };

    let firestore = required_pair(
        "Firestore",
        (ENV_FIREBASE_PROJECT_ID, read(ENV_FIREBASE_PROJECT_ID)),
        (ENV_FIREBASE_API_KEY, read(ENV_FIREBASE_API_KEY)),
    )?
    .map(|(project_id, api_key)| FirestoreConfig {
        project_id,
        api_key,
    });

    let push_scope = read(ENV_PUSH_SCOPE)
        .map(|value| value.parse::<PushScope>())
        .transpose()?
        .unwrap_or_default();

    Ok(BackendConfig {
        supabase,
        firestore,
        push_scope,
        state_dir: read(ENV_STATE_DIR).map(PathBuf::from),
    })
}

fn required_pair(
    backend: &str,
    (first_key, first): (&str, Option<String>),
    (second_key, second): (&str, Option<String>),
) -> Result<Option<(String, String)>> {
    match (first, second) {
        (Some(first), Some(second)) => Ok(Some((first, second))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(incomplete(backend, second_key)),
        (None, Some(_)) => Err(incomplete(backend, first_key)),
    }
}

fn incomplete(backend: &str, missing: &str) -> Error {
    Error::Config(format!(
        "{backend} configuration is incomplete. Missing: {missing}"
    ))
}

fn normalize_http_url(value: &str, key: &str) -> Result<String> {
    if is_http_url(value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(format!(
            "{key} must include http:// or https://"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn parse_from_map(map: &HashMap<&str, &str>) -> Result<BackendConfig> {
        parse_config(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_is_local_only() {
        let config = parse_from_map(&HashMap::new()).unwrap();
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.push_scope, PushScope::Changed);
    }

    #[test]
    fn full_environment_configures_both_backends() {
        let map = HashMap::from([
            (ENV_SUPABASE_URL, " https://project.supabase.co/ "),
            (ENV_SUPABASE_ANON_KEY, "anon"),
            (ENV_FIREBASE_PROJECT_ID, "field-app"),
            (ENV_FIREBASE_API_KEY, "key"),
            (ENV_PUSH_SCOPE, "all-local"),
            (ENV_STATE_DIR, "/var/lib/fieldsync"),
        ]);
        let config = parse_from_map(&map).unwrap();

        let supabase = config.supabase.unwrap();
        assert_eq!(supabase.url, "https://project.supabase.co");
        assert_eq!(supabase.tasks_table, "tasks");
        assert_eq!(
            supabase.rest_url(),
            "https://project.supabase.co/rest/v1/tasks"
        );
        assert_eq!(config.firestore.unwrap().project_id, "field-app");
        assert_eq!(config.push_scope, PushScope::AllLocal);
        assert_eq!(config.state_dir, Some(PathBuf::from("/var/lib/fieldsync")));
    }

    #[test]
    fn partial_backend_is_rejected() {
        let map = HashMap::from([(ENV_SUPABASE_URL, "https://project.supabase.co")]);
        let error = parse_from_map(&map).unwrap_err();
        assert!(error.to_string().contains(ENV_SUPABASE_ANON_KEY));

        let map = HashMap::from([(ENV_FIREBASE_API_KEY, "key"), (ENV_FIREBASE_PROJECT_ID, "  ")]);
        let error = parse_from_map(&map).unwrap_err();
        assert!(error.to_string().contains(ENV_FIREBASE_PROJECT_ID));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let map = HashMap::from([
            (ENV_SUPABASE_URL, "project.supabase.co"),
            (ENV_SUPABASE_ANON_KEY, "anon"),
        ]);
        assert!(matches!(parse_from_map(&map), Err(Error::Config(_))));

        let map = HashMap::from([(ENV_PUSH_SCOPE, "sometimes")]);
        assert!(matches!(parse_from_map(&map), Err(Error::Config(_))));
    }

    #[test]
    fn debug_redacts_keys() {
        let config = SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            anon_key: "secret".to_string(),
            tasks_table: DEFAULT_TASKS_TABLE.to_string(),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    #[ignore = "Requires backend env vars in process environment or .env"]
    fn from_env_loads_real_config() {
        let _ = dotenvy::dotenv();

        let config = BackendConfig::from_env().expect("backend env parsing should not error");
        assert!(config.supabase.is_some() || config.firestore.is_some());
    }
}
