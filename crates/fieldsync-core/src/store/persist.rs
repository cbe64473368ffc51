//! Versioned local persistence for the report collection.
//!
//! State is stored as `{"state": {"reports": [...]}, "version": 1}` under a
//! named store (`reports-storage` by default).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::models::InterventionReport;
use crate::Result;

pub const REPORT_STORE_NAME: &str = "reports-storage";
pub const REPORT_STORE_VERSION: u32 = 1;

/// Storage backend for the persisted report collection
pub trait ReportPersistence {
    /// Load persisted reports; `None` when nothing usable is stored.
    fn load(&self) -> Result<Option<Vec<InterventionReport>>>;

    /// Persist the full collection.
    fn save(&self, reports: &[InterventionReport]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<S> {
    state: S,
    version: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReportState {
    reports: Vec<InterventionReport>,
}

#[derive(Serialize)]
struct ReportStateRef<'a> {
    reports: &'a [InterventionReport],
}

/// Encode the collection in the versioned envelope.
pub fn encode_reports(reports: &[InterventionReport]) -> Result<String> {
    let envelope = Envelope {
        state: ReportStateRef { reports },
        version: REPORT_STORE_VERSION,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode a versioned envelope. A different schema version yields `None`.
pub fn decode_reports(payload: &str) -> Result<Option<Vec<InterventionReport>>> {
    let envelope: Envelope<serde_json::Value> = serde_json::from_str(payload)?;
    if envelope.version != REPORT_STORE_VERSION {
        tracing::warn!(
            found = envelope.version,
            expected = REPORT_STORE_VERSION,
            "Discarding persisted reports with unsupported version"
        );
        return Ok(None);
    }

    let state: ReportState = serde_json::from_value(envelope.state)?;
    Ok(Some(state.reports))
}

/// JSON file persistence at `<dir>/<name>.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{name}.json")),
        }
    }

    /// Report store file under `dir`.
    pub fn reports(dir: impl AsRef<Path>) -> Self {
        Self::new(dir, REPORT_STORE_NAME)
    }

    /// Report store file under the configured state directory, if any.
    pub fn from_config(config: &BackendConfig) -> Option<Self> {
        config.state_dir.as_deref().map(Self::reports)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportPersistence for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<InterventionReport>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let payload = fs::read_to_string(&self.path)?;
        decode_reports(&payload)
    }

    fn save(&self, reports: &[InterventionReport]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let payload = encode_reports(reports)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory persistence keeping the encoded payload (for tests and hosts
/// without a writable disk).
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    payload: Arc<Mutex<Option<String>>>,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with a raw payload.
    #[must_use]
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Arc::new(Mutex::new(Some(payload.into()))),
        }
    }

    /// The last saved payload.
    pub fn payload(&self) -> Option<String> {
        self.payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ReportPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<Vec<InterventionReport>>> {
        match self.payload() {
            Some(payload) => decode_reports(&payload),
            None => Ok(None),
        }
    }

    fn save(&self, reports: &[InterventionReport]) -> Result<()> {
        let payload = encode_reports(reports)?;
        *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload);
        Ok(())
    }
}
