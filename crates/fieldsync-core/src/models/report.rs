//! Intervention report model

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static REPORT_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^R\d{8}-[0-9A-Z]{4}$").expect("Invalid regex"));

const BASE36_DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const RANDOM_SUFFIX_LEN: usize = 4;

/// Client-generated report identifier: `R<YYYYMMDD>-<4 base36 chars>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Generate a fresh identifier stamped with the date of `now`.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..RANDOM_SUFFIX_LEN)
            .map(|_| char::from(BASE36_DIGITS[rng.random_range(0..BASE36_DIGITS.len())]))
            .collect();
        Self(format!("R{}-{suffix}", now.format("%Y%m%d")))
    }

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier follows the generated pattern.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        REPORT_ID_PATTERN.is_match(&self.0)
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReportId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Report workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ReportStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether the workflow allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft | Self::Rejected, Self::Submitted)
                | (Self::Submitted, Self::Approved | Self::Rejected)
        )
    }

    /// Approved reports never change status again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intervention report written by a technician for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionReport {
    pub id: ReportId,
    pub task_id: String,
    pub equipment_id: String,
    pub technician_id: String,
    pub date: String,
    pub client_name: String,
    pub service: String,
    pub equipment_type: String,
    pub serial_number: String,
    pub brand: String,
    pub specifications: String,
    /// Intervention details
    pub description: String,
    /// Actions performed
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_maintenance_date: Option<String>,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
}

impl InterventionReport {
    /// Create a draft report from technician input.
    #[must_use]
    pub fn draft(input: NewReport, now: DateTime<Utc>) -> Self {
        Self {
            id: ReportId::generate(now),
            task_id: input.task_id,
            equipment_id: input.equipment_id,
            technician_id: input.technician_id,
            date: input.date,
            client_name: input.client_name,
            service: input.service,
            equipment_type: input.equipment_type,
            serial_number: input.serial_number,
            brand: input.brand,
            specifications: input.specifications,
            description: input.description,
            findings: input.findings,
            recommendations: input.recommendations,
            next_maintenance_date: input.next_maintenance_date,
            status: ReportStatus::Draft,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            approved_at: None,
            rejected_at: None,
            approved_by: None,
            rejected_by: None,
        }
    }

    /// Merge editable fields from a patch and refresh `updated_at`.
    ///
    /// Status and transition stamps are owned by the lifecycle and are not
    /// patchable.
    pub fn apply_patch(&mut self, patch: ReportPatch, now: DateTime<Utc>) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = patch.$field {
                    self.$field = value;
                })*
            };
        }

        merge!(
            equipment_id,
            technician_id,
            date,
            client_name,
            service,
            equipment_type,
            serial_number,
            brand,
            specifications,
            description,
            findings,
            recommendations,
        );
        if let Some(next) = patch.next_maintenance_date {
            self.next_maintenance_date = next;
        }
        self.updated_at = now;
    }
}

/// Technician input for a new report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewReport {
    pub task_id: String,
    pub equipment_id: String,
    pub technician_id: String,
    pub date: String,
    pub client_name: String,
    pub service: String,
    pub equipment_type: String,
    pub serial_number: String,
    pub brand: String,
    pub specifications: String,
    pub description: String,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub next_maintenance_date: Option<String>,
}

/// Partial update of a report's editable fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specifications: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    /// `Some(None)` clears the date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_maintenance_date: Option<Option<String>>,
}

#[cfg(test)]
pub(crate) fn sample_new_report(task_id: &str) -> NewReport {
    NewReport {
        task_id: task_id.to_string(),
        equipment_id: "eq-7".to_string(),
        technician_id: "tech-3".to_string(),
        date: "2024-05-14".to_string(),
        client_name: "Clinique du Parc".to_string(),
        service: "Radiologie".to_string(),
        equipment_type: "Scanner".to_string(),
        serial_number: "SN-0042".to_string(),
        brand: "Acme".to_string(),
        specifications: "128 coupes".to_string(),
        description: "Remplacement du tube".to_string(),
        findings: vec!["Tube remplacé".to_string()],
        recommendations: vec![],
        next_maintenance_date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_id_follows_pattern() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let id = ReportId::generate(now);
        assert!(id.as_str().starts_with("R20240309-"));
        assert!(id.is_well_formed(), "unexpected id {id}");
    }

    #[test]
    fn malformed_ids_are_detected() {
        assert!(!ReportId::new("R2024-ABCD").is_well_formed());
        assert!(!ReportId::new("R20240309-abcd").is_well_formed());
        assert!(ReportId::new("R20240309-0Z9A").is_well_formed());
    }

    #[test]
    fn transition_table() {
        use ReportStatus::{Approved, Draft, Rejected, Submitted};

        assert!(Draft.can_transition_to(Submitted));
        assert!(Rejected.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Approved));
        assert!(Submitted.can_transition_to(Rejected));

        assert!(!Draft.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Submitted));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(Approved.is_terminal());
        assert!(!Rejected.is_terminal());
    }

    #[test]
    fn report_serializes_in_camel_case() {
        let now = Utc::now();
        let report = InterventionReport::draft(sample_new_report("t1"), now);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "draft");
        assert_eq!(json["taskId"], "t1");
        assert!(json.get("submittedAt").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn patch_does_not_touch_status() {
        let created = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 9, 13, 0, 0).unwrap();
        let mut report = InterventionReport::draft(sample_new_report("t1"), created);

        report.apply_patch(
            ReportPatch {
                description: Some("Nouveau diagnostic".to_string()),
                next_maintenance_date: Some(Some("2024-09-01".to_string())),
                ..ReportPatch::default()
            },
            later,
        );

        assert_eq!(report.description, "Nouveau diagnostic");
        assert_eq!(report.next_maintenance_date.as_deref(), Some("2024-09-01"));
        assert_eq!(report.status, ReportStatus::Draft);
        assert_eq!(report.updated_at, later);
        assert_eq!(report.created_at, created);
    }
}
