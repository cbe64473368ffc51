//! Report lifecycle: `draft -> submitted -> approved | rejected`, with
//! `rejected -> submitted` for resubmission.
//!
//! Every transition is gated. The `check_*` functions are dry runs that UI
//! layers use to disable actions up front; the transition functions run the
//! same checks and refuse with the unmet guard.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{InterventionReport, ReportStatus};
use crate::util::is_blank;

/// The guard that blocked a report transition.
///
/// Messages are user-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("Rapport introuvable")]
    ReportNotFound,
    #[error("Le rapport doit être en brouillon ou rejeté pour être soumis")]
    NotSubmittable,
    #[error("Les détails de l'intervention sont requis")]
    MissingDescription,
    #[error("Les actions réalisées sont requises")]
    MissingFindings,
    #[error("Le rapport doit être soumis pour être approuvé ou rejeté")]
    NotReviewable,
    #[error("Le rapport ne peut pas être rejeté")]
    NotRejectable,
    #[error("L'identifiant de l'administrateur est requis")]
    MissingActor,
    #[error("Une raison de rejet est requise")]
    MissingRejectionReason,
}

/// Outcome of a dry-run precondition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Allowed,
    Denied(GuardViolation),
}

impl Eligibility {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Human-readable reason when denied.
    #[must_use]
    pub fn reason(self) -> Option<String> {
        match self {
            Self::Allowed => None,
            Self::Denied(violation) => Some(violation.to_string()),
        }
    }

    /// Convert into a `Result`, for callers that want `?`.
    pub const fn into_result(self) -> Result<(), GuardViolation> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(violation) => Err(violation),
        }
    }
}

impl From<Result<(), GuardViolation>> for Eligibility {
    fn from(value: Result<(), GuardViolation>) -> Self {
        match value {
            Ok(()) => Self::Allowed,
            Err(violation) => Self::Denied(violation),
        }
    }
}

/// Can this report be submitted for review?
pub fn check_submit(report: &InterventionReport) -> Eligibility {
    submit_guard(report).into()
}

/// Can this report be approved or rejected?
pub fn check_review(report: &InterventionReport) -> Eligibility {
    review_guard(report).into()
}

/// Move a draft or rejected report to `submitted`.
pub fn submit(report: &mut InterventionReport, now: DateTime<Utc>) -> Result<(), GuardViolation> {
    submit_guard(report)?;
    report.status = ReportStatus::Submitted;
    report.submitted_at = Some(now);
    report.updated_at = now;
    Ok(())
}

/// Approve a submitted report on behalf of `actor`.
pub fn approve(
    report: &mut InterventionReport,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<(), GuardViolation> {
    review_guard(report)?;
    if is_blank(actor) {
        return Err(GuardViolation::MissingActor);
    }

    report.status = ReportStatus::Approved;
    report.approved_at = Some(now);
    report.approved_by = Some(actor.trim().to_string());
    report.updated_at = now;
    Ok(())
}

/// Reject a submitted report on behalf of `actor`, recording why.
pub fn reject(
    report: &mut InterventionReport,
    actor: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<(), GuardViolation> {
    if !check_review(report).is_allowed() {
        return Err(GuardViolation::NotRejectable);
    }
    if is_blank(actor) {
        return Err(GuardViolation::MissingActor);
    }
    if is_blank(reason) {
        return Err(GuardViolation::MissingRejectionReason);
    }

    report.status = ReportStatus::Rejected;
    report.rejected_at = Some(now);
    report.rejected_by = Some(actor.trim().to_string());
    report.rejection_reason = Some(reason.to_string());
    report.updated_at = now;
    Ok(())
}

fn submit_guard(report: &InterventionReport) -> Result<(), GuardViolation> {
    if !report.status.can_transition_to(ReportStatus::Submitted) {
        return Err(GuardViolation::NotSubmittable);
    }
    if is_blank(&report.description) {
        return Err(GuardViolation::MissingDescription);
    }
    if report.findings.iter().all(|finding| is_blank(finding)) {
        return Err(GuardViolation::MissingFindings);
    }
    Ok(())
}

fn review_guard(report: &InterventionReport) -> Result<(), GuardViolation> {
    if report.status == ReportStatus::Submitted {
        Ok(())
    } else {
        Err(GuardViolation::NotReviewable)
    }
}
