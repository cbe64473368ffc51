//! Intervention report collection and its lifecycle operations.

use chrono::Utc;

use crate::lifecycle::{self, Eligibility, GuardViolation};
use crate::models::{InterventionReport, NewReport, ReportId, ReportPatch};
use crate::store::persist::ReportPersistence;
use crate::{Error, Result};

/// Report collection persisted after every mutation
#[derive(Debug)]
pub struct ReportStore<P: ReportPersistence> {
    reports: Vec<InterventionReport>,
    persistence: P,
}

impl<P: ReportPersistence> ReportStore<P> {
    /// Open the store, hydrating from persistence.
    pub fn open(persistence: P) -> Result<Self> {
        let reports = persistence.load()?.unwrap_or_default();
        tracing::debug!(count = reports.len(), "Loaded persisted reports");
        Ok(Self {
            reports,
            persistence,
        })
    }

    pub fn reports(&self) -> &[InterventionReport] {
        &self.reports
    }

    pub fn get(&self, id: &ReportId) -> Option<&InterventionReport> {
        self.reports.iter().find(|report| &report.id == id)
    }

    /// First report written for a task.
    pub fn report_by_task(&self, task_id: &str) -> Option<&InterventionReport> {
        self.reports.iter().find(|report| report.task_id == task_id)
    }

    /// Create a draft report with a fresh client-side id.
    pub fn add_report(&mut self, input: NewReport) -> Result<InterventionReport> {
        let mut report = InterventionReport::draft(input, Utc::now());
        while self.get(&report.id).is_some() {
            report.id = ReportId::generate(report.created_at);
        }

        self.reports.push(report.clone());
        if let Err(error) = self.persist() {
            self.reports.pop();
            return Err(error);
        }
        tracing::info!(report_id = %report.id, task_id = %report.task_id, "Created draft report");
        Ok(report)
    }

    /// Merge editable fields into a report.
    pub fn update_report(&mut self, id: &ReportId, patch: ReportPatch) -> Result<&InterventionReport> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::ReportNotFound(id.to_string()))?;
        let mut next = self.reports[index].clone();
        next.apply_patch(patch, Utc::now());
        self.commit(index, next)?;
        Ok(&self.reports[index])
    }

    /// Remove a report; returns whether it existed.
    pub fn delete_report(&mut self, id: &ReportId) -> Result<bool> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let removed = self.reports.remove(index);
        if let Err(error) = self.persist() {
            self.reports.insert(index, removed);
            return Err(error);
        }
        Ok(true)
    }

    pub fn can_submit(&self, id: &ReportId) -> Eligibility {
        self.get(id).map_or(
            Eligibility::Denied(GuardViolation::ReportNotFound),
            lifecycle::check_submit,
        )
    }

    pub fn can_approve(&self, id: &ReportId) -> Eligibility {
        self.get(id).map_or(
            Eligibility::Denied(GuardViolation::ReportNotFound),
            lifecycle::check_review,
        )
    }

    pub fn submit(&mut self, id: &ReportId) -> Result<&InterventionReport> {
        self.transition(id, |report, now| lifecycle::submit(report, now))
    }

    pub fn approve(&mut self, id: &ReportId, admin_id: &str) -> Result<&InterventionReport> {
        self.transition(id, |report, now| lifecycle::approve(report, admin_id, now))
    }

    pub fn reject(
        &mut self,
        id: &ReportId,
        admin_id: &str,
        reason: &str,
    ) -> Result<&InterventionReport> {
        self.transition(id, |report, now| {
            lifecycle::reject(report, admin_id, reason, now)
        })
    }

    fn transition<F>(&mut self, id: &ReportId, apply: F) -> Result<&InterventionReport>
    where
        F: FnOnce(&mut InterventionReport, chrono::DateTime<Utc>) -> std::result::Result<(), GuardViolation>,
    {
        let index = self.position(id).ok_or(GuardViolation::ReportNotFound)?;

        let mut next = self.reports[index].clone();
        if let Err(violation) = apply(&mut next, Utc::now()) {
            tracing::debug!(report_id = %id, %violation, "Report transition refused");
            return Err(violation.into());
        }

        self.commit(index, next)?;

        let report = &self.reports[index];
        tracing::info!(report_id = %id, status = %report.status, "Report status changed");
        Ok(report)
    }

    /// Replace the report at `index` and persist, restoring it on failure.
    fn commit(&mut self, index: usize, next: InterventionReport) -> Result<()> {
        let previous = std::mem::replace(&mut self.reports[index], next);
        if let Err(error) = self.persist() {
            self.reports[index] = previous;
            return Err(error);
        }
        Ok(())
    }

    fn position(&self, id: &ReportId) -> Option<usize> {
        self.reports.iter().position(|report| &report.id == id)
    }

    fn persist(&self) -> Result<()> {
        self.persistence.save(&self.reports)
    }
}
