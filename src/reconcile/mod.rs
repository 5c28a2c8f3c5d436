//! Assignment/audit status reconciliation
//!
//! Assignments and audits are written independently. The reconciler joins
//! them by school identity key: on read it decorates an assignment's schools
//! with live audit statuses, on sync it writes those statuses back onto the
//! assignment document.

mod accessor;
mod identity;
mod merge;
mod resolution;

pub use accessor::AssignmentAccessor;
pub use identity::{dedup_schools, identity_key, Deduped};
pub use merge::{
    merge_for_read, merge_for_sync, MergedSchool, MergedView, StatusSummary, SyncOutcome,
};
pub use resolution::{
    lookup_statuses, parse_audit_date, resolve_statuses, Resolution, ResolutionMap,
    AUDIT_DATE_FORMAT,
};

use bson::DateTime;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

use crate::db::schemas::AssignmentDoc;
use crate::store::{AssignmentStore, AuditStore};
use crate::types::{FieldOpsError, Result};

/// Date format of assignment_date
pub const ASSIGNMENT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Read and sync flows over one assignment store and one audit store
#[derive(Clone)]
pub struct Reconciler {
    accessor: AssignmentAccessor,
    audits: Arc<dyn AuditStore>,
}

impl Reconciler {
    pub fn new(assignments: Arc<dyn AssignmentStore>, audits: Arc<dyn AuditStore>) -> Self {
        Self {
            accessor: AssignmentAccessor::new(assignments),
            audits,
        }
    }

    pub fn accessor(&self) -> &AssignmentAccessor {
        &self.accessor
    }

    /// Active assignment for (trainer, date) merged with live audit statuses
    pub async fn view(
        &self,
        trainer_email: &str,
        date: NaiveDate,
    ) -> Result<Option<(AssignmentDoc, MergedView)>> {
        let date_str = date.format(ASSIGNMENT_DATE_FORMAT).to_string();
        let Some(assignment) = self
            .accessor
            .find_active_assignment(trainer_email, &date_str)
            .await?
        else {
            return Ok(None);
        };

        let deduped = dedup_schools(&assignment.schools);
        let resolutions =
            lookup_statuses(self.audits.as_ref(), trainer_email, &deduped, date).await?;
        let view = merge_for_read(deduped, &resolutions);

        debug!(
            trainer = %trainer_email,
            date = %date_str,
            completed = view.summary.completed,
            in_progress = view.summary.in_progress,
            pending = view.summary.pending,
            "Merged assignment view"
        );

        Ok(Some((assignment, view)))
    }

    /// Reconcile one stored assignment, writing back only when something
    /// changed
    pub async fn sync_assignment(&self, assignment: &AssignmentDoc) -> Result<SyncOutcome> {
        let id = assignment
            ._id
            .ok_or_else(|| FieldOpsError::Internal("Assignment has no id".into()))?;
        let target = NaiveDate::parse_from_str(&assignment.assignment_date, ASSIGNMENT_DATE_FORMAT)
            .map_err(|_| {
                FieldOpsError::BadRequest(format!(
                    "Stored assignment {} has invalid date {}",
                    id, assignment.assignment_date
                ))
            })?;

        let deduped = dedup_schools(&assignment.schools);
        let resolutions = lookup_statuses(
            self.audits.as_ref(),
            &assignment.trainer_email,
            &deduped,
            target,
        )
        .await?;
        let outcome = merge_for_sync(deduped, &resolutions, DateTime::now());

        if outcome.changed() {
            self.accessor
                .write_back_school_statuses(&id, &outcome.schools)
                .await?;
            info!(
                assignment_id = %id,
                trainer = %assignment.trainer_email,
                schools_updated = outcome.schools_updated,
                duplicates_removed = outcome.duplicates_removed,
                "Assignment statuses synced"
            );
        }

        Ok(outcome)
    }
}
