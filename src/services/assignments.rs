//! School assignment operations
//!
//! Controllers assign up to one list of schools per (trainer, date). The
//! uniqueness check is read-then-write: two concurrent assigns for the same
//! trainer and date can both pass it. Reads and the sync pass go through the
//! [`Reconciler`].

use bson::oid::ObjectId;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{format_date, normalize_email, parse_date};
use crate::db::schemas::{AssignmentDoc, SchoolEntry};
use crate::reconcile::{dedup_schools, identity_key, MergedView, Reconciler, StatusSummary};
use crate::store::{AssignmentQuery, AssignmentStore, SchoolsStamp, SortOrder, UserStore};
use crate::types::{FieldOpsError, Result};

/// Largest trailing window a sync request may ask for
pub const MAX_SYNC_DAYS: i64 = 90;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchoolInput {
    #[serde(default)]
    pub school_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignRequest {
    #[serde(default)]
    pub controller_email: Option<String>,
    #[serde(default)]
    pub trainer_email: Option<String>,
    #[serde(default)]
    pub assignment_date: Option<String>,
    #[serde(default)]
    pub schools: Option<Vec<SchoolInput>>,
    #[serde(default)]
    pub allow_overwrite: bool,
}

#[derive(Debug, Serialize)]
pub struct AssignResult {
    pub message: String,
    pub assignment_id: String,
    pub assignment_date: String,
    pub trainer_email: String,
    pub schools_count: usize,
    pub overwritten: bool,
}

#[derive(Debug)]
pub enum AssignOutcome {
    Assigned(AssignResult),
    /// An active assignment exists and overwrite was not requested
    Conflict(AssignmentDoc),
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub schools: Option<Vec<SchoolInput>>,
    #[serde(default)]
    pub allow_past_edit: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateResult {
    pub message: String,
    pub assignment_id: String,
    pub schools_count: usize,
    pub assignment_date: String,
    pub is_past_assignment: bool,
}

#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(UpdateResult),
    /// Assignment date is before today and no override was given
    PastBlocked { assignment_date: String },
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub days_back: Option<i64>,
    #[serde(default)]
    pub trainer_email: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
    pub assignments_scanned: usize,
    pub assignments_updated: usize,
    pub schools_updated: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkItem {
    #[serde(default)]
    pub trainer_email: Option<String>,
    #[serde(default)]
    pub assignment_date: Option<String>,
    #[serde(default)]
    pub schools: Option<Vec<SchoolInput>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub controller_email: Option<String>,
    #[serde(default)]
    pub assignments: Option<Vec<BulkItem>>,
}

#[derive(Debug, Default, Serialize)]
pub struct BulkReport {
    pub message: String,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Assignment with live statuses for one trainer and date
#[derive(Debug)]
pub struct DayView {
    pub assignment_date: String,
    pub found: Option<(AssignmentDoc, MergedView)>,
}

/// Assignment with the statuses last written by sync
#[derive(Debug)]
pub struct StoredDayView {
    pub assignment_date: String,
    pub assignment: Option<AssignmentDoc>,
    pub schools: Vec<SchoolEntry>,
    pub summary: StatusSummary,
    pub duplicates_removed: usize,
}

/// Date filter for a controller's assignment list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    #[default]
    Upcoming,
    Past,
    All,
}

impl std::str::FromStr for DateFilter {
    type Err = FieldOpsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "past" => Ok(Self::Past),
            "all" => Ok(Self::All),
            other => Err(FieldOpsError::BadRequest(format!(
                "Invalid date_filter '{}'. Use upcoming, past or all",
                other
            ))),
        }
    }
}

// =============================================================================
// Validation helpers
// =============================================================================

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    non_empty(value)
        .ok_or_else(|| FieldOpsError::BadRequest(format!("Missing required field: {}", field)))
}

/// Every school needs a name and a city
fn validate_schools(inputs: &[SchoolInput]) -> Result<Vec<SchoolEntry>> {
    inputs
        .iter()
        .map(|s| match (non_empty(&s.school_name), non_empty(&s.city)) {
            (Some(name), Some(city)) => Ok(SchoolEntry::new(name, city)),
            _ => Err(FieldOpsError::BadRequest(
                "Each school must have school_name and city".into(),
            )),
        })
        .collect()
}

fn object_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim())
        .map_err(|_| FieldOpsError::BadRequest("Invalid assignment id".into()))
}

// =============================================================================
// Service
// =============================================================================

/// Assignment operations over the configured stores
#[derive(Clone)]
pub struct AssignmentService {
    reconciler: Reconciler,
    users: Arc<dyn UserStore>,
    window_days: i64,
    sync_window_days: i64,
}

impl AssignmentService {
    pub fn new(
        reconciler: Reconciler,
        users: Arc<dyn UserStore>,
        window_days: i64,
        sync_window_days: i64,
    ) -> Self {
        Self {
            reconciler,
            users,
            window_days,
            sync_window_days,
        }
    }

    fn store(&self) -> &dyn AssignmentStore {
        self.reconciler.accessor().store()
    }

    /// Assignment date must lie in [today, today + window]
    fn check_window(&self, date: NaiveDate, today: NaiveDate) -> Result<()> {
        if date < today {
            return Err(FieldOpsError::BadRequest(
                "Cannot assign schools for past dates".into(),
            ));
        }
        if (date - today).num_days() > self.window_days {
            return Err(FieldOpsError::BadRequest(format!(
                "Cannot assign schools more than {} days in advance",
                self.window_days
            )));
        }
        Ok(())
    }

    async fn require_trainer(&self, trainer_email: &str) -> Result<()> {
        match self.users.find_user(trainer_email).await? {
            Some(_) => Ok(()),
            None => Err(FieldOpsError::NotFound("Trainer not found".into())),
        }
    }

    /// Create an assignment, or overwrite the active one when allowed
    pub async fn assign_schools(&self, req: AssignRequest, today: NaiveDate) -> Result<AssignOutcome> {
        let controller = normalize_email(required(&req.controller_email, "controller_email")?);
        let trainer = normalize_email(required(&req.trainer_email, "trainer_email")?);
        let date_raw = required(&req.assignment_date, "assignment_date")?;
        let inputs = req
            .schools
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FieldOpsError::BadRequest("Missing required field: schools".into()))?;

        let date = parse_date(date_raw)?;
        self.check_window(date, today)?;
        let schools = validate_schools(inputs)?;
        self.require_trainer(&trainer).await?;

        let date_str = format_date(date);
        let accessor = self.reconciler.accessor();
        let existing = accessor.find_active_assignment(&trainer, &date_str).await?;

        if let Some(existing) = existing.as_ref() {
            if !req.allow_overwrite {
                info!(trainer = %trainer, date = %date_str, "Assignment conflict");
                return Ok(AssignOutcome::Conflict(existing.clone()));
            }
        }

        let schools_count = schools.len();
        let record = AssignmentDoc::new(controller.clone(), trainer.clone(), date_str.clone(), schools);
        let id = accessor.upsert_assignment(record, existing.as_ref()).await?;

        let message = match &existing {
            Some(previous) => format!(
                "School assignment updated successfully (overwrote previous assignment with {} schools)",
                previous.schools.len()
            ),
            None => "Schools assigned successfully".to_string(),
        };

        info!(
            controller = %controller,
            trainer = %trainer,
            date = %date_str,
            schools = schools_count,
            overwritten = existing.is_some(),
            "Schools assigned"
        );

        Ok(AssignOutcome::Assigned(AssignResult {
            message,
            assignment_id: id.to_hex(),
            assignment_date: date_str,
            trainer_email: trainer,
            schools_count,
            overwritten: existing.is_some(),
        }))
    }

    /// Active assignment for (trainer, date), if any
    pub async fn check_assignment(&self, trainer: &str, date_raw: &str) -> Result<Option<AssignmentDoc>> {
        let date = parse_date(date_raw)?;
        self.reconciler
            .accessor()
            .find_active_assignment(&normalize_email(trainer), &format_date(date))
            .await
    }

    /// Merged view with live audit statuses
    pub async fn today_assignments(
        &self,
        trainer: &str,
        date_raw: Option<&str>,
        today: NaiveDate,
    ) -> Result<DayView> {
        let date = match date_raw {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        let found = self.reconciler.view(&normalize_email(trainer), date).await?;

        Ok(DayView {
            assignment_date: format_date(date),
            found,
        })
    }

    /// View built from the statuses stored on the assignment, without
    /// consulting audits
    pub async fn today_assignments_with_audit_status(
        &self,
        trainer: &str,
        date_raw: Option<&str>,
        today: NaiveDate,
    ) -> Result<StoredDayView> {
        let date = match date_raw {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        let date_str = format_date(date);
        let assignment = self
            .reconciler
            .accessor()
            .find_active_assignment(&normalize_email(trainer), &date_str)
            .await?;

        let deduped = assignment
            .as_ref()
            .map(|a| dedup_schools(&a.schools))
            .unwrap_or_default();

        Ok(StoredDayView {
            assignment_date: date_str,
            summary: StatusSummary::from_stored(&deduped.schools),
            duplicates_removed: deduped.duplicates_removed,
            schools: deduped.schools,
            assignment,
        })
    }

    /// Replace an assignment's schools. Schools that were already assigned
    /// keep their stored audit status.
    pub async fn update_assignment(
        &self,
        id_raw: &str,
        req: UpdateRequest,
        today: NaiveDate,
    ) -> Result<UpdateOutcome> {
        let inputs = req
            .schools
            .as_deref()
            .ok_or_else(|| FieldOpsError::BadRequest("Missing required field: schools".into()))?;
        let mut schools = validate_schools(inputs)?;
        let id = object_id(id_raw)?;

        let existing = self
            .store()
            .find_active_by_id(&id)
            .await?
            .ok_or_else(|| FieldOpsError::NotFound("Assignment not found".into()))?;

        let today_str = format_date(today);
        let is_past = existing.assignment_date < today_str;
        if is_past && !req.allow_past_edit {
            warn!(assignment_id = %id, date = %existing.assignment_date, "Blocked edit of past assignment");
            return Ok(UpdateOutcome::PastBlocked {
                assignment_date: existing.assignment_date,
            });
        }

        let previous: HashMap<String, &SchoolEntry> = existing
            .schools
            .iter()
            .map(|s| (identity_key(&s.school_name, &s.city), s))
            .collect();
        for school in schools.iter_mut() {
            if let Some(prev) = previous.get(&identity_key(&school.school_name, &school.city)) {
                school.audit_status = prev.audit_status;
                school.audit_id = prev.audit_id.clone();
                school.last_updated = prev.last_updated;
                school.audit_started_at = prev.audit_started_at.clone();
                school.audit_completed_at = prev.audit_completed_at.clone();
            }
        }

        if !self
            .store()
            .write_schools(&id, &schools, SchoolsStamp::Edited)
            .await?
        {
            return Err(FieldOpsError::NotFound("Assignment not found".into()));
        }

        info!(assignment_id = %id, schools = schools.len(), "Assignment updated");

        Ok(UpdateOutcome::Updated(UpdateResult {
            message: "Assignment updated successfully".into(),
            assignment_id: id.to_hex(),
            schools_count: schools.len(),
            assignment_date: existing.assignment_date,
            is_past_assignment: is_past,
        }))
    }

    /// Soft delete
    pub async fn delete_assignment(&self, id_raw: &str) -> Result<()> {
        let id = object_id(id_raw)?;
        if self.store().soft_delete_assignment(&id).await? {
            info!(assignment_id = %id, "Assignment deleted");
            Ok(())
        } else {
            Err(FieldOpsError::NotFound("Assignment not found".into()))
        }
    }

    /// Write reconciled statuses back onto every active assignment dated
    /// within the trailing window. Best-effort: a failing assignment is
    /// reported and the scan goes on.
    pub async fn sync_audit_status(&self, req: SyncRequest, today: NaiveDate) -> Result<SyncReport> {
        let days_back = req.days_back.unwrap_or(self.sync_window_days);
        if !(0..=MAX_SYNC_DAYS).contains(&days_back) {
            return Err(FieldOpsError::BadRequest(format!(
                "days_back must be between 0 and {}",
                MAX_SYNC_DAYS
            )));
        }

        let query = AssignmentQuery {
            trainer_email: non_empty(&req.trainer_email).map(normalize_email),
            date_from: Some(format_date(today - Duration::days(days_back))),
            date_to: Some(format_date(today)),
            ..Default::default()
        };
        let assignments = self.store().find_assignments(&query).await?;

        let mut report = SyncReport::default();
        for assignment in &assignments {
            report.assignments_scanned += 1;
            match self.reconciler.sync_assignment(assignment).await {
                Ok(outcome) => {
                    if outcome.changed() {
                        report.assignments_updated += 1;
                    }
                    report.schools_updated += outcome.schools_updated;
                }
                Err(e) => {
                    error!(assignment_id = %assignment.id_hex(), error = %e, "Sync failed for assignment");
                    report
                        .errors
                        .push(format!("{}: {}", assignment.id_hex(), e.public_message()));
                }
            }
        }

        info!(
            scanned = report.assignments_scanned,
            updated = report.assignments_updated,
            schools = report.schools_updated,
            errors = report.errors.len(),
            "Audit status sync finished"
        );
        Ok(report)
    }

    /// Create or overwrite many assignments; invalid items are reported
    pub async fn bulk_assign(&self, req: BulkRequest, today: NaiveDate) -> Result<BulkReport> {
        let controller = normalize_email(required(&req.controller_email, "controller_email")?);
        let items = req
            .assignments
            .filter(|a| !a.is_empty())
            .ok_or_else(|| FieldOpsError::BadRequest("Missing required field: assignments".into()))?;

        let mut report = BulkReport {
            message: "Bulk assignment completed".into(),
            ..Default::default()
        };

        for item in items {
            let trainer = non_empty(&item.trainer_email).unwrap_or("unknown").to_string();
            match self.bulk_one(&controller, item, today).await {
                Ok(true) => report.updated += 1,
                Ok(false) => report.created += 1,
                Err(e) => report.errors.push(format!(
                    "Error processing assignment for {}: {}",
                    trainer,
                    e.public_message()
                )),
            }
        }

        info!(
            controller = %controller,
            created = report.created,
            updated = report.updated,
            errors = report.errors.len(),
            "Bulk assignment finished"
        );
        Ok(report)
    }

    /// Returns whether an existing assignment was overwritten
    async fn bulk_one(&self, controller: &str, item: BulkItem, today: NaiveDate) -> Result<bool> {
        let (Some(trainer), Some(date_raw), Some(inputs)) = (
            non_empty(&item.trainer_email),
            non_empty(&item.assignment_date),
            item.schools.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Err(FieldOpsError::BadRequest("Invalid assignment data".into()));
        };

        let trainer = normalize_email(trainer);
        let date = parse_date(date_raw)?;
        self.check_window(date, today)?;
        let schools = validate_schools(inputs)?;
        self.require_trainer(&trainer).await?;

        let date_str = format_date(date);
        let accessor = self.reconciler.accessor();
        let existing = accessor.find_active_assignment(&trainer, &date_str).await?;
        let record = AssignmentDoc::new(controller.to_string(), trainer, date_str, schools);
        accessor.upsert_assignment(record, existing.as_ref()).await?;

        Ok(existing.is_some())
    }

    /// A trainer's active assignments between two dates, ascending.
    /// Defaults to today through today + window.
    pub async fn trainer_assignments(
        &self,
        trainer: &str,
        start_raw: Option<&str>,
        end_raw: Option<&str>,
        today: NaiveDate,
    ) -> Result<Vec<AssignmentDoc>> {
        let start = match start_raw {
            Some(raw) => parse_date(raw)?,
            None => today,
        };
        let end = match end_raw {
            Some(raw) => parse_date(raw)?,
            None => start + Duration::days(self.window_days),
        };

        self.store()
            .find_assignments(&AssignmentQuery {
                trainer_email: Some(normalize_email(trainer)),
                date_from: Some(format_date(start)),
                date_to: Some(format_date(end)),
                order: SortOrder::Ascending,
                ..Default::default()
            })
            .await
    }

    /// A controller's active assignments, newest date first, each paired
    /// with the trainer's display name
    pub async fn controller_assignments(
        &self,
        controller: &str,
        filter: DateFilter,
        today: NaiveDate,
    ) -> Result<Vec<(AssignmentDoc, String)>> {
        let today_str = format_date(today);
        let mut query = AssignmentQuery {
            controller_email: Some(normalize_email(controller)),
            order: SortOrder::Descending,
            ..Default::default()
        };
        match filter {
            DateFilter::Upcoming => query.date_from = Some(today_str),
            DateFilter::Past => query.date_before = Some(today_str),
            DateFilter::All => {}
        }

        let assignments = self.store().find_assignments(&query).await?;

        let mut names: HashMap<String, String> = HashMap::new();
        let mut out = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let name = match names.get(&assignment.trainer_email) {
                Some(n) => n.clone(),
                None => {
                    let n = self
                        .users
                        .find_user(&assignment.trainer_email)
                        .await?
                        .map(|u| u.full_name)
                        .filter(|n| !n.is_empty())
                        .unwrap_or_else(|| "Unknown".to_string());
                    names.insert(assignment.trainer_email.clone(), n.clone());
                    n
                }
            };
            out.push((assignment, name));
        }
        Ok(out)
    }
}
