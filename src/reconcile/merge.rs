//! Merging resolved audit statuses into assignment schools
//!
//! The read path decorates each school for display. The sync path rewrites
//! the stored per-school fields and reports whether anything changed.

use bson::DateTime;
use serde::Serialize;
use serde_json::{json, Value};

use super::identity::{identity_key, Deduped};
use super::resolution::ResolutionMap;
use crate::db::schemas::{AuditDoc, AuditState, AuditStatus, SchoolEntry};

/// Per-status counts over the deduplicated schools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_assigned: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
}

impl StatusSummary {
    pub fn record(&mut self, status: AuditStatus) {
        self.total_assigned += 1;
        match status {
            AuditStatus::Pending => self.pending += 1,
            AuditStatus::InProgress => self.in_progress += 1,
            AuditStatus::Completed => self.completed += 1,
        }
    }

    /// Counts taken from the statuses already stored on the schools
    pub fn from_stored(schools: &[SchoolEntry]) -> Self {
        let mut summary = Self::default();
        for school in schools {
            summary.record(school.audit_status);
        }
        summary
    }
}

/// One school with its live status attached
#[derive(Debug, Clone)]
pub struct MergedSchool {
    pub school: SchoolEntry,
    pub audit_status: AuditStatus,
    pub audit_id: Option<String>,
    pub start_timestamp: Option<String>,
    pub completion_timestamp: Option<String>,
    /// Full audit, only while it is in progress, so the client can resume
    pub current_audit: Option<AuditDoc>,
}

impl MergedSchool {
    pub fn to_json(&self, base_url: &str) -> Value {
        let mut v = json!({
            "school_name": self.school.school_name,
            "city": self.school.city,
            "audit_status": self.audit_status,
            "audit_id": self.audit_id,
            "start_timestamp": self.start_timestamp,
            "completion_timestamp": self.completion_timestamp,
        });
        if let (Some(audit), Value::Object(obj)) = (&self.current_audit, &mut v) {
            obj.insert("current_audit_data".into(), audit.to_json(base_url));
        }
        v
    }
}

/// Read-path result
#[derive(Debug, Clone, Default)]
pub struct MergedView {
    pub schools: Vec<MergedSchool>,
    pub summary: StatusSummary,
    pub duplicates_removed: usize,
}

/// Attach resolved statuses to deduplicated schools; unresolved schools
/// are pending
pub fn merge_for_read(deduped: Deduped, resolutions: &ResolutionMap) -> MergedView {
    let mut summary = StatusSummary::default();
    let mut schools = Vec::with_capacity(deduped.schools.len());

    for school in deduped.schools {
        let key = identity_key(&school.school_name, &school.city);
        let merged = match resolutions.get(&key) {
            Some(r) => MergedSchool {
                audit_status: r.status.into(),
                audit_id: Some(r.audit_id.clone()),
                start_timestamp: r.start_timestamp.clone(),
                completion_timestamp: r.completion_timestamp.clone(),
                current_audit: (r.status == AuditState::InProgress).then(|| r.audit.clone()),
                school,
            },
            None => MergedSchool {
                audit_status: AuditStatus::Pending,
                audit_id: None,
                start_timestamp: None,
                completion_timestamp: None,
                current_audit: None,
                school,
            },
        };
        summary.record(merged.audit_status);
        schools.push(merged);
    }

    MergedView {
        schools,
        summary,
        duplicates_removed: deduped.duplicates_removed,
    }
}

/// Sync-path result
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Deduplicated schools with refreshed status fields
    pub schools: Vec<SchoolEntry>,
    /// Schools whose stored status changed
    pub schools_updated: usize,
    pub duplicates_removed: usize,
}

impl SyncOutcome {
    /// Whether the assignment needs to be written back
    pub fn changed(&self) -> bool {
        self.schools_updated > 0 || self.duplicates_removed > 0
    }
}

/// Compare stored statuses to the resolved ones and rewrite the schools
/// whose status differs
pub fn merge_for_sync(deduped: Deduped, resolutions: &ResolutionMap, now: DateTime) -> SyncOutcome {
    let mut schools_updated = 0;
    let mut schools = Vec::with_capacity(deduped.schools.len());

    for mut school in deduped.schools {
        let key = identity_key(&school.school_name, &school.city);
        let resolved = resolutions.get(&key);
        let status = resolved.map_or(AuditStatus::Pending, |r| r.status.into());

        if school.audit_status != status {
            school.audit_status = status;
            school.last_updated = Some(now);
            match resolved {
                Some(r) => {
                    school.audit_id = Some(r.audit_id.clone());
                    school.audit_started_at = r.start_timestamp.clone();
                    school.audit_completed_at = r.completion_timestamp.clone();
                }
                None => {
                    school.audit_id = None;
                    school.audit_started_at = None;
                    school.audit_completed_at = None;
                }
            }
            schools_updated += 1;
        }
        schools.push(school);
    }

    SyncOutcome {
        schools,
        schools_updated,
        duplicates_removed: deduped.duplicates_removed,
    }
}
