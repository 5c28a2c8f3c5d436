//! School assignment document schema
//!
//! One document per (trainer, date): the ordered list of schools a
//! controller wants the trainer to visit, with the last known audit status
//! of each school.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::mongo::{IntoIndexes, MutTimestamps};
use crate::db::schemas::{iso, AuditStatus};

/// Collection name for assignments
pub const ASSIGNMENT_COLLECTION: &str = "school_assignments";

/// Lifecycle of an assignment document
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    #[default]
    Active,
    Deleted,
}

/// One school inside an assignment
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SchoolEntry {
    pub school_name: String,
    pub city: String,

    #[serde(default)]
    pub audit_status: AuditStatus,

    /// Hex id of the audit this status came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,

    /// When audit_status last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime>,

    /// Display start time copied from the audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_started_at: Option<String>,

    /// Display completion time copied from the audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_completed_at: Option<String>,
}

impl SchoolEntry {
    pub fn new(school_name: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            school_name: school_name.into(),
            city: city.into(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "school_name": self.school_name,
            "city": self.city,
            "audit_status": self.audit_status,
            "audit_id": self.audit_id,
            "last_updated": iso(&self.last_updated),
            "audit_started_at": self.audit_started_at,
            "audit_completed_at": self.audit_completed_at,
        })
    }
}

/// Assignment document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AssignmentDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Controller who created the assignment
    pub controller_email: String,

    /// Trainer who must visit the schools
    pub trainer_email: String,

    /// Calendar date, "YYYY-MM-DD"
    pub assignment_date: String,

    /// Schools in the order the controller submitted them
    #[serde(default)]
    pub schools: Vec<SchoolEntry>,

    #[serde(default)]
    pub status: AssignmentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Set whenever reconciled statuses are written back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_update: Option<DateTime>,

    /// Set by the sync maintenance pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_update: Option<DateTime>,
}

impl AssignmentDoc {
    /// Create a new active assignment
    pub fn new(
        controller_email: String,
        trainer_email: String,
        assignment_date: String,
        schools: Vec<SchoolEntry>,
    ) -> Self {
        Self {
            _id: None,
            controller_email,
            trainer_email,
            assignment_date,
            schools,
            status: AssignmentStatus::Active,
            created_at: None,
            updated_at: None,
            last_status_update: None,
            last_sync_update: None,
        }
    }

    /// Hex id, empty when not yet stored
    pub fn id_hex(&self) -> String {
        self._id.map(|id| id.to_hex()).unwrap_or_default()
    }

    /// Short form shown when an assignment already exists
    pub fn summary_json(&self) -> Value {
        json!({
            "assignment_id": self.id_hex(),
            "schools": self.schools.iter().map(SchoolEntry::to_json).collect::<Vec<_>>(),
            "schools_count": self.schools.len(),
            "created_by": self.controller_email,
            "created_at": iso(&self.created_at),
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "_id": self.id_hex(),
            "controller_email": self.controller_email,
            "trainer_email": self.trainer_email,
            "assignment_date": self.assignment_date,
            "schools": self.schools.iter().map(SchoolEntry::to_json).collect::<Vec<_>>(),
            "status": self.status,
            "created_at": iso(&self.created_at),
            "updated_at": iso(&self.updated_at),
            "last_status_update": iso(&self.last_status_update),
            "last_sync_update": iso(&self.last_sync_update),
        })
    }
}

impl IntoIndexes for AssignmentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Active-assignment lookup. Not unique: one trainer may hold
            // deleted assignments for the same date
            (
                doc! { "trainer_email": 1, "assignment_date": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("trainer_date_status_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "controller_email": 1, "assignment_date": -1 },
                Some(
                    IndexOptions::builder()
                        .name("controller_date_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutTimestamps for AssignmentDoc {
    fn stamp_created(&mut self, now: DateTime) {
        self.created_at = Some(now);
    }

    fn stamp_updated(&mut self, now: DateTime) {
        self.updated_at = Some(now);
    }
}
