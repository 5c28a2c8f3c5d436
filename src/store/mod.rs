//! Store traits for assignments, audits, mystery audits and users
//!
//! Services only see these traits. `MongoStore` backs production,
//! `MemoryStore` backs tests and dev mode without a database.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use bson::{oid::ObjectId, DateTime};
use std::sync::Arc;

use crate::db::schemas::{
    AssignmentDoc, AuditDoc, AuditState, MysteryAuditDoc, SchoolEntry, UserDoc,
};
use crate::types::Result;

/// Ordering of assignment results by assignment_date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter over active assignments. Dates are "YYYY-MM-DD" strings, which
/// order lexicographically.
#[derive(Debug, Clone, Default)]
pub struct AssignmentQuery {
    pub trainer_email: Option<String>,
    pub controller_email: Option<String>,
    /// Inclusive lower bound
    pub date_from: Option<String>,
    /// Inclusive upper bound
    pub date_to: Option<String>,
    /// Exclusive upper bound
    pub date_before: Option<String>,
    pub order: SortOrder,
}

impl AssignmentQuery {
    pub(crate) fn matches(&self, a: &AssignmentDoc) -> bool {
        let date = a.assignment_date.as_str();
        self.trainer_email.as_deref().map_or(true, |t| a.trainer_email == t)
            && self.controller_email.as_deref().map_or(true, |c| a.controller_email == c)
            && self.date_from.as_deref().map_or(true, |d| date >= d)
            && self.date_to.as_deref().map_or(true, |d| date <= d)
            && self.date_before.as_deref().map_or(true, |d| date < d)
    }
}

/// Which timestamps a schools rewrite stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchoolsStamp {
    /// Controller edit: updated_at
    Edited,
    /// Reconciled statuses: last_status_update and last_sync_update
    Synced,
}

/// Filter over audits; results are newest first by created_at
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub user_email: String,
    pub status: Option<AuditState>,
    /// Display date, "%d %b %Y"
    pub audit_date: Option<String>,
    pub school_name: Option<String>,
    pub city: Option<String>,
}

impl AuditQuery {
    pub(crate) fn matches(&self, a: &AuditDoc) -> bool {
        a.user_email == self.user_email
            && self.status.map_or(true, |s| a.status == s)
            && self.audit_date.as_deref().map_or(true, |d| a.audit_date == d)
            && self.school_name.as_deref().map_or(true, |s| a.school_name == s)
            && self.city.as_deref().map_or(true, |c| a.city == c)
    }
}

/// Fields written when an audit is completed
#[derive(Debug, Clone)]
pub struct AuditCompletion {
    pub completion_timestamp: String,
    pub end_image_file_id: String,
    pub sessions_completed: i64,
    pub teacher_count: i64,
    pub auditor_remarks: String,
    pub session_duration_minutes: i64,
    pub completed_at: DateTime,
}

/// Persistence for school assignments
#[async_trait::async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Active assignment for (trainer, date)
    async fn find_active(&self, trainer_email: &str, date: &str) -> Result<Option<AssignmentDoc>>;

    /// Active assignment by id
    async fn find_active_by_id(&self, id: &ObjectId) -> Result<Option<AssignmentDoc>>;

    /// Insert, stamping created_at/updated_at
    async fn insert_assignment(&self, doc: AssignmentDoc) -> Result<ObjectId>;

    /// Replace the whole document in place; false when the id is unknown
    async fn replace_assignment(&self, id: &ObjectId, doc: AssignmentDoc) -> Result<bool>;

    /// Replace the schools sequence; false when the id is unknown
    async fn write_schools(
        &self,
        id: &ObjectId,
        schools: &[SchoolEntry],
        stamp: SchoolsStamp,
    ) -> Result<bool>;

    /// Mark deleted; false when missing or already deleted
    async fn soft_delete_assignment(&self, id: &ObjectId) -> Result<bool>;

    /// Active assignments matching the query
    async fn find_assignments(&self, query: &AssignmentQuery) -> Result<Vec<AssignmentDoc>>;
}

/// Persistence for school audits
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit(&self, doc: AuditDoc) -> Result<ObjectId>;

    async fn find_audit(&self, id: &ObjectId) -> Result<Option<AuditDoc>>;

    /// Every audit by `user_email` at any of the (school_name, city) pairs.
    /// Names compare case-insensitively. Order is unspecified.
    async fn find_audits_for_schools(
        &self,
        user_email: &str,
        schools: &[(String, String)],
    ) -> Result<Vec<AuditDoc>>;

    /// Audits matching the query, newest first
    async fn find_audits(&self, query: &AuditQuery) -> Result<Vec<AuditDoc>>;

    /// Complete an in-progress audit; false when it is not in progress
    async fn complete_audit(&self, id: &ObjectId, completion: AuditCompletion) -> Result<bool>;
}

/// Persistence for mystery audits
#[async_trait::async_trait]
pub trait MysteryAuditStore: Send + Sync {
    async fn insert_mystery_audit(&self, doc: MysteryAuditDoc) -> Result<ObjectId>;

    async fn find_mystery_audit(&self, id: &ObjectId) -> Result<Option<MysteryAuditDoc>>;

    /// One page of a user's records, newest first
    async fn list_mystery_audits(
        &self,
        user_email: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<MysteryAuditDoc>>;

    /// Records by the user, optionally only those created at or after `since`
    async fn count_mystery_audits(&self, user_email: &str, since: Option<DateTime>) -> Result<u64>;

    /// Sum of staff_count over the user's records
    async fn total_staff_evaluated(&self, user_email: &str) -> Result<i64>;
}

/// Persistence for user accounts
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup by (lowercase) email
    async fn find_user(&self, email: &str) -> Result<Option<UserDoc>>;

    /// Insert; `Conflict` when the email is taken
    async fn insert_user(&self, doc: UserDoc) -> Result<ObjectId>;

    /// Field workers whose controller_email matches
    async fn find_field_workers(&self, controller_email: &str) -> Result<Vec<UserDoc>>;
}

/// The stores a request handler needs
#[derive(Clone)]
pub struct Stores {
    pub assignments: Arc<dyn AssignmentStore>,
    pub audits: Arc<dyn AuditStore>,
    pub mystery: Arc<dyn MysteryAuditStore>,
    pub users: Arc<dyn UserStore>,
    /// "mongodb" or "memory"
    pub backend: &'static str,
}

impl Stores {
    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Self {
            assignments: store.clone(),
            audits: store.clone(),
            mystery: store.clone(),
            users: store,
            backend: "mongodb",
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            assignments: store.clone(),
            audits: store.clone(),
            mystery: store.clone(),
            users: store,
            backend: "memory",
        }
    }
}

/// Newest first by created_at; undated records sort last
pub(crate) fn sort_newest_first(audits: &mut [AuditDoc]) {
    audits.sort_by(|a, b| match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_query_bounds() {
        let a = AssignmentDoc::new("c".into(), "t".into(), "2026-10-18".into(), vec![]);

        let q = AssignmentQuery {
            date_from: Some("2026-10-18".into()),
            date_to: Some("2026-10-18".into()),
            ..Default::default()
        };
        assert!(q.matches(&a));

        let q = AssignmentQuery {
            date_before: Some("2026-10-18".into()),
            ..Default::default()
        };
        assert!(!q.matches(&a));

        let q = AssignmentQuery {
            trainer_email: Some("other".into()),
            ..Default::default()
        };
        assert!(!q.matches(&a));
    }

    #[test]
    fn test_sort_newest_first_puts_undated_last() {
        let mk = |ms: Option<i64>| AuditDoc {
            created_at: ms.map(DateTime::from_millis),
            ..Default::default()
        };
        let mut audits = vec![mk(None), mk(Some(1_000)), mk(Some(5_000))];
        sort_newest_first(&mut audits);

        let order: Vec<_> = audits.iter().map(|a| a.created_at.map(|d| d.timestamp_millis())).collect();
        assert_eq!(order, vec![Some(5_000), Some(1_000), None]);
    }
}
