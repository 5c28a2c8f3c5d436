//! In-memory store for tests and local development

use bson::{oid::ObjectId, DateTime};
use tokio::sync::RwLock;

use super::{
    sort_newest_first, AssignmentQuery, AssignmentStore, AuditCompletion, AuditQuery, AuditStore,
    MysteryAuditStore, SchoolsStamp, SortOrder, UserStore,
};
use crate::auth::Role;
use crate::db::schemas::{
    AssignmentDoc, AssignmentStatus, AuditDoc, AuditState, MysteryAuditDoc, SchoolEntry, UserDoc,
};
use crate::db::MutTimestamps;
use crate::reconcile::identity_key;
use crate::types::{FieldOpsError, Result};

/// Vec-backed store guarded by tokio RwLocks
#[derive(Default)]
pub struct MemoryStore {
    assignments: RwLock<Vec<AssignmentDoc>>,
    audits: RwLock<Vec<AuditDoc>>,
    mystery: RwLock<Vec<MysteryAuditDoc>>,
    users: RwLock<Vec<UserDoc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every assignment regardless of status
    pub async fn all_assignments(&self) -> Vec<AssignmentDoc> {
        self.assignments.read().await.clone()
    }
}

fn is_active(a: &AssignmentDoc) -> bool {
    a.status == AssignmentStatus::Active
}

#[async_trait::async_trait]
impl AssignmentStore for MemoryStore {
    async fn find_active(&self, trainer_email: &str, date: &str) -> Result<Option<AssignmentDoc>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .find(|a| is_active(a) && a.trainer_email == trainer_email && a.assignment_date == date)
            .cloned())
    }

    async fn find_active_by_id(&self, id: &ObjectId) -> Result<Option<AssignmentDoc>> {
        Ok(self
            .assignments
            .read()
            .await
            .iter()
            .find(|a| is_active(a) && a._id.as_ref() == Some(id))
            .cloned())
    }

    async fn insert_assignment(&self, mut doc: AssignmentDoc) -> Result<ObjectId> {
        let id = ObjectId::new();
        let now = DateTime::now();
        doc._id = Some(id);
        doc.stamp_created(now);
        doc.stamp_updated(now);
        self.assignments.write().await.push(doc);
        Ok(id)
    }

    async fn replace_assignment(&self, id: &ObjectId, mut doc: AssignmentDoc) -> Result<bool> {
        let mut assignments = self.assignments.write().await;
        match assignments.iter_mut().find(|a| a._id.as_ref() == Some(id)) {
            Some(slot) => {
                doc._id = Some(*id);
                doc.stamp_updated(DateTime::now());
                *slot = doc;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn write_schools(
        &self,
        id: &ObjectId,
        schools: &[SchoolEntry],
        stamp: SchoolsStamp,
    ) -> Result<bool> {
        let mut assignments = self.assignments.write().await;
        let Some(slot) = assignments
            .iter_mut()
            .find(|a| a._id.as_ref() == Some(id) && is_active(a))
        else {
            return Ok(false);
        };

        let now = DateTime::now();
        slot.schools = schools.to_vec();
        match stamp {
            SchoolsStamp::Edited => slot.updated_at = Some(now),
            SchoolsStamp::Synced => {
                slot.last_status_update = Some(now);
                slot.last_sync_update = Some(now);
            }
        }
        Ok(true)
    }

    async fn soft_delete_assignment(&self, id: &ObjectId) -> Result<bool> {
        let mut assignments = self.assignments.write().await;
        match assignments
            .iter_mut()
            .find(|a| a._id.as_ref() == Some(id) && is_active(a))
        {
            Some(slot) => {
                slot.status = AssignmentStatus::Deleted;
                slot.updated_at = Some(DateTime::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_assignments(&self, query: &AssignmentQuery) -> Result<Vec<AssignmentDoc>> {
        let mut found: Vec<AssignmentDoc> = self
            .assignments
            .read()
            .await
            .iter()
            .filter(|a| is_active(a) && query.matches(a))
            .cloned()
            .collect();

        // Stable sort keeps insertion order among equal dates
        found.sort_by(|a, b| a.assignment_date.cmp(&b.assignment_date));
        if query.order == SortOrder::Descending {
            found.reverse();
        }
        Ok(found)
    }
}

#[async_trait::async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit(&self, mut doc: AuditDoc) -> Result<ObjectId> {
        let id = ObjectId::new();
        let now = DateTime::now();
        doc._id = Some(id);
        doc.stamp_created(now);
        doc.stamp_updated(now);
        self.audits.write().await.push(doc);
        Ok(id)
    }

    async fn find_audit(&self, id: &ObjectId) -> Result<Option<AuditDoc>> {
        Ok(self
            .audits
            .read()
            .await
            .iter()
            .find(|a| a._id.as_ref() == Some(id))
            .cloned())
    }

    async fn find_audits_for_schools(
        &self,
        user_email: &str,
        schools: &[(String, String)],
    ) -> Result<Vec<AuditDoc>> {
        Ok(self
            .audits
            .read()
            .await
            .iter()
            .filter(|a| a.user_email == user_email)
            .filter(|a| {
                let key = identity_key(&a.school_name, &a.city);
                schools
                    .iter()
                    .any(|(name, city)| identity_key(name, city) == key)
            })
            .cloned()
            .collect())
    }

    async fn find_audits(&self, query: &AuditQuery) -> Result<Vec<AuditDoc>> {
        let mut found: Vec<AuditDoc> = self
            .audits
            .read()
            .await
            .iter()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn complete_audit(&self, id: &ObjectId, completion: AuditCompletion) -> Result<bool> {
        let mut audits = self.audits.write().await;
        let Some(audit) = audits
            .iter_mut()
            .find(|a| a._id.as_ref() == Some(id) && a.status == AuditState::InProgress)
        else {
            return Ok(false);
        };

        audit.status = AuditState::Completed;
        audit.completion_timestamp = Some(completion.completion_timestamp);
        audit.end_image_file_id = Some(completion.end_image_file_id);
        audit.sessions_completed = Some(completion.sessions_completed);
        audit.teacher_count = Some(completion.teacher_count);
        audit.auditor_remarks = Some(completion.auditor_remarks);
        audit.session_duration_minutes = Some(completion.session_duration_minutes);
        audit.completed_at = Some(completion.completed_at);
        audit.updated_at = Some(DateTime::now());
        Ok(true)
    }
}

#[async_trait::async_trait]
impl MysteryAuditStore for MemoryStore {
    async fn insert_mystery_audit(&self, mut doc: MysteryAuditDoc) -> Result<ObjectId> {
        let id = ObjectId::new();
        let now = DateTime::now();
        doc._id = Some(id);
        doc.stamp_created(now);
        doc.stamp_updated(now);
        self.mystery.write().await.push(doc);
        Ok(id)
    }

    async fn find_mystery_audit(&self, id: &ObjectId) -> Result<Option<MysteryAuditDoc>> {
        Ok(self
            .mystery
            .read()
            .await
            .iter()
            .find(|a| a._id.as_ref() == Some(id))
            .cloned())
    }

    async fn list_mystery_audits(
        &self,
        user_email: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<MysteryAuditDoc>> {
        let mut found: Vec<MysteryAuditDoc> = self
            .mystery
            .read()
            .await
            .iter()
            .filter(|a| a.user_email == user_email)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(found
            .into_iter()
            .skip(skip as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_mystery_audits(&self, user_email: &str, since: Option<DateTime>) -> Result<u64> {
        Ok(self
            .mystery
            .read()
            .await
            .iter()
            .filter(|a| a.user_email == user_email)
            .filter(|a| since.map_or(true, |s| a.created_at.map_or(false, |c| c >= s)))
            .count() as u64)
    }

    async fn total_staff_evaluated(&self, user_email: &str) -> Result<i64> {
        Ok(self
            .mystery
            .read()
            .await
            .iter()
            .filter(|a| a.user_email == user_email)
            .map(|a| a.staff_count)
            .sum())
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, email: &str) -> Result<Option<UserDoc>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert_user(&self, mut doc: UserDoc) -> Result<ObjectId> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == doc.email) {
            return Err(FieldOpsError::Conflict(format!(
                "User already exists: {}",
                doc.email
            )));
        }

        let id = ObjectId::new();
        let now = DateTime::now();
        doc._id = Some(id);
        doc.stamp_created(now);
        doc.stamp_updated(now);
        users.push(doc);
        Ok(id)
    }

    async fn find_field_workers(&self, controller_email: &str) -> Result<Vec<UserDoc>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| u.role == Role::FieldWorker)
            .filter(|u| u.controller_email.as_deref() == Some(controller_email))
            .cloned()
            .collect())
    }
}
