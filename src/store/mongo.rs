//! MongoDB-backed store

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::options::{Collation, CollationStrength, FindOptions};

use super::{
    AssignmentQuery, AssignmentStore, AuditCompletion, AuditQuery, AuditStore, MysteryAuditStore,
    SchoolsStamp, SortOrder, UserStore,
};
use crate::auth::Role;
use crate::db::schemas::{
    AssignmentDoc, AuditDoc, AuditState, MysteryAuditDoc, SchoolEntry, UserDoc,
    ASSIGNMENT_COLLECTION, AUDIT_COLLECTION, MYSTERY_AUDIT_COLLECTION, USER_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{FieldOpsError, Result};

/// Store over the fieldops collections
#[derive(Clone)]
pub struct MongoStore {
    assignments: MongoCollection<AssignmentDoc>,
    audits: MongoCollection<AuditDoc>,
    mystery: MongoCollection<MysteryAuditDoc>,
    users: MongoCollection<UserDoc>,
}

impl MongoStore {
    /// Open collections and apply their indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            assignments: mongo.collection(ASSIGNMENT_COLLECTION).await?,
            audits: mongo.collection(AUDIT_COLLECTION).await?,
            mystery: mongo.collection(MYSTERY_AUDIT_COLLECTION).await?,
            users: mongo.collection(USER_COLLECTION).await?,
        })
    }
}

/// Writes never touch a soft-deleted assignment
fn active_by_id(id: &ObjectId) -> Document {
    doc! { "_id": id, "status": "active" }
}

fn assignment_filter(query: &AssignmentQuery) -> Document {
    let mut filter = doc! { "status": "active" };
    if let Some(trainer) = &query.trainer_email {
        filter.insert("trainer_email", trainer);
    }
    if let Some(controller) = &query.controller_email {
        filter.insert("controller_email", controller);
    }

    let mut range = Document::new();
    if let Some(from) = &query.date_from {
        range.insert("$gte", from);
    }
    if let Some(to) = &query.date_to {
        range.insert("$lte", to);
    }
    if let Some(before) = &query.date_before {
        range.insert("$lt", before);
    }
    if !range.is_empty() {
        filter.insert("assignment_date", range);
    }
    filter
}

fn audit_filter(query: &AuditQuery) -> Document {
    let mut filter = doc! { "user_email": &query.user_email };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(date) = &query.audit_date {
        filter.insert("audit_date", date);
    }
    if let Some(name) = &query.school_name {
        filter.insert("school_name", name);
    }
    if let Some(city) = &query.city {
        filter.insert("city", city);
    }
    filter
}

#[async_trait::async_trait]
impl AssignmentStore for MongoStore {
    async fn find_active(&self, trainer_email: &str, date: &str) -> Result<Option<AssignmentDoc>> {
        self.assignments
            .find_one(doc! {
                "trainer_email": trainer_email,
                "assignment_date": date,
                "status": "active",
            })
            .await
    }

    async fn find_active_by_id(&self, id: &ObjectId) -> Result<Option<AssignmentDoc>> {
        self.assignments
            .find_one(doc! { "_id": id, "status": "active" })
            .await
    }

    async fn insert_assignment(&self, doc: AssignmentDoc) -> Result<ObjectId> {
        self.assignments.insert_one(doc).await
    }

    async fn replace_assignment(&self, id: &ObjectId, mut doc: AssignmentDoc) -> Result<bool> {
        doc._id = Some(*id);
        let result = self.assignments.replace_one(*id, doc).await?;
        Ok(result.matched_count > 0)
    }

    async fn write_schools(
        &self,
        id: &ObjectId,
        schools: &[SchoolEntry],
        stamp: SchoolsStamp,
    ) -> Result<bool> {
        let now = DateTime::now();
        let mut set = doc! { "schools": bson::to_bson(schools)? };
        match stamp {
            SchoolsStamp::Edited => {
                set.insert("updated_at", now);
            }
            SchoolsStamp::Synced => {
                set.insert("last_status_update", now);
                set.insert("last_sync_update", now);
            }
        }

        let result = self
            .assignments
            .update_one(active_by_id(id), doc! { "$set": set })
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn soft_delete_assignment(&self, id: &ObjectId) -> Result<bool> {
        let result = self
            .assignments
            .update_one(
                active_by_id(id),
                doc! { "$set": { "status": "deleted", "updated_at": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn find_assignments(&self, query: &AssignmentQuery) -> Result<Vec<AssignmentDoc>> {
        let direction = match query.order {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        };
        self.assignments
            .find_many(assignment_filter(query), Some(doc! { "assignment_date": direction }))
            .await
    }
}

#[async_trait::async_trait]
impl AuditStore for MongoStore {
    async fn insert_audit(&self, doc: AuditDoc) -> Result<ObjectId> {
        self.audits.insert_one(doc).await
    }

    async fn find_audit(&self, id: &ObjectId) -> Result<Option<AuditDoc>> {
        self.audits.find_one(doc! { "_id": id }).await
    }

    async fn find_audits_for_schools(
        &self,
        user_email: &str,
        schools: &[(String, String)],
    ) -> Result<Vec<AuditDoc>> {
        use futures_util::TryStreamExt;

        // $or with an empty array is rejected by the server
        if schools.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<Document> = schools
            .iter()
            .map(|(name, city)| doc! { "school_name": name, "city": city })
            .collect();

        // Strength 2 compares case-insensitively
        let options = FindOptions::builder()
            .collation(
                Collation::builder()
                    .locale("en".to_string())
                    .strength(CollationStrength::Secondary)
                    .build(),
            )
            .build();

        let cursor = self
            .audits
            .inner()
            .find(doc! { "user_email": user_email, "$or": pairs })
            .with_options(options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn find_audits(&self, query: &AuditQuery) -> Result<Vec<AuditDoc>> {
        self.audits
            .find_many(audit_filter(query), Some(doc! { "created_at": -1 }))
            .await
    }

    async fn complete_audit(&self, id: &ObjectId, completion: AuditCompletion) -> Result<bool> {
        let result = self
            .audits
            .update_one(
                doc! { "_id": id, "status": AuditState::InProgress.as_str() },
                doc! {
                    "$set": {
                        "status": AuditState::Completed.as_str(),
                        "completion_timestamp": completion.completion_timestamp,
                        "end_image_file_id": completion.end_image_file_id,
                        "sessions_completed": completion.sessions_completed,
                        "teacher_count": completion.teacher_count,
                        "auditor_remarks": completion.auditor_remarks,
                        "session_duration_minutes": completion.session_duration_minutes,
                        "completed_at": completion.completed_at,
                        "updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}

fn mystery_filter(user_email: &str, since: Option<DateTime>) -> Document {
    let mut filter = doc! { "user_email": user_email };
    if let Some(since) = since {
        filter.insert("created_at", doc! { "$gte": since });
    }
    filter
}

#[async_trait::async_trait]
impl MysteryAuditStore for MongoStore {
    async fn insert_mystery_audit(&self, doc: MysteryAuditDoc) -> Result<ObjectId> {
        self.mystery.insert_one(doc).await
    }

    async fn find_mystery_audit(&self, id: &ObjectId) -> Result<Option<MysteryAuditDoc>> {
        self.mystery.find_one(doc! { "_id": id }).await
    }

    async fn list_mystery_audits(
        &self,
        user_email: &str,
        skip: u64,
        limit: i64,
    ) -> Result<Vec<MysteryAuditDoc>> {
        use futures_util::TryStreamExt;

        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .skip(skip)
            .limit(limit)
            .build();

        let cursor = self
            .mystery
            .inner()
            .find(mystery_filter(user_email, None))
            .with_options(options)
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn count_mystery_audits(&self, user_email: &str, since: Option<DateTime>) -> Result<u64> {
        Ok(self
            .mystery
            .inner()
            .count_documents(mystery_filter(user_email, since))
            .await?)
    }

    async fn total_staff_evaluated(&self, user_email: &str) -> Result<i64> {
        use futures_util::TryStreamExt;

        let pipeline = vec![
            doc! { "$match": { "user_email": user_email } },
            doc! { "$group": { "_id": Bson::Null, "total": { "$sum": "$staff_count" } } },
        ];
        let mut cursor = self.mystery.inner().aggregate(pipeline).await?;

        // $sum yields int32 or int64 depending on magnitude
        Ok(match cursor.try_next().await? {
            Some(group) => match group.get("total") {
                Some(Bson::Int32(n)) => i64::from(*n),
                Some(Bson::Int64(n)) => *n,
                Some(Bson::Double(n)) => *n as i64,
                _ => 0,
            },
            None => 0,
        })
    }
}

#[async_trait::async_trait]
impl UserStore for MongoStore {
    async fn find_user(&self, email: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "email": email }).await
    }

    async fn insert_user(&self, doc: UserDoc) -> Result<ObjectId> {
        let email = doc.email.clone();
        self.users.insert_one(doc).await.map_err(|e| match e {
            FieldOpsError::Conflict(_) => {
                FieldOpsError::Conflict(format!("User already exists: {}", email))
            }
            other => other,
        })
    }

    async fn find_field_workers(&self, controller_email: &str) -> Result<Vec<UserDoc>> {
        self.users
            .find_many(
                doc! {
                    "role": Role::FieldWorker.to_string(),
                    "controller_email": controller_email,
                },
                Some(doc! { "email": 1 }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_filter_ranges() {
        let filter = assignment_filter(&AssignmentQuery {
            trainer_email: Some("t@example.com".into()),
            date_from: Some("2026-10-11".into()),
            date_to: Some("2026-10-18".into()),
            ..Default::default()
        });
        assert_eq!(filter.get_str("status").unwrap(), "active");
        assert_eq!(filter.get_str("trainer_email").unwrap(), "t@example.com");
        let range = filter.get_document("assignment_date").unwrap();
        assert_eq!(range.get_str("$gte").unwrap(), "2026-10-11");
        assert_eq!(range.get_str("$lte").unwrap(), "2026-10-18");
    }

    #[test]
    fn test_active_by_id_excludes_deleted() {
        let id = ObjectId::new();
        let filter = active_by_id(&id);
        assert_eq!(filter.get_object_id("_id").unwrap(), id);
        assert_eq!(filter.get_str("status").unwrap(), "active");
    }

    #[test]
    fn test_assignment_filter_without_dates() {
        let filter = assignment_filter(&AssignmentQuery::default());
        assert!(filter.get("assignment_date").is_none());
    }

    #[test]
    fn test_mystery_filter_since() {
        assert!(mystery_filter("t@example.com", None).get("created_at").is_none());

        let since = DateTime::from_millis(1_000);
        let filter = mystery_filter("t@example.com", Some(since));
        let range = filter.get_document("created_at").unwrap();
        assert_eq!(range.get_datetime("$gte").unwrap(), &since);
    }

    #[test]
    fn test_audit_filter_status() {
        let filter = audit_filter(&AuditQuery {
            user_email: "t@example.com".into(),
            status: Some(AuditState::InProgress),
            ..Default::default()
        });
        assert_eq!(filter.get_str("status").unwrap(), "in_progress");
        assert!(filter.get("audit_date").is_none());
    }
}
