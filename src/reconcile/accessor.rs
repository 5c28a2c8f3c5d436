//! Assignment reads and writes used by the reconciler

use bson::oid::ObjectId;
use std::sync::Arc;
use tracing::debug;

use crate::db::schemas::{AssignmentDoc, SchoolEntry};
use crate::store::{AssignmentStore, SchoolsStamp};
use crate::types::{FieldOpsError, Result};

/// Thin layer over an [`AssignmentStore`]
#[derive(Clone)]
pub struct AssignmentAccessor {
    store: Arc<dyn AssignmentStore>,
}

impl AssignmentAccessor {
    pub fn new(store: Arc<dyn AssignmentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn AssignmentStore {
        self.store.as_ref()
    }

    /// Active assignment for (trainer, date), if any
    pub async fn find_active_assignment(
        &self,
        trainer_email: &str,
        date: &str,
    ) -> Result<Option<AssignmentDoc>> {
        self.store.find_active(trainer_email, date).await
    }

    /// Insert `record`, or replace `existing` in place keeping its id and
    /// created_at
    pub async fn upsert_assignment(
        &self,
        mut record: AssignmentDoc,
        existing: Option<&AssignmentDoc>,
    ) -> Result<ObjectId> {
        let Some(existing) = existing else {
            return self.store.insert_assignment(record).await;
        };

        let id = existing
            ._id
            .ok_or_else(|| FieldOpsError::Internal("Existing assignment has no id".into()))?;
        record.created_at = existing.created_at;

        if !self.store.replace_assignment(&id, record).await? {
            return Err(FieldOpsError::NotFound("Assignment not found".into()));
        }
        debug!(assignment_id = %id, "Assignment overwritten");
        Ok(id)
    }

    /// Replace the stored schools with reconciled ones
    pub async fn write_back_school_statuses(
        &self,
        id: &ObjectId,
        schools: &[SchoolEntry],
    ) -> Result<()> {
        if self
            .store
            .write_schools(id, schools, SchoolsStamp::Synced)
            .await?
        {
            Ok(())
        } else {
            Err(FieldOpsError::NotFound("Assignment not found".into()))
        }
    }
}
