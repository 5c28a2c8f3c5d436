//! Mystery audits and the controller's field-worker roster
//!
//! A mystery audit is submitted in one request, already complete. Photo
//! uploads follow the school-audit rule: a failure is recorded as a sentinel
//! and the record is still stored.

use bson::oid::ObjectId;
use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use super::audits::{parse_client_timestamp, upload_image, DISPLAY_TIMESTAMP_FORMAT};
use super::{float_field, normalize_email, str_field};
use crate::auth::Role;
use crate::blob::BlobStore;
use crate::db::schemas::{
    AuditState, GeoPoint, MysteryAuditDoc, StaffEvaluation, MYSTERY_AUDIT_TYPE,
};
use crate::store::{MysteryAuditStore, UserStore};
use crate::types::{FieldOpsError, Result};

const SUBMIT_FIELDS: &[&str] = &[
    "latitude",
    "longitude",
    "image",
    "timestamp",
    "user_email",
    "audit_type",
    "evaluations",
    "cityName",
];

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;

/// One page of a user's mystery audits
#[derive(Debug)]
pub struct MysteryAuditPage {
    pub audits: Vec<MysteryAuditDoc>,
    pub total_count: u64,
    pub page: u64,
    pub limit: u64,
    pub has_more: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct MysteryAuditStats {
    pub total_audits: u64,
    pub this_month: u64,
    pub total_staff_evaluated: i64,
    pub average_staff_per_audit: f64,
}

/// Field workers reporting to a controller
#[derive(Debug, Serialize)]
pub struct Roster {
    pub users: Vec<String>,
    pub count: usize,
    pub controller_email: String,
}

/// Required fields that are absent, null or empty strings
fn blank_fields(body: &Value) -> Vec<&'static str> {
    SUBMIT_FIELDS
        .iter()
        .copied()
        .filter(|field| match body.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => *field != "evaluations" && s.is_empty(),
            Some(_) => false,
        })
        .collect()
}

/// Scorecard with every field present and non-blank. `position` is 1-based.
fn parse_evaluation(position: usize, raw: &Value) -> Result<StaffEvaluation> {
    let mut fields = Map::new();
    for field in StaffEvaluation::FIELDS {
        let text = str_field(raw, field)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                FieldOpsError::BadRequest(format!(
                    "Evaluation {} is missing required field: {}",
                    position, field
                ))
            })?;
        fields.insert(field.to_string(), Value::String(text));
    }
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Positive integer query parameter; absent or blank takes the default
fn positive_param(raw: Option<&str>, name: &str, default: u64) -> Result<u64> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                FieldOpsError::BadRequest(format!("{} must be a positive integer", name))
            }),
    }
}

/// Midnight UTC on the first day of `now`'s month
fn month_start(now: DateTime<Utc>) -> bson::DateTime {
    let first = now.date_naive().with_day(1).unwrap_or_else(|| now.date_naive());
    bson::DateTime::from_chrono(first.and_time(NaiveTime::MIN).and_utc())
}

#[derive(Clone)]
pub struct MysteryAuditService {
    audits: Arc<dyn MysteryAuditStore>,
    users: Arc<dyn UserStore>,
    blobs: Arc<dyn BlobStore>,
    tz: FixedOffset,
}

impl MysteryAuditService {
    pub fn new(
        audits: Arc<dyn MysteryAuditStore>,
        users: Arc<dyn UserStore>,
        blobs: Arc<dyn BlobStore>,
        tz: FixedOffset,
    ) -> Self {
        Self {
            audits,
            users,
            blobs,
            tz,
        }
    }

    /// Validate and store a completed mystery audit
    pub async fn submit(&self, body: &Value) -> Result<MysteryAuditDoc> {
        let blank = blank_fields(body);
        if !blank.is_empty() {
            return Err(FieldOpsError::BadRequest(format!(
                "Missing or invalid required fields: {}",
                blank.join(", ")
            )));
        }

        let audit_type = str_field(body, "audit_type").unwrap_or_default();
        if !audit_type.trim().eq_ignore_ascii_case(MYSTERY_AUDIT_TYPE) {
            return Err(FieldOpsError::BadRequest(format!(
                "Invalid audit_type: {}. Must be {}",
                audit_type, MYSTERY_AUDIT_TYPE
            )));
        }

        let raw_evaluations = body
            .get("evaluations")
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| {
                FieldOpsError::BadRequest("At least one staff evaluation is required".into())
            })?;
        let evaluations = raw_evaluations
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_evaluation(i + 1, raw))
            .collect::<Result<Vec<_>>>()?;

        let raw_ts = str_field(body, "timestamp").unwrap_or_default();
        let local = parse_client_timestamp(&raw_ts, &self.tz)
            .ok_or_else(|| FieldOpsError::BadRequest("Invalid timestamp format".into()))?;

        let location = GeoPoint {
            latitude: float_field(body, "latitude")?,
            longitude: float_field(body, "longitude")?,
        };
        let user_email = normalize_email(&str_field(body, "user_email").unwrap_or_default());
        let city_name = str_field(body, "cityName").unwrap_or_default();
        let image = str_field(body, "image").unwrap_or_default();

        let image_file_id =
            upload_image(self.blobs.as_ref(), &image, &user_email, "mystery_audit", &local).await;

        let mut doc = MysteryAuditDoc {
            _id: None,
            user_email: user_email.clone(),
            location: Some(location),
            city_name,
            image_file_id,
            timestamp: local.format(DISPLAY_TIMESTAMP_FORMAT).to_string(),
            audit_type: MYSTERY_AUDIT_TYPE.to_string(),
            staff_count: evaluations.len() as i64,
            evaluations,
            status: AuditState::Completed,
            created_at: None,
            updated_at: None,
        };
        let id = self.audits.insert_mystery_audit(doc.clone()).await?;
        doc._id = Some(id);

        info!(
            record_id = %id,
            user = %user_email,
            city = %doc.city_name,
            staff = doc.staff_count,
            "Mystery audit submitted"
        );

        Ok(doc)
    }

    pub async fn find(&self, raw_id: &str) -> Result<MysteryAuditDoc> {
        let id = ObjectId::parse_str(raw_id.trim())
            .map_err(|_| FieldOpsError::BadRequest("Invalid record id".into()))?;
        self.audits
            .find_mystery_audit(&id)
            .await?
            .ok_or_else(|| FieldOpsError::NotFound("Record not found".into()))
    }

    /// Newest-first page; `page` and `limit` are raw query values
    pub async fn list(
        &self,
        user_email: &str,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<MysteryAuditPage> {
        let page = positive_param(page, "page", 1)?;
        let limit = positive_param(limit, "limit", DEFAULT_PAGE_SIZE)?.min(MAX_PAGE_SIZE);
        let skip = (page - 1).saturating_mul(limit);
        let user_email = normalize_email(user_email);

        let audits = self
            .audits
            .list_mystery_audits(&user_email, skip, limit as i64)
            .await?;
        let total_count = self.audits.count_mystery_audits(&user_email, None).await?;

        Ok(MysteryAuditPage {
            audits,
            total_count,
            page,
            limit,
            has_more: skip.saturating_add(limit) < total_count,
        })
    }

    pub async fn stats(&self, user_email: &str, now: DateTime<Utc>) -> Result<MysteryAuditStats> {
        let user_email = normalize_email(user_email);
        let total_audits = self.audits.count_mystery_audits(&user_email, None).await?;
        let this_month = self
            .audits
            .count_mystery_audits(&user_email, Some(month_start(now)))
            .await?;
        let total_staff_evaluated = self.audits.total_staff_evaluated(&user_email).await?;

        let average_staff_per_audit = if total_audits == 0 {
            0.0
        } else {
            (total_staff_evaluated as f64 * 10.0 / total_audits as f64).round() / 10.0
        };

        Ok(MysteryAuditStats {
            total_audits,
            this_month,
            total_staff_evaluated,
            average_staff_per_audit,
        })
    }

    /// Emails of the field workers a controller manages
    pub async fn roster(&self, controller_email: Option<&str>) -> Result<Roster> {
        let controller_email = match controller_email.map(str::trim) {
            Some(e) if !e.is_empty() && !e.eq_ignore_ascii_case("null") => normalize_email(e),
            _ => {
                return Err(FieldOpsError::BadRequest(
                    "Missing or invalid controllerEmail parameter".into(),
                ))
            }
        };

        match self.users.find_user(&controller_email).await? {
            Some(user) if user.role == Role::Controller => {}
            _ => return Err(FieldOpsError::NotFound("Controller not found".into())),
        }

        let users: Vec<String> = self
            .users
            .find_field_workers(&controller_email)
            .await?
            .into_iter()
            .map(|u| u.email)
            .collect();

        Ok(Roster {
            count: users.len(),
            users,
            controller_email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{MemoryBlobStore, UnavailableBlobStore};
    use crate::db::schemas::{UserDoc, UPLOAD_FAILED_PREFIX};
    use crate::store::MemoryStore;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use chrono::TimeZone;
    use serde_json::json;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn setup() -> (MysteryAuditService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = MysteryAuditService::new(
            store.clone(),
            store.clone(),
            Arc::new(MemoryBlobStore::new()),
            ist(),
        );
        (service, store)
    }

    fn evaluation(promoter: &str) -> Value {
        let mut eval = Map::new();
        for field in StaffEvaluation::FIELDS {
            eval.insert(field.to_string(), json!("Good"));
        }
        eval.insert("promoterName".into(), json!(promoter));
        eval.insert("storeCode".into(), json!(1042));
        Value::Object(eval)
    }

    fn submit_body() -> Value {
        json!({
            "latitude": 19.07,
            "longitude": 72.87,
            "image": STANDARD.encode(b"\xff\xd8\xff\xe0outlet"),
            "timestamp": "2026-10-18T14:05:00",
            "user_email": "Trainer@Example.com",
            "audit_type": " Mystery_Audit ",
            "evaluations": [evaluation("Asha"), evaluation("Ravi")],
            "cityName": "Mumbai"
        })
    }

    #[tokio::test]
    async fn test_submit_stores_completed_record() {
        let (service, store) = setup();
        let doc = service.submit(&submit_body()).await.unwrap();

        assert_eq!(doc.staff_count, 2);
        assert_eq!(doc.timestamp, "18 Oct 2026, 02:05 PM IST");
        assert_eq!(doc.audit_type, "mystery_audit");

        let stored = store.find_mystery_audit(&doc._id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.user_email, "trainer@example.com");
        assert_eq!(stored.status, AuditState::Completed);
        assert_eq!(stored.evaluations[1].promoter_name, "Ravi");
        assert_eq!(stored.evaluations[0].store_code, "1042");
        assert!(stored.image_url("http://h").is_some());
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (service, _) = setup();

        let mut body = submit_body();
        body["image"] = json!("");
        body["cityName"] = Value::Null;
        let err = service.submit(&body).await.unwrap_err();
        assert_eq!(
            err.public_message(),
            "Missing or invalid required fields: image, cityName"
        );

        let mut body = submit_body();
        body["audit_type"] = json!("school_audit");
        let err = service.submit(&body).await.unwrap_err();
        assert_eq!(
            err.public_message(),
            "Invalid audit_type: school_audit. Must be mystery_audit"
        );

        let mut body = submit_body();
        body["evaluations"] = json!([]);
        let err = service.submit(&body).await.unwrap_err();
        assert_eq!(err.public_message(), "At least one staff evaluation is required");

        let mut body = submit_body();
        body["evaluations"][1]["crossSelling"] = json!("  ");
        let err = service.submit(&body).await.unwrap_err();
        assert_eq!(
            err.public_message(),
            "Evaluation 2 is missing required field: crossSelling"
        );
    }

    #[tokio::test]
    async fn test_submit_survives_upload_failure() {
        let store = Arc::new(MemoryStore::new());
        let service =
            MysteryAuditService::new(store.clone(), store, Arc::new(UnavailableBlobStore), ist());

        let doc = service.submit(&submit_body()).await.unwrap();
        assert!(doc.image_file_id.starts_with(UPLOAD_FAILED_PREFIX));
        assert!(doc.image_url("http://h").is_none());
    }

    #[tokio::test]
    async fn test_find_by_id() {
        let (service, _) = setup();
        let doc = service.submit(&submit_body()).await.unwrap();

        let found = service.find(&doc.id_hex()).await.unwrap();
        assert_eq!(found.city_name, "Mumbai");
        assert_eq!(service.find("nope").await.unwrap_err().status_code(), 400);
        assert_eq!(
            service.find(&ObjectId::new().to_hex()).await.unwrap_err().status_code(),
            404
        );
    }

    #[tokio::test]
    async fn test_list_pages() {
        let (service, _) = setup();
        for _ in 0..3 {
            service.submit(&submit_body()).await.unwrap();
        }

        let first = service.list("trainer@example.com", None, Some("2")).await.unwrap();
        assert_eq!(first.audits.len(), 2);
        assert_eq!(first.total_count, 3);
        assert!(first.has_more);

        let second = service
            .list("trainer@example.com", Some("2"), Some("2"))
            .await
            .unwrap();
        assert_eq!(second.audits.len(), 1);
        assert!(!second.has_more);

        assert!(service.list("trainer@example.com", Some("0"), None).await.is_err());
        assert!(service.list("trainer@example.com", None, Some("x")).await.is_err());

        let capped = service.list("trainer@example.com", None, Some("500")).await.unwrap();
        assert_eq!(capped.limit, 100);
    }

    #[tokio::test]
    async fn test_stats() {
        let (service, store) = setup();
        service.submit(&submit_body()).await.unwrap();

        let mut single = submit_body();
        single["evaluations"] = json!([evaluation("Meena")]);
        service.submit(&single).await.unwrap();

        // Backdate one record to the previous month
        store
            .insert_mystery_audit(MysteryAuditDoc {
                user_email: "trainer@example.com".into(),
                staff_count: 4,
                created_at: Some(bson::DateTime::from_chrono(
                    Utc.with_ymd_and_hms(2026, 9, 30, 23, 0, 0).unwrap(),
                )),
                ..Default::default()
            })
            .await
            .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let stats = service.stats("trainer@example.com", now).await.unwrap();
        assert_eq!(stats.total_audits, 3);
        assert_eq!(stats.total_staff_evaluated, 7);
        assert_eq!(stats.average_staff_per_audit, 2.3);

        let empty = service.stats("nobody@example.com", now).await.unwrap();
        assert_eq!(empty.total_audits, 0);
        assert_eq!(empty.average_staff_per_audit, 0.0);
    }

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap();
        let start = month_start(now).to_chrono();
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_roster() {
        let (service, store) = setup();
        store
            .insert_user(UserDoc::new("c@example.com", "h".into(), Role::Controller))
            .await
            .unwrap();
        store
            .insert_user(UserDoc::new("lone@example.com", "h".into(), Role::FieldWorker))
            .await
            .unwrap();
        let mut worker = UserDoc::new("w@example.com", "h".into(), Role::FieldWorker);
        worker.controller_email = Some("c@example.com".into());
        store.insert_user(worker).await.unwrap();

        let roster = service.roster(Some(" C@example.com ")).await.unwrap();
        assert_eq!(roster.users, vec!["w@example.com"]);
        assert_eq!(roster.count, 1);
        assert_eq!(roster.controller_email, "c@example.com");

        assert_eq!(service.roster(Some("null")).await.unwrap_err().status_code(), 400);
        assert_eq!(service.roster(None).await.unwrap_err().status_code(), 400);
        assert_eq!(
            service.roster(Some("lone@example.com")).await.unwrap_err().status_code(),
            404
        );
    }
}
