//! School audit workflow
//!
//! A trainer starts an audit on arrival (location, photo, enabled sessions)
//! and ends it on departure. Photos go to the blob store; a failed upload is
//! stored as an `UPLOAD_FAILED: <reason>` sentinel and never aborts the audit.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bson::oid::ObjectId;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{float_field, int_field, normalize_email, parse_date, require_fields, str_field};
use crate::blob::BlobStore;
use crate::db::schemas::{AuditDoc, AuditState, GeoPoint, SessionRecord, UPLOAD_FAILED_PREFIX};
use crate::reconcile::{parse_audit_date, AUDIT_DATE_FORMAT};
use crate::store::{AuditCompletion, AuditQuery, AuditStore};
use crate::types::{FieldOpsError, Result};

/// Display format of start/completion timestamps
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%d %b %Y, %I:%M %p IST";

const START_FIELDS: &[&str] = &[
    "latitude",
    "longitude",
    "school_name",
    "city",
    "start_image",
    "timestamp",
    "user_email",
    "promoters_count",
    "sessions",
];

const END_FIELDS: &[&str] = &[
    "audit_id",
    "end_image",
    "timestamp",
    "sessions_completed",
    "teacher_count",
    "auditor_remarks",
];

/// Per-session photo slots: (request/storage key, filename tag)
const SESSION_PHOTOS: &[(&str, &str)] = &[
    ("startSelfie", "start_selfie"),
    ("endSelfie", "end_selfie"),
    ("winnerPhoto", "winner"),
    ("sachetDistributionPhoto", "distribution"),
];

#[derive(Debug, Serialize)]
pub struct StartResult {
    pub message: String,
    pub audit_id: String,
    pub school_name: String,
    pub start_time: String,
    pub total_students: i64,
    pub sessions_enabled: usize,
}

#[derive(Debug, Serialize)]
pub struct EndResult {
    pub message: String,
    pub audit_id: String,
    pub school_name: String,
    pub duration_minutes: i64,
    pub end_time: String,
}

/// Aggregate figures over a trainer's audits
#[derive(Debug, Default, Serialize)]
pub struct AuditSummary {
    pub total_audits: usize,
    pub completed_audits: usize,
    pub in_progress_audits: usize,
    pub completion_rate: f64,
    pub total_students_reached: i64,
    pub total_sachets_distributed: i64,
    pub total_sessions_completed: i64,
    pub unique_schools_visited: usize,
    pub unique_cities_covered: usize,
    pub average_students_per_audit: f64,
    /// Over completed audits
    pub average_session_minutes: f64,
    pub schools_list: Vec<String>,
    pub cities_list: Vec<String>,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// ISO-8601 timestamp from the client. Naive values are business-local.
pub fn parse_client_timestamp(raw: &str, tz: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).single())
}

/// Minutes between the clock times of two display timestamps. An end time
/// earlier than the start is taken to be past midnight. Unparseable input
/// gives 0.
pub fn duration_minutes(start_display: &str, end_display: &str) -> i64 {
    fn clock(display: &str) -> Option<NaiveTime> {
        let time = display.split(',').nth(1)?.trim();
        let time = time.strip_suffix("IST").unwrap_or(time).trim();
        NaiveTime::parse_from_str(time, "%I:%M %p").ok()
    }

    match (clock(start_display), clock(end_display)) {
        (Some(start), Some(end)) => {
            let minutes = (end - start).num_minutes();
            if minutes < 0 {
                minutes + 24 * 60
            } else {
                minutes
            }
        }
        _ => {
            warn!(start = %start_display, end = %end_display, "Could not compute audit duration");
            0
        }
    }
}

/// Raw bytes from a base64 string or a `data:` URL
fn decode_image(raw: &str) -> Result<Bytes> {
    let raw = raw.trim();
    let payload = match raw.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| FieldOpsError::BadRequest("Malformed data URL".into()))?,
        None => raw,
    };
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| FieldOpsError::BadRequest(format!("Invalid base64 image: {}", e)))?;
    Ok(Bytes::from(bytes))
}

/// `{email with @ and . replaced}_{kind}_{YYYYmmdd_HHMMSS}_{8 hex}.jpg`
fn image_filename(user_email: &str, kind: &str, at: &DateTime<FixedOffset>) -> String {
    let sanitized = user_email.replace(['@', '.'], "_");
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}.jpg",
        sanitized,
        kind,
        at.format("%Y%m%d_%H%M%S"),
        &unique[..8]
    )
}

/// Upload one photo, returning its file id or a failure sentinel
pub(super) async fn upload_image(
    blobs: &dyn BlobStore,
    raw: &str,
    user_email: &str,
    kind: &str,
    at: &DateTime<FixedOffset>,
) -> String {
    let name = image_filename(user_email, kind, at);
    let uploaded = match decode_image(raw) {
        Ok(bytes) => blobs.upload(bytes, &name).await,
        Err(e) => Err(e),
    };

    match uploaded {
        Ok(file_id) => {
            debug!(name = %name, file_id = %file_id, "Audit image stored");
            file_id
        }
        Err(e) => {
            warn!(name = %name, error = %e, "Audit image upload failed");
            format!("{}: {}", UPLOAD_FAILED_PREFIX, e)
        }
    }
}

/// Session photos arrive as `{"base64": "..."}` or a bare string
fn session_photo(session: &Value, key: &str) -> Option<String> {
    let value = session.get(key)?;
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("base64")?.as_str()?,
        _ => return None,
    };
    (!raw.trim().is_empty()).then(|| raw.to_string())
}

fn session_text(session: &Value, key: &str) -> String {
    str_field(session, key).unwrap_or_default()
}

fn is_enabled(session: &Value) -> bool {
    session.get("enabled").and_then(Value::as_bool).unwrap_or(false)
}

fn parse_state_filter(raw: Option<&str>) -> Result<Option<AuditState>> {
    match raw.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some("in_progress") => Ok(Some(AuditState::InProgress)),
        Some("completed") => Ok(Some(AuditState::Completed)),
        Some(other) => Err(FieldOpsError::BadRequest(format!(
            "Invalid status '{}'. Use all, in_progress or completed",
            other
        ))),
    }
}

/// Audit operations over an audit store and a blob store
#[derive(Clone)]
pub struct AuditService {
    audits: Arc<dyn AuditStore>,
    blobs: Arc<dyn BlobStore>,
    tz: FixedOffset,
}

impl AuditService {
    pub fn new(audits: Arc<dyn AuditStore>, blobs: Arc<dyn BlobStore>, tz: FixedOffset) -> Self {
        Self { audits, blobs, tz }
    }

    async fn upload_image(
        &self,
        raw: &str,
        user_email: &str,
        kind: &str,
        at: &DateTime<FixedOffset>,
    ) -> String {
        upload_image(self.blobs.as_ref(), raw, user_email, kind, at).await
    }

    /// Enabled sessions with their photos uploaded
    async fn process_sessions(
        &self,
        sessions: &Map<String, Value>,
        user_email: &str,
        at: &DateTime<FixedOffset>,
    ) -> BTreeMap<String, SessionRecord> {
        let mut processed = BTreeMap::new();

        for (key, session) in sessions.iter().filter(|(_, s)| is_enabled(s)) {
            let mut record = SessionRecord {
                enabled: true,
                name: session_text(session, "name"),
                students_count: session_text(session, "studentsCount"),
                sachet_count: session_text(session, "sachetCount"),
                winner_name: session_text(session, "winnerName"),
                winner_class: session_text(session, "winnerClass"),
                ..Default::default()
            };

            for (field, tag) in SESSION_PHOTOS {
                let Some(raw) = session_photo(session, field) else {
                    continue;
                };
                let file_id = self
                    .upload_image(&raw, user_email, &format!("{}_{}", key, tag), at)
                    .await;
                let slot = match *field {
                    "startSelfie" => &mut record.start_selfie,
                    "endSelfie" => &mut record.end_selfie,
                    "winnerPhoto" => &mut record.winner_photo,
                    _ => &mut record.sachet_distribution_photo,
                };
                *slot = Some(file_id);
            }

            processed.insert(key.clone(), record);
        }

        processed
    }

    /// Create an in-progress audit
    pub async fn start_audit(&self, body: &Value) -> Result<StartResult> {
        require_fields(body, START_FIELDS)?;

        let sessions = body
            .get("sessions")
            .and_then(Value::as_object)
            .ok_or_else(|| FieldOpsError::BadRequest("sessions must be an object".into()))?;
        if !sessions.values().any(is_enabled) {
            return Err(FieldOpsError::BadRequest(
                "At least one session must be enabled".into(),
            ));
        }

        let raw_ts = str_field(body, "timestamp").unwrap_or_default();
        let local = parse_client_timestamp(&raw_ts, &self.tz)
            .ok_or_else(|| FieldOpsError::BadRequest("Invalid timestamp format".into()))?;
        let start_display = local.format(DISPLAY_TIMESTAMP_FORMAT).to_string();
        let audit_date = local.format(AUDIT_DATE_FORMAT).to_string();

        let user_email = normalize_email(&str_field(body, "user_email").unwrap_or_default());
        let school_name = str_field(body, "school_name").unwrap_or_default();
        let city = str_field(body, "city").unwrap_or_default();
        let location = GeoPoint {
            latitude: float_field(body, "latitude")?,
            longitude: float_field(body, "longitude")?,
        };
        let promoters_count = int_field(body, "promoters_count")?
            .ok_or_else(|| FieldOpsError::BadRequest("promoters_count must be an integer".into()))?;
        let boost_sachets_given = int_field(body, "boost_sachets_given")?.unwrap_or(0);
        let giveaways_given = str_field(body, "giveaways_given").unwrap_or_default();

        let start_image = str_field(body, "start_image")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FieldOpsError::BadRequest("start_image must not be empty".into()))?;

        // Checked before any upload so a rejected start leaves no orphan blobs
        let existing = self
            .audits
            .find_audits(&AuditQuery {
                user_email: user_email.clone(),
                status: Some(AuditState::InProgress),
                audit_date: Some(audit_date.clone()),
                school_name: Some(school_name.clone()),
                city: Some(city.clone()),
            })
            .await?;
        if !existing.is_empty() {
            return Err(FieldOpsError::BadRequest(
                "Audit already in progress for this school today".into(),
            ));
        }

        let start_image_file_id = self
            .upload_image(&start_image, &user_email, "audit_start", &local)
            .await;
        let audit_sheet_image_file_id = match str_field(body, "audit_sheet_image")
            .filter(|s| !s.trim().is_empty())
        {
            Some(raw) => self.upload_image(&raw, &user_email, "audit_sheet", &local).await,
            None => String::new(),
        };

        let sessions = self.process_sessions(sessions, &user_email, &local).await;
        let total_students: i64 = sessions.values().map(SessionRecord::students).sum();

        let mut responses = BTreeMap::new();
        responses.insert("promoters_count".to_string(), promoters_count.to_string());
        responses.insert("boost_sachets_given".to_string(), boost_sachets_given.to_string());
        if !giveaways_given.is_empty() {
            responses.insert("giveaways_given".to_string(), giveaways_given.clone());
        }

        let audit = AuditDoc {
            _id: None,
            user_email: user_email.clone(),
            school_name: school_name.clone(),
            city,
            location: Some(location),
            start_timestamp: start_display.clone(),
            audit_date,
            status: AuditState::InProgress,
            start_image_file_id,
            audit_sheet_image_file_id,
            promoters_count,
            boost_sachets_given,
            giveaways_given,
            sections: sessions.keys().cloned().collect(),
            total_students,
            responses,
            created_at: Some(bson::DateTime::from_chrono(local.with_timezone(&Utc))),
            sessions,
            ..Default::default()
        };
        let sessions_enabled = audit.sessions.len();
        let id = self.audits.insert_audit(audit).await?;

        info!(
            audit_id = %id,
            user = %user_email,
            school = %school_name,
            sessions = sessions_enabled,
            students = total_students,
            "School audit started"
        );

        Ok(StartResult {
            message: "School audit started successfully".into(),
            audit_id: id.to_hex(),
            school_name,
            start_time: start_display,
            total_students,
            sessions_enabled,
        })
    }

    /// Complete an in-progress audit
    pub async fn end_audit(&self, body: &Value) -> Result<EndResult> {
        require_fields(body, END_FIELDS)?;

        let raw_id = str_field(body, "audit_id").unwrap_or_default();
        let id = ObjectId::parse_str(raw_id.trim())
            .map_err(|_| FieldOpsError::BadRequest("Invalid audit id".into()))?;

        let audit = self
            .audits
            .find_audit(&id)
            .await?
            .ok_or_else(|| FieldOpsError::NotFound("Audit record not found".into()))?;
        if audit.status != AuditState::InProgress {
            return Err(FieldOpsError::BadRequest("Audit is not in progress".into()));
        }

        let raw_ts = str_field(body, "timestamp").unwrap_or_default();
        let local = parse_client_timestamp(&raw_ts, &self.tz)
            .ok_or_else(|| FieldOpsError::BadRequest("Invalid timestamp format".into()))?;
        let end_display = local.format(DISPLAY_TIMESTAMP_FORMAT).to_string();

        let sessions_completed = int_field(body, "sessions_completed")?.ok_or_else(|| {
            FieldOpsError::BadRequest("sessions_completed must be an integer".into())
        })?;
        let teacher_count = int_field(body, "teacher_count")?
            .ok_or_else(|| FieldOpsError::BadRequest("teacher_count must be an integer".into()))?;
        let auditor_remarks = str_field(body, "auditor_remarks").unwrap_or_default();

        let end_image = str_field(body, "end_image").unwrap_or_default();
        let end_image_file_id = if end_image.trim().is_empty() {
            String::new()
        } else {
            self.upload_image(&end_image, &audit.user_email, "audit_end", &local)
                .await
        };

        let duration = duration_minutes(&audit.start_timestamp, &end_display);
        let completion = AuditCompletion {
            completion_timestamp: end_display.clone(),
            end_image_file_id,
            sessions_completed,
            teacher_count,
            auditor_remarks,
            session_duration_minutes: duration,
            completed_at: bson::DateTime::from_chrono(local.with_timezone(&Utc)),
        };

        // Lost a race with another end-audit for the same id
        if !self.audits.complete_audit(&id, completion).await? {
            return Err(FieldOpsError::BadRequest("Audit is not in progress".into()));
        }

        info!(
            audit_id = %id,
            user = %audit.user_email,
            school = %audit.school_name,
            duration_minutes = duration,
            "School audit completed"
        );

        Ok(EndResult {
            message: "School audit completed successfully".into(),
            audit_id: id.to_hex(),
            school_name: audit.school_name,
            duration_minutes: duration,
            end_time: end_display,
        })
    }

    /// The user's in-progress audit dated today, if any
    pub async fn current_audit(&self, user_email: &str, today: NaiveDate) -> Result<Option<AuditDoc>> {
        let found = self
            .audits
            .find_audits(&AuditQuery {
                user_email: normalize_email(user_email),
                status: Some(AuditState::InProgress),
                audit_date: Some(today.format(AUDIT_DATE_FORMAT).to_string()),
                ..Default::default()
            })
            .await?;
        Ok(found.into_iter().next())
    }

    /// Audits filtered by state and by calendar date range (both bounds
    /// inclusive, "YYYY-MM-DD"), newest first
    async fn filtered(
        &self,
        user_email: &str,
        status: Option<AuditState>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Vec<AuditDoc>> {
        let from = date_from.filter(|d| !d.is_empty()).map(parse_date).transpose()?;
        let to = date_to.filter(|d| !d.is_empty()).map(parse_date).transpose()?;

        let audits = self
            .audits
            .find_audits(&AuditQuery {
                user_email: normalize_email(user_email),
                status,
                ..Default::default()
            })
            .await?;

        if from.is_none() && to.is_none() {
            return Ok(audits);
        }

        Ok(audits
            .into_iter()
            .filter(|a| match parse_audit_date(&a.audit_date) {
                Some(d) => from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t),
                None => false,
            })
            .collect())
    }

    /// Audit history; `status` is all, in_progress or completed
    pub async fn user_audits(
        &self,
        user_email: &str,
        status: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
    ) -> Result<Vec<AuditDoc>> {
        let state = parse_state_filter(status)?;
        self.filtered(user_email, state, date_from, date_to).await
    }

    pub async fn audit_summary(
        &self,
        user_email: &str,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<AuditSummary> {
        let audits = self.filtered(user_email, None, start_date, end_date).await?;

        let mut summary = AuditSummary {
            total_audits: audits.len(),
            ..Default::default()
        };
        let mut schools = BTreeSet::new();
        let mut cities = BTreeSet::new();
        let mut session_minutes = 0i64;

        for audit in &audits {
            match audit.status {
                AuditState::Completed => {
                    summary.completed_audits += 1;
                    summary.total_sessions_completed += audit.sessions_completed.unwrap_or(0);
                    session_minutes += audit.session_duration_minutes.unwrap_or(0);
                }
                AuditState::InProgress => summary.in_progress_audits += 1,
            }
            summary.total_students_reached += audit.total_students;
            summary.total_sachets_distributed += audit.boost_sachets_given;
            schools.insert(audit.school_name.clone());
            cities.insert(audit.city.clone());
        }

        summary.completion_rate = round1(
            summary.completed_audits as f64 * 100.0 / summary.total_audits.max(1) as f64,
        );
        summary.average_students_per_audit = round1(
            summary.total_students_reached as f64 / summary.completed_audits.max(1) as f64,
        );
        summary.average_session_minutes =
            round1(session_minutes as f64 / summary.completed_audits.max(1) as f64);
        summary.unique_schools_visited = schools.len();
        summary.unique_cities_covered = cities.len();
        summary.schools_list = schools.into_iter().collect();
        summary.cities_list = cities.into_iter().collect();

        Ok(summary)
    }

    /// Image bytes for a (percent-encoded) file id or sharing URL
    pub async fn fetch_image(&self, raw_id: &str) -> Result<Bytes> {
        let file_id = urlencoding::decode(raw_id)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw_id.to_string());
        let file_id = file_id.trim();

        if file_id.is_empty() || file_id.starts_with(UPLOAD_FAILED_PREFIX) {
            return Err(FieldOpsError::BadRequest("Invalid file ID".into()));
        }

        let file_id = if file_id.starts_with("http://") || file_id.starts_with("https://") {
            self.blobs.resolve(file_id).await?
        } else {
            file_id.to_string()
        };

        self.blobs.download(&file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{MemoryBlobStore, UnavailableBlobStore};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    fn jpeg() -> String {
        STANDARD.encode(b"\xff\xd8\xff\xe0fake-jpeg")
    }

    fn setup() -> (AuditService, Arc<MemoryStore>, Arc<MemoryBlobStore>) {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        (AuditService::new(store.clone(), blobs.clone(), ist()), store, blobs)
    }

    fn start_body() -> Value {
        json!({
            "latitude": 18.52,
            "longitude": "73.85",
            "school_name": "Apex School",
            "city": "Pune",
            "start_image": format!("data:image/jpeg;base64,{}", jpeg()),
            "timestamp": "2026-10-18T09:30:00",
            "user_email": "Trainer@Example.com",
            "promoters_count": "2",
            "boost_sachets_given": 40,
            "sessions": {
                "session1": {
                    "enabled": true,
                    "name": "Class 5",
                    "studentsCount": "30",
                    "startSelfie": { "base64": jpeg() }
                },
                "session2": { "enabled": false, "studentsCount": "99" },
                "session3": { "enabled": true, "studentsCount": "" }
            }
        })
    }

    #[test]
    fn test_parse_client_timestamp() {
        let naive = parse_client_timestamp("2026-10-18T09:30:00", &ist()).unwrap();
        assert_eq!(naive.format(DISPLAY_TIMESTAMP_FORMAT).to_string(), "18 Oct 2026, 09:30 AM IST");

        // 23:00 UTC is the next morning in IST
        let utc = parse_client_timestamp("2026-10-18T23:00:00Z", &ist()).unwrap();
        assert_eq!(utc.format(AUDIT_DATE_FORMAT).to_string(), "19 Oct 2026");

        assert!(parse_client_timestamp("yesterday", &ist()).is_none());
    }

    #[test]
    fn test_duration_minutes() {
        assert_eq!(
            duration_minutes("18 Oct 2026, 09:30 AM IST", "18 Oct 2026, 11:45 AM IST"),
            135
        );
        assert_eq!(
            duration_minutes("18 Oct 2026, 11:30 PM IST", "19 Oct 2026, 12:15 AM IST"),
            45
        );
        assert_eq!(duration_minutes("garbage", "18 Oct 2026, 11:45 AM IST"), 0);
    }

    #[test]
    fn test_decode_image_accepts_data_urls() {
        let plain = decode_image(&jpeg()).unwrap();
        let url = decode_image(&format!("data:image/jpeg;base64,{}", jpeg())).unwrap();
        assert_eq!(plain, url);
        assert!(decode_image("not base64!!").is_err());
    }

    #[test]
    fn test_image_filename_shape() {
        let at = parse_client_timestamp("2026-10-18T09:30:05", &ist()).unwrap();
        let name = image_filename("t.x@example.com", "audit_start", &at);
        assert!(name.starts_with("t_x_example_com_audit_start_20261018_093005_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "t_x_example_com_audit_start_20261018_093005_".len() + 8 + 4);
    }

    #[tokio::test]
    async fn test_start_audit_records_content() {
        let (service, store, blobs) = setup();
        let result = service.start_audit(&start_body()).await.unwrap();

        assert_eq!(result.sessions_enabled, 2);
        assert_eq!(result.total_students, 30);
        assert_eq!(result.start_time, "18 Oct 2026, 09:30 AM IST");
        // start image + one session selfie
        assert_eq!(blobs.len().await, 2);

        let id = ObjectId::parse_str(&result.audit_id).unwrap();
        let audit = store.find_audit(&id).await.unwrap().unwrap();
        assert_eq!(audit.user_email, "trainer@example.com");
        assert_eq!(audit.audit_date, "18 Oct 2026");
        assert_eq!(audit.status, AuditState::InProgress);
        assert_eq!(audit.sections, vec!["session1", "session3"]);
        assert_eq!(audit.promoters_count, 2);
        assert!(audit.has_content());
        assert!(audit.sessions["session1"].start_selfie.is_some());
        assert!(audit.sessions["session1"].end_selfie.is_none());
        assert!(!audit.start_image_file_id.starts_with(UPLOAD_FAILED_PREFIX));
    }

    #[tokio::test]
    async fn test_start_audit_rejects_second_in_progress() {
        let (service, _, blobs) = setup();
        service.start_audit(&start_body()).await.unwrap();
        let uploads = blobs.len().await;

        let err = service.start_audit(&start_body()).await.unwrap_err();
        assert_eq!(err.public_message(), "Audit already in progress for this school today");
        assert_eq!(blobs.len().await, uploads);
    }

    #[tokio::test]
    async fn test_start_audit_validation() {
        let (service, _, _) = setup();

        let err = service.start_audit(&json!({ "city": "Pune" })).await.unwrap_err();
        assert_eq!(
            err.public_message(),
            "Missing required fields: latitude, longitude, school_name, start_image, timestamp, user_email, promoters_count, sessions"
        );

        let mut body = start_body();
        body["sessions"] = json!({ "session1": { "enabled": false } });
        let err = service.start_audit(&body).await.unwrap_err();
        assert_eq!(err.public_message(), "At least one session must be enabled");

        let mut body = start_body();
        body["timestamp"] = json!("18/10/2026 9:30");
        let err = service.start_audit(&body).await.unwrap_err();
        assert_eq!(err.public_message(), "Invalid timestamp format");

        let mut body = start_body();
        body["start_image"] = json!("");
        assert_eq!(service.start_audit(&body).await.unwrap_err().status_code(), 400);
    }

    #[tokio::test]
    async fn test_failed_upload_is_recorded_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        let service = AuditService::new(store.clone(), Arc::new(UnavailableBlobStore), ist());

        let result = service.start_audit(&start_body()).await.unwrap();
        let id = ObjectId::parse_str(&result.audit_id).unwrap();
        let audit = store.find_audit(&id).await.unwrap().unwrap();
        assert!(audit.start_image_file_id.starts_with("UPLOAD_FAILED: "));

        let rendered = audit.to_json("http://api");
        assert_eq!(rendered["start_image_url"], "");
    }

    #[tokio::test]
    async fn test_end_audit_completes_once() {
        let (service, store, _) = setup();
        let started = service.start_audit(&start_body()).await.unwrap();

        let end = json!({
            "audit_id": started.audit_id,
            "end_image": jpeg(),
            "timestamp": "2026-10-18T11:00:00+05:30",
            "sessions_completed": 2,
            "teacher_count": "3",
            "auditor_remarks": "Good turnout"
        });
        let result = service.end_audit(&end).await.unwrap();
        assert_eq!(result.duration_minutes, 90);
        assert_eq!(result.end_time, "18 Oct 2026, 11:00 AM IST");

        let id = ObjectId::parse_str(&started.audit_id).unwrap();
        let audit = store.find_audit(&id).await.unwrap().unwrap();
        assert_eq!(audit.status, AuditState::Completed);
        assert_eq!(audit.completion_timestamp.as_deref(), Some("18 Oct 2026, 11:00 AM IST"));
        assert_eq!(audit.teacher_count, Some(3));
        assert!(audit.completed_at.is_some());

        let err = service.end_audit(&end).await.unwrap_err();
        assert_eq!(err.public_message(), "Audit is not in progress");
    }

    #[tokio::test]
    async fn test_end_audit_errors() {
        let (service, _, _) = setup();
        let mut end = json!({
            "audit_id": "nope",
            "end_image": jpeg(),
            "timestamp": "2026-10-18T11:00:00",
            "sessions_completed": 1,
            "teacher_count": 1,
            "auditor_remarks": ""
        });
        assert_eq!(service.end_audit(&end).await.unwrap_err().status_code(), 400);

        end["audit_id"] = json!(ObjectId::new().to_hex());
        assert_eq!(service.end_audit(&end).await.unwrap_err().status_code(), 404);

        end["auditor_remarks"] = Value::Null;
        let err = service.end_audit(&end).await.unwrap_err();
        assert_eq!(err.public_message(), "Missing required fields: auditor_remarks");
    }

    #[tokio::test]
    async fn test_current_audit_and_history() {
        let (service, _, _) = setup();
        service.start_audit(&start_body()).await.unwrap();

        let mut other = start_body();
        other["school_name"] = json!("Zenith");
        other["timestamp"] = json!("2026-10-15T10:00:00");
        service.start_audit(&other).await.unwrap();

        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let current = service.current_audit("trainer@example.com", today).await.unwrap();
        assert_eq!(current.unwrap().school_name, "Apex School");

        let all = service
            .user_audits("trainer@example.com", Some("all"), None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].school_name, "Apex School");

        let ranged = service
            .user_audits("trainer@example.com", None, Some("2026-10-14"), Some("2026-10-16"))
            .await
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].school_name, "Zenith");

        let completed = service
            .user_audits("trainer@example.com", Some("completed"), None, None)
            .await
            .unwrap();
        assert!(completed.is_empty());

        assert!(service
            .user_audits("trainer@example.com", Some("done"), None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_audit_summary() {
        let (service, _, _) = setup();
        let started = service.start_audit(&start_body()).await.unwrap();
        let mut other = start_body();
        other["city"] = json!("Mumbai");
        service.start_audit(&other).await.unwrap();

        service
            .end_audit(&json!({
                "audit_id": started.audit_id,
                "end_image": jpeg(),
                "timestamp": "2026-10-18T10:30:00",
                "sessions_completed": 2,
                "teacher_count": 1,
                "auditor_remarks": "ok"
            }))
            .await
            .unwrap();

        let summary = service
            .audit_summary("trainer@example.com", None, None)
            .await
            .unwrap();
        assert_eq!(summary.total_audits, 2);
        assert_eq!(summary.completed_audits, 1);
        assert_eq!(summary.in_progress_audits, 1);
        assert_eq!(summary.completion_rate, 50.0);
        assert_eq!(summary.total_students_reached, 60);
        assert_eq!(summary.total_sachets_distributed, 80);
        assert_eq!(summary.total_sessions_completed, 2);
        assert_eq!(summary.unique_schools_visited, 1);
        assert_eq!(summary.cities_list, vec!["Mumbai", "Pune"]);
        assert_eq!(summary.average_students_per_audit, 60.0);
        assert_eq!(summary.average_session_minutes, 60.0);
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let (service, _, blobs) = setup();
        let id = blobs
            .upload(Bytes::from_static(b"img"), "a b.jpg")
            .await
            .unwrap();

        let encoded = urlencoding::encode(&id).into_owned();
        assert_eq!(service.fetch_image(&encoded).await.unwrap(), Bytes::from_static(b"img"));

        let err = service.fetch_image("UPLOAD_FAILED%3A%20boom").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(service.fetch_image("missing").await.unwrap_err().status_code(), 404);
    }
}
