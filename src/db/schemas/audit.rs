//! School audit document schema
//!
//! Written by the audit workflow (start/end), read by the assignment
//! reconciler. Display timestamps are stored pre-formatted in the business
//! timezone, e.g. "18 Oct 2026, 09:30 AM IST".

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::db::mongo::{IntoIndexes, MutTimestamps};
use crate::db::schemas::{iso, AuditState};

/// Collection name for school audits
pub const AUDIT_COLLECTION: &str = "school_audits";

/// Prefix stored in place of a file id when an upload failed
pub const UPLOAD_FAILED_PREFIX: &str = "UPLOAD_FAILED";

/// GPS position captured at audit start
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One promotional session within an audit
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub students_count: String,
    #[serde(default)]
    pub sachet_count: String,
    #[serde(default)]
    pub winner_name: String,
    #[serde(default)]
    pub winner_class: String,

    // Blob file ids (or UPLOAD_FAILED sentinels)
    #[serde(default)]
    pub start_selfie: Option<String>,
    #[serde(default)]
    pub end_selfie: Option<String>,
    #[serde(default)]
    pub winner_photo: Option<String>,
    #[serde(default)]
    pub sachet_distribution_photo: Option<String>,
}

impl SessionRecord {
    /// Student count as a number; blanks and junk count as zero
    pub fn students(&self) -> i64 {
        self.students_count.trim().parse().unwrap_or(0)
    }
}

/// Audit document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AuditDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Trainer who performed the audit
    pub user_email: String,
    pub school_name: String,
    pub city: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,

    /// Display start time
    #[serde(default)]
    pub start_timestamp: String,

    /// Display calendar date, "%d %b %Y"
    pub audit_date: String,

    #[serde(default)]
    pub status: AuditState,

    #[serde(default)]
    pub start_image_file_id: String,

    #[serde(default)]
    pub audit_sheet_image_file_id: String,

    #[serde(default)]
    pub promoters_count: i64,

    #[serde(default)]
    pub boost_sachets_given: i64,

    #[serde(default)]
    pub giveaways_given: String,

    /// Enabled sessions keyed by the client's session key
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionRecord>,

    #[serde(default)]
    pub total_students: i64,

    /// Sections of the audit form the trainer has filled in
    #[serde(default)]
    pub sections: Vec<String>,

    /// Scalar form answers
    #[serde(default)]
    pub responses: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    /// Display completion time; older records call it end_timestamp
    #[serde(default, alias = "end_timestamp", skip_serializing_if = "Option::is_none")]
    pub completion_timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_image_file_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_completed: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_count: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auditor_remarks: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration_minutes: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

impl AuditDoc {
    /// Hex id, empty when not yet stored
    pub fn id_hex(&self) -> String {
        self._id.map(|id| id.to_hex()).unwrap_or_default()
    }

    /// Whether the trainer recorded anything beyond pressing "start"
    pub fn has_content(&self) -> bool {
        !self.sections.is_empty() || !self.responses.is_empty()
    }

    /// Render for API responses, with proxy URLs for every stored image
    pub fn to_json(&self, base_url: &str) -> Value {
        let sessions: Map<String, Value> = self
            .sessions
            .iter()
            .map(|(key, s)| {
                let mut v = serde_json::to_value(s).unwrap_or(Value::Null);
                if let Value::Object(obj) = &mut v {
                    obj.insert("startSelfieUrl".into(), image_url(base_url, s.start_selfie.as_deref()).into());
                    obj.insert("endSelfieUrl".into(), image_url(base_url, s.end_selfie.as_deref()).into());
                    obj.insert("winnerPhotoUrl".into(), image_url(base_url, s.winner_photo.as_deref()).into());
                    obj.insert(
                        "sachetDistributionPhotoUrl".into(),
                        image_url(base_url, s.sachet_distribution_photo.as_deref()).into(),
                    );
                }
                (key.clone(), v)
            })
            .collect();

        json!({
            "_id": self.id_hex(),
            "user_email": self.user_email,
            "school_name": self.school_name,
            "city": self.city,
            "location": self.location,
            "start_timestamp": self.start_timestamp,
            "completion_timestamp": self.completion_timestamp,
            "audit_date": self.audit_date,
            "status": self.status,
            "promoters_count": self.promoters_count,
            "boost_sachets_given": self.boost_sachets_given,
            "giveaways_given": self.giveaways_given,
            "sessions": sessions,
            "total_students": self.total_students,
            "sections": self.sections,
            "responses": self.responses,
            "sessions_completed": self.sessions_completed,
            "teacher_count": self.teacher_count,
            "auditor_remarks": self.auditor_remarks,
            "session_duration_minutes": self.session_duration_minutes,
            "created_at": iso(&self.created_at),
            "completed_at": iso(&self.completed_at),
            "start_image_url": image_url(base_url, Some(self.start_image_file_id.as_str())),
            "end_image_url": image_url(base_url, self.end_image_file_id.as_deref()),
            "audit_sheet_image_url": image_url(base_url, Some(self.audit_sheet_image_file_id.as_str())),
        })
    }
}

/// Proxy URL for a stored image; "" when there is nothing to show
pub fn image_url(base_url: &str, file_id: Option<&str>) -> String {
    let id = match file_id.map(str::trim) {
        Some(id) if !id.is_empty() && !id.starts_with(UPLOAD_FAILED_PREFIX) => id,
        _ => return String::new(),
    };

    format!(
        "{}/api/school-audit/image/{}?resize=true",
        base_url.trim_end_matches('/'),
        urlencoding::encode(id)
    )
}

impl IntoIndexes for AuditDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_email": 1, "school_name": 1, "city": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_school_city_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_email": 1, "audit_date": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_date_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutTimestamps for AuditDoc {
    fn stamp_created(&mut self, now: DateTime) {
        // start-audit records the trainer's own start time
        if self.created_at.is_none() {
            self.created_at = Some(now);
        }
    }

    fn stamp_updated(&mut self, now: DateTime) {
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_url() {
        assert_eq!(
            image_url("http://host:10000/", Some("abc/def")),
            "http://host:10000/api/school-audit/image/abc%2Fdef?resize=true"
        );
        assert_eq!(image_url("http://host", Some("UPLOAD_FAILED: timeout")), "");
        assert_eq!(image_url("http://host", Some("  ")), "");
        assert_eq!(image_url("http://host", None), "");
    }

    #[test]
    fn test_end_timestamp_alias() {
        let audit: AuditDoc = bson::from_document(doc! {
            "user_email": "t@example.com",
            "school_name": "A",
            "city": "Pune",
            "audit_date": "18 Oct 2026",
            "status": "completed",
            "end_timestamp": "18 Oct 2026, 11:00 AM IST",
        })
        .unwrap();
        assert_eq!(audit.completion_timestamp.as_deref(), Some("18 Oct 2026, 11:00 AM IST"));
        assert_eq!(audit.status, AuditState::Completed);
        assert!(!audit.has_content());
    }

    #[test]
    fn test_session_students_parsing() {
        let mut s = SessionRecord::default();
        assert_eq!(s.students(), 0);
        s.students_count = " 42 ".into();
        assert_eq!(s.students(), 42);
    }

    #[test]
    fn test_to_json_adds_session_urls() {
        let mut audit = AuditDoc {
            user_email: "t@example.com".into(),
            school_name: "A".into(),
            city: "Pune".into(),
            audit_date: "18 Oct 2026".into(),
            start_image_file_id: "img1".into(),
            ..Default::default()
        };
        audit.sessions.insert(
            "session1".into(),
            SessionRecord {
                enabled: true,
                start_selfie: Some("selfie1".into()),
                ..Default::default()
            },
        );

        let v = audit.to_json("http://h");
        assert_eq!(v["start_image_url"], "http://h/api/school-audit/image/img1?resize=true");
        assert_eq!(
            v["sessions"]["session1"]["startSelfieUrl"],
            "http://h/api/school-audit/image/selfie1?resize=true"
        );
        assert_eq!(v["sessions"]["session1"]["endSelfieUrl"], "");
        assert_eq!(v["status"], "in_progress");
    }
}
