//! Mystery audit document schema
//!
//! A trainer visits a retail outlet unannounced and scores each promoter on
//! a fixed checklist. These records are independent of school assignments.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::mongo::{IntoIndexes, MutTimestamps};
use crate::db::schemas::{image_url, iso, AuditState, GeoPoint};

/// Collection name for mystery audits
pub const MYSTERY_AUDIT_COLLECTION: &str = "mystery_audits";

/// Only accepted value of `audit_type`
pub const MYSTERY_AUDIT_TYPE: &str = "mystery_audit";

/// One promoter's scorecard. Scores are free text from the client's pickers.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaffEvaluation {
    pub store_code: String,
    pub outlet_name: String,
    pub promoter_name: String,
    pub grooming_compliance: String,
    pub greeting_engagement: String,
    pub product_knowledge: String,
    pub communication_skills: String,
    pub sales_closing_skills: String,
    pub handling_objections: String,
    pub cross_selling: String,
    pub explaining_offers: String,
    pub other_observations: String,
}

impl StaffEvaluation {
    /// Wire names of every scorecard field, in form order
    pub const FIELDS: &'static [&'static str] = &[
        "storeCode",
        "outletName",
        "promoterName",
        "groomingCompliance",
        "greetingEngagement",
        "productKnowledge",
        "communicationSkills",
        "salesClosingSkills",
        "handlingObjections",
        "crossSelling",
        "explainingOffers",
        "otherObservations",
    ];
}

/// Mystery audit document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MysteryAuditDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub user_email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,

    #[serde(rename = "cityName", default)]
    pub city_name: String,

    /// Blob file id, or an UPLOAD_FAILED sentinel
    #[serde(default)]
    pub image_file_id: String,

    /// Display visit time in the business timezone
    #[serde(default)]
    pub timestamp: String,

    #[serde(default)]
    pub audit_type: String,

    #[serde(default)]
    pub evaluations: Vec<StaffEvaluation>,

    #[serde(default)]
    pub staff_count: i64,

    #[serde(default)]
    pub status: AuditState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl MysteryAuditDoc {
    /// Hex id, empty when not yet stored
    pub fn id_hex(&self) -> String {
        self._id.map(|id| id.to_hex()).unwrap_or_default()
    }

    /// Proxy URL for the visit photo, None when the upload failed
    pub fn image_url(&self, base_url: &str) -> Option<String> {
        Some(image_url(base_url, Some(self.image_file_id.as_str()))).filter(|u| !u.is_empty())
    }

    /// Render for API responses
    pub fn to_json(&self, base_url: &str) -> Value {
        json!({
            "_id": self.id_hex(),
            "user_email": self.user_email,
            "location": self.location,
            "cityName": self.city_name,
            "timestamp": self.timestamp,
            "audit_type": self.audit_type,
            "evaluations": self.evaluations,
            "staff_count": self.staff_count,
            "status": self.status,
            "image_url": self.image_url(base_url),
            "created_at": iso(&self.created_at),
        })
    }
}

impl IntoIndexes for MysteryAuditDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_email": 1, "created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("user_created_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutTimestamps for MysteryAuditDoc {
    fn stamp_created(&mut self, now: DateTime) {
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
    fn test_evaluation_field_names_match_serde() {
        let v = serde_json::to_value(StaffEvaluation::default()).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), StaffEvaluation::FIELDS.len());
        for field in StaffEvaluation::FIELDS {
            assert!(obj.contains_key(*field), "{}", field);
        }
    }

    #[test]
    fn test_failed_image_renders_null() {
        let mut audit = MysteryAuditDoc {
            image_file_id: "UPLOAD_FAILED: timeout".into(),
            city_name: "Pune".into(),
            ..Default::default()
        };
        let v = audit.to_json("http://h");
        assert!(v["image_url"].is_null());
        assert_eq!(v["cityName"], "Pune");

        audit.image_file_id = "img1".into();
        assert_eq!(
            audit.image_url("http://h").as_deref(),
            Some("http://h/api/school-audit/image/img1?resize=true")
        );
    }
}
