//! Database schemas for fieldops
//!
//! Defines MongoDB document structures for users, assignments, school audits and
//! mystery audits.

mod assignment;
mod audit;
mod mystery;
mod status;
mod user;

pub use assignment::{AssignmentDoc, AssignmentStatus, SchoolEntry, ASSIGNMENT_COLLECTION};
pub use audit::{
    image_url, AuditDoc, GeoPoint, SessionRecord, AUDIT_COLLECTION, UPLOAD_FAILED_PREFIX,
};
pub use mystery::{
    MysteryAuditDoc, StaffEvaluation, MYSTERY_AUDIT_COLLECTION, MYSTERY_AUDIT_TYPE,
};
pub use status::{AuditState, AuditStatus};
pub use user::{UserDoc, USER_COLLECTION};

use bson::DateTime;

/// RFC 3339 rendering of an optional stored timestamp
pub fn iso(dt: &Option<DateTime>) -> Option<String> {
    dt.as_ref().and_then(|d| d.try_to_rfc3339_string().ok())
}
