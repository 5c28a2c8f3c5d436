//! User document schema
//!
//! Stores credentials and profile for trainers, controllers and admins.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutTimestamps};
use crate::db::schemas::iso;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Login identifier, stored lowercase
    pub email: String,

    /// Argon2 password hash
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,

    #[serde(default)]
    pub full_name: String,

    #[serde(default)]
    pub phone_number: String,

    /// Controller a trainer reports to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_email: Option<String>,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document
    pub fn new(email: &str, password_hash: String, role: Role) -> Self {
        Self {
            _id: None,
            email: email.trim().to_lowercase(),
            password_hash,
            role,
            full_name: String::new(),
            phone_number: String::new(),
            controller_email: None,
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Hex id, empty when not yet stored
    pub fn id_hex(&self) -> String {
        self._id.map(|id| id.to_hex()).unwrap_or_default()
    }

    /// Public profile; never includes the password hash
    pub fn profile_json(&self) -> Value {
        json!({
            "user_id": self.id_hex(),
            "email": self.email,
            "role": self.role,
            "full_name": self.full_name,
            "phone_number": self.phone_number,
            "controller_email": self.controller_email,
            "is_active": self.is_active,
            "created_at": iso(&self.created_at),
        })
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "controller_email": 1 },
                Some(
                    IndexOptions::builder()
                        .name("controller_email_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutTimestamps for UserDoc {
    fn stamp_created(&mut self, now: DateTime) {
        self.created_at = Some(now);
    }

    fn stamp_updated(&mut self, now: DateTime) {
        self.updated_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let user = UserDoc::new("  Trainer@Example.COM ", "hash".into(), Role::FieldWorker);
        assert_eq!(user.email, "trainer@example.com");
        assert!(user.is_active);
    }

    #[test]
    fn test_profile_hides_hash() {
        let user = UserDoc::new("a@example.com", "$argon2id$secret".into(), Role::Controller);
        let profile = user.profile_json();
        assert!(profile.get("password_hash").is_none());
        assert_eq!(profile["role"], "controller");
    }
}
