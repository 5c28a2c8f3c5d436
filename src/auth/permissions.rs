//! User roles and the minimum role each route requires

use hyper::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Roles stored on user documents and carried in tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Role {
    /// Field trainer who runs audits
    #[default]
    FieldWorker = 0,
    /// Controller who assigns schools to trainers
    Controller = 1,
    /// Operations admin
    Admin = 2,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::FieldWorker => write!(f, "field_worker"),
            Role::Controller => write!(f, "controller"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "field_worker" | "trainer" => Ok(Role::FieldWorker),
            "controller" => Ok(Role::Controller),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Minimum role required for a route, or None for public routes.
///
/// `path` is the full request path including the `/api` prefix.
pub fn required_role(method: &Method, path: &str) -> Option<Role> {
    match (method, path) {
        (&Method::POST, "/api/auth/login")
        | (&Method::POST, "/api/auth/register")
        | (&Method::POST, "/api/auth/refresh")
        | (&Method::POST, "/api/auth/validate-token") => None,

        // Loaded by <img> tags, which cannot carry a bearer header
        (&Method::GET, p) if p.starts_with("/api/school-audit/image/") => None,

        (&Method::POST, "/api/school-assignment/assign-schools")
        | (&Method::POST, "/api/school-assignment/bulk-assign")
        | (&Method::POST, "/api/school-assignment/sync-audit-status")
        | (&Method::GET, "/api/attendance/users") => Some(Role::Controller),
        (&Method::PUT, p) if p.starts_with("/api/school-assignment/update-assignment/") => {
            Some(Role::Controller)
        }
        (&Method::DELETE, p) if p.starts_with("/api/school-assignment/delete-assignment/") => {
            Some(Role::Controller)
        }

        (_, p) if p.starts_with("/api/") => Some(Role::FieldWorker),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin > Role::Controller);
        assert!(Role::Controller > Role::FieldWorker);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("controller".parse::<Role>().unwrap(), Role::Controller);
        assert_eq!("Field_Worker".parse::<Role>().unwrap(), Role::FieldWorker);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_matches_display() {
        let json = serde_json::to_string(&Role::FieldWorker).unwrap();
        assert_eq!(json, "\"field_worker\"");
        assert_eq!(Role::FieldWorker.to_string(), "field_worker");
    }

    #[test]
    fn test_required_roles() {
        assert_eq!(required_role(&Method::POST, "/api/auth/login"), None);
        assert_eq!(
            required_role(&Method::POST, "/api/school-assignment/assign-schools"),
            Some(Role::Controller)
        );
        assert_eq!(
            required_role(&Method::DELETE, "/api/school-assignment/delete-assignment/abc"),
            Some(Role::Controller)
        );
        assert_eq!(
            required_role(&Method::GET, "/api/school-assignment/today-assignments/t@x.com"),
            Some(Role::FieldWorker)
        );
        assert_eq!(
            required_role(&Method::GET, "/api/attendance/users"),
            Some(Role::Controller)
        );
        assert_eq!(
            required_role(&Method::POST, "/api/attendance/submit"),
            Some(Role::FieldWorker)
        );
        assert_eq!(required_role(&Method::GET, "/health"), None);
        assert_eq!(required_role(&Method::GET, "/api/school-audit/image/abc"), None);
    }
}
