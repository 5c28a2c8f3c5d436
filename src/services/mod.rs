//! Business operations behind the HTTP routes
//!
//! Services take "today" as an argument instead of reading the clock, so
//! date-window rules are testable.

pub mod accounts;
pub mod assignments;
pub mod audits;
pub mod mystery;

pub use accounts::AccountService;
pub use assignments::AssignmentService;
pub use audits::AuditService;
pub use mystery::MysteryAuditService;

use chrono::NaiveDate;
use serde_json::Value;

use crate::reconcile::ASSIGNMENT_DATE_FORMAT;
use crate::types::{FieldOpsError, Result};

/// Emails are matched case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Parse a "YYYY-MM-DD" date
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), ASSIGNMENT_DATE_FORMAT)
        .map_err(|_| FieldOpsError::BadRequest("Invalid date format. Use YYYY-MM-DD".into()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(ASSIGNMENT_DATE_FORMAT).to_string()
}

/// Fields that are absent or null in a JSON object, in the given order
pub fn missing_fields(body: &Value, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|f| body.get(**f).map_or(true, Value::is_null))
        .map(|f| f.to_string())
        .collect()
}

/// 400 listing every missing field
pub fn require_fields(body: &Value, required: &[&str]) -> Result<()> {
    let missing = missing_fields(body, required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(FieldOpsError::BadRequest(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// String field; numbers are accepted and stringified
pub fn str_field(body: &Value, field: &str) -> Option<String> {
    match body.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Integer field; numeric strings are accepted
pub fn int_field(body: &Value, field: &str) -> Result<Option<i64>> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or_else(|| FieldOpsError::BadRequest(format!("{} must be an integer", field))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| FieldOpsError::BadRequest(format!("{} must be an integer", field))),
        Some(_) => Err(FieldOpsError::BadRequest(format!("{} must be an integer", field))),
    }
}

/// Float field; numeric strings are accepted
pub fn float_field(body: &Value, field: &str) -> Result<f64> {
    let value = match body.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    value.ok_or_else(|| FieldOpsError::BadRequest(format!("{} must be a number", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_treats_null_as_missing() {
        let body = json!({ "a": 1, "b": null });
        assert_eq!(missing_fields(&body, &["a", "b", "c"]), vec!["b", "c"]);
        assert!(require_fields(&body, &["a"]).is_ok());
        let err = require_fields(&body, &["b", "c"]).unwrap_err();
        assert_eq!(err.public_message(), "Missing required fields: b, c");
    }

    #[test]
    fn test_numeric_fields_accept_strings() {
        let body = json!({ "n": "12", "f": 3, "s": "x", "lat": "18.52" });
        assert_eq!(int_field(&body, "n").unwrap(), Some(12));
        assert_eq!(int_field(&body, "f").unwrap(), Some(3));
        assert_eq!(int_field(&body, "missing").unwrap(), None);
        assert!(int_field(&body, "s").is_err());
        assert!((float_field(&body, "lat").unwrap() - 18.52).abs() < 1e-9);
        assert_eq!(str_field(&body, "f").as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2026-10-18").unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
        );
        assert!(parse_date("18/10/2026").is_err());
        assert_eq!(normalize_email(" T@Example.com "), "t@example.com");
    }
}
