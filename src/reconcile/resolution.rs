//! Audit lookup and per-school status resolution
//!
//! Many audits can exist for one (trainer, school, city): restarts, audits
//! from earlier visits, abandoned starts. Resolution picks the single audit
//! that decides the school's status:
//!
//! 1. Audits are visited newest first (by `created_at`, undated last).
//! 2. An in_progress audit wins and replaces any completed pick. The newest
//!    in_progress audit is kept.
//! 3. A completed audit dated on the target day replaces a completed pick
//!    from another day.
//! 4. Otherwise the newest completed audit is kept.
//!
//! Afterwards every in_progress pick without sections or responses is
//! dropped, so the school reads as pending.

use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use super::identity::{identity_key, Deduped};
use crate::db::schemas::{AuditDoc, AuditState};
use crate::store::{sort_newest_first, AuditStore};
use crate::types::Result;

/// Display format used in audit_date
pub const AUDIT_DATE_FORMAT: &str = "%d %b %Y";

/// The audit chosen for one identity key
#[derive(Debug, Clone)]
pub struct Resolution {
    pub status: AuditState,
    pub audit_id: String,
    pub start_timestamp: Option<String>,
    pub completion_timestamp: Option<String>,
    pub raw_audit_date: String,
    /// Whether raw_audit_date falls on the target date
    pub same_day: bool,
    pub audit: AuditDoc,
}

impl Resolution {
    fn from_audit(audit: AuditDoc, target: NaiveDate) -> Self {
        let start = Some(audit.start_timestamp.clone()).filter(|s| !s.is_empty());
        let completion = match audit.status {
            AuditState::Completed => audit.completion_timestamp.clone(),
            AuditState::InProgress => None,
        };

        Self {
            status: audit.status,
            audit_id: audit.id_hex(),
            start_timestamp: start,
            completion_timestamp: completion,
            raw_audit_date: audit.audit_date.clone(),
            same_day: parse_audit_date(&audit.audit_date) == Some(target),
            audit,
        }
    }
}

/// Resolved audits keyed by identity key
pub type ResolutionMap = HashMap<String, Resolution>;

/// Parse an audit date written either as "18 Oct 2026" or "2026-10-18"
pub fn parse_audit_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, AUDIT_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Fold audits into one resolution per identity key
pub fn resolve_statuses(mut audits: Vec<AuditDoc>, target: NaiveDate) -> ResolutionMap {
    sort_newest_first(&mut audits);

    let mut resolved = ResolutionMap::new();
    for audit in audits {
        let key = identity_key(&audit.school_name, &audit.city);
        let candidate = Resolution::from_audit(audit, target);

        let replace = match (candidate.status, resolved.get(&key)) {
            (_, None) => true,
            (AuditState::InProgress, Some(current)) => current.status != AuditState::InProgress,
            (AuditState::Completed, Some(current)) => {
                current.status == AuditState::Completed && !current.same_day && candidate.same_day
            }
        };

        if replace {
            resolved.insert(key, candidate);
        }
    }

    resolved.retain(|key, r| {
        let keep = r.status != AuditState::InProgress || r.audit.has_content();
        if !keep {
            debug!(key = %key, audit_id = %r.audit_id, "Ignoring in-progress audit with no content");
        }
        keep
    });

    resolved
}

/// Fetch the trainer's audits for the given schools and resolve them
pub async fn lookup_statuses(
    audits: &dyn AuditStore,
    trainer_email: &str,
    schools: &Deduped,
    target: NaiveDate,
) -> Result<ResolutionMap> {
    let pairs = schools.pairs();
    if pairs.is_empty() {
        return Ok(ResolutionMap::new());
    }

    let found = audits.find_audits_for_schools(trainer_email, &pairs).await?;
    debug!(trainer = %trainer_email, audits = found.len(), "Fetched audits for resolution");

    Ok(resolve_statuses(found, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{oid::ObjectId, DateTime};

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn audit(status: AuditState, audit_date: &str, created_ms: i64) -> AuditDoc {
        let mut a = AuditDoc {
            _id: Some(ObjectId::new()),
            user_email: "t@example.com".into(),
            school_name: "St. Mary's".into(),
            city: "Pune".into(),
            audit_date: audit_date.into(),
            status,
            start_timestamp: "18 Oct 2026, 09:00 AM IST".into(),
            created_at: Some(DateTime::from_millis(created_ms)),
            ..Default::default()
        };
        a.sections.push("session1".into());
        if status == AuditState::Completed {
            a.completion_timestamp = Some("18 Oct 2026, 11:00 AM IST".into());
        }
        a
    }

    fn key() -> String {
        identity_key("St. Mary's", "Pune")
    }

    #[test]
    fn test_parse_audit_date_formats() {
        assert_eq!(parse_audit_date("18 Oct 2026"), Some(target()));
        assert_eq!(parse_audit_date("2026-10-18"), Some(target()));
        assert_eq!(parse_audit_date("yesterday"), None);
    }

    #[test]
    fn test_in_progress_dominates_completed_in_either_order() {
        for (ip_ms, done_ms) in [(1_000, 2_000), (2_000, 1_000)] {
            let ip = audit(AuditState::InProgress, "18 Oct 2026", ip_ms);
            let done = audit(AuditState::Completed, "18 Oct 2026", done_ms);
            let ip_id = ip.id_hex();

            let resolved = resolve_statuses(vec![done, ip], target());
            let r = &resolved[&key()];
            assert_eq!(r.status, AuditState::InProgress);
            assert_eq!(r.audit_id, ip_id);
            assert!(r.completion_timestamp.is_none());
        }
    }

    #[test]
    fn test_newest_in_progress_kept() {
        let older = audit(AuditState::InProgress, "17 Oct 2026", 1_000);
        let newer = audit(AuditState::InProgress, "18 Oct 2026", 2_000);
        let newer_id = newer.id_hex();

        let resolved = resolve_statuses(vec![older, newer], target());
        assert_eq!(resolved[&key()].audit_id, newer_id);
    }

    #[test]
    fn test_same_day_completion_preferred_regardless_of_recency() {
        for (same_ms, other_ms) in [(1_000, 2_000), (2_000, 1_000)] {
            let same_day = audit(AuditState::Completed, "18 Oct 2026", same_ms);
            let other_day = audit(AuditState::Completed, "11 Oct 2026", other_ms);
            let same_id = same_day.id_hex();

            let resolved = resolve_statuses(vec![other_day, same_day], target());
            let r = &resolved[&key()];
            assert_eq!(r.audit_id, same_id);
            assert!(r.same_day);
        }
    }

    #[test]
    fn test_newest_completed_kept_when_none_same_day() {
        let older = audit(AuditState::Completed, "10 Oct 2026", 1_000);
        let newer = audit(AuditState::Completed, "11 Oct 2026", 2_000);
        let newer_id = newer.id_hex();

        let resolved = resolve_statuses(vec![older, newer], target());
        assert_eq!(resolved[&key()].audit_id, newer_id);
        assert_eq!(resolved[&key()].raw_audit_date, "11 Oct 2026");
    }

    #[test]
    fn test_phantom_start_resolves_to_nothing() {
        let mut phantom = audit(AuditState::InProgress, "18 Oct 2026", 1_000);
        phantom.sections.clear();
        phantom.responses.clear();

        let resolved = resolve_statuses(vec![phantom], target());
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_in_progress_with_responses_only_is_kept() {
        let mut a = audit(AuditState::InProgress, "18 Oct 2026", 1_000);
        a.sections.clear();
        a.responses.insert("promoters_count".into(), "2".into());

        let resolved = resolve_statuses(vec![a], target());
        assert_eq!(resolved[&key()].status, AuditState::InProgress);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let mut a = audit(AuditState::Completed, "18 Oct 2026", 1_000);
        a.school_name = "ST. MARY'S".into();
        a.city = "pune".into();

        let resolved = resolve_statuses(vec![a], target());
        assert!(resolved.contains_key(&key()));
    }

    #[test]
    fn test_separate_schools_resolve_independently() {
        let a = audit(AuditState::Completed, "18 Oct 2026", 1_000);
        let mut b = audit(AuditState::InProgress, "18 Oct 2026", 2_000);
        b.school_name = "Apex".into();

        let resolved = resolve_statuses(vec![a, b], target());
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[&identity_key("Apex", "Pune")].status, AuditState::InProgress);
        assert_eq!(resolved[&key()].status, AuditState::Completed);
    }
}
