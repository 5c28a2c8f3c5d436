//! School identity keys and order-preserving dedup

use std::collections::HashSet;
use tracing::warn;

use crate::db::schemas::SchoolEntry;

/// `lowercase(school_name)|lowercase(city)`
pub fn identity_key(school_name: &str, city: &str) -> String {
    format!("{}|{}", school_name.to_lowercase(), city.to_lowercase())
}

/// Schools with duplicates collapsed to their first occurrence
#[derive(Debug, Clone, Default)]
pub struct Deduped {
    pub schools: Vec<SchoolEntry>,
    pub duplicates_removed: usize,
}

impl Deduped {
    /// (school_name, city) pairs for the audit lookup
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.schools
            .iter()
            .map(|s| (s.school_name.clone(), s.city.clone()))
            .collect()
    }
}

/// Single pass keeping the first school seen for each identity key
pub fn dedup_schools(schools: &[SchoolEntry]) -> Deduped {
    let mut seen = HashSet::with_capacity(schools.len());
    let mut unique = Vec::with_capacity(schools.len());

    for school in schools {
        if seen.insert(identity_key(&school.school_name, &school.city)) {
            unique.push(school.clone());
        } else {
            warn!(
                school = %school.school_name,
                city = %school.city,
                "Duplicate school removed"
            );
        }
    }

    Deduped {
        duplicates_removed: schools.len() - unique.len(),
        schools: unique,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_lowercases_both_parts() {
        assert_eq!(identity_key("St. Mary's", "PUNE"), "st. mary's|pune");
        assert_ne!(identity_key("A", "Pune"), identity_key("A", "Mumbai"));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence_in_order() {
        let mut first = SchoolEntry::new("St. Mary's", "Pune");
        first.audit_id = Some("first".into());
        let mut dup = SchoolEntry::new("st. mary's", "pune");
        dup.audit_id = Some("dup".into());

        let schools = vec![
            SchoolEntry::new("Zenith", "Mumbai"),
            first,
            SchoolEntry::new("Apex", "Pune"),
            dup,
            SchoolEntry::new("Zenith", "Mumbai"),
        ];

        let deduped = dedup_schools(&schools);
        assert_eq!(deduped.duplicates_removed, 2);

        let names: Vec<_> = deduped.schools.iter().map(|s| s.school_name.as_str()).collect();
        assert_eq!(names, vec!["Zenith", "St. Mary's", "Apex"]);
        assert_eq!(deduped.schools[1].audit_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_dedup_counts_match_distinct_keys() {
        // N schools over K keys always yields K schools and N-K removed
        let cities = ["Pune", "Mumbai", "pune"];
        let schools: Vec<_> = (0..12)
            .map(|i| SchoolEntry::new(format!("School {}", i % 4), cities[i % 3]))
            .collect();

        let keys: HashSet<_> = schools
            .iter()
            .map(|s| identity_key(&s.school_name, &s.city))
            .collect();

        let deduped = dedup_schools(&schools);
        assert_eq!(deduped.schools.len(), keys.len());
        assert_eq!(deduped.duplicates_removed, schools.len() - keys.len());
    }

    #[test]
    fn test_dedup_empty() {
        let deduped = dedup_schools(&[]);
        assert!(deduped.schools.is_empty());
        assert_eq!(deduped.duplicates_removed, 0);
        assert!(deduped.pairs().is_empty());
    }
}
