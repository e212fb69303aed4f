use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who is changing an issue, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueChangeContext {
    pub date: DateTime<Utc>,
    /// Acting user; `None` for scan-driven changes
    pub user: Option<String>,
    /// Administrators may edit or delete comments they did not write
    pub admin: bool,
}

impl IssueChangeContext {
    /// Context for changes applied by an analysis.
    pub fn scan(date: DateTime<Utc>) -> Self {
        Self {
            date,
            user: None,
            admin: false,
        }
    }

    /// Context for changes requested by a user.
    pub fn user(date: DateTime<Utc>, login: impl Into<String>) -> Self {
        Self {
            date,
            user: Some(login.into()),
            admin: false,
        }
    }

    pub fn as_admin(mut self) -> Self {
        self.admin = true;
        self
    }

    pub fn is_scan(&self) -> bool {
        self.user.is_none()
    }
}

/// Old and new value of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// A dated, optionally user-attributed group of field changes on one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiffs {
    pub issue_key: String,
    pub user: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub diffs: BTreeMap<String, FieldDiff>,
}

impl FieldDiffs {
    pub fn new(issue_key: impl Into<String>, ctx: &IssueChangeContext) -> Self {
        Self {
            issue_key: issue_key.into(),
            user: ctx.user.clone(),
            creation_date: ctx.date,
            diffs: BTreeMap::new(),
        }
    }

    /// Record a change of `field`. A field changed twice within the same set
    /// keeps its first old value; a change that ends up back where it started
    /// is dropped.
    pub fn set_diff(&mut self, field: &str, old_value: Option<String>, new_value: Option<String>) {
        let old_value = match self.diffs.remove(field) {
            Some(previous) => previous.old_value,
            None => old_value,
        };
        if old_value == new_value {
            return;
        }
        self.diffs.insert(
            field.to_string(),
            FieldDiff {
                old_value,
                new_value,
            },
        );
    }

    pub fn get(&self, field: &str) -> Option<&FieldDiff> {
        self.diffs.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> IssueChangeContext {
        IssueChangeContext::user(Utc::now(), "simon")
    }

    #[test]
    fn test_set_diff_records_old_and_new() {
        let mut diffs = FieldDiffs::new("ABCDE", &ctx());
        diffs.set_diff("severity", Some("MAJOR".into()), Some("BLOCKER".into()));
        let diff = diffs.get("severity").unwrap();
        assert_eq!(diff.old_value.as_deref(), Some("MAJOR"));
        assert_eq!(diff.new_value.as_deref(), Some("BLOCKER"));
        assert_eq!(diffs.user.as_deref(), Some("simon"));
    }

    #[test]
    fn test_repeated_change_keeps_first_old_value() {
        let mut diffs = FieldDiffs::new("ABCDE", &ctx());
        diffs.set_diff("status", Some("OPEN".into()), Some("CONFIRMED".into()));
        diffs.set_diff("status", Some("CONFIRMED".into()), Some("RESOLVED".into()));
        let diff = diffs.get("status").unwrap();
        assert_eq!(diff.old_value.as_deref(), Some("OPEN"));
        assert_eq!(diff.new_value.as_deref(), Some("RESOLVED"));
    }

    #[test]
    fn test_change_back_to_original_is_dropped() {
        let mut diffs = FieldDiffs::new("ABCDE", &ctx());
        diffs.set_diff("assignee", None, Some("arthur".into()));
        diffs.set_diff("assignee", Some("arthur".into()), None);
        assert!(diffs.is_empty());
    }

    #[test]
    fn test_scan_context_has_no_user() {
        let scan = IssueChangeContext::scan(Utc::now());
        assert!(scan.is_scan());
        assert!(!ctx().is_scan());
    }
}
