use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::FieldDiff;

/// Content of a persisted changelog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeData {
    Diff { diffs: BTreeMap<String, FieldDiff> },
    Comment { comment_key: String, text: String },
}

/// One changelog row, ready for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogRecord {
    pub issue_key: String,
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
    pub change: ChangeData,
}

/// Outbound notification, delivered by a [`NotificationChannel`](super::NotificationChannel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// An analysis introduced issues on a component
    NewIssues {
        component_key: String,
        issue_keys: Vec<String>,
    },
    AssigneeChanged {
        issue_key: String,
        assignee: Option<String>,
        changed_by: Option<String>,
    },
    /// An assigned issue was changed by someone other than its assignee
    IssueChanged {
        issue_key: String,
        assignee: String,
        changed_by: Option<String>,
        fields: Vec<String>,
    },
}

impl fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationEvent::NewIssues { component_key, issue_keys } => {
                write!(f, "{} new issue(s) on {}", issue_keys.len(), component_key)
            }
            NotificationEvent::AssigneeChanged { issue_key, assignee, .. } => match assignee {
                Some(assignee) => write!(f, "issue {issue_key} assigned to {assignee}"),
                None => write!(f, "issue {issue_key} unassigned"),
            },
            NotificationEvent::IssueChanged { issue_key, assignee, fields, .. } => {
                write!(f, "issue {issue_key} of {assignee} changed ({})", fields.join(", "))
            }
        }
    }
}

/// Everything one batch of changes turns into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
    pub records: Vec<ChangelogRecord>,
    pub events: Vec<NotificationEvent>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.events.is_empty()
    }
}
