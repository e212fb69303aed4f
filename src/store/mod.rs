pub mod json;

pub use json::JsonFileIssueStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::issue::Issue;
use crate::notification::ChangelogRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access issue store: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse issue store: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence of issues and their changelog.
#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Issues of `component_key` that are not CLOSED, in insertion order.
    async fn load_open_issues(&self, component_key: &str) -> Result<Vec<Issue>, StoreError>;

    async fn load_issue(&self, issue_key: &str) -> Result<Option<Issue>, StoreError>;

    /// Insert or replace `issues` by key and append `changelog`.
    async fn save(&self, issues: &[Issue], changelog: &[ChangelogRecord]) -> Result<(), StoreError>;

    async fn changelog(&self, issue_key: &str) -> Result<Vec<ChangelogRecord>, StoreError>;
}

/// Issues and changelog rows as persisted.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StoreContents {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub changelog: Vec<ChangelogRecord>,
}

impl StoreContents {
    fn open_issues(&self, component_key: &str) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|i| i.component_key == component_key && !i.is_closed())
            .cloned()
            .collect()
    }

    fn issue(&self, issue_key: &str) -> Option<Issue> {
        self.issues.iter().find(|i| i.key == issue_key).cloned()
    }

    fn upsert(&mut self, issues: &[Issue], changelog: &[ChangelogRecord]) {
        let positions: BTreeMap<String, usize> =
            self.issues.iter().enumerate().map(|(i, issue)| (issue.key.clone(), i)).collect();
        for issue in issues {
            let mut stored = issue.clone();
            stored.changed = false;
            stored.current_change = None;
            match positions.get(&issue.key) {
                Some(&i) => self.issues[i] = stored,
                None => self.issues.push(stored),
            }
        }
        self.changelog.extend_from_slice(changelog);
    }

    fn changelog_of(&self, issue_key: &str) -> Vec<ChangelogRecord> {
        self.changelog.iter().filter(|r| r.issue_key == issue_key).cloned().collect()
    }
}

/// Store kept in process memory; used by tests and the demo mode.
#[derive(Debug, Default)]
pub struct InMemoryIssueStore {
    contents: RwLock<StoreContents>,
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_issues(issues: Vec<Issue>) -> Self {
        Self {
            contents: RwLock::new(StoreContents {
                issues,
                changelog: Vec::new(),
            }),
        }
    }

    /// All stored issues, closed ones included.
    pub async fn all_issues(&self) -> Vec<Issue> {
        self.contents.read().await.issues.clone()
    }
}

#[async_trait]
impl IssueStore for InMemoryIssueStore {
    async fn load_open_issues(&self, component_key: &str) -> Result<Vec<Issue>, StoreError> {
        Ok(self.contents.read().await.open_issues(component_key))
    }

    async fn load_issue(&self, issue_key: &str) -> Result<Option<Issue>, StoreError> {
        Ok(self.contents.read().await.issue(issue_key))
    }

    async fn save(&self, issues: &[Issue], changelog: &[ChangelogRecord]) -> Result<(), StoreError> {
        self.contents.write().await.upsert(issues, changelog);
        debug!(issues = issues.len(), changelog = changelog.len(), "saved to memory");
        Ok(())
    }

    async fn changelog(&self, issue_key: &str) -> Result<Vec<ChangelogRecord>, StoreError> {
        Ok(self.contents.read().await.changelog_of(issue_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::test_support::{date, issue_on, open_issue};
    use crate::issue::{Resolution, Status};
    use crate::notification::ChangeData;

    fn closed(key: &str) -> Issue {
        let mut issue = open_issue(key);
        issue.status = Status::Closed;
        issue.resolution = Some(Resolution::Fixed);
        issue
    }

    #[tokio::test]
    async fn test_load_open_issues_filters_component_and_status() {
        let mut other = issue_on("C", "rust:S1", Some(1), None);
        other.component_key = "src/lib.rs".to_string();
        let store = InMemoryIssueStore::with_issues(vec![open_issue("A"), closed("B"), other]);

        let open = store.load_open_issues("src/main.rs").await.unwrap();
        let keys: Vec<&str> = open.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["A"]);
    }

    #[tokio::test]
    async fn test_save_replaces_by_key_and_appends() {
        let store = InMemoryIssueStore::with_issues(vec![open_issue("A")]);
        let mut updated = open_issue("A");
        updated.assignee = Some("arthur".into());
        let record = ChangelogRecord {
            issue_key: "A".to_string(),
            user: Some("simon".to_string()),
            created_at: date(2),
            change: ChangeData::Comment {
                comment_key: "c1".to_string(),
                text: "hi".to_string(),
            },
        };

        store.save(&[updated, open_issue("B")], &[record.clone()]).await.unwrap();

        let all = store.all_issues().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].assignee.as_deref(), Some("arthur"));
        assert_eq!(store.changelog("A").await.unwrap(), vec![record]);
        assert!(store.changelog("B").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_issue() {
        let store = InMemoryIssueStore::new();
        assert!(store.load_issue("nope").await.unwrap().is_none());
    }
}
