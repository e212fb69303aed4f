pub mod types;

pub use types::{ChangeData, ChangelogRecord, Emission, NotificationEvent};

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::issue::setter::ASSIGNEE;
use crate::issue::{Comment, FieldDiffs, Issue};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Failed to deliver notification via {channel}: {reason}")]
    Delivery { channel: String, reason: String },
}

/// Delivery of notification events (email, webhook, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Channel that only writes events to the log.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        info!(%event, "notification");
        Ok(())
    }
}

/// Turns change sets into changelog rows and notification events.
///
/// Change sets are grouped per issue; sets sharing author and date are
/// folded into one row, and empty sets produce nothing at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct Emitter;

impl Emitter {
    pub fn new() -> Self {
        Self
    }

    pub fn emit(&self, component_key: &str, issues: &[Issue], changelog: &[FieldDiffs]) -> Emission {
        let mut emission = Emission::default();

        let mut by_issue: BTreeMap<&str, Vec<FieldDiffs>> = BTreeMap::new();
        for change in changelog.iter().filter(|c| !c.is_empty()) {
            let group = by_issue.entry(change.issue_key.as_str()).or_default();
            match group.last_mut() {
                Some(last) if last.user == change.user && last.creation_date == change.creation_date => {
                    for (field, diff) in &change.diffs {
                        last.set_diff(field, diff.old_value.clone(), diff.new_value.clone());
                    }
                }
                _ => group.push(change.clone()),
            }
        }

        for (issue_key, changes) in by_issue {
            let issue = issues.iter().find(|i| i.key == issue_key);
            for change in changes.into_iter().filter(|c| !c.is_empty()) {
                emission.events.extend(change_events(issue, &change));
                emission.records.push(ChangelogRecord {
                    issue_key: change.issue_key,
                    user: change.user,
                    created_at: change.creation_date,
                    change: ChangeData::Diff { diffs: change.diffs },
                });
            }
        }

        let new_keys: Vec<String> = issues.iter().filter(|i| i.is_new).map(|i| i.key.clone()).collect();
        if !new_keys.is_empty() {
            emission.events.insert(
                0,
                NotificationEvent::NewIssues {
                    component_key: component_key.to_string(),
                    issue_keys: new_keys,
                },
            );
        }

        debug!(records = emission.records.len(), events = emission.events.len(), "emission built");
        emission
    }

    /// Changelog row for a comment just added to an issue.
    pub fn comment_record(&self, issue_key: &str, comment: &Comment) -> ChangelogRecord {
        ChangelogRecord {
            issue_key: issue_key.to_string(),
            user: Some(comment.user.clone()),
            created_at: comment.created_at,
            change: ChangeData::Comment {
                comment_key: comment.key.clone(),
                text: comment.text.clone(),
            },
        }
    }
}

fn change_events(issue: Option<&Issue>, change: &FieldDiffs) -> Vec<NotificationEvent> {
    let mut events = Vec::new();

    if let Some(diff) = change.get(ASSIGNEE) {
        if diff.new_value != change.user {
            events.push(NotificationEvent::AssigneeChanged {
                issue_key: change.issue_key.clone(),
                assignee: diff.new_value.clone(),
                changed_by: change.user.clone(),
            });
        }
    }

    let assignee = issue.and_then(|i| i.assignee.as_ref());
    if let Some(assignee) = assignee {
        let fields: Vec<String> = change.diffs.keys().filter(|f| *f != ASSIGNEE).cloned().collect();
        if !fields.is_empty() && change.user.as_ref() != Some(assignee) {
            events.push(NotificationEvent::IssueChanged {
                issue_key: change.issue_key.clone(),
                assignee: assignee.clone(),
                changed_by: change.user.clone(),
                fields,
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::test_support::{date, open_issue};
    use crate::issue::IssueChangeContext;

    fn diffs(key: &str, user: Option<&str>, day: u32, field: &str, old: Option<&str>, new: Option<&str>) -> FieldDiffs {
        let ctx = IssueChangeContext {
            date: date(day),
            user: user.map(str::to_string),
            admin: false,
        };
        let mut diffs = FieldDiffs::new(key, &ctx);
        diffs.set_diff(field, old.map(str::to_string), new.map(str::to_string));
        diffs
    }

    #[test]
    fn test_empty_changesets_are_suppressed() {
        let empty = FieldDiffs::new("A", &IssueChangeContext::scan(date(2)));
        let emission = Emitter::new().emit("c", &[open_issue("A")], &[empty]);
        assert!(emission.is_empty());
    }

    #[test]
    fn test_same_author_and_date_grouped() {
        let changes = vec![
            diffs("A", None, 2, "status", Some("OPEN"), Some("CLOSED")),
            diffs("A", None, 2, "resolution", None, Some("FIXED")),
            diffs("A", Some("simon"), 3, "severity", Some("MAJOR"), Some("BLOCKER")),
        ];
        let emission = Emitter::new().emit("c", &[open_issue("A")], &changes);
        assert_eq!(emission.records.len(), 2);
        match &emission.records[0].change {
            ChangeData::Diff { diffs } => assert_eq!(diffs.len(), 2),
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn test_new_issues_event() {
        let mut issue = open_issue("A");
        issue.is_new = true;
        let emission = Emitter::new().emit("src/main.rs", &[issue, open_issue("B")], &[]);
        assert_eq!(
            emission.events,
            vec![NotificationEvent::NewIssues {
                component_key: "src/main.rs".to_string(),
                issue_keys: vec!["A".to_string()],
            }]
        );
        assert!(emission.records.is_empty());
    }

    #[test]
    fn test_assignment_by_someone_else_notifies() {
        let mut issue = open_issue("A");
        issue.assignee = Some("arthur".into());
        let changes = vec![diffs("A", Some("simon"), 2, "assignee", None, Some("arthur"))];
        let emission = Emitter::new().emit("c", &[issue], &changes);
        assert_eq!(
            emission.events,
            vec![NotificationEvent::AssigneeChanged {
                issue_key: "A".to_string(),
                assignee: Some("arthur".to_string()),
                changed_by: Some("simon".to_string()),
            }]
        );
    }

    #[test]
    fn test_self_assignment_is_silent() {
        let mut issue = open_issue("A");
        issue.assignee = Some("arthur".into());
        let changes = vec![diffs("A", Some("arthur"), 2, "assignee", None, Some("arthur"))];
        assert!(Emitter::new().emit("c", &[issue], &changes).events.is_empty());
    }

    #[test]
    fn test_changes_on_my_issue() {
        let mut issue = open_issue("A");
        issue.assignee = Some("arthur".into());
        let by_scan = vec![diffs("A", None, 2, "status", Some("OPEN"), Some("CLOSED"))];
        let emission = Emitter::new().emit("c", &[issue.clone()], &by_scan);
        assert!(matches!(&emission.events[0], NotificationEvent::IssueChanged { fields, .. } if fields == &vec!["status".to_string()]));

        let by_assignee = vec![diffs("A", Some("arthur"), 2, "status", Some("OPEN"), Some("CONFIRMED"))];
        assert!(Emitter::new().emit("c", &[issue], &by_assignee).events.is_empty());
    }

    #[test]
    fn test_comment_record() {
        let mut issue = open_issue("A");
        let comment = issue
            .add_comment("please check", &IssueChangeContext::user(date(2), "simon"))
            .unwrap()
            .clone();
        let record = Emitter::new().comment_record("A", &comment);
        assert_eq!(record.user.as_deref(), Some("simon"));
        assert!(matches!(record.change, ChangeData::Comment { ref text, .. } if text == "please check"));
    }

    #[tokio::test]
    async fn test_log_channel_delivers() {
        let event = NotificationEvent::AssigneeChanged {
            issue_key: "A".to_string(),
            assignee: None,
            changed_by: None,
        };
        assert_eq!(event.to_string(), "issue A unassigned");
        LogChannel.deliver(&event).await.unwrap();
    }
}
