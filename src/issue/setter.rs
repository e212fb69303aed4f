//! Field writes on an [`Issue`] that keep the changelog honest.
//!
//! Every setter compares the current and requested values and does nothing
//! when they are equal, so replaying the same analysis produces no changes.
//! Changes land in the issue's current [`FieldDiffs`] and advance its update
//! date; `line` and `message` are refreshed silently, without a diff.

use std::collections::BTreeSet;

use tracing::debug;

use super::diff::{FieldDiffs, IssueChangeContext};
use super::types::{Comment, Impact, Issue, IssueType, Resolution, Severity, Status};
use crate::error::IssueError;

pub const ASSIGNEE: &str = "assignee";
pub const SEVERITY: &str = "severity";
pub const TYPE: &str = "type";
pub const TAGS: &str = "tags";
pub const STATUS: &str = "status";
pub const RESOLUTION: &str = "resolution";
pub const IMPACTS: &str = "impacts";

impl Issue {
    fn record(&mut self, field: &str, old: Option<String>, new: Option<String>, ctx: &IssueChangeContext) {
        let key = self.key.clone();
        self.current_change
            .get_or_insert_with(|| FieldDiffs::new(key, ctx))
            .set_diff(field, old, new);
        self.touch(ctx);
    }

    /// Mark the issue changed and move its update date forward, never back.
    pub(crate) fn touch(&mut self, ctx: &IssueChangeContext) {
        self.changed = true;
        if ctx.date > self.update_date {
            self.update_date = ctx.date;
        }
    }

    pub fn assign(&mut self, assignee: Option<&str>, ctx: &IssueChangeContext) -> bool {
        if self.assignee.as_deref() == assignee {
            return false;
        }
        let old = self.assignee.take();
        self.assignee = assignee.map(str::to_string);
        self.record(ASSIGNEE, old, self.assignee.clone(), ctx);
        true
    }

    /// Severity reported by a scan. Ignored once a user has overridden it.
    pub fn set_severity(&mut self, severity: Severity, ctx: &IssueChangeContext) -> bool {
        if self.manual_severity || self.severity == severity {
            return false;
        }
        let old = self.severity;
        self.severity = severity;
        self.record(SEVERITY, Some(old.to_string()), Some(severity.to_string()), ctx);
        true
    }

    /// Severity chosen by a user; pins it against later scans.
    pub fn set_manual_severity(&mut self, severity: Severity, ctx: &IssueChangeContext) -> bool {
        if self.manual_severity && self.severity == severity {
            return false;
        }
        let old = self.severity;
        self.severity = severity;
        self.manual_severity = true;
        if old != severity {
            self.record(SEVERITY, Some(old.to_string()), Some(severity.to_string()), ctx);
        } else {
            self.touch(ctx);
        }
        true
    }

    pub fn set_type(&mut self, issue_type: IssueType, ctx: &IssueChangeContext) -> bool {
        if self.issue_type == issue_type {
            return false;
        }
        let old = self.issue_type;
        self.issue_type = issue_type;
        self.record(TYPE, Some(old.to_string()), Some(issue_type.to_string()), ctx);
        true
    }

    pub fn set_tags(&mut self, tags: BTreeSet<String>, ctx: &IssueChangeContext) -> bool {
        if self.tags == tags {
            return false;
        }
        let old = join_or_none(self.tags.iter());
        self.tags = tags;
        let new = join_or_none(self.tags.iter());
        self.record(TAGS, old, new, ctx);
        true
    }

    pub fn set_impacts(&mut self, mut impacts: Vec<Impact>, ctx: &IssueChangeContext) -> bool {
        impacts.sort();
        let mut current = self.impacts.clone();
        current.sort();
        if current == impacts {
            return false;
        }
        let old = join_or_none(current.iter());
        let new = join_or_none(impacts.iter());
        self.impacts = impacts;
        self.record(IMPACTS, old, new, ctx);
        true
    }

    pub fn set_line(&mut self, line: Option<usize>, ctx: &IssueChangeContext) -> bool {
        if self.line == line {
            return false;
        }
        debug!(issue = %self.key, old = ?self.line, new = ?line, "moving issue");
        self.line = line;
        self.touch(ctx);
        true
    }

    pub fn set_message(&mut self, message: &str, ctx: &IssueChangeContext) -> bool {
        if self.message == message {
            return false;
        }
        self.message = message.to_string();
        self.touch(ctx);
        true
    }

    pub fn set_status(&mut self, status: Status, ctx: &IssueChangeContext) -> bool {
        if self.status == status {
            return false;
        }
        let old = self.status;
        self.status = status;
        self.record(STATUS, Some(old.to_string()), Some(status.to_string()), ctx);
        true
    }

    pub fn set_resolution(&mut self, resolution: Option<Resolution>, ctx: &IssueChangeContext) -> bool {
        if self.resolution == resolution {
            return false;
        }
        let old = self.resolution.map(|r| r.to_string());
        self.resolution = resolution;
        self.record(RESOLUTION, old, resolution.map(|r| r.to_string()), ctx);
        true
    }

    /// Refresh the line/block fingerprints from the latest analysis.
    ///
    /// Fingerprints are tracking state: a refresh marks the issue changed so
    /// it gets saved, but neither records a diff nor moves the update date.
    pub(crate) fn set_hashes(&mut self, line_hash: Option<String>, block_hash: Option<String>) {
        if line_hash.is_some() && self.line_hash != line_hash {
            self.line_hash = line_hash;
            self.changed = true;
        }
        if block_hash.is_some() && self.block_hash != block_hash {
            self.block_hash = block_hash;
            self.changed = true;
        }
    }

    /// Flag whether the latest analysis still reports the issue. Same
    /// bookkeeping as [`Issue::set_hashes`].
    pub(crate) fn set_end_of_life(&mut self, end_of_life: bool) {
        if self.end_of_life != end_of_life {
            self.end_of_life = end_of_life;
            self.changed = true;
        }
    }

    pub fn add_comment(&mut self, text: &str, ctx: &IssueChangeContext) -> Result<&Comment, IssueError> {
        let user = ctx.user.clone().ok_or_else(|| IssueError::InvalidParameter {
            action: "comment".to_string(),
            reason: "comments need an author".to_string(),
        })?;
        let text = non_blank(text)?;
        self.comments.push(Comment {
            key: uuid::Uuid::new_v4().to_string(),
            user,
            text,
            created_at: ctx.date,
            updated_at: ctx.date,
        });
        self.touch(ctx);
        self.comments.last().ok_or_else(|| IssueError::CommentNotFound(String::new()))
    }

    pub fn edit_comment(&mut self, comment_key: &str, text: &str, ctx: &IssueChangeContext) -> Result<(), IssueError> {
        let text = non_blank(text)?;
        let index = self.comment_owned_by(comment_key, ctx, "edit")?;
        let comment = &mut self.comments[index];
        comment.text = text;
        comment.updated_at = ctx.date;
        self.touch(ctx);
        Ok(())
    }

    pub fn delete_comment(&mut self, comment_key: &str, ctx: &IssueChangeContext) -> Result<Comment, IssueError> {
        let index = self.comment_owned_by(comment_key, ctx, "delete")?;
        let removed = self.comments.remove(index);
        self.touch(ctx);
        Ok(removed)
    }

    fn comment_owned_by(&self, comment_key: &str, ctx: &IssueChangeContext, verb: &str) -> Result<usize, IssueError> {
        let index = self
            .comments
            .iter()
            .position(|c| c.key == comment_key)
            .ok_or_else(|| IssueError::CommentNotFound(comment_key.to_string()))?;
        let author = &self.comments[index].user;
        if ctx.admin || ctx.user.as_deref() == Some(author.as_str()) {
            Ok(index)
        } else {
            Err(IssueError::PermissionDenied {
                user: ctx.user.clone().unwrap_or_else(|| "<scan>".to_string()),
                reason: format!("{verb} a comment written by {author}"),
            })
        }
    }
}

fn join_or_none<T: ToString>(items: impl Iterator<Item = T>) -> Option<String> {
    let joined = items.map(|i| i.to_string()).collect::<Vec<_>>().join(",");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn non_blank(text: &str) -> Result<String, IssueError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(IssueError::InvalidParameter {
            action: "comment".to_string(),
            reason: "comment text must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::issue::test_support::open_issue;

    fn user_ctx(offset_secs: i64) -> IssueChangeContext {
        let issue = open_issue("ABCDE");
        IssueChangeContext::user(issue.creation_date + Duration::seconds(offset_secs), "simon")
    }

    #[test]
    fn test_assign_records_diff() {
        let mut issue = open_issue("ABCDE");
        assert!(issue.assign(Some("arthur"), &user_ctx(10)));
        let change = issue.current_change().unwrap();
        let diff = change.get(ASSIGNEE).unwrap();
        assert_eq!(diff.old_value, None);
        assert_eq!(diff.new_value.as_deref(), Some("arthur"));
        assert!(issue.is_changed());
    }

    #[test]
    fn test_same_assignee_is_noop() {
        let mut issue = open_issue("ABCDE");
        issue.assignee = Some("arthur".into());
        let before = issue.update_date;
        assert!(!issue.assign(Some("arthur"), &user_ctx(10)));
        assert!(issue.current_change().is_none());
        assert_eq!(issue.update_date, before);
    }

    #[test]
    fn test_scan_does_not_revert_manual_severity() {
        let mut issue = open_issue("ABCDE");
        issue.set_manual_severity(Severity::Blocker, &user_ctx(10));
        assert!(!issue.set_severity(Severity::Minor, &user_ctx(20)));
        assert_eq!(issue.severity, Severity::Blocker);
        assert!(issue.manual_severity);
    }

    #[test]
    fn test_line_change_has_no_diff() {
        let mut issue = open_issue("ABCDE");
        assert!(issue.set_line(Some(14), &user_ctx(10)));
        assert_eq!(issue.line, Some(14));
        assert!(issue.current_change().is_none());
        assert!(issue.is_changed());
    }

    #[test]
    fn test_new_fingerprint_marks_changed_without_diff() {
        let mut issue = open_issue("ABCDE");
        let before = issue.update_date;
        issue.set_hashes(Some("h10".into()), None);
        assert!(!issue.is_changed());

        issue.set_hashes(Some("h11".into()), Some("b11".into()));
        assert_eq!(issue.line_hash.as_deref(), Some("h11"));
        assert_eq!(issue.block_hash.as_deref(), Some("b11"));
        assert!(issue.is_changed());
        assert!(issue.current_change().is_none());
        assert_eq!(issue.update_date, before);
    }

    #[test]
    fn test_end_of_life_flip_marks_changed() {
        let mut issue = open_issue("ABCDE");
        issue.set_end_of_life(false);
        assert!(!issue.is_changed());
        issue.set_end_of_life(true);
        assert!(issue.end_of_life);
        assert!(issue.is_changed());
        assert!(issue.current_change().is_none());
    }

    #[test]
    fn test_update_date_never_moves_back() {
        let mut issue = open_issue("ABCDE");
        issue.set_status(Status::Confirmed, &user_ctx(100));
        let later = issue.update_date;
        issue.set_type(IssueType::Bug, &user_ctx(50));
        assert_eq!(issue.update_date, later);
    }

    #[test]
    fn test_tags_diff_is_comma_joined() {
        let mut issue = open_issue("ABCDE");
        let tags: BTreeSet<String> = ["security", "cwe"].iter().map(|s| s.to_string()).collect();
        issue.set_tags(tags, &user_ctx(10));
        let diff = issue.current_change().unwrap().get(TAGS).unwrap();
        assert_eq!(diff.new_value.as_deref(), Some("cwe,security"));
    }

    #[test]
    fn test_comment_lifecycle() {
        let mut issue = open_issue("ABCDE");
        let key = issue.add_comment("  looks fine  ", &user_ctx(10)).unwrap().key.clone();
        assert_eq!(issue.comments[0].text, "looks fine");

        issue.edit_comment(&key, "actually not", &user_ctx(20)).unwrap();
        assert_eq!(issue.comments[0].text, "actually not");

        let other = IssueChangeContext::user(issue.update_date, "julien");
        let err = issue.delete_comment(&key, &other).unwrap_err();
        assert!(matches!(err, IssueError::PermissionDenied { .. }));

        let admin = other.as_admin();
        issue.delete_comment(&key, &admin).unwrap();
        assert!(issue.comments.is_empty());
    }

    #[test]
    fn test_blank_comment_rejected() {
        let mut issue = open_issue("ABCDE");
        let err = issue.add_comment("   ", &user_ctx(10)).unwrap_err();
        assert!(matches!(err, IssueError::InvalidParameter { .. }));
    }

    #[test]
    fn test_unknown_comment() {
        let mut issue = open_issue("ABCDE");
        let err = issue.edit_comment("nope", "text", &user_ctx(10)).unwrap_err();
        assert_eq!(err, IssueError::CommentNotFound("nope".to_string()));
    }
}
