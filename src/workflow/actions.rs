//! Named actions applied to a single issue, e.g. from a bulk change request.
//!
//! Actions are looked up by key at apply time. Each one validates its own
//! parameters and writes through the issue setters, so plugin actions get
//! the same changelog treatment as built-in ones.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{Transition, Workflow};
use crate::error::IssueError;
use crate::issue::{Issue, IssueChangeContext, IssueType, Severity};

pub type ActionParams = BTreeMap<String, String>;

pub trait Action: Send + Sync {
    /// Name the action is registered and invoked under.
    fn key(&self) -> &str;

    /// Check parameters before touching any issue.
    fn verify(&self, params: &ActionParams) -> Result<(), IssueError>;

    /// Whether the action makes sense for this issue at all.
    fn supports(&self, issue: &Issue) -> bool {
        !issue.is_closed()
    }

    /// Apply the action; returns whether the issue changed.
    fn execute(
        &self,
        issue: &mut Issue,
        params: &ActionParams,
        ctx: &IssueChangeContext,
    ) -> Result<bool, IssueError>;
}

/// Actions available by name.
pub struct ActionRegistry {
    actions: BTreeMap<String, Box<dyn Action>>,
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    pub fn with_builtins(workflow: Workflow) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(AssignAction));
        registry.register(Box::new(SetSeverityAction));
        registry.register(Box::new(SetTypeAction));
        registry.register(Box::new(TagsAction { remove: false }));
        registry.register(Box::new(TagsAction { remove: true }));
        registry.register(Box::new(CommentAction));
        registry.register(Box::new(TransitionAction { workflow }));
        registry
    }

    /// Register an action, replacing any action with the same key.
    pub fn register(&mut self, action: Box<dyn Action>) {
        self.actions.insert(action.key().to_string(), action);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn execute(
        &self,
        key: &str,
        issue: &mut Issue,
        params: &ActionParams,
        ctx: &IssueChangeContext,
    ) -> Result<bool, IssueError> {
        let action = self
            .actions
            .get(key)
            .ok_or_else(|| IssueError::UnknownAction(key.to_string()))?;
        action.verify(params)?;
        if !action.supports(issue) {
            return Err(invalid(
                key,
                format!("not applicable to issue {} in status {}", issue.key, issue.status),
            ));
        }
        let changed = action.execute(issue, params, ctx)?;
        debug!(issue = %issue.key, action = key, changed, "action executed");
        Ok(changed)
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins(Workflow::new())
    }
}

fn invalid(action: &str, reason: impl Into<String>) -> IssueError {
    IssueError::InvalidParameter {
        action: action.to_string(),
        reason: reason.into(),
    }
}

fn required<'p>(action: &str, params: &'p ActionParams, name: &str) -> Result<&'p str, IssueError> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| invalid(action, format!("missing parameter '{name}'")))
}

struct AssignAction;

impl Action for AssignAction {
    fn key(&self) -> &str {
        "assign"
    }

    fn verify(&self, _params: &ActionParams) -> Result<(), IssueError> {
        Ok(())
    }

    /// A missing or blank `assignee` unassigns.
    fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
        let assignee = params.get("assignee").map(|a| a.trim()).filter(|a| !a.is_empty());
        Ok(issue.assign(assignee, ctx))
    }
}

struct SetSeverityAction;

impl Action for SetSeverityAction {
    fn key(&self) -> &str {
        "set_severity"
    }

    fn verify(&self, params: &ActionParams) -> Result<(), IssueError> {
        required(self.key(), params, "severity")?
            .parse::<Severity>()
            .map(|_| ())
            .map_err(|e| invalid(self.key(), e))
    }

    fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
        let severity = required(self.key(), params, "severity")?
            .parse::<Severity>()
            .map_err(|e| invalid(self.key(), e))?;
        Ok(issue.set_manual_severity(severity, ctx))
    }
}

struct SetTypeAction;

impl Action for SetTypeAction {
    fn key(&self) -> &str {
        "set_type"
    }

    fn verify(&self, params: &ActionParams) -> Result<(), IssueError> {
        required(self.key(), params, "type")?
            .parse::<IssueType>()
            .map(|_| ())
            .map_err(|e| invalid(self.key(), e))
    }

    fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
        let issue_type = required(self.key(), params, "type")?
            .parse::<IssueType>()
            .map_err(|e| invalid(self.key(), e))?;
        Ok(issue.set_type(issue_type, ctx))
    }
}

/// `add_tags` / `remove_tags`, with a comma separated `tags` parameter.
struct TagsAction {
    remove: bool,
}

impl TagsAction {
    fn parse(&self, params: &ActionParams) -> Result<BTreeSet<String>, IssueError> {
        required(self.key(), params, "tags")?
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t.chars().all(|c| c.is_ascii_alphanumeric() || "+#-.".contains(c)) {
                    Ok(t)
                } else {
                    Err(invalid(self.key(), format!("tag '{t}' contains invalid characters")))
                }
            })
            .collect()
    }
}

impl Action for TagsAction {
    fn key(&self) -> &str {
        if self.remove {
            "remove_tags"
        } else {
            "add_tags"
        }
    }

    fn verify(&self, params: &ActionParams) -> Result<(), IssueError> {
        self.parse(params).map(|_| ())
    }

    fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
        let requested = self.parse(params)?;
        let tags = if self.remove {
            issue.tags.difference(&requested).cloned().collect()
        } else {
            issue.tags.union(&requested).cloned().collect()
        };
        Ok(issue.set_tags(tags, ctx))
    }
}

struct CommentAction;

impl Action for CommentAction {
    fn key(&self) -> &str {
        "comment"
    }

    fn verify(&self, params: &ActionParams) -> Result<(), IssueError> {
        required(self.key(), params, "text").map(|_| ())
    }

    fn supports(&self, _issue: &Issue) -> bool {
        true
    }

    fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
        let text = required(self.key(), params, "text")?;
        issue.add_comment(text, ctx)?;
        Ok(true)
    }
}

struct TransitionAction {
    workflow: Workflow,
}

impl Action for TransitionAction {
    fn key(&self) -> &str {
        "do_transition"
    }

    fn verify(&self, params: &ActionParams) -> Result<(), IssueError> {
        required(self.key(), params, "transition")?
            .parse::<Transition>()
            .map(|_| ())
            .map_err(|e| invalid(self.key(), e))
    }

    // The workflow decides, and reports what is available.
    fn supports(&self, _issue: &Issue) -> bool {
        true
    }

    fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
        let transition = required(self.key(), params, "transition")?
            .parse::<Transition>()
            .map_err(|e| invalid(self.key(), e))?;
        self.workflow.do_transition(issue, transition, ctx)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::test_support::{date, open_issue};
    use crate::issue::{Resolution, Status};

    fn params(pairs: &[(&str, &str)]) -> ActionParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn ctx() -> IssueChangeContext {
        IssueChangeContext::user(date(2), "simon")
    }

    /// A third-party action registered next to the built-ins.
    struct FakeAction;

    impl Action for FakeAction {
        fn key(&self) -> &str {
            "fake"
        }

        fn verify(&self, params: &ActionParams) -> Result<(), IssueError> {
            required(self.key(), params, "tag").map(|_| ())
        }

        fn execute(&self, issue: &mut Issue, params: &ActionParams, ctx: &IssueChangeContext) -> Result<bool, IssueError> {
            let mut tags = issue.tags.clone();
            tags.insert(params["tag"].clone());
            Ok(issue.set_tags(tags, ctx))
        }
    }

    #[test]
    fn test_builtin_keys() {
        let registry = ActionRegistry::default();
        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(
            keys,
            vec!["add_tags", "assign", "comment", "do_transition", "remove_tags", "set_severity", "set_type"]
        );
    }

    #[test]
    fn test_unknown_action() {
        let mut issue = open_issue("ABCDE");
        let err = ActionRegistry::default()
            .execute("explode", &mut issue, &params(&[]), &ctx())
            .unwrap_err();
        assert_eq!(err, IssueError::UnknownAction("explode".to_string()));
    }

    #[test]
    fn test_assign_and_unassign() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        assert!(registry.execute("assign", &mut issue, &params(&[("assignee", "arthur")]), &ctx()).unwrap());
        assert_eq!(issue.assignee.as_deref(), Some("arthur"));
        assert!(registry.execute("assign", &mut issue, &params(&[]), &ctx()).unwrap());
        assert_eq!(issue.assignee, None);
    }

    #[test]
    fn test_set_severity_marks_manual() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        registry
            .execute("set_severity", &mut issue, &params(&[("severity", "BLOCKER")]), &ctx())
            .unwrap();
        assert_eq!(issue.severity, Severity::Blocker);
        assert!(issue.manual_severity);
    }

    #[test]
    fn test_invalid_severity_rejected_before_execution() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        let before = issue.clone();
        let err = registry
            .execute("set_severity", &mut issue, &params(&[("severity", "HUGE")]), &ctx())
            .unwrap_err();
        assert!(matches!(err, IssueError::InvalidParameter { .. }));
        assert_eq!(issue, before);
    }

    #[test]
    fn test_add_and_remove_tags() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        registry
            .execute("add_tags", &mut issue, &params(&[("tags", "Security, cwe")]), &ctx())
            .unwrap();
        assert_eq!(issue.tags.iter().cloned().collect::<Vec<_>>(), vec!["cwe", "security"]);
        registry
            .execute("remove_tags", &mut issue, &params(&[("tags", "cwe")]), &ctx())
            .unwrap();
        assert_eq!(issue.tags.iter().cloned().collect::<Vec<_>>(), vec!["security"]);
    }

    #[test]
    fn test_bad_tag_rejected() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        let err = registry
            .execute("add_tags", &mut issue, &params(&[("tags", "no spaces allowed")]), &ctx())
            .unwrap_err();
        assert!(matches!(err, IssueError::InvalidParameter { .. }));
    }

    #[test]
    fn test_actions_refused_on_closed_issue() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        issue.status = Status::Closed;
        issue.resolution = Some(Resolution::Fixed);
        let err = registry
            .execute("set_type", &mut issue, &params(&[("type", "BUG")]), &ctx())
            .unwrap_err();
        assert!(err.to_string().contains("not applicable"));
    }

    #[test]
    fn test_transition_action_uses_workflow() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        registry
            .execute("do_transition", &mut issue, &params(&[("transition", "wontfix")]), &ctx())
            .unwrap();
        assert_eq!(issue.status, Status::Resolved);
        assert_eq!(issue.resolution, Some(Resolution::WontFix));

        let err = registry
            .execute("do_transition", &mut issue, &params(&[("transition", "confirm")]), &ctx())
            .unwrap_err();
        assert!(matches!(err, IssueError::InvalidTransition { .. }));
    }

    #[test]
    fn test_comment_action() {
        let registry = ActionRegistry::default();
        let mut issue = open_issue("ABCDE");
        registry
            .execute("comment", &mut issue, &params(&[("text", "will fix in next sprint")]), &ctx())
            .unwrap();
        assert_eq!(issue.comments.len(), 1);
        assert_eq!(issue.comments[0].user, "simon");
    }

    #[test]
    fn test_plugin_action() {
        let mut registry = ActionRegistry::default();
        registry.register(Box::new(FakeAction));
        let mut issue = open_issue("ABCDE");
        assert!(registry.execute("fake", &mut issue, &params(&[("tag", "fake")]), &ctx()).unwrap());
        assert!(issue.tags.contains("fake"));
        assert!(issue.current_change().unwrap().get("tags").is_some());

        let err = registry.execute("fake", &mut issue, &params(&[]), &ctx()).unwrap_err();
        assert!(matches!(err, IssueError::InvalidParameter { .. }));
    }
}
