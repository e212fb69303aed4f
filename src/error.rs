use thiserror::Error;

use crate::issue::{Resolution, Status};

/// Errors raised by the issue lifecycle core.
///
/// All of these are business or input rejections handed back to the caller;
/// nothing here is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error(
        "Transition '{transition}' is not allowed from status {status}{} (available: {})",
        resolution_suffix(.resolution),
        list_or_none(.available)
    )]
    InvalidTransition {
        transition: String,
        status: Status,
        resolution: Option<Resolution>,
        available: Vec<String>,
    },

    #[error("Issue not found: {0}")]
    NotFound(String),

    #[error("Malformed finding #{index}: {reason}")]
    MalformedFinding { index: usize, reason: String },

    /// Two reconciliations of the same component overlapped. The core never
    /// raises this itself; the service layer does.
    #[error("Component {0} is already being reconciled")]
    ConcurrentModification(String),

    #[error("Issue {issue} belongs to component {found}, expected {expected}")]
    ComponentMismatch {
        issue: String,
        expected: String,
        found: String,
    },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Invalid parameters for action {action}: {reason}")]
    InvalidParameter { action: String, reason: String },

    #[error("Comment not found: {0}")]
    CommentNotFound(String),

    #[error("User {user} is not allowed to {reason}")]
    PermissionDenied { user: String, reason: String },
}

fn resolution_suffix(resolution: &Option<Resolution>) -> String {
    resolution.map(|r| format!("/{r}")).unwrap_or_default()
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
