pub mod actions;
pub mod types;

pub use actions::{Action, ActionParams, ActionRegistry};
pub use types::{AutomaticTransition, Guard, Transition, TransitionDef};

use tracing::{debug, instrument};

use crate::error::IssueError;
use crate::issue::{Issue, IssueChangeContext, Resolution, Status};
use types::USER_TRANSITIONS;

/// The issue status/resolution state machine.
///
/// Users move issues with [`Workflow::do_transition`]; analyses use
/// [`Workflow::do_automatic_transition`]. Both write through the issue
/// setters, so every change shows up in the issue's changelog.
#[derive(Debug, Clone, Copy, Default)]
pub struct Workflow;

impl Workflow {
    pub fn new() -> Self {
        Self
    }

    /// User transitions currently legal for `issue`, in table order.
    pub fn out_transitions(&self, issue: &Issue) -> Vec<Transition> {
        USER_TRANSITIONS
            .iter()
            .filter(|def| allowed(def, issue))
            .map(|def| def.transition)
            .collect()
    }

    /// Apply a user transition. On error the issue is left untouched.
    #[instrument(skip(self, issue, ctx), fields(issue = %issue.key, status = %issue.status, user = ?ctx.user))]
    pub fn do_transition(
        &self,
        issue: &mut Issue,
        transition: Transition,
        ctx: &IssueChangeContext,
    ) -> Result<(), IssueError> {
        let def = USER_TRANSITIONS
            .iter()
            .find(|def| def.transition == transition)
            .filter(|def| allowed(def, issue))
            .ok_or_else(|| IssueError::InvalidTransition {
                transition: transition.key().to_string(),
                status: issue.status,
                resolution: issue.resolution,
                available: self
                    .out_transitions(issue)
                    .iter()
                    .map(|t| t.key().to_string())
                    .collect(),
            })?;

        move_to(issue, def.to, def.resolution, ctx);
        debug!(to = %issue.status, resolution = ?issue.resolution, "transition applied");
        Ok(())
    }

    /// By-value form of [`Workflow::do_transition`].
    pub fn transitioned(
        &self,
        mut issue: Issue,
        transition: Transition,
        ctx: &IssueChangeContext,
    ) -> Result<Issue, IssueError> {
        self.do_transition(&mut issue, transition, ctx)?;
        Ok(issue)
    }

    /// Apply whatever transition an analysis implies for `issue`, if any.
    ///
    /// Relies on the issue's `end_of_life` (no longer reported) and
    /// `on_disabled_rule` (rule inactive or component gone) flags.
    pub fn do_automatic_transition(
        &self,
        issue: &mut Issue,
        ctx: &IssueChangeContext,
    ) -> Option<AutomaticTransition> {
        let applied = if issue.end_of_life {
            if issue.is_closed() {
                None
            } else if issue.on_disabled_rule {
                move_to(issue, Status::Closed, Some(Resolution::Removed), ctx);
                Some(AutomaticTransition::CloseRemoved)
            } else if issue.status.is_unresolved()
                || matches!(issue.resolution, None | Some(Resolution::Fixed))
            {
                move_to(issue, Status::Closed, Some(Resolution::Fixed), ctx);
                Some(AutomaticTransition::CloseFixed)
            } else {
                // False-positive and won't-fix issues only close with their rule or component.
                None
            }
        } else if issue.status == Status::Resolved && issue.resolution == Some(Resolution::Fixed) {
            move_to(issue, Status::Reopened, None, ctx);
            Some(AutomaticTransition::Reopen)
        } else {
            None
        };

        if let Some(transition) = applied {
            debug!(issue = %issue.key, %transition, "automatic transition");
        }
        applied
    }
}

fn allowed(def: &TransitionDef, issue: &Issue) -> bool {
    def.from.contains(&issue.status)
        && match def.guard {
            Guard::None => true,
            Guard::StillDetected => !issue.end_of_life,
        }
}

fn move_to(issue: &mut Issue, status: Status, resolution: Option<Resolution>, ctx: &IssueChangeContext) {
    let was_closed = issue.is_closed();
    issue.set_resolution(resolution, ctx);
    issue.set_status(status, ctx);
    if status == Status::Closed {
        issue.close_date = Some(ctx.date.max(issue.creation_date));
    } else if was_closed {
        issue.close_date = None;
    }
}
