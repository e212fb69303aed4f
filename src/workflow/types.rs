use std::fmt;
use std::str::FromStr;

use crate::issue::{Resolution, Status};

/// Transitions a user can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Confirm,
    Unconfirm,
    Resolve,
    FalsePositive,
    WontFix,
    Reopen,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Confirm,
        Transition::Unconfirm,
        Transition::Resolve,
        Transition::FalsePositive,
        Transition::WontFix,
        Transition::Reopen,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Unconfirm => "unconfirm",
            Transition::Resolve => "resolve",
            Transition::FalsePositive => "falsepositive",
            Transition::WontFix => "wontfix",
            Transition::Reopen => "reopen",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Transition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Transition::ALL
            .into_iter()
            .find(|t| t.key() == s)
            .ok_or_else(|| format!("unknown transition '{s}'"))
    }
}

/// Transitions an analysis applies on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutomaticTransition {
    /// A resolved-as-fixed issue was detected again
    Reopen,
    /// The issue disappeared while its rule and component remain
    CloseFixed,
    /// The issue's rule or component is gone
    CloseRemoved,
}

impl fmt::Display for AutomaticTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AutomaticTransition::Reopen => "automatic-reopen",
            AutomaticTransition::CloseFixed => "automatic-close-fixed",
            AutomaticTransition::CloseRemoved => "automatic-close-removed",
        };
        f.write_str(name)
    }
}

/// Extra requirement on the issue beyond its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    /// The last analysis still reported the issue
    StillDetected,
}

/// One row of the user transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionDef {
    pub transition: Transition,
    pub from: &'static [Status],
    pub to: Status,
    pub resolution: Option<Resolution>,
    pub guard: Guard,
}

const UNRESOLVED: &[Status] = &[Status::Open, Status::Reopened, Status::Confirmed];

pub(crate) const USER_TRANSITIONS: &[TransitionDef] = &[
    TransitionDef {
        transition: Transition::Confirm,
        from: &[Status::Open, Status::Reopened],
        to: Status::Confirmed,
        resolution: None,
        guard: Guard::None,
    },
    TransitionDef {
        transition: Transition::Unconfirm,
        from: &[Status::Confirmed],
        to: Status::Reopened,
        resolution: None,
        guard: Guard::None,
    },
    TransitionDef {
        transition: Transition::Resolve,
        from: UNRESOLVED,
        to: Status::Resolved,
        resolution: Some(Resolution::Fixed),
        guard: Guard::None,
    },
    TransitionDef {
        transition: Transition::FalsePositive,
        from: UNRESOLVED,
        to: Status::Resolved,
        resolution: Some(Resolution::FalsePositive),
        guard: Guard::None,
    },
    TransitionDef {
        transition: Transition::WontFix,
        from: UNRESOLVED,
        to: Status::Resolved,
        resolution: Some(Resolution::WontFix),
        guard: Guard::None,
    },
    TransitionDef {
        transition: Transition::Reopen,
        from: &[Status::Resolved, Status::Closed],
        to: Status::Reopened,
        resolution: None,
        guard: Guard::StillDetected,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_keys_round_trip() {
        for t in Transition::ALL {
            assert_eq!(t.key().parse::<Transition>().unwrap(), t);
        }
        assert!("close".parse::<Transition>().is_err());
    }

    #[test]
    fn test_every_transition_has_one_row() {
        for t in Transition::ALL {
            assert_eq!(USER_TRANSITIONS.iter().filter(|d| d.transition == t).count(), 1);
        }
    }

    #[test]
    fn test_resolutions_only_on_resolved_targets() {
        for def in USER_TRANSITIONS {
            if def.resolution.is_some() {
                assert!(matches!(def.to, Status::Resolved | Status::Closed));
            }
        }
    }
}
