use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::IssueError;
use crate::issue::{FieldDiffs, Issue, RuleKey};
use crate::tracking::LineHashSequence;

/// Whether a rule is still part of the analysis.
pub trait RuleActivation: Send + Sync {
    fn is_active(&self, rule: &RuleKey) -> bool;
}

/// The set of active rules; anything else is inactive.
impl RuleActivation for HashSet<RuleKey> {
    fn is_active(&self, rule: &RuleKey) -> bool {
        self.contains(rule)
    }
}

/// Explicit activation flags; unknown rules count as inactive.
impl RuleActivation for HashMap<RuleKey, bool> {
    fn is_active(&self, rule: &RuleKey) -> bool {
        self.get(rule).copied().unwrap_or(false)
    }
}

/// Every rule is active except the listed ones.
#[derive(Debug, Clone, Default)]
pub struct InactiveRules(pub HashSet<RuleKey>);

impl RuleActivation for InactiveRules {
    fn is_active(&self, rule: &RuleKey) -> bool {
        !self.0.contains(rule)
    }
}

/// Whether a component still exists in the analysed project.
pub trait ComponentExistence: Send + Sync {
    fn exists(&self, component_key: &str) -> bool;
}

/// The set of existing components.
impl ComponentExistence for HashSet<String> {
    fn exists(&self, component_key: &str) -> bool {
        self.contains(component_key)
    }
}

/// Every component exists except the listed ones.
#[derive(Debug, Clone, Default)]
pub struct RemovedComponents(pub HashSet<String>);

impl ComponentExistence for RemovedComponents {
    fn exists(&self, component_key: &str) -> bool {
        !self.0.contains(component_key)
    }
}

/// Start of the new-code period, if one is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewCodePeriod {
    pub since: Option<DateTime<Utc>>,
}

impl NewCodePeriod {
    pub fn since(date: DateTime<Utc>) -> Self {
        Self { since: Some(date) }
    }

    /// Without a configured period nothing counts as new code.
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.since.is_some_and(|since| date >= since)
    }
}

/// Read-only inputs of one reconciliation.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub analysis_date: DateTime<Utc>,
    pub new_code: NewCodePeriod,
    pub rules: &'a dyn RuleActivation,
    pub components: &'a dyn ComponentExistence,
    /// Line hashes of the component's current source, when it is a file
    pub source: Option<&'a LineHashSequence>,
    /// Lines on each side of an issue covered by its block hash
    pub block_radius: usize,
}

/// Counters describing what a reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub created: usize,
    pub matched: usize,
    pub reopened: usize,
    pub closed_fixed: usize,
    pub closed_removed: usize,
    pub manual_moved: usize,
    pub rejected: usize,
}

/// Outcome of reconciling one component.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub component_key: String,
    /// The component's issues after this analysis: previous issues in their
    /// original order, then new ones in finding order
    pub issues: Vec<Issue>,
    /// Non-empty change sets produced by this analysis
    pub changelog: Vec<FieldDiffs>,
    /// Findings skipped because they were malformed
    pub rejected: Vec<IssueError>,
    pub summary: ReconcileSummary,
}

impl Reconciliation {
    pub fn new_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.is_new)
    }
}
