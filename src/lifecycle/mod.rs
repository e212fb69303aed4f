pub mod types;

pub use types::{
    AnalysisContext, ComponentExistence, InactiveRules, NewCodePeriod, ReconcileSummary,
    Reconciliation, RemovedComponents, RuleActivation,
};

use tracing::{debug, info, info_span, warn};

use crate::error::IssueError;
use crate::issue::{Finding, Issue, IssueChangeContext, RawFinding};
use crate::tracking::{LineHashSequence, Tracker};
use crate::workflow::{AutomaticTransition, Workflow};

type KeyGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Drives the reconciliation of one component's issues with a new analysis.
///
/// Callers must not reconcile the same component twice concurrently; the
/// reconciler holds no state between calls and does no locking of its own.
pub struct Reconciler {
    tracker: Tracker,
    workflow: Workflow,
    new_key: KeyGenerator,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Workflow::new())
    }
}

impl Reconciler {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            tracker: Tracker::new(),
            workflow,
            new_key: Box::new(|| uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Replace the key generator for new issues (random UUIDs by default).
    pub fn with_key_generator(mut self, new_key: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.new_key = Box::new(new_key);
        self
    }

    /// Reconcile `old_issues` of `component_key` with the findings of the
    /// current analysis.
    ///
    /// Malformed findings are skipped and listed in
    /// [`Reconciliation::rejected`]; an old issue from another component
    /// aborts the call.
    pub fn reconcile(
        &self,
        component_key: &str,
        old_issues: Vec<Issue>,
        raw_findings: Vec<RawFinding>,
        ctx: &AnalysisContext<'_>,
    ) -> Result<Reconciliation, IssueError> {
        let _span = info_span!("reconcile", component = %component_key).entered();

        if let Some(foreign) = old_issues.iter().find(|i| i.component_key != component_key) {
            return Err(IssueError::ComponentMismatch {
                issue: foreign.key.clone(),
                expected: component_key.to_string(),
                found: foreign.component_key.clone(),
            });
        }

        let mut summary = ReconcileSummary::default();
        let (findings, rejected) = validate_findings(component_key, raw_findings, ctx);
        summary.rejected = rejected.len();

        // Closed issues are history: carried through in place, never tracked.
        let mut issues = old_issues;
        let open: Vec<usize> = (0..issues.len()).filter(|&i| !issues[i].is_closed()).collect();
        for &i in &open {
            let issue = &mut issues[i];
            // Clearing the new flag has to reach the store too.
            issue.changed = issue.is_new;
            issue.is_new = false;
            issue.current_change = None;
        }

        let tracking = {
            let bases: Vec<&Issue> = open.iter().map(|&i| &issues[i]).collect();
            self.tracker.track(&bases, &findings)
        };
        let scan = IssueChangeContext::scan(ctx.analysis_date);

        for m in &tracking.matches {
            let issue = &mut issues[open[m.base]];
            merge_matched(issue, &findings[m.raw], &scan);
            summary.matched += 1;
            if let Some(transition) = self.workflow.do_automatic_transition(issue, &scan) {
                count(&mut summary, transition);
            }
        }

        for &b in &tracking.unmatched_bases {
            let issue = &mut issues[open[b]];
            if issue.is_manual() {
                if relocate_manual(issue, ctx, &scan) {
                    summary.manual_moved += 1;
                }
            } else {
                issue.set_end_of_life(true);
                issue.on_disabled_rule =
                    !ctx.rules.is_active(&issue.rule_key) || !ctx.components.exists(component_key);
            }
            if let Some(transition) = self.workflow.do_automatic_transition(issue, &scan) {
                count(&mut summary, transition);
            }
        }

        let on_new_code = ctx.new_code.contains(ctx.analysis_date);
        let created: Vec<Issue> = tracking
            .unmatched_raws
            .iter()
            .map(|&r| Issue::from_finding((self.new_key)(), &findings[r], ctx.analysis_date, on_new_code))
            .collect();
        summary.created = created.len();

        issues.extend(created);

        let changelog = issues
            .iter_mut()
            .filter_map(Issue::take_change)
            .filter(|change| !change.is_empty())
            .collect();

        info!(
            created = summary.created,
            matched = summary.matched,
            reopened = summary.reopened,
            closed_fixed = summary.closed_fixed,
            closed_removed = summary.closed_removed,
            rejected = summary.rejected,
            "reconciliation complete"
        );

        Ok(Reconciliation {
            component_key: component_key.to_string(),
            issues,
            changelog,
            rejected,
            summary,
        })
    }
}

fn validate_findings(
    component_key: &str,
    raw_findings: Vec<RawFinding>,
    ctx: &AnalysisContext<'_>,
) -> (Vec<Finding>, Vec<IssueError>) {
    let mut findings = Vec::with_capacity(raw_findings.len());
    let mut rejected = Vec::new();
    for (index, raw) in raw_findings.into_iter().enumerate() {
        match Finding::validate(raw, index, component_key) {
            Ok(mut finding) => {
                if let Some(source) = ctx.source {
                    fill_hashes(&mut finding, source, ctx.block_radius);
                }
                findings.push(finding);
            }
            Err(err) => {
                warn!(error = %err, "skipping finding");
                rejected.push(err);
            }
        }
    }
    (findings, rejected)
}

/// Compute the fingerprints the rule engine did not provide.
fn fill_hashes(finding: &mut Finding, source: &LineHashSequence, radius: usize) {
    let Some(line) = finding.line else {
        return;
    };
    if finding.line_hash.is_none() {
        finding.line_hash = source.hash_at(line).map(str::to_string);
    }
    if finding.block_hash.is_none() {
        finding.block_hash = source.block_hash(line, radius);
    }
}

/// Carry a previous issue forward with the latest scanner data.
fn merge_matched(issue: &mut Issue, finding: &Finding, scan: &IssueChangeContext) {
    issue.set_end_of_life(false);
    issue.on_disabled_rule = false;
    issue.set_line(finding.line, scan);
    issue.set_message(&finding.message, scan);
    if issue.message_formattings != finding.message_formattings {
        issue.message_formattings = finding.message_formattings.clone();
        issue.touch(scan);
    }
    issue.set_severity(finding.severity, scan);
    issue.set_type(finding.issue_type, scan);
    issue.set_impacts(finding.impacts.clone(), scan);
    if issue.quick_fix_available != finding.quick_fix_available {
        issue.quick_fix_available = finding.quick_fix_available;
        issue.touch(scan);
    }
    issue.set_hashes(finding.line_hash.clone(), finding.block_hash.clone());
}

/// Follow a manual issue to its line in the new source.
///
/// Returns whether the issue moved. An issue whose line no longer exists is
/// flagged for closing; an issue whose rule or component is gone too.
fn relocate_manual(issue: &mut Issue, ctx: &AnalysisContext<'_>, scan: &IssueChangeContext) -> bool {
    if issue.is_closed() {
        return false;
    }
    if !ctx.rules.is_active(&issue.rule_key) || !ctx.components.exists(&issue.component_key) {
        issue.set_end_of_life(true);
        issue.on_disabled_rule = true;
        return false;
    }
    let (Some(source), Some(line)) = (ctx.source, issue.line) else {
        return false;
    };
    if !source.has_line(line) {
        debug!(issue = %issue.key, line, "manual issue beyond end of file");
        issue.set_end_of_life(true);
        issue.on_disabled_rule = true;
        return false;
    }
    let Some(hash) = issue.line_hash.clone() else {
        return false;
    };
    match source.occurrences(&hash).as_slice() {
        [only] if *only != line => issue.set_line(Some(*only), scan),
        // Missing or ambiguous: stay put.
        _ => false,
    }
}

fn count(summary: &mut ReconcileSummary, transition: AutomaticTransition) {
    match transition {
        AutomaticTransition::Reopen => summary.reopened += 1,
        AutomaticTransition::CloseFixed => summary.closed_fixed += 1,
        AutomaticTransition::CloseRemoved => summary.closed_removed += 1,
    }
}
