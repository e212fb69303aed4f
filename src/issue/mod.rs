pub mod diff;
pub mod finding;
pub mod setter;
pub mod types;

pub use diff::{FieldDiff, FieldDiffs, IssueChangeContext};
pub use finding::{Finding, RawFinding};
pub use types::{
    Comment, Impact, ImpactSeverity, Issue, IssueType, MessageFormatting, Resolution, RuleKey,
    Severity, SoftwareQuality, Status, MANUAL_REPOSITORY,
};

use chrono::{DateTime, Utc};

impl Issue {
    /// Open a new issue for a finding seen for the first time.
    pub fn from_finding(
        key: impl Into<String>,
        finding: &Finding,
        creation_date: DateTime<Utc>,
        is_on_new_code: bool,
    ) -> Issue {
        Issue {
            key: key.into(),
            component_key: finding.component_key.clone(),
            rule_key: finding.rule_key.clone(),
            line: finding.line,
            line_hash: finding.line_hash.clone(),
            block_hash: finding.block_hash.clone(),
            message: finding.message.clone(),
            message_formattings: finding.message_formattings.clone(),
            severity: finding.severity,
            manual_severity: false,
            issue_type: finding.issue_type,
            impacts: finding.impacts.clone(),
            status: Status::Open,
            resolution: None,
            assignee: None,
            tags: Default::default(),
            comments: Vec::new(),
            creation_date,
            update_date: creation_date,
            close_date: None,
            quick_fix_available: finding.quick_fix_available,
            is_new: true,
            is_on_new_code,
            end_of_life: false,
            on_disabled_rule: false,
            changed: true,
            current_change: None,
        }
    }
}
