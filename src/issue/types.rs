use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::diff::FieldDiffs;

/// Repository reserved for issues entered by hand rather than raised by a rule engine.
pub const MANUAL_REPOSITORY: &str = "manual";

/// Workflow status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Open,
    Confirmed,
    Reopened,
    Resolved,
    Closed,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Open,
        Status::Confirmed,
        Status::Reopened,
        Status::Resolved,
        Status::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Open => "OPEN",
            Status::Confirmed => "CONFIRMED",
            Status::Reopened => "REOPENED",
            Status::Resolved => "RESOLVED",
            Status::Closed => "CLOSED",
        }
    }

    /// Open, confirmed or reopened: still waiting for someone to act on it.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Status::Open | Status::Confirmed | Status::Reopened)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an issue was resolved or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "FIXED")]
    Fixed,
    #[serde(rename = "FALSE-POSITIVE")]
    FalsePositive,
    #[serde(rename = "WONTFIX")]
    WontFix,
    #[serde(rename = "REMOVED")]
    Removed,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Fixed => "FIXED",
            Resolution::FalsePositive => "FALSE-POSITIVE",
            Resolution::WontFix => "WONTFIX",
            Resolution::Removed => "REMOVED",
        }
    }

    /// Resolutions a user chose deliberately; a scan never reopens these.
    pub fn is_human_decision(&self) -> bool {
        matches!(self, Resolution::FalsePositive | Resolution::WontFix)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Blocker => "BLOCKER",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "MINOR" => Ok(Severity::Minor),
            "MAJOR" => Ok(Severity::Major),
            "CRITICAL" => Ok(Severity::Critical),
            "BLOCKER" => Ok(Severity::Blocker),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    Bug,
    Vulnerability,
    CodeSmell,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Bug => "BUG",
            IssueType::Vulnerability => "VULNERABILITY",
            IssueType::CodeSmell => "CODE_SMELL",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUG" => Ok(IssueType::Bug),
            "VULNERABILITY" => Ok(IssueType::Vulnerability),
            "CODE_SMELL" => Ok(IssueType::CodeSmell),
            other => Err(format!("unknown issue type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoftwareQuality {
    Maintainability,
    Reliability,
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactSeverity {
    Low,
    Medium,
    High,
}

/// One software-quality impact of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Impact {
    pub quality: SoftwareQuality,
    pub severity: ImpactSeverity,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{:?}", self.quality, self.severity)
    }
}

/// A formatting span (e.g. code) within an issue message, as byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFormatting {
    pub start: usize,
    pub end: usize,
    #[serde(default = "default_formatting_kind")]
    pub kind: String,
}

fn default_formatting_kind() -> String {
    "CODE".to_string()
}

/// Fully qualified rule reference, `repository:rule`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleKey {
    pub repository: String,
    pub rule: String,
}

impl RuleKey {
    pub fn new(repository: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            rule: rule.into(),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.repository == MANUAL_REPOSITORY
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.rule)
    }
}

impl FromStr for RuleKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((repo, rule)) if !repo.trim().is_empty() && !rule.trim().is_empty() => {
                Ok(RuleKey::new(repo.trim(), rule.trim()))
            }
            _ => Err(format!("invalid rule key '{s}', expected 'repository:rule'")),
        }
    }
}

impl TryFrom<String> for RuleKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuleKey> for String {
    fn from(key: RuleKey) -> Self {
        key.to_string()
    }
}

/// A free-text comment attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub key: String,
    pub user: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persistent violation record, tracked across analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stable identity, assigned once at creation
    pub key: String,
    /// File, module or project the issue lives on
    pub component_key: String,
    pub rule_key: RuleKey,
    /// 1-based line; `None` for component-level issues
    pub line: Option<usize>,
    /// Hash of the whitespace-stripped source line
    pub line_hash: Option<String>,
    /// Hash of the block of lines surrounding the issue
    pub block_hash: Option<String>,
    pub message: String,
    #[serde(default)]
    pub message_formattings: Vec<MessageFormatting>,
    pub severity: Severity,
    /// Severity was set by a user; scans no longer overwrite it
    #[serde(default)]
    pub manual_severity: bool,
    pub issue_type: IssueType,
    #[serde(default)]
    pub impacts: Vec<Impact>,
    pub status: Status,
    pub resolution: Option<Resolution>,
    pub assignee: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub creation_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
    pub close_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub quick_fix_available: bool,
    /// Created by the current analysis
    #[serde(default)]
    pub is_new: bool,
    /// First appeared within the new-code period
    #[serde(default)]
    pub is_on_new_code: bool,
    /// The last analysis no longer reported this issue
    #[serde(default)]
    pub end_of_life: bool,
    /// The issue's rule is inactive or its component is gone
    #[serde(skip)]
    pub on_disabled_rule: bool,
    #[serde(skip)]
    pub(crate) changed: bool,
    #[serde(skip)]
    pub(crate) current_change: Option<FieldDiffs>,
}

impl Issue {
    pub fn is_manual(&self) -> bool {
        self.rule_key.is_manual()
    }

    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }

    /// Whether anything was modified since the issue was loaded or created.
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// The change set accumulated so far, if any.
    pub fn current_change(&self) -> Option<&FieldDiffs> {
        self.current_change.as_ref()
    }

    /// Detach the accumulated change set, leaving the issue with none.
    pub fn take_change(&mut self) -> Option<FieldDiffs> {
        self.current_change.take()
    }
}
