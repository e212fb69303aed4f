use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::issue::{Resolution, Severity, Status};
use crate::lifecycle::ReconcileSummary;

/// What the analysis did to one issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Created,
    Reopened,
    ClosedFixed,
    ClosedRemoved,
    Tracked,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Created => write!(f, "NEW"),
            Outcome::Reopened => write!(f, "REOPENED"),
            Outcome::ClosedFixed => write!(f, "FIXED"),
            Outcome::ClosedRemoved => write!(f, "REMOVED"),
            Outcome::Tracked => write!(f, "TRACKED"),
        }
    }
}

/// One issue line of the report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub issue_key: String,
    pub rule: String,
    pub line: Option<usize>,
    pub message: String,
    pub severity: Severity,
    pub status: Status,
    pub resolution: Option<Resolution>,
    pub outcome: Outcome,
}

/// Outcome of one component analysis, ready for display.
#[derive(Debug, Serialize)]
pub struct Report {
    pub component_key: String,
    pub analysis_date: DateTime<Utc>,
    pub summary: ReconcileSummary,
    /// Sorted by outcome, then line
    pub rows: Vec<ReportRow>,
    /// Reasons findings were skipped
    pub rejected: Vec<String>,
}

impl Report {
    pub fn rows_with(&self, outcome: Outcome) -> impl Iterator<Item = &ReportRow> {
        self.rows.iter().filter(move |r| r.outcome == outcome)
    }

    /// Issues still awaiting a fix after the analysis.
    pub fn open_count(&self) -> usize {
        self.rows.iter().filter(|r| r.status.is_unresolved()).count()
    }
}
