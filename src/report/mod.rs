pub mod types;

pub use types::{Outcome, Report, ReportRow};

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::Colorize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::issue::setter::STATUS;
use crate::issue::{Issue, Resolution, Severity, Status};
use crate::lifecycle::Reconciliation;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build a Report from a reconciliation.
///
/// Issues that were closed before this analysis and stayed closed are left
/// out; everything else gets one row.
pub fn build(reconciliation: &Reconciliation, analysis_date: DateTime<Utc>) -> Report {
    let status_changes: HashMap<&str, Option<&str>> = reconciliation
        .changelog
        .iter()
        .filter_map(|c| c.get(STATUS).map(|d| (c.issue_key.as_str(), d.new_value.as_deref())))
        .collect();

    let mut rows: Vec<ReportRow> = reconciliation
        .issues
        .iter()
        .filter_map(|issue| {
            let status_changed = status_changes.contains_key(issue.key.as_str());
            if issue.is_closed() && !status_changed {
                return None;
            }
            Some(row(issue, outcome(issue, status_changed)))
        })
        .collect();
    rows.sort_by(|a, b| a.outcome.cmp(&b.outcome).then(a.line.cmp(&b.line)));

    Report {
        component_key: reconciliation.component_key.clone(),
        analysis_date,
        summary: reconciliation.summary,
        rows,
        rejected: reconciliation.rejected.iter().map(|e| e.to_string()).collect(),
    }
}

fn outcome(issue: &Issue, status_changed: bool) -> Outcome {
    if issue.is_new {
        return Outcome::Created;
    }
    match (status_changed, issue.status, issue.resolution) {
        (true, Status::Reopened, _) => Outcome::Reopened,
        (true, Status::Closed, Some(Resolution::Removed)) => Outcome::ClosedRemoved,
        (true, Status::Closed, _) => Outcome::ClosedFixed,
        _ => Outcome::Tracked,
    }
}

fn row(issue: &Issue, outcome: Outcome) -> ReportRow {
    ReportRow {
        issue_key: issue.key.clone(),
        rule: issue.rule_key.to_string(),
        line: issue.line,
        message: issue.message.clone(),
        severity: issue.severity,
        status: issue.status,
        resolution: issue.resolution,
        outcome,
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(component = %report.component_key, rows = report.rows.len()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

fn print_terminal_report(report: &Report) {
    let s = &report.summary;
    println!();
    println!("Component: {}", report.component_key.bold());
    println!("Analysis: {}", report.analysis_date.to_rfc3339());
    println!(
        "New: {} | Tracked: {} | Reopened: {} | Fixed: {} | Removed: {} | Rejected: {}",
        s.created, s.matched, s.reopened, s.closed_fixed, s.closed_removed, s.rejected
    );
    println!();

    if report.rows.is_empty() {
        println!("  No issues.");
    } else {
        for row in &report.rows {
            println!(
                "  {:<9} {:<8} {} {}{}",
                colorize_outcome(row.outcome),
                colorize_severity(row.severity),
                row.rule.dimmed(),
                row.message,
                location(row.line)
            );
        }
    }

    if !report.rejected.is_empty() {
        println!();
        println!("═══ Rejected findings ═══");
        for reason in &report.rejected {
            println!("  • {}", reason.yellow());
        }
    }

    println!();
    println!("═══ Open issues: {} ═══", report.open_count());
    println!();
}

fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let s = &report.summary;
    let mut md = String::new();
    md.push_str(&format!("# Issues of `{}`\n\n", report.component_key));
    md.push_str(&format!("**Analysis:** {}\n\n", report.analysis_date.to_rfc3339()));
    md.push_str("| New | Tracked | Reopened | Fixed | Removed | Rejected |\n");
    md.push_str("|----:|--------:|---------:|------:|--------:|---------:|\n");
    md.push_str(&format!(
        "| {} | {} | {} | {} | {} | {} |\n\n",
        s.created, s.matched, s.reopened, s.closed_fixed, s.closed_removed, s.rejected
    ));

    md.push_str("## Issues\n\n");
    if report.rows.is_empty() {
        md.push_str("No issues.\n\n");
    } else {
        for row in &report.rows {
            md.push_str(&format!(
                "- **[{}]** {} `{}` {}{}\n",
                row.outcome,
                row.severity,
                row.rule,
                row.message,
                location(row.line)
            ));
        }
        md.push('\n');
    }

    if !report.rejected.is_empty() {
        md.push_str("## Rejected findings\n\n");
        for reason in &report.rejected {
            md.push_str(&format!("- {reason}\n"));
        }
        md.push('\n');
    }

    md.push_str(&format!("## Open issues: {}\n", report.open_count()));

    std::fs::write(path, md)?;
    Ok(())
}

fn location(line: Option<usize>) -> String {
    line.map(|l| format!(" (line {l})")).unwrap_or_default()
}

fn colorize_outcome(outcome: Outcome) -> colored::ColoredString {
    let label = outcome.to_string();
    match outcome {
        Outcome::Created => label.red().bold(),
        Outcome::Reopened => label.yellow().bold(),
        Outcome::ClosedFixed | Outcome::ClosedRemoved => label.green().bold(),
        Outcome::Tracked => label.normal(),
    }
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::Blocker | Severity::Critical => label.red(),
        Severity::Major => label.yellow(),
        Severity::Minor | Severity::Info => label.normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::test_support::{date, open_issue};
    use crate::issue::{FieldDiffs, IssueChangeContext};
    use crate::lifecycle::ReconcileSummary;
    use crate::error::IssueError;

    fn sample() -> Reconciliation {
        let mut new = open_issue("N");
        new.is_new = true;
        new.line = Some(3);
        new.message = "Remove this unwrap".to_string();

        let mut fixed = open_issue("F");
        fixed.status = Status::Closed;
        fixed.resolution = Some(Resolution::Fixed);
        let mut change = FieldDiffs::new("F", &IssueChangeContext::scan(date(5)));
        change.set_diff(STATUS, Some("OPEN".into()), Some("CLOSED".into()));

        let mut old_closed = open_issue("H");
        old_closed.status = Status::Closed;

        Reconciliation {
            component_key: "src/main.rs".to_string(),
            issues: vec![open_issue("T"), fixed, old_closed, new],
            changelog: vec![change],
            rejected: vec![IssueError::MalformedFinding {
                index: 2,
                reason: "missing rule key".to_string(),
            }],
            summary: ReconcileSummary {
                created: 1,
                matched: 1,
                closed_fixed: 1,
                rejected: 1,
                ..ReconcileSummary::default()
            },
        }
    }

    #[test]
    fn test_build_report() {
        let report = build(&sample(), date(5));
        let outcomes: Vec<(&str, Outcome)> = report.rows.iter().map(|r| (r.issue_key.as_str(), r.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![("N", Outcome::Created), ("F", Outcome::ClosedFixed), ("T", Outcome::Tracked)]
        );
        assert_eq!(report.open_count(), 2);
        assert_eq!(report.rejected, vec!["Malformed finding #2: missing rule key".to_string()]);
        assert_eq!(report.rows_with(Outcome::Created).count(), 1);
    }

    #[test]
    fn test_removed_outcome() {
        let mut issue = open_issue("R");
        issue.status = Status::Closed;
        issue.resolution = Some(Resolution::Removed);
        assert_eq!(outcome(&issue, true), Outcome::ClosedRemoved);
        assert_eq!(outcome(&open_issue("T"), false), Outcome::Tracked);
    }

    #[test]
    fn test_write_markdown_report() {
        let report = build(&sample(), date(5));
        let path = std::env::temp_dir().join("issue_tracker_test_report.md");
        write_markdown_report(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Issues of `src/main.rs`"));
        assert!(content.contains("| 1 | 1 | 0 | 1 | 0 | 1 |"));
        assert!(content.contains("**[NEW]** MAJOR `rust:S100` Remove this unwrap (line 3)"));
        assert!(content.contains("## Rejected findings"));
        assert!(content.contains("## Open issues: 2"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_output_to_terminal() {
        let report = build(&sample(), date(5));
        output(&report, None).unwrap();
    }
}
