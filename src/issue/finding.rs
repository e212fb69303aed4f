use serde::{Deserialize, Serialize};

use super::types::{Impact, IssueType, MessageFormatting, RuleKey, Severity};
use crate::error::IssueError;

/// A finding as produced by a rule engine, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFinding {
    pub rule_key: Option<String>,
    pub component_key: Option<String>,
    pub line: Option<usize>,
    pub line_hash: Option<String>,
    pub block_hash: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_formattings: Vec<MessageFormatting>,
    pub severity: Option<Severity>,
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub impacts: Vec<Impact>,
    #[serde(default)]
    pub quick_fix_available: bool,
}

/// A validated finding from the current analysis of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub rule_key: RuleKey,
    pub component_key: String,
    pub line: Option<usize>,
    pub line_hash: Option<String>,
    pub block_hash: Option<String>,
    pub message: String,
    pub message_formattings: Vec<MessageFormatting>,
    pub severity: Severity,
    pub issue_type: IssueType,
    pub impacts: Vec<Impact>,
    pub quick_fix_available: bool,
}

impl Finding {
    /// Check the mandatory fields of the `index`-th raw finding reported for `component`.
    ///
    /// Severity defaults to MAJOR and type to CODE_SMELL when the engine leaves them out.
    pub fn validate(raw: RawFinding, index: usize, component: &str) -> Result<Finding, IssueError> {
        let malformed = |reason: String| IssueError::MalformedFinding { index, reason };

        let rule_key: RuleKey = match raw.rule_key.as_deref().map(str::trim) {
            None | Some("") => return Err(malformed("missing rule key".to_string())),
            Some(key) => key.parse().map_err(malformed)?,
        };
        if rule_key.is_manual() {
            return Err(malformed(format!("rule {rule_key} cannot be raised by an analysis")));
        }

        let component_key = match raw.component_key {
            None => return Err(malformed("missing component key".to_string())),
            Some(key) if key.trim().is_empty() => {
                return Err(malformed("missing component key".to_string()))
            }
            Some(key) if key != component => {
                return Err(malformed(format!(
                    "reported on component {key} while reconciling {component}"
                )))
            }
            Some(key) => key,
        };

        if raw.line == Some(0) {
            return Err(malformed("lines are 1-based".to_string()));
        }

        Ok(Finding {
            rule_key,
            component_key,
            line: raw.line,
            line_hash: raw.line_hash.filter(|h| !h.is_empty()),
            block_hash: raw.block_hash.filter(|h| !h.is_empty()),
            message: raw.message.trim().to_string(),
            message_formattings: raw.message_formattings,
            severity: raw.severity.unwrap_or(Severity::Major),
            issue_type: raw.issue_type.unwrap_or(IssueType::CodeSmell),
            impacts: raw.impacts,
            quick_fix_available: raw.quick_fix_available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(rule: Option<&str>, component: Option<&str>) -> RawFinding {
        RawFinding {
            rule_key: rule.map(str::to_string),
            component_key: component.map(str::to_string),
            line: Some(3),
            message: " Remove this unused import ".to_string(),
            ..RawFinding::default()
        }
    }

    #[test]
    fn test_validate_applies_defaults() {
        let finding = Finding::validate(raw(Some("rust:S1128"), Some("src/lib.rs")), 0, "src/lib.rs").unwrap();
        assert_eq!(finding.rule_key, RuleKey::new("rust", "S1128"));
        assert_eq!(finding.severity, Severity::Major);
        assert_eq!(finding.issue_type, IssueType::CodeSmell);
        assert_eq!(finding.message, "Remove this unused import");
    }

    #[test]
    fn test_missing_rule_key_is_malformed() {
        let err = Finding::validate(raw(None, Some("src/lib.rs")), 4, "src/lib.rs").unwrap_err();
        assert_eq!(
            err,
            IssueError::MalformedFinding {
                index: 4,
                reason: "missing rule key".to_string()
            }
        );
    }

    #[test]
    fn test_unparseable_rule_key_is_malformed() {
        let err = Finding::validate(raw(Some("S1128"), Some("src/lib.rs")), 0, "src/lib.rs").unwrap_err();
        assert!(matches!(err, IssueError::MalformedFinding { .. }));
    }

    #[test]
    fn test_missing_or_foreign_component_is_malformed() {
        assert!(Finding::validate(raw(Some("rust:S1"), None), 0, "src/lib.rs").is_err());
        assert!(Finding::validate(raw(Some("rust:S1"), Some("src/main.rs")), 0, "src/lib.rs").is_err());
    }

    #[test]
    fn test_manual_rule_cannot_come_from_scan() {
        let err = Finding::validate(raw(Some("manual:Perf"), Some("a.rs")), 0, "a.rs").unwrap_err();
        assert!(err.to_string().contains("cannot be raised"));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{"rule_key":"rust:S1","component_key":"a.rs","line":7,"severity":"CRITICAL","issue_type":"BUG"}"#;
        let raw: RawFinding = serde_json::from_str(json).unwrap();
        let finding = Finding::validate(raw, 0, "a.rs").unwrap();
        assert_eq!(finding.severity, Severity::Critical);
        assert_eq!(finding.issue_type, IssueType::Bug);
        assert_eq!(finding.line, Some(7));
    }
}
