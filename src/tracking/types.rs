use std::fmt;

use crate::issue::{Finding, Issue, RuleKey};

/// Anything the tracker can pair up: persisted issues on one side, fresh
/// findings on the other.
pub trait Trackable {
    fn rule_key(&self) -> &RuleKey;
    fn line(&self) -> Option<usize>;
    fn line_hash(&self) -> Option<&str>;
    fn block_hash(&self) -> Option<&str>;
    fn message(&self) -> &str;

    /// Manual issues are never paired with scanner findings.
    fn is_manual(&self) -> bool {
        self.rule_key().is_manual()
    }
}

impl Trackable for Issue {
    fn rule_key(&self) -> &RuleKey {
        &self.rule_key
    }

    fn line(&self) -> Option<usize> {
        self.line
    }

    fn line_hash(&self) -> Option<&str> {
        self.line_hash.as_deref()
    }

    fn block_hash(&self) -> Option<&str> {
        self.block_hash.as_deref()
    }

    fn message(&self) -> &str {
        &self.message
    }
}

impl Trackable for Finding {
    fn rule_key(&self) -> &RuleKey {
        &self.rule_key
    }

    fn line(&self) -> Option<usize> {
        self.line
    }

    fn line_hash(&self) -> Option<&str> {
        self.line_hash.as_deref()
    }

    fn block_hash(&self) -> Option<&str> {
        self.block_hash.as_deref()
    }

    fn message(&self) -> &str {
        &self.message
    }
}

impl<T: Trackable + ?Sized> Trackable for &T {
    fn rule_key(&self) -> &RuleKey {
        (**self).rule_key()
    }

    fn line(&self) -> Option<usize> {
        (**self).line()
    }

    fn line_hash(&self) -> Option<&str> {
        (**self).line_hash()
    }

    fn block_hash(&self) -> Option<&str> {
        (**self).block_hash()
    }

    fn message(&self) -> &str {
        (**self).message()
    }
}

/// The matching pass that paired a base with a raw, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchPass {
    /// Same rule, line and line hash
    Exact,
    /// Same rule and line hash, the code moved
    LineHash,
    /// Same rule and surrounding block
    Block,
    /// Same rule and line, whatever the hash
    Line,
    /// Component-level issues: same rule and message
    Message,
}

impl fmt::Display for MatchPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPass::Exact => "exact",
            MatchPass::LineHash => "line-hash",
            MatchPass::Block => "block",
            MatchPass::Line => "line",
            MatchPass::Message => "message",
        };
        f.write_str(name)
    }
}

/// One base/raw pairing, by position in the tracker's input slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub base: usize,
    pub raw: usize,
    pub pass: MatchPass,
}

/// Partition of a tracker's inputs. Indexes refer to the slices given to
/// [`Tracker::track`](super::Tracker::track); every base and every raw
/// appears exactly once across the three lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tracking {
    /// Sorted by base index
    pub matches: Vec<Match>,
    pub unmatched_bases: Vec<usize>,
    pub unmatched_raws: Vec<usize>,
}

impl Tracking {
    pub fn raw_for_base(&self, base: usize) -> Option<usize> {
        self.matches.iter().find(|m| m.base == base).map(|m| m.raw)
    }

    pub fn count_by_pass(&self, pass: MatchPass) -> usize {
        self.matches.iter().filter(|m| m.pass == pass).count()
    }
}
