pub mod source;
pub mod types;

pub use source::LineHashSequence;
pub use types::{Match, MatchPass, Trackable, Tracking};

use std::collections::HashMap;
use std::hash::Hash;

use tracing::{debug, instrument};

/// Pairs persisted issues ("bases") with the findings of a new analysis
/// ("raws") for one component.
///
/// Matching runs in passes of decreasing confidence; each pass only looks at
/// what earlier passes left unmatched. Within a pass, candidates are ranked by
/// line distance, then by raw position, then by base position, so the outcome
/// depends only on the inputs. The tracker reads, it never mutates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tracker;

struct Matching {
    base_matched: Vec<bool>,
    raw_matched: Vec<bool>,
    matches: Vec<Match>,
}

impl Tracker {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip_all, fields(bases = bases.len(), raws = raws.len()))]
    pub fn track<B: Trackable, R: Trackable>(&self, bases: &[B], raws: &[R]) -> Tracking {
        let mut state = Matching {
            // Manual issues sit out the matching entirely.
            base_matched: bases.iter().map(|b| b.is_manual()).collect(),
            raw_matched: vec![false; raws.len()],
            matches: Vec::new(),
        };

        run_pass(&mut state, MatchPass::Exact, bases, raws, |t| {
            Some((t.rule_key(), t.line()?, t.line_hash()?))
        });
        run_pass(&mut state, MatchPass::LineHash, bases, raws, |t| {
            t.line()?;
            Some((t.rule_key(), t.line_hash()?))
        });
        run_pass(&mut state, MatchPass::Block, bases, raws, |t| {
            t.line()?;
            Some((t.rule_key(), t.block_hash()?))
        });
        run_pass(&mut state, MatchPass::Line, bases, raws, |t| {
            Some((t.rule_key(), t.line()?))
        });
        run_pass(&mut state, MatchPass::Message, bases, raws, |t| {
            match t.line() {
                Some(_) => None,
                None => Some((t.rule_key(), t.message())),
            }
        });

        let mut matches = state.matches;
        matches.sort_by_key(|m| m.base);

        let unmatched_bases = (0..bases.len())
            .filter(|&i| matches.iter().all(|m| m.base != i))
            .collect();
        let unmatched_raws = state
            .raw_matched
            .iter()
            .enumerate()
            .filter(|(_, matched)| !**matched)
            .map(|(i, _)| i)
            .collect();

        let tracking = Tracking {
            matches,
            unmatched_bases,
            unmatched_raws,
        };
        debug!(
            matched = tracking.matches.len(),
            unmatched_bases = tracking.unmatched_bases.len(),
            unmatched_raws = tracking.unmatched_raws.len(),
            "tracking complete"
        );
        tracking
    }
}

/// Pair still-unmatched bases and raws sharing the key produced by `key_of`.
///
/// The key closure is applied to both sides through the [`Trackable`] trait
/// object, so bases and raws are always compared on the same fields.
fn run_pass<'a, B, R, K, F>(state: &mut Matching, pass: MatchPass, bases: &'a [B], raws: &'a [R], key_of: F)
where
    B: Trackable,
    R: Trackable,
    K: Hash + Eq,
    F: Fn(&'a dyn Trackable) -> Option<K>,
{
    let mut raws_by_key: HashMap<K, Vec<usize>> = HashMap::new();
    for (i, raw) in raws.iter().enumerate() {
        if state.raw_matched[i] {
            continue;
        }
        if let Some(key) = key_of(raw as &dyn Trackable) {
            raws_by_key.entry(key).or_default().push(i);
        }
    }
    if raws_by_key.is_empty() {
        return;
    }

    // (line distance, raw index, base index)
    let mut candidates: Vec<(usize, usize, usize)> = Vec::new();
    for (b, base) in bases.iter().enumerate() {
        if state.base_matched[b] {
            continue;
        }
        let Some(key) = key_of(base as &dyn Trackable) else {
            continue;
        };
        if let Some(raw_indexes) = raws_by_key.get(&key) {
            for &r in raw_indexes {
                candidates.push((line_distance(base.line(), raws[r].line()), r, b));
            }
        }
    }
    candidates.sort_unstable();

    let mut paired = 0usize;
    for (_, r, b) in candidates {
        if state.base_matched[b] || state.raw_matched[r] {
            continue;
        }
        state.base_matched[b] = true;
        state.raw_matched[r] = true;
        state.matches.push(Match { base: b, raw: r, pass });
        paired += 1;
    }
    if paired > 0 {
        debug!(%pass, paired, "matching pass");
    }
}

fn line_distance(a: Option<usize>, b: Option<usize>) -> usize {
    match (a, b) {
        (Some(a), Some(b)) => a.abs_diff(b),
        _ => 0,
    }
}
