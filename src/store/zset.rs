//! Sorted-set values
//!
//! A sorted set keeps a `member → score` map and a score-ordered index that
//! always agree in size and content. Iteration order is ascending score,
//! ties broken lexicographically by member; ranks are 0-based positions in
//! that order.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// A totally-ordered f64 wrapper so scores can live in a `BTreeSet`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Score(f64);

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A set of unique members with floating-point scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    scores: HashMap<Vec<u8>, f64>,
    index: BTreeSet<(Score, Vec<u8>)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.scores.len(), self.index.len());
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Add `member` with `score`, or update its score in place.
    /// Returns true when the member was newly added.
    pub fn insert(&mut self, member: Vec<u8>, score: f64) -> bool {
        match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.index.remove(&(Score(old), member.clone()));
                self.index.insert((Score(score), member));
                false
            }
            None => {
                self.index.insert((Score(score), member));
                true
            }
        }
    }

    /// Remove `member`; true when it was present.
    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.index.remove(&(Score(score), member.to_vec()));
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// 0-based position of `member` in the sort order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = self.score(member)?;
        let target = (Score(score), member.to_vec());
        Some(self.index.range(..&target).count())
    }

    /// Members (with scores) in sort order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], f64)> {
        self.index.iter().map(|(score, member)| (member.as_slice(), score.0))
    }

    /// Members in the normalized inclusive index range `[start, stop]`.
    pub fn range(&self, start: usize, stop: usize) -> Vec<(&[u8], f64)> {
        self.iter()
            .skip(start)
            .take(stop.saturating_sub(start) + 1)
            .collect()
    }
}

/// Render a score the way replies expect: shortest representation that
/// round-trips, integers without a decimal point.
pub fn format_score(score: f64) -> String {
    format!("{}", score)
}
