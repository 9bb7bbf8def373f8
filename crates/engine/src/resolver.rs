// ABOUTME: Confidence resolver: picks one price from a pool of candidates.
// ABOUTME: Highest confidence wins, ties go to the highest value, result is rounded to cents.

use std::cmp::Ordering;

use crate::extractors::PriceCandidate;
use crate::money::{round_cents, Money};

fn rank(a: &PriceCandidate, b: &PriceCandidate) -> Ordering {
    a.confidence
        .cmp(&b.confidence)
        .then_with(|| a.value.cmp(&b.value))
}

/// The winning candidate, if any candidate has a positive value.
///
/// Deterministic for a given multiset: candidates that compare equal on
/// confidence and value are interchangeable, whichever order they arrive in.
pub fn select(candidates: &[PriceCandidate]) -> Option<PriceCandidate> {
    candidates
        .iter()
        .filter(|c| c.value > Money::ZERO)
        .max_by(|a, b| rank(a, b))
        .copied()
}

/// The resolved price rounded to cents.
pub fn resolve(candidates: &[PriceCandidate]) -> Option<Money> {
    select(candidates).map(|c| round_cents(c.value))
}
