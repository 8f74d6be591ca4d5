//! Claim ranking.
//!
//! Claims with a confidence come first, highest confidence first. Claims
//! without one follow in arrival order. Ties keep arrival order, so
//! recomputing the ranking never shuffles equal claims.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::session::ClaimId;

/// Order claim ids for display.
///
/// `claims` is the claim list in arrival order; ids missing from
/// `confidences`, or mapped to `None`, count as unscored.
pub fn rank<T>(claims: &[(ClaimId, T)], confidences: &HashMap<ClaimId, Option<u8>>) -> Vec<ClaimId> {
    let mut scored: Vec<(ClaimId, Option<u8>)> = claims
        .iter()
        .map(|(id, _)| (*id, confidences.get(id).copied().flatten()))
        .collect();

    // stable: equal keys keep arrival order
    scored.sort_by(|a, b| compare(a.1, b.1));
    scored.into_iter().map(|(id, _)| id).collect()
}

fn compare(a: Option<u8>, b: Option<u8>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
