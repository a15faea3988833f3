//! Pairwise affinity from survey answers.

use std::collections::HashSet;

use itertools::Itertools;
use tracing::warn;

use crate::model::condition::{AffinityMatrix, Score};
use crate::model::entity::{Attributes, Member};

pub const LIKE_SCORE: Score = 3.0;
pub const DISLIKE_SCORE: Score = -3.0;
pub const ATTR_MATCH: Score = 0.5;
pub const ATTR_CLASH: Score = -0.5;
pub const MESSINESS_CLOSE: Score = 0.3;
pub const MESSINESS_FAR: Score = -0.3;
pub const SCORE_LIMIT: Score = 3.0;

fn shared_attributes(a: &Attributes) -> [Option<&str>; 3] {
    [
        a.sleep.as_deref(),
        a.temperature.as_deref(),
        a.room_use.as_deref(),
    ]
}

/// Score for `a` looking at `b`. Requests and avoids are matched against
/// `b`'s display name.
pub fn directed_score(a: &Member, b: &Member) -> Score {
    let mut score = 0.0;
    if a.requested_with.contains(&b.name) {
        score += LIKE_SCORE;
    }
    if a.avoid_with.contains(&b.name) {
        score += DISLIKE_SCORE;
    }

    let pairs = shared_attributes(&a.attributes)
        .into_iter()
        .zip(shared_attributes(&b.attributes));
    for (av, bv) in pairs {
        match (av, bv) {
            (Some(av), Some(bv)) if !av.is_empty() && !bv.is_empty() => {
                score += if av == bv { ATTR_MATCH } else { ATTR_CLASH };
            }
            _ => {}
        }
    }

    if let (Some(am), Some(bm)) = (a.attributes.messiness, b.attributes.messiness) {
        match (am - bm).abs() {
            0 | 1 => score += MESSINESS_CLOSE,
            2 => {}
            _ => score += MESSINESS_FAR,
        }
    }

    score.clamp(-SCORE_LIMIT, SCORE_LIMIT)
}

/// Builds the full directed matrix, one entry per ordered pair of distinct
/// members. Every member gets a row, even a population of one.
pub fn build_affinity(members: &[Member]) -> AffinityMatrix {
    let mut matrix = AffinityMatrix::new();
    for member in members {
        matrix.scores.entry(member.id.clone()).or_default();
    }

    let names: HashSet<&str> = members.iter().map(|m| m.name.as_str()).collect();
    for member in members {
        member
            .requested_with
            .iter()
            .chain(member.avoid_with.iter())
            .filter(|name| !names.contains(name.as_str()))
            .for_each(|name| {
                warn!(member = %member.id, reference = %name, "name reference matches no member");
            });
    }

    for pair in members.iter().permutations(2) {
        let (a, b) = (pair[0], pair[1]);
        matrix.set(&a.id, &b.id, directed_score(a, b));
    }
    matrix
}
