use std::ops::Add;
use thiserror::Error;

pub type Index = usize;

/// A change to a complete block assignment, used by the local search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Move { block: Index, to: Index },
    Swap(Index, Index),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Invalid block {0}")]
    InvalidBlock(Index),
    #[error("Invalid room {0}")]
    InvalidRoom(Index),
    #[error("Action does not change the assignment")]
    NoOp,
    #[error("Action breaks a hard constraint")]
    Unsatisfied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    ScoreDiff(i64),
    /// The action would break a hard rule; the diff is what it would have scored.
    UnsatisfiedScoreDiff(i64),
    Failed(Vec<ActionError>),
}

impl ActionResult {
    pub fn feasible_diff(&self) -> Option<i64> {
        match self {
            ActionResult::ScoreDiff(diff) => Some(*diff),
            _ => None,
        }
    }
}

impl Add for ActionResult {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        use ActionResult::*;
        match (self, rhs) {
            (Failed(mut e1), Failed(e2)) => {
                e1.extend(e2);
                Failed(e1)
            }
            (Failed(e), _) | (_, Failed(e)) => Failed(e),
            (ScoreDiff(s1), ScoreDiff(s2)) => ScoreDiff(s1 + s2),
            (ScoreDiff(s1), UnsatisfiedScoreDiff(s2))
            | (UnsatisfiedScoreDiff(s1), ScoreDiff(s2))
            | (UnsatisfiedScoreDiff(s1), UnsatisfiedScoreDiff(s2)) => UnsatisfiedScoreDiff(s1 + s2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_combine() {
        use ActionResult::*;
        assert_eq!(ScoreDiff(3) + ScoreDiff(-1), ScoreDiff(2));
        assert_eq!(ScoreDiff(3) + UnsatisfiedScoreDiff(1), UnsatisfiedScoreDiff(4));
        assert_eq!(UnsatisfiedScoreDiff(1) + ScoreDiff(3), UnsatisfiedScoreDiff(4));
        assert_eq!(
            ScoreDiff(3) + Failed(vec![ActionError::NoOp]),
            Failed(vec![ActionError::NoOp])
        );
        assert_eq!(
            Failed(vec![ActionError::InvalidBlock(1)]) + Failed(vec![ActionError::InvalidRoom(2)]),
            Failed(vec![ActionError::InvalidBlock(1), ActionError::InvalidRoom(2)])
        );
        assert_eq!(UnsatisfiedScoreDiff(5).feasible_diff(), None);
        assert_eq!(ScoreDiff(5).feasible_diff(), Some(5));
    }
}
