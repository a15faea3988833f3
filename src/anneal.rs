//! Warm start for the exact search: a greedy construction improved by
//! simulated annealing over block moves and swaps.
//!
//! Every state visited is hard-feasible, so whatever comes out is a valid
//! incumbent the branch-and-bound only has to beat.

use std::time::Instant;

use rand::prelude::SliceRandom;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::action::{Action, Index};
use crate::cache::TableCache;
use crate::config::AnnealParams;
use crate::problem::{Problem, PRECISION};

#[derive(Debug, Clone, PartialEq)]
pub struct WarmStart {
    pub assignment: Vec<Index>,
    pub score: i64,
    pub iterations: usize,
}

/// Placement order shared with the exact search: fixed blocks, then bigger
/// blocks, then blocks with more must-apart partners.
pub fn block_order(problem: &Problem) -> Vec<Index> {
    let mut order: Vec<Index> = (0..problem.n_blocks()).collect();
    order.sort_by_key(|&b| {
        (
            problem.blocks[b].fixed_room.is_none(),
            std::cmp::Reverse(problem.blocks[b].size()),
            std::cmp::Reverse(problem.conflict_lists[b].len()),
            b,
        )
    });
    order
}

/// Puts each block, in order, into the feasible room where it gains most.
/// Gives up with `None` as soon as a block has nowhere to go.
pub fn construct(problem: &Problem, order: &[Index]) -> Option<Vec<Index>> {
    let mut room_of = vec![usize::MAX; problem.n_blocks()];
    let mut members: Vec<Vec<Index>> = vec![Vec::new(); problem.n_rooms()];
    let mut load = vec![0u32; problem.n_rooms()];

    for &block in order {
        let size = problem.blocks[block].size();
        let best = (0..problem.n_rooms())
            .filter(|&r| {
                problem.allowed[block][r]
                    && load[r] + size <= problem.capacities[r]
                    && !members[r].iter().any(|&other| problem.conflicts[block][other])
            })
            .map(|r| {
                let gain = problem.bonus[block][r]
                    + members[r]
                        .iter()
                        .map(|&other| problem.block_weight[block][other])
                        .sum::<i64>();
                (gain, std::cmp::Reverse(r))
            })
            .max()?;
        let room = best.1 .0;
        room_of[block] = room;
        members[room].push(block);
        load[room] += size;
    }
    Some(room_of)
}

struct State {
    table: TableCache,
    n_iterations: usize,
    temperature: f64,
}

struct ActionGenerator {
    movable: Vec<Index>,
    candidates: Vec<Index>,
    n_rooms: usize,
    rng: SmallRng,
}

impl ActionGenerator {
    fn init(&mut self) {
        self.candidates = self.movable.clone();
        self.candidates.shuffle(&mut self.rng);
    }

    fn next(&mut self) -> Action {
        let block = match self.candidates.pop() {
            Some(block) => block,
            None => {
                self.init();
                return self.next();
            }
        };
        if self.rng.gen_bool(0.5) {
            Action::Move { block, to: self.rng.gen_range(0..self.n_rooms) }
        } else {
            let other = self.movable[self.rng.gen_range(0..self.movable.len())];
            Action::Swap(block, other)
        }
    }
}

/// Anneals from a feasible `start` and returns the best state seen.
pub fn anneal(
    problem: &Problem,
    start: &[Index],
    params: &AnnealParams,
    seed: u64,
    deadline: Instant,
) -> WarmStart {
    let mut state = State {
        table: TableCache::create(start, problem),
        n_iterations: 0,
        temperature: params.temperature,
    };
    let mut best = WarmStart {
        assignment: start.to_vec(),
        score: state.table.score(),
        iterations: 0,
    };

    let movable: Vec<Index> = (0..problem.n_blocks())
        .filter(|&b| problem.allowed[b].iter().filter(|&&ok| ok).count() > 1)
        .collect();
    if movable.is_empty() || problem.n_rooms() < 2 {
        return best;
    }
    let mut generator = ActionGenerator {
        movable,
        candidates: Vec::new(),
        n_rooms: problem.n_rooms(),
        rng: SmallRng::seed_from_u64(seed),
    };

    while state.n_iterations < params.max_iterations {
        if state.n_iterations % 256 == 0 && Instant::now() >= deadline {
            debug!(iterations = state.n_iterations, "warm start stopped by deadline");
            break;
        }
        state.n_iterations += 1;

        let action = generator.next();
        if let Some(diff) = state.table.simulate(&action, problem).feasible_diff() {
            let accept = diff >= 0
                || (state.temperature > 0.0
                    && generator.rng.gen::<f64>()
                        < (diff as f64 / PRECISION / state.temperature).exp());
            if accept
                && state.table.act(action, problem).is_ok()
                && state.table.score() > best.score
            {
                best.score = state.table.score();
                best.assignment = state.table.assignment().to_vec();
            }
        }
        state.temperature *= params.cooling_rate;
    }
    best.iterations = state.n_iterations;
    best
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::condition::{AffinityMatrix, ConstraintConfig, HardConstraints, SoftWeights};
    use crate::model::entity::Member;
    use crate::model::group::RoomTemplate;

    fn problem(n: usize, caps: &[u32], w: &AffinityMatrix, hard: HardConstraints) -> Problem {
        let members: Vec<Member> = (0..n)
            .map(|i| Member::new(format!("m{i}"), format!("M{i}")))
            .collect();
        let rooms = caps
            .iter()
            .enumerate()
            .map(|(i, &c)| RoomTemplate::new(format!("R{i}"), format!("R{i}"), c))
            .collect();
        let config = ConstraintConfig::new(rooms)
            .with_hard(hard)
            .with_soft(SoftWeights::zero());
        Problem::compile(&members, &config, w).unwrap()
    }

    #[test]
    fn order_puts_fixed_and_large_blocks_first() {
        let hard = HardConstraints::default()
            .together("m2", "m3")
            .fixed("m4", "R1")
            .apart("m0", "m1");
        let p = problem(5, &[3, 3], &AffinityMatrix::new(), hard);
        // blocks: {m0} {m1} {m2,m3} {m4}
        assert_eq!(block_order(&p), vec![3, 2, 0, 1]);
    }

    #[test]
    fn construction_respects_hard_rules() {
        let hard = HardConstraints::default().apart("m0", "m1").apart("m1", "m2");
        let p = problem(4, &[2, 2], &AffinityMatrix::new(), hard);
        let assignment = construct(&p, &block_order(&p)).unwrap();
        assert!(p.is_feasible(&assignment));
    }

    #[test]
    fn construction_can_dead_end() {
        // m0 and m1 fill the first room, then the pair that must avoid
        // each other has only one room left
        let mut w = AffinityMatrix::new();
        w.set("m0", "m1", 3.0);
        let hard = HardConstraints::default().apart("m2", "m3");
        let p = problem(4, &[2, 2], &w, hard);
        let order = vec![0, 1, 2, 3];
        assert_eq!(construct(&p, &order), None);
    }

    #[test]
    fn annealing_improves_a_poor_start() {
        let mut w = AffinityMatrix::new();
        w.set("m0", "m1", 3.0);
        w.set("m2", "m3", 3.0);
        let p = problem(4, &[2, 2], &w, HardConstraints::default());
        let start = vec![0, 1, 0, 1];
        assert_eq!(p.evaluate(&start), 0);

        let params = AnnealParams {
            max_iterations: 2_000,
            ..AnnealParams::default()
        };
        let deadline = Instant::now() + Duration::from_secs(10);
        let warm = anneal(&p, &start, &params, 7, deadline);
        assert_eq!(warm.score, 600);
        assert_eq!(warm.iterations, params.max_iterations);
        assert!(p.is_feasible(&warm.assignment));
        assert_eq!(warm, anneal(&p, &start, &params, 7, deadline));
    }
}
