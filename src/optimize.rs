//! The blocking solve call.
//!
//! Compiles the instance, seeds an incumbent with the annealed warm start and
//! hands it to the exact search. The time limit covers all three phases.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info};

use crate::action::Index;
use crate::anneal::{anneal, block_order, construct, WarmStart};
use crate::config::SolverConfig;
use crate::model::condition::ConstraintConfig;
use crate::model::entity::Member;
use crate::model::group::{capacity_violations, Room};
use crate::problem::{Infeasibility, Problem, PRECISION};
use crate::search::{Search, SearchStatus};
use crate::solution::Solution;
use crate::weights::build_affinity;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Proven best under the hard constraints.
    Optimal(Solution),
    /// Best found before the time limit; not proven optimal.
    Feasible(Solution),
    /// No assignment satisfies the hard constraints.
    Infeasible(String),
    /// The time limit passed before any feasible assignment was found.
    Timeout,
}

impl Outcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            Outcome::Optimal(solution) | Outcome::Feasible(solution) => Some(solution),
            Outcome::Infeasible(_) | Outcome::Timeout => None,
        }
    }

    pub fn into_solution(self) -> Option<Solution> {
        match self {
            Outcome::Optimal(solution) | Outcome::Feasible(solution) => Some(solution),
            Outcome::Infeasible(_) | Outcome::Timeout => None,
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, Outcome::Optimal(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            Outcome::Optimal(_) => "optimal",
            Outcome::Feasible(_) => "feasible",
            Outcome::Infeasible(_) => "infeasible",
            Outcome::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: SolverConfig,
}

impl Optimizer {
    pub fn new(config: SolverConfig) -> Self {
        Optimizer { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Assigns every member to a room. Uses `constraints.pairwise_w` when
    /// given and builds the affinity matrix from the members otherwise.
    pub fn solve(&self, members: &[Member], constraints: &ConstraintConfig) -> Outcome {
        let started = Instant::now();
        let deadline = started + self.config.time_limit();

        let affinity = match &constraints.pairwise_w {
            Some(matrix) => Cow::Borrowed(matrix),
            None => Cow::Owned(build_affinity(members)),
        };

        let problem = match Problem::compile(members, constraints, &affinity) {
            Ok(problem) => problem,
            Err(Infeasibility(reason)) => {
                info!(event = "solve_end", status = "infeasible", reason = %reason);
                return Outcome::Infeasible(reason);
            }
        };
        info!(
            event = "solve_start",
            members = members.len(),
            rooms = problem.n_rooms(),
            blocks = problem.n_blocks(),
            time_limit_secs = self.config.time_limit().as_secs_f64(),
        );

        let order = block_order(&problem);
        let warm = self.warm_start(&problem, &order, started);
        let search = Search::new(&problem, order, deadline, self.config.check_interval);
        let result = search.run(warm.as_ref().map(|w| w.score), self.config.workers);
        let complete = result.status == SearchStatus::Complete;
        debug!(
            event = "search_end",
            nodes = result.nodes,
            subtrees = result.subtrees,
            complete,
            improved = result.best.is_some(),
        );

        let best = match (result.best, warm) {
            (Some(found), _) => Some(found),
            (None, Some(warm)) => Some((warm.score, warm.assignment)),
            (None, None) => None,
        };

        let outcome = match (result.status, best) {
            (SearchStatus::Complete, Some((score, rooms))) => Outcome::Optimal(
                self.solution(members, constraints, &problem, &rooms, score, started),
            ),
            (SearchStatus::TimedOut, Some((score, rooms))) => Outcome::Feasible(
                self.solution(members, constraints, &problem, &rooms, score, started),
            ),
            (SearchStatus::Complete, None) => {
                Outcome::Infeasible("no assignment satisfies the hard constraints".to_string())
            }
            (SearchStatus::TimedOut, None) => Outcome::Timeout,
        };
        let score = outcome.solution().map(|s| s.score);
        info!(
            event = "solve_end",
            status = outcome.status(),
            score,
            runtime_ms = started.elapsed().as_millis() as u64,
        );
        outcome
    }

    fn warm_start(
        &self,
        problem: &Problem,
        order: &[Index],
        started: Instant,
    ) -> Option<WarmStart> {
        let params = &self.config.warm_start;
        if !params.enabled {
            return None;
        }
        let Some(start) = construct(problem, order) else {
            debug!(event = "warm_start", "greedy construction found no feasible start");
            return None;
        };
        let deadline = started + self.config.warm_start_limit();
        let warm = anneal(problem, &start, params, self.config.random_seed, deadline);
        debug!(
            event = "warm_start",
            score = warm.score,
            iterations = warm.iterations,
        );
        Some(warm)
    }

    fn solution(
        &self,
        members: &[Member],
        constraints: &ConstraintConfig,
        problem: &Problem,
        block_rooms: &[Index],
        score: i64,
        started: Instant,
    ) -> Solution {
        let mut room_of = vec![0; members.len()];
        for (block, &room) in problem.blocks.iter().zip(block_rooms) {
            for &member in &block.members {
                room_of[member] = room;
            }
        }

        let mut rooms: Vec<Room> = constraints.rooms.iter().map(Room::from_template).collect();
        for (member, &room) in members.iter().zip(&room_of) {
            rooms[room].members.push(member.clone());
        }
        let hard_violations = capacity_violations(&rooms);

        Solution {
            rooms,
            score: score as f64 / PRECISION,
            hard_violations,
            soft_scores: BTreeMap::new(),
            runtime_ms: started.elapsed().as_millis() as u64,
            moves: Vec::new(),
        }
    }
}

/// One-shot solve with default tuning and the given time limit.
pub fn run_optimization(
    members: &[Member],
    constraints: &ConstraintConfig,
    time_limit_secs: f64,
) -> Outcome {
    Optimizer::new(SolverConfig::default().with_time_limit_secs(time_limit_secs))
        .solve(members, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::condition::{AffinityMatrix, HardConstraints, SoftWeights};
    use crate::model::group::RoomTemplate;

    fn members(ids: &[&str]) -> Vec<Member> {
        ids.iter().map(|id| Member::new(*id, id.to_uppercase())).collect()
    }

    fn optimizer() -> Optimizer {
        Optimizer::new(SolverConfig::default().with_time_limit_secs(10.0).with_workers(2))
    }

    fn room_ids(solution: &Solution) -> Vec<Vec<&str>> {
        solution
            .rooms
            .iter()
            .map(|room| room.members.iter().map(|m| m.id.as_str()).collect())
            .collect()
    }

    #[test]
    fn friends_share_a_room() {
        let mut w = AffinityMatrix::new();
        w.set("a", "b", 3.0);
        w.set("c", "d", 2.0);
        w.set("a", "c", -1.0);
        let config = ConstraintConfig::new(vec![
            RoomTemplate::new("R1", "One", 2),
            RoomTemplate::new("R2", "Two", 2),
        ])
        .with_soft(SoftWeights::zero())
        .with_affinity(w);

        let outcome = optimizer().solve(&members(&["a", "b", "c", "d"]), &config);
        assert!(outcome.is_optimal());
        let solution = outcome.into_solution().unwrap();
        assert_eq!(solution.score, 5.0);
        let rooms = room_ids(&solution);
        assert!(rooms.contains(&vec!["a", "b"]));
        assert!(rooms.contains(&vec!["c", "d"]));
        assert!(solution.hard_violations.is_empty());
        assert!(solution.soft_scores.is_empty());
    }

    #[test]
    fn size_preference_and_empty_beds_enter_the_score() {
        let mut solo = Member::new("a", "A");
        solo.ranked_room_sizes.insert(1, 1);
        solo.ranked_room_sizes.insert(3, 3);
        let config = ConstraintConfig::new(vec![
            RoomTemplate::new("big", "Big", 3),
            RoomTemplate::new("single", "Single", 1),
        ])
        .with_soft(SoftWeights { alpha: 0.5, beta: 0.25, gamma: 0.0 })
        .with_affinity(AffinityMatrix::new());

        let solution = optimizer().solve(&[solo], &config).into_solution().unwrap();
        assert_eq!(room_ids(&solution), vec![Vec::<&str>::new(), vec!["a"]]);
        // 0.5 * (5 - 1) for the single room, minus 0.25 for each of 3 empty beds
        assert_eq!(solution.score, 1.25);
    }

    #[test]
    fn contradictions_are_infeasible() {
        let config = ConstraintConfig::new(vec![
            RoomTemplate::new("R1", "One", 2),
            RoomTemplate::new("R2", "Two", 2),
        ])
        .with_hard(HardConstraints::default().apart("a", "b").apart("b", "c").apart("a", "c"))
        .with_affinity(AffinityMatrix::new());

        let outcome = optimizer().solve(&members(&["a", "b", "c"]), &config);
        assert!(matches!(outcome, Outcome::Infeasible(_)));
        assert_eq!(outcome.solution(), None);
    }

    #[test]
    fn exact_mode_with_wrong_headcount_is_infeasible() {
        let config = ConstraintConfig::new(vec![RoomTemplate::new("R1", "One", 3)])
            .with_empty_beds(false, None)
            .with_affinity(AffinityMatrix::new());
        let outcome = optimizer().solve(&members(&["a", "b"]), &config);
        assert_eq!(outcome.status(), "infeasible");
    }

    #[test]
    fn missing_affinity_is_built_from_requests() {
        let mut people = members(&["ann", "bob", "cat"]);
        people[0].requested_with.push("BOB".to_string());
        let config = ConstraintConfig::new(vec![
            RoomTemplate::new("R1", "One", 2),
            RoomTemplate::new("R2", "Two", 1),
        ])
        .with_soft(SoftWeights::zero());

        let solution = optimizer().solve(&people, &config).into_solution().unwrap();
        assert_eq!(room_ids(&solution), vec![vec!["ann", "bob"], vec!["cat"]]);
        assert_eq!(solution.score, 3.0);
    }

    #[test]
    fn no_members_is_trivially_optimal() {
        let config = ConstraintConfig::new(vec![RoomTemplate::new("R1", "One", 2)])
            .with_soft(SoftWeights::zero());
        let solution = optimizer().solve(&[], &config).into_solution().unwrap();
        assert_eq!(solution.rooms.len(), 1);
        assert!(solution.rooms[0].members.is_empty());
    }

    #[test]
    fn warm_start_and_sequential_search_agree() {
        let mut w = AffinityMatrix::new();
        for (i, a) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
            for (j, b) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
                if i != j {
                    w.set(a, b, ((i * 5 + j * 2) % 7) as f64 / 2.0 - 1.5);
                }
            }
        }
        let config = ConstraintConfig::new(vec![
            RoomTemplate::new("R1", "One", 3),
            RoomTemplate::new("R2", "Two", 3),
        ])
        .with_soft(SoftWeights::zero())
        .with_affinity(w);
        let people = members(&["a", "b", "c", "d", "e", "f"]);

        let cold = Optimizer::new(SolverConfig::default().without_warm_start().with_workers(1))
            .solve(&people, &config);
        let warm = optimizer().solve(&people, &config);
        assert!(cold.is_optimal() && warm.is_optimal());
        assert_eq!(cold.solution().unwrap().score, warm.solution().unwrap().score);
    }
}
