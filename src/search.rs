//! Depth-first branch-and-bound over block placements.
//!
//! Blocks are placed in [`block_order`](crate::anneal::block_order). A node is
//! pruned when its optimistic bound cannot beat the best assignment known,
//! when some unplaced block has no room left, or when it would open a room
//! indistinguishable from one already tried. The top of the tree is expanded
//! until there are enough open subtrees to keep every worker busy; those are
//! explored in parallel and share the incumbent score.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::warn;

use crate::action::Index;
use crate::problem::Problem;

/// Open subtrees to aim for per worker before going parallel.
const SUBTREES_PER_WORKER: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// The whole tree was explored.
    Complete,
    /// The deadline cut the search short.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub status: SearchStatus,
    /// Best assignment found by the search itself, one room per block.
    pub best: Option<(i64, Vec<Index>)>,
    pub nodes: u64,
    /// Independent subtrees the search was split into.
    pub subtrees: usize,
}

pub struct Search<'p> {
    problem: &'p Problem,
    order: Vec<Index>,
    /// `suffix_bound[d]`: most the blocks `order[d..]` can still add.
    suffix_bound: Vec<i64>,
    /// Rooms with the same class are interchangeable while empty.
    room_class: Vec<usize>,
    deadline: Instant,
    check_interval: u64,
}

struct Shared {
    incumbent: AtomicI64,
    stop: AtomicBool,
}

impl<'p> Search<'p> {
    pub fn new(
        problem: &'p Problem,
        order: Vec<Index>,
        deadline: Instant,
        check_interval: u64,
    ) -> Self {
        let mut suffix_bound = vec![0i64; order.len() + 1];
        for depth in (0..order.len()).rev() {
            let b = order[depth];
            let best_bonus = (0..problem.n_rooms())
                .filter(|&r| problem.allowed[b][r])
                .map(|r| problem.bonus[b][r])
                .max()
                .unwrap_or(0);
            let earlier: i64 = order[..depth]
                .iter()
                .map(|&c| problem.block_weight[b][c].max(0))
                .sum();
            suffix_bound[depth] = suffix_bound[depth + 1] + best_bonus + earlier;
        }

        let pinned: Vec<bool> = (0..problem.n_rooms())
            .map(|r| problem.blocks.iter().any(|block| block.fixed_room == Some(r)))
            .collect();
        let room_class = (0..problem.n_rooms())
            .map(|r| {
                if pinned[r] {
                    return r;
                }
                (0..r)
                    .find(|&s| !pinned[s] && problem.capacities[s] == problem.capacities[r])
                    .unwrap_or(r)
            })
            .collect();

        Search {
            problem,
            order,
            suffix_bound,
            room_class,
            deadline,
            check_interval: check_interval.max(1),
        }
    }

    /// Runs the search. `incumbent` is the score of an assignment already in
    /// hand; only strictly better ones are reported.
    pub fn run(&self, incumbent: Option<i64>, workers: usize) -> SearchResult {
        let shared = Shared {
            incumbent: AtomicI64::new(incumbent.unwrap_or(i64::MIN)),
            stop: AtomicBool::new(false),
        };
        let target = if workers > 1 { workers * SUBTREES_PER_WORKER } else { 1 };
        let (depth, subtrees, expanded) = self.split(&shared, target);

        let explore = |prefix: &Prefix| {
            let mut branch = Branch::new(self, &shared);
            for &(block, room) in &prefix.placed {
                branch.place(block, room);
            }
            branch.dfs(depth, prefix.score);
            (branch.best, branch.nodes)
        };

        let outcomes: Vec<(Option<(i64, Vec<Index>)>, u64)> = if workers > 1 && subtrees.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => pool.install(|| subtrees.par_iter().map(explore).collect()),
                Err(err) => {
                    warn!(error = %err, "thread pool unavailable, searching sequentially");
                    subtrees.iter().map(explore).collect()
                }
            }
        } else {
            subtrees.iter().map(explore).collect()
        };

        let nodes = expanded + outcomes.iter().map(|(_, n)| n).sum::<u64>();
        // subtrees are in depth-first order, so the earliest wins a tie
        let mut best: Option<(i64, Vec<Index>)> = None;
        for (found, _) in outcomes {
            if let Some((score, rooms)) = found {
                if best.as_ref().map_or(true, |(s, _)| score > *s) {
                    best = Some((score, rooms));
                }
            }
        }
        let best = best.filter(|(score, _)| incumbent.map_or(true, |i| *score > i));
        let status = if shared.stop.load(Ordering::Relaxed) {
            SearchStatus::TimedOut
        } else {
            SearchStatus::Complete
        };
        SearchResult {
            status,
            best,
            nodes,
            subtrees: subtrees.len(),
        }
    }

    /// Expands the tree one level at a time until there are at least
    /// `target` open subtrees or every block is placed. Returns the depth
    /// reached, the subtrees in depth-first order and the nodes expanded.
    fn split(&self, shared: &Shared, target: usize) -> (usize, Vec<Prefix>, u64) {
        let mut frontier = vec![Prefix {
            placed: Vec::new(),
            score: self.problem.constant,
        }];
        let mut depth = 0;
        let mut expanded = 0;
        while depth < self.order.len() && !frontier.is_empty() && frontier.len() < target {
            let block = self.order[depth];
            let mut next = Vec::new();
            for prefix in &frontier {
                let mut branch = Branch::new(self, shared);
                for &(b, room) in &prefix.placed {
                    branch.place(b, room);
                }
                expanded += 1;
                for (room, gain) in branch.choices(block) {
                    let mut placed = prefix.placed.clone();
                    placed.push((block, room));
                    next.push(Prefix {
                        placed,
                        score: prefix.score + gain,
                    });
                }
            }
            frontier = next;
            depth += 1;
        }
        (depth, frontier, expanded)
    }
}

/// A partial placement of the first blocks in search order.
struct Prefix {
    placed: Vec<(Index, Index)>,
    score: i64,
}

struct Branch<'s, 'p> {
    search: &'s Search<'p>,
    shared: &'s Shared,
    room_of: Vec<Option<Index>>,
    room_blocks: Vec<Vec<Index>>,
    load: Vec<u32>,
    /// `conflict_count[r][b]`: blocks in room `r` that `b` must avoid.
    conflict_count: Vec<Vec<u32>>,
    best: Option<(i64, Vec<Index>)>,
    nodes: u64,
}

impl<'s, 'p> Branch<'s, 'p> {
    fn new(search: &'s Search<'p>, shared: &'s Shared) -> Self {
        let problem = search.problem;
        Branch {
            search,
            shared,
            room_of: vec![None; problem.n_blocks()],
            room_blocks: vec![Vec::new(); problem.n_rooms()],
            load: vec![0; problem.n_rooms()],
            conflict_count: vec![vec![0; problem.n_blocks()]; problem.n_rooms()],
            best: None,
            nodes: 0,
        }
    }

    fn fits(&self, block: Index, room: Index) -> bool {
        let problem = self.search.problem;
        problem.allowed[block][room]
            && self.load[room] + problem.blocks[block].size() <= problem.capacities[room]
            && self.conflict_count[room][block] == 0
    }

    fn gain(&self, block: Index, room: Index) -> i64 {
        let problem = self.search.problem;
        problem.bonus[block][room]
            + self.room_blocks[room]
                .iter()
                .map(|&other| problem.block_weight[block][other])
                .sum::<i64>()
    }

    /// Feasible rooms for `block`, best gain first. Of several empty rooms
    /// in one class only the first is offered.
    fn choices(&self, block: Index) -> Vec<(Index, i64)> {
        let mut opened = Vec::new();
        let mut choices: Vec<(Index, i64)> = Vec::new();
        for room in 0..self.search.problem.n_rooms() {
            if !self.fits(block, room) {
                continue;
            }
            if self.room_blocks[room].is_empty() {
                let class = self.search.room_class[room];
                if opened.contains(&class) {
                    continue;
                }
                opened.push(class);
            }
            choices.push((room, self.gain(block, room)));
        }
        choices.sort_by_key(|&(room, gain)| (std::cmp::Reverse(gain), room));
        choices
    }

    fn place(&mut self, block: Index, room: Index) {
        let problem = self.search.problem;
        self.room_blocks[room].push(block);
        self.load[room] += problem.blocks[block].size();
        for &other in &problem.conflict_lists[block] {
            self.conflict_count[room][other] += 1;
        }
        self.room_of[block] = Some(room);
    }

    fn unplace(&mut self, block: Index, room: Index) {
        let problem = self.search.problem;
        self.room_blocks[room].pop();
        self.load[room] -= problem.blocks[block].size();
        for &other in &problem.conflict_lists[block] {
            self.conflict_count[room][other] -= 1;
        }
        self.room_of[block] = None;
    }

    fn should_stop(&mut self) -> bool {
        self.nodes += 1;
        if self.nodes % self.search.check_interval == 0 && Instant::now() >= self.search.deadline {
            self.shared.stop.store(true, Ordering::Relaxed);
        }
        self.shared.stop.load(Ordering::Relaxed)
    }

    fn dfs(&mut self, depth: usize, score: i64) {
        if self.should_stop() {
            return;
        }
        let order = &self.search.order;
        if depth == order.len() {
            if self.best.as_ref().map_or(true, |(s, _)| score > *s) {
                let rooms = self.room_of.iter().map(|r| r.unwrap_or(0)).collect();
                self.best = Some((score, rooms));
                self.shared.incumbent.fetch_max(score, Ordering::Relaxed);
            }
            return;
        }

        let bound = score + self.search.suffix_bound[depth];
        if bound < self.shared.incumbent.load(Ordering::Relaxed) {
            return;
        }
        if self.best.as_ref().is_some_and(|(s, _)| bound <= *s) {
            return;
        }
        let n_rooms = self.search.problem.n_rooms();
        if order[depth + 1..]
            .iter()
            .any(|&b| !(0..n_rooms).any(|r| self.fits(b, r)))
        {
            return;
        }

        let block = order[depth];
        for (room, gain) in self.choices(block) {
            self.place(block, room);
            self.dfs(depth + 1, score + gain);
            self.unplace(block, room);
            if self.shared.stop.load(Ordering::Relaxed) {
                return;
            }
        }
    }
}
