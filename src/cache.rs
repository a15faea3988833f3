//! Incremental scoring of a complete block assignment.
//!
//! Each room remembers, per block, the affinity that block shares with its
//! roommates, so moves and swaps are scored without a full re-evaluation.

use crate::action::{Action, ActionError, ActionResult, Index};
use crate::problem::Problem;

#[derive(Debug, Clone)]
struct CachedBlock {
    block: Index,
    score: i64,
}

impl CachedBlock {
    fn from_blocks(block: Index, others: &[CachedBlock], problem: &Problem) -> CachedBlock {
        let score = others
            .iter()
            .map(|other| problem.block_weight[block][other.block])
            .sum();
        CachedBlock { block, score }
    }

    fn broadcast_adding(&self, others: &mut [CachedBlock], problem: &Problem) {
        others
            .iter_mut()
            .for_each(|other| other.score += problem.block_weight[self.block][other.block]);
    }

    fn broadcast_removed(&self, others: &mut [CachedBlock], problem: &Problem) {
        others
            .iter_mut()
            .for_each(|other| other.score -= problem.block_weight[self.block][other.block]);
    }
}

#[derive(Debug, Clone)]
struct RoomCache {
    room: Index,
    blocks: Vec<CachedBlock>,
    load: u32,
}

impl RoomCache {
    fn position(&self, block: Index) -> Option<usize> {
        self.blocks.iter().position(|cached| cached.block == block)
    }

    fn pair_score(&self) -> i64 {
        // every pair is counted from both ends
        self.blocks.iter().map(|cached| cached.score).sum::<i64>() / 2
    }

    fn gain_with(&self, block: Index, skip: Option<Index>, problem: &Problem) -> i64 {
        self.blocks
            .iter()
            .filter(|cached| Some(cached.block) != skip)
            .map(|cached| problem.block_weight[block][cached.block])
            .sum::<i64>()
            + problem.bonus[block][self.room]
    }

    fn accepts(&self, block: Index, skip: Option<Index>, problem: &Problem) -> bool {
        let freed = skip.map_or(0, |s| problem.blocks[s].size());
        problem.allowed[block][self.room]
            && self.load - freed + problem.blocks[block].size() <= problem.capacities[self.room]
            && !self
                .blocks
                .iter()
                .any(|cached| Some(cached.block) != skip && problem.conflicts[block][cached.block])
    }

    fn simulate_add(&self, block: Index, problem: &Problem) -> ActionResult {
        let diff = self.gain_with(block, None, problem);
        if self.accepts(block, None, problem) {
            ActionResult::ScoreDiff(diff)
        } else {
            ActionResult::UnsatisfiedScoreDiff(diff)
        }
    }

    fn simulate_remove(&self, block: Index, problem: &Problem) -> ActionResult {
        match self.position(block) {
            Some(pos) => ActionResult::ScoreDiff(
                -(self.blocks[pos].score + problem.bonus[block][self.room]),
            ),
            None => ActionResult::Failed(vec![ActionError::InvalidBlock(block)]),
        }
    }

    fn simulate_swap(&self, out: Index, incoming: Index, problem: &Problem) -> ActionResult {
        let Some(pos) = self.position(out) else {
            return ActionResult::Failed(vec![ActionError::InvalidBlock(out)]);
        };
        let diff = self.gain_with(incoming, Some(out), problem)
            - self.blocks[pos].score
            - problem.bonus[out][self.room];
        if self.accepts(incoming, Some(out), problem) {
            ActionResult::ScoreDiff(diff)
        } else {
            ActionResult::UnsatisfiedScoreDiff(diff)
        }
    }

    fn add(&mut self, block: Index, problem: &Problem) {
        let cached = CachedBlock::from_blocks(block, &self.blocks, problem);
        cached.broadcast_adding(&mut self.blocks, problem);
        self.blocks.push(cached);
        self.load += problem.blocks[block].size();
    }

    fn remove(&mut self, block: Index, problem: &Problem) -> Result<(), ActionError> {
        let pos = self.position(block).ok_or(ActionError::InvalidBlock(block))?;
        let cached = self.blocks.swap_remove(pos);
        cached.broadcast_removed(&mut self.blocks, problem);
        self.load -= problem.blocks[block].size();
        Ok(())
    }
}

/// A complete, hard-feasible assignment with its objective kept up to date.
#[derive(Debug, Clone)]
pub struct TableCache {
    rooms: Vec<RoomCache>,
    room_of: Vec<Index>,
    score: i64,
}

impl TableCache {
    /// `assignment[b]` is the room of block `b`.
    pub fn create(assignment: &[Index], problem: &Problem) -> TableCache {
        let mut rooms: Vec<RoomCache> = (0..problem.n_rooms())
            .map(|room| RoomCache { room, blocks: Vec::new(), load: 0 })
            .collect();
        for (block, &room) in assignment.iter().enumerate() {
            rooms[room].add(block, problem);
        }
        TableCache {
            rooms,
            room_of: assignment.to_vec(),
            score: problem.evaluate(assignment),
        }
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn assignment(&self) -> &[Index] {
        &self.room_of
    }

    /// Recomputes the objective from scratch; matches [`TableCache::score`].
    pub fn recount(&self, problem: &Problem) -> i64 {
        let pairs: i64 = self.rooms.iter().map(RoomCache::pair_score).sum();
        let bonus: i64 = self
            .room_of
            .iter()
            .enumerate()
            .map(|(block, &room)| problem.bonus[block][room])
            .sum();
        problem.constant + pairs + bonus
    }

    fn room_of(&self, block: Index) -> Result<Index, ActionError> {
        self.room_of.get(block).copied().ok_or(ActionError::InvalidBlock(block))
    }

    pub fn simulate(&self, action: &Action, problem: &Problem) -> ActionResult {
        match *action {
            Action::Move { block, to } => {
                let from = match self.room_of(block) {
                    Ok(room) => room,
                    Err(err) => return ActionResult::Failed(vec![err]),
                };
                let Some(target) = self.rooms.get(to) else {
                    return ActionResult::Failed(vec![ActionError::InvalidRoom(to)]);
                };
                if from == to {
                    return ActionResult::Failed(vec![ActionError::NoOp]);
                }
                self.rooms[from].simulate_remove(block, problem)
                    + target.simulate_add(block, problem)
            }
            Action::Swap(a, b) => {
                let (room_a, room_b) = match (self.room_of(a), self.room_of(b)) {
                    (Ok(ra), Ok(rb)) => (ra, rb),
                    (Err(err), _) | (_, Err(err)) => return ActionResult::Failed(vec![err]),
                };
                if room_a == room_b {
                    return ActionResult::Failed(vec![ActionError::NoOp]);
                }
                self.rooms[room_a].simulate_swap(a, b, problem)
                    + self.rooms[room_b].simulate_swap(b, a, problem)
            }
        }
    }

    /// Applies the action if it keeps every hard rule and returns the score diff.
    pub fn act(&mut self, action: Action, problem: &Problem) -> Result<i64, ActionError> {
        let diff = match self.simulate(&action, problem) {
            ActionResult::ScoreDiff(diff) => diff,
            ActionResult::UnsatisfiedScoreDiff(_) => return Err(ActionError::Unsatisfied),
            ActionResult::Failed(mut errors) => return Err(errors.remove(0)),
        };
        match action {
            Action::Move { block, to } => {
                let from = self.room_of(block)?;
                self.rooms[from].remove(block, problem)?;
                self.rooms[to].add(block, problem);
                self.room_of[block] = to;
            }
            Action::Swap(a, b) => {
                let (room_a, room_b) = (self.room_of(a)?, self.room_of(b)?);
                self.rooms[room_a].remove(a, problem)?;
                self.rooms[room_b].remove(b, problem)?;
                self.rooms[room_a].add(b, problem);
                self.rooms[room_b].add(a, problem);
                self.room_of[a] = room_b;
                self.room_of[b] = room_a;
            }
        }
        self.score += diff;
        Ok(diff)
    }
}
