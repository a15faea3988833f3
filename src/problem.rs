//! Index-based form of an assignment problem.
//!
//! Members joined by must-together pairs are merged into blocks up front, so
//! the search places whole blocks and never has to reason about equality
//! constraints. Everything the search touches is integer, scaled by
//! [`PRECISION`].

use std::collections::HashMap;

use itertools::Itertools;
use tracing::warn;

use crate::action::Index;
use crate::model::condition::{AffinityMatrix, ConstraintConfig};
use crate::model::entity::Member;

pub const PRECISION: f64 = 100.0;

/// Highest rank that still earns a size bonus is `SIZE_BONUS_BASE - 1`.
pub const SIZE_BONUS_BASE: i64 = 5;

fn scaled(value: f64) -> i64 {
    (value * PRECISION).round() as i64
}

/// Why no assignment can exist. Detected before search when possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Infeasibility(pub String);

#[derive(Debug, Clone)]
pub struct Block {
    pub members: Vec<Index>,
    pub fixed_room: Option<Index>,
}

impl Block {
    pub fn size(&self) -> u32 {
        self.members.len() as u32
    }
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub capacities: Vec<u32>,
    pub blocks: Vec<Block>,
    /// `allowed[b][r]`: block `b` may be placed in room `r`.
    pub allowed: Vec<Vec<bool>>,
    /// Symmetric must-apart relation between blocks.
    pub conflicts: Vec<Vec<bool>>,
    pub conflict_lists: Vec<Vec<Index>>,
    /// Combined affinity of every member pair across two blocks.
    pub block_weight: Vec<Vec<i64>>,
    /// Size-preference bonus of the whole block for each room.
    pub bonus: Vec<Vec<i64>>,
    /// Objective part that every complete assignment shares: affinity inside
    /// blocks plus the empty-bed penalty.
    pub constant: i64,
}

struct UnionFind {
    parent: Vec<Index>,
}

impl UnionFind {
    fn new(n: usize) -> UnionFind {
        UnionFind { parent: (0..n).collect() }
    }

    fn find(&mut self, x: Index) -> Index {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: Index, b: Index) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

impl Problem {
    pub fn compile(
        members: &[Member],
        config: &ConstraintConfig,
        affinity: &AffinityMatrix,
    ) -> Result<Problem, Infeasibility> {
        let n_members = members.len();
        let n_rooms = config.rooms.len();
        let capacities: Vec<u32> = config.rooms.iter().map(|room| room.capacity).collect();
        let total_capacity: u64 = capacities.iter().map(|&c| c as u64).sum();

        if n_members > 0 && n_rooms == 0 {
            return Err(Infeasibility(format!("{n_members} members but no rooms")));
        }
        if config.allow_empty_beds {
            if n_members as u64 > total_capacity {
                return Err(Infeasibility(format!(
                    "{n_members} members exceed total capacity {total_capacity}"
                )));
            }
            if let Some(budget) = config.empty_bed_budget {
                let empty = total_capacity - n_members as u64;
                if empty > budget as u64 {
                    return Err(Infeasibility(format!(
                        "{empty} empty beds exceed the budget of {budget}"
                    )));
                }
            }
        } else if n_members as u64 != total_capacity {
            return Err(Infeasibility(format!(
                "exact fill needs {total_capacity} members, got {n_members}"
            )));
        }

        let member_index: HashMap<&str, Index> = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.as_str(), i))
            .collect();
        let room_index: HashMap<&str, Index> = config
            .rooms
            .iter()
            .enumerate()
            .map(|(r, room)| (room.id.as_str(), r))
            .collect();
        let lookup = |id: &str, what: &str| {
            let found = member_index.get(id).copied();
            if found.is_none() {
                warn!(member = %id, constraint = what, "unknown member id ignored");
            }
            found
        };

        let mut uf = UnionFind::new(n_members);
        for (a, b) in config.hard.together_pairs() {
            if let (Some(i), Some(j)) = (lookup(a, "mustTogether"), lookup(b, "mustTogether")) {
                uf.union(i, j);
            }
        }

        // Blocks are numbered by their lowest member index.
        let mut block_of_root: HashMap<Index, Index> = HashMap::new();
        let mut blocks: Vec<Block> = Vec::new();
        let mut block_of = vec![0; n_members];
        for i in 0..n_members {
            let root = uf.find(i);
            let b = *block_of_root.entry(root).or_insert_with(|| {
                blocks.push(Block { members: Vec::new(), fixed_room: None });
                blocks.len() - 1
            });
            blocks[b].members.push(i);
            block_of[i] = b;
        }

        for (member, room) in &config.hard.fixed_room_assignments {
            let Some(i) = lookup(member, "fixedRoom") else {
                continue;
            };
            let Some(&r) = room_index.get(room.as_str()) else {
                warn!(member = %member, room = %room, "unknown fixed room ignored");
                continue;
            };
            let block = &mut blocks[block_of[i]];
            match block.fixed_room {
                Some(existing) if existing != r => {
                    return Err(Infeasibility(format!(
                        "{member} is tied to members fixed in {} and {room}",
                        config.rooms[existing].id
                    )));
                }
                _ => block.fixed_room = Some(r),
            }
        }

        let n_blocks = blocks.len();
        let mut conflicts = vec![vec![false; n_blocks]; n_blocks];
        for (a, b) in config.hard.apart_pairs() {
            let (Some(i), Some(j)) = (lookup(a, "mustApart"), lookup(b, "mustApart")) else {
                continue;
            };
            let (bi, bj) = (block_of[i], block_of[j]);
            if bi == bj {
                return Err(Infeasibility(format!(
                    "{a} and {b} must be apart but are tied together"
                )));
            }
            conflicts[bi][bj] = true;
            conflicts[bj][bi] = true;
        }
        let conflict_lists: Vec<Vec<Index>> = conflicts
            .iter()
            .map(|row| row.iter().positions(|&c| c).collect())
            .collect();

        let allowed: Vec<Vec<bool>> = blocks
            .iter()
            .map(|block| {
                (0..n_rooms)
                    .map(|r| {
                        block.fixed_room.map_or(true, |fixed| fixed == r)
                            && capacities[r] >= block.size()
                    })
                    .collect()
            })
            .collect();
        for (block, row) in blocks.iter().zip(&allowed) {
            if !row.iter().any(|&ok| ok) {
                let first = &members[block.members[0]].id;
                return Err(Infeasibility(format!(
                    "group of {} around {first} fits no room",
                    block.size()
                )));
            }
        }

        let mut member_weight = vec![vec![0i64; n_members]; n_members];
        for (i, j) in (0..n_members).tuple_combinations() {
            let w = scaled(affinity.get_pair([&members[i].id, &members[j].id]));
            member_weight[i][j] = w;
            member_weight[j][i] = w;
        }

        let mut block_weight = vec![vec![0i64; n_blocks]; n_blocks];
        let mut constant = 0i64;
        for (i, j) in (0..n_members).tuple_combinations() {
            let (bi, bj) = (block_of[i], block_of[j]);
            if bi == bj {
                constant += member_weight[i][j];
            } else {
                block_weight[bi][bj] += member_weight[i][j];
                block_weight[bj][bi] += member_weight[i][j];
            }
        }

        let bonus: Vec<Vec<i64>> = blocks
            .iter()
            .map(|block| {
                capacities
                    .iter()
                    .map(|&capacity| {
                        block
                            .members
                            .iter()
                            .map(|&i| size_bonus(&members[i], capacity, config.soft.alpha))
                            .sum()
                    })
                    .collect()
            })
            .collect();

        // Every member is placed, so the empty-bed total is fixed.
        if config.allow_empty_beds && config.soft.beta != 0.0 {
            let empty = total_capacity as i64 - n_members as i64;
            constant -= scaled(config.soft.beta) * empty;
        }

        Ok(Problem {
            capacities,
            blocks,
            allowed,
            conflicts,
            conflict_lists,
            block_weight,
            bonus,
            constant,
        })
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn n_rooms(&self) -> usize {
        self.capacities.len()
    }

    /// Objective of a complete assignment given as one room per block.
    pub fn evaluate(&self, rooms: &[Index]) -> i64 {
        let pairs: i64 = (0..rooms.len())
            .tuple_combinations()
            .filter(|&(a, b)| rooms[a] == rooms[b])
            .map(|(a, b)| self.block_weight[a][b])
            .sum();
        let bonus: i64 = rooms.iter().enumerate().map(|(b, &r)| self.bonus[b][r]).sum();
        self.constant + pairs + bonus
    }

    /// True if every hard rule holds for a complete assignment.
    pub fn is_feasible(&self, rooms: &[Index]) -> bool {
        if rooms.len() != self.n_blocks() {
            return false;
        }
        let mut load = vec![0u32; self.n_rooms()];
        for (b, &r) in rooms.iter().enumerate() {
            if r >= self.n_rooms() || !self.allowed[b][r] {
                return false;
            }
            load[r] += self.blocks[b].size();
        }
        let over = load.iter().zip(&self.capacities).any(|(l, c)| l > c);
        let clash = (0..rooms.len())
            .tuple_combinations()
            .any(|(a, b)| rooms[a] == rooms[b] && self.conflicts[a][b]);
        !over && !clash
    }
}

pub fn size_bonus(member: &Member, capacity: u32, alpha: f64) -> i64 {
    match member.size_rank(capacity) {
        Some(rank) => {
            let bonus = (SIZE_BONUS_BASE - rank).max(0);
            scaled(alpha * bonus as f64)
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::condition::{HardConstraints, SoftWeights};
    use crate::model::group::RoomTemplate;

    fn members(ids: &[&str]) -> Vec<Member> {
        ids.iter().map(|id| Member::new(*id, id.to_uppercase())).collect()
    }

    fn rooms(caps: &[u32]) -> Vec<RoomTemplate> {
        caps.iter()
            .enumerate()
            .map(|(i, &c)| RoomTemplate::new(format!("R{}", i + 1), format!("Room {}", i + 1), c))
            .collect()
    }

    fn compile(ms: &[Member], config: &ConstraintConfig) -> Result<Problem, Infeasibility> {
        Problem::compile(ms, config, &AffinityMatrix::new())
    }

    #[test]
    fn together_pairs_merge_into_blocks() {
        let ms = members(&["a", "b", "c", "d"]);
        let config = ConstraintConfig::new(rooms(&[4]))
            .with_hard(HardConstraints::default().together("a", "c").together("c", "d"))
            .with_soft(SoftWeights::zero());
        let problem = compile(&ms, &config).unwrap();
        assert_eq!(problem.n_blocks(), 2);
        assert_eq!(problem.blocks[0].members, vec![0, 2, 3]);
        assert_eq!(problem.blocks[1].members, vec![1]);
        // every member lands in exactly one block
        assert_eq!(problem.blocks.iter().map(Block::size).sum::<u32>(), 4);
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let ms = members(&["a", "b"]);
        let config = ConstraintConfig::new(rooms(&[2]))
            .with_hard(
                HardConstraints::default()
                    .apart("a", "ghost")
                    .together("ghost", "b")
                    .fixed("a", "R9"),
            );
        let problem = compile(&ms, &config).unwrap();
        assert_eq!(problem.n_blocks(), 2);
        assert!(problem.conflict_lists.iter().all(Vec::is_empty));
        assert!(problem.blocks.iter().all(|b| b.fixed_room.is_none()));
    }

    #[test]
    fn contradictions_are_infeasible() {
        let ms = members(&["a", "b"]);

        let apart_and_together = ConstraintConfig::new(rooms(&[2]))
            .with_hard(HardConstraints::default().together("a", "b").apart("b", "a"));
        assert!(compile(&ms, &apart_and_together).is_err());

        let split_fixed = ConstraintConfig::new(rooms(&[2, 2]))
            .with_hard(
                HardConstraints::default()
                    .together("a", "b")
                    .fixed("a", "R1")
                    .fixed("b", "R2"),
            );
        assert!(compile(&ms, &split_fixed).is_err());

        let too_big = ConstraintConfig::new(rooms(&[1, 1]))
            .with_hard(HardConstraints::default().together("a", "b"));
        assert!(compile(&ms, &too_big).is_err());
    }

    #[test]
    fn capacity_totals() {
        let ms = members(&["a", "b", "c"]);
        let exact = ConstraintConfig::new(rooms(&[2, 2])).with_empty_beds(false, None);
        assert!(compile(&ms, &exact).is_err());

        let overfull = ConstraintConfig::new(rooms(&[1, 1]));
        assert!(compile(&ms, &overfull).is_err());

        let over_budget = ConstraintConfig::new(rooms(&[2, 4])).with_empty_beds(true, Some(2));
        assert!(compile(&ms, &over_budget).is_err());

        let within_budget = ConstraintConfig::new(rooms(&[2, 4])).with_empty_beds(true, Some(3));
        assert!(compile(&ms, &within_budget).is_ok());

        let no_rooms = ConstraintConfig::new(Vec::new());
        assert!(compile(&ms, &no_rooms).is_err());
        assert!(compile(&[], &no_rooms).is_ok());
    }

    #[test]
    fn objective_terms_are_scaled() {
        let mut ms = members(&["a", "b"]);
        ms[0].ranked_room_sizes.insert(2, 1);
        ms[1].ranked_room_sizes.insert(2, 7);
        let mut w = AffinityMatrix::new();
        w.set("a", "b", 3.0);
        w.set("b", "a", -0.5);
        let config = ConstraintConfig::new(rooms(&[2, 3]))
            .with_soft(SoftWeights { alpha: 0.2, beta: 0.1, gamma: 0.0 });

        let problem = Problem::compile(&ms, &config, &w).unwrap();
        assert_eq!(problem.block_weight[0][1], 250);
        // rank 1 -> 4 * 0.2, rank 7 earns nothing
        assert_eq!(problem.bonus[0], vec![80, 0]);
        assert_eq!(problem.bonus[1], vec![0, 0]);
        // three empty beds at 0.1 each
        assert_eq!(problem.constant, -30);
        assert_eq!(problem.evaluate(&[0, 0]), 250 + 80 - 30);
        assert_eq!(problem.evaluate(&[0, 1]), 80 - 30);
    }

    #[test]
    fn feasibility_check() {
        let ms = members(&["a", "b", "c"]);
        let config = ConstraintConfig::new(rooms(&[2, 1]))
            .with_hard(HardConstraints::default().apart("a", "b").fixed("c", "R1"));
        let problem = compile(&ms, &config).unwrap();
        assert!(problem.is_feasible(&[0, 1, 0]));
        assert!(!problem.is_feasible(&[0, 0, 0]));
        assert!(!problem.is_feasible(&[1, 0, 1]));
        assert!(!problem.is_feasible(&[0, 1]));
    }
}
