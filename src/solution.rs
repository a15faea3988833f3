use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomError};
use crate::model::entity::{Id, Member};
use crate::model::group::{capacity_violations, Room};
use crate::validate::{validate_move, MoveRequest};

/// One applied manual move, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub member_id: Id,
    pub from_room_id: Option<Id>,
    pub to_room_id: Option<Id>,
    pub reason: Option<String>,
}

/// Flat row for CSV or printed rosters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub room_label: String,
    pub capacity: u32,
    pub member_id: Id,
    pub member_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    /// Every room, including empty ones, in template order.
    pub rooms: Vec<Room>,
    pub score: f64,
    pub hard_violations: Vec<String>,
    /// Reserved for a per-term breakdown; always empty for now.
    #[serde(default)]
    pub soft_scores: BTreeMap<String, f64>,
    pub runtime_ms: u64,
    #[serde(default)]
    pub moves: Vec<MoveRecord>,
}

impl Solution {
    pub fn from_json_str(s: &str) -> Result<Solution> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn room(&self, id: &str) -> Result<&Room> {
        self.rooms
            .iter()
            .find(|room| room.id == id)
            .ok_or_else(|| RoomError::UnknownRoom(id.to_string()))
    }

    pub fn room_of(&self, member_id: &str) -> Option<&Room> {
        self.rooms.iter().find(|room| room.contains(member_id))
    }

    /// Runs the move validator, takes over the new partition and records the
    /// move. Returns the violations caused by this move; `hard_violations`
    /// is refreshed to describe the whole partition.
    pub fn apply_move(&mut self, request: &MoveRequest) -> Vec<String> {
        let outcome = validate_move(&self.rooms, request);
        self.rooms = outcome.rooms;
        self.hard_violations = capacity_violations(&self.rooms);
        self.moves.push(MoveRecord {
            member_id: request.member_id.clone(),
            from_room_id: outcome.from_room_id,
            to_room_id: outcome.to_room_id,
            reason: request.reason.clone(),
        });
        outcome.violations
    }

    /// Members of `population` that sit in no room.
    pub fn staged<'a>(&self, population: &'a [Member]) -> Vec<&'a Member> {
        let placed: HashSet<&str> = self
            .rooms
            .iter()
            .flat_map(|room| room.members.iter().map(|m| m.id.as_str()))
            .collect();
        population
            .iter()
            .filter(|m| !placed.contains(m.id.as_str()))
            .collect()
    }

    pub fn export_rows(&self) -> Vec<ExportRow> {
        self.rooms
            .iter()
            .flat_map(|room| {
                room.members.iter().map(move |m| ExportRow {
                    room_label: room.label.clone(),
                    capacity: room.capacity,
                    member_id: m.id.clone(),
                    member_name: m.name.clone(),
                })
            })
            .collect()
    }
}
