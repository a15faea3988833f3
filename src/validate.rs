//! Manual reassignment of a single member.
//!
//! Only the destination's capacity is checked, and an overfull room is
//! reported, not refused. Apart, together and fixed-room rules are not looked
//! at here.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::entity::{Id, Member};
use crate::model::group::Room;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub member_id: Id,
    /// Informational; the member is taken from wherever it is found.
    #[serde(default)]
    pub from_room_id: Option<Id>,
    /// `None` sends the member to staging.
    #[serde(default)]
    pub to_room_id: Option<Id>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl MoveRequest {
    pub fn to_room(member_id: &str, room_id: &str) -> MoveRequest {
        MoveRequest {
            member_id: member_id.to_string(),
            to_room_id: Some(room_id.to_string()),
            ..MoveRequest::default()
        }
    }

    pub fn to_staging(member_id: &str) -> MoveRequest {
        MoveRequest {
            member_id: member_id.to_string(),
            ..MoveRequest::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveOutcome {
    pub rooms: Vec<Room>,
    pub violations: Vec<String>,
    /// Room the member was actually taken out of.
    pub from_room_id: Option<Id>,
    /// Room the member ended up in; `None` when staged.
    pub to_room_id: Option<Id>,
}

/// Applies `request` to a copy of `rooms`.
pub fn validate_move(rooms: &[Room], request: &MoveRequest) -> MoveOutcome {
    let mut rooms = rooms.to_vec();
    let mut member: Option<Member> = None;
    let mut from_room_id = None;

    for room in rooms.iter_mut() {
        if let Some(pos) = room.members.iter().position(|m| m.id == request.member_id) {
            let removed = room.members.remove(pos);
            if from_room_id.is_none() {
                from_room_id = Some(room.id.clone());
                member = Some(removed);
            }
        }
    }
    let member = member.unwrap_or_else(|| {
        debug!(member = %request.member_id, "member not placed, using placeholder");
        Member::placeholder(&request.member_id)
    });

    let mut violations = Vec::new();
    let mut to_room_id = None;
    if let Some(target) = request.to_room_id.as_deref() {
        match rooms.iter_mut().find(|room| room.id == target) {
            Some(room) => {
                room.members.push(member);
                if room.is_over_capacity() {
                    violations.push(room.capacity_violation());
                }
                to_room_id = Some(room.id.clone());
            }
            None => {
                warn!(
                    member = %request.member_id,
                    room = %target,
                    "unknown destination, member staged"
                );
            }
        }
    }

    debug!(
        member = %request.member_id,
        from = ?from_room_id,
        to = ?to_room_id,
        violations = violations.len(),
        "move applied"
    );
    MoveOutcome { rooms, violations, from_room_id, to_room_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::group::RoomTemplate;

    fn rooms() -> Vec<Room> {
        let mut a = Room::from_template(&RoomTemplate::new("A", "Alpha", 2));
        let mut b = Room::from_template(&RoomTemplate::new("B", "Beta", 1));
        a.members.push(Member::new("x", "X"));
        a.members.push(Member::new("y", "Y"));
        b.members.push(Member::new("z", "Z"));
        vec![a, b, Room::from_template(&RoomTemplate::new("C", "Gamma", 1))]
    }

    fn ids(room: &Room) -> Vec<&str> {
        room.members.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn move_touches_only_source_and_destination() {
        let before = rooms();
        let outcome = validate_move(&before, &MoveRequest::to_room("x", "C"));
        assert_eq!(ids(&outcome.rooms[0]), vec!["y"]);
        assert_eq!(outcome.rooms[1], before[1]);
        assert_eq!(ids(&outcome.rooms[2]), vec!["x"]);
        assert!(outcome.violations.is_empty());
        assert_eq!(outcome.from_room_id.as_deref(), Some("A"));
        assert_eq!(outcome.to_room_id.as_deref(), Some("C"));
        // the original member record travels with the move
        assert_eq!(outcome.rooms[2].members[0].name, "X");
    }

    #[test]
    fn overfull_destination_is_reported_not_refused() {
        let outcome = validate_move(&rooms(), &MoveRequest::to_room("x", "B"));
        assert_eq!(ids(&outcome.rooms[1]), vec!["z", "x"]);
        assert_eq!(outcome.violations, vec!["Room Beta (B) over capacity: 2/1".to_string()]);
    }

    #[test]
    fn no_destination_stages_the_member() {
        let outcome = validate_move(&rooms(), &MoveRequest::to_staging("z"));
        assert!(outcome.rooms.iter().all(|room| !room.contains("z")));
        assert!(outcome.violations.is_empty());
        assert_eq!(outcome.to_room_id, None);
    }

    #[test]
    fn unknown_member_gets_a_placeholder() {
        let outcome = validate_move(&rooms(), &MoveRequest::to_room("newbie", "C"));
        assert_eq!(outcome.rooms[2].members, vec![Member::placeholder("newbie")]);
        assert_eq!(outcome.from_room_id, None);
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn unknown_destination_leaves_member_staged() {
        let outcome = validate_move(&rooms(), &MoveRequest::to_room("y", "Q"));
        assert!(outcome.rooms.iter().all(|room| !room.contains("y")));
        assert_eq!(outcome.to_room_id, None);
    }

    #[test]
    fn request_parses_from_json() {
        let json = r#"{"memberId": "x", "toRoomId": null, "reason": "swap"}"#;
        let request: MoveRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request, MoveRequest::to_staging("x").with_reason("swap"));
    }
}
