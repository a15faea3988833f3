pub mod entity {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    pub type Id = String;

    /// Survey answers that feed the affinity builder. `bother` and `enforce`
    /// are carried through from ingestion but not scored.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Attributes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub year: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub sleep: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub temperature: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub room_use: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub messiness: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub bother: Option<String>,
        #[serde(default)]
        pub enforce: bool,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Member {
        pub id: Id,
        pub name: String,
        #[serde(default)]
        pub year: Option<String>,
        #[serde(default)]
        pub attributes: Attributes,
        /// Room capacity -> rank, 1 being the favourite size.
        #[serde(default)]
        pub ranked_room_sizes: BTreeMap<u32, i64>,
        #[serde(default)]
        pub requested_with: Vec<String>,
        #[serde(default)]
        pub avoid_with: Vec<String>,
    }

    impl Member {
        pub fn new(id: impl Into<Id>, name: impl Into<String>) -> Member {
            Member {
                id: id.into(),
                name: name.into(),
                ..Member::default()
            }
        }

        /// Stand-in record for an id that is not present in any room.
        pub fn placeholder(id: &str) -> Member {
            Member::new(id, id)
        }

        pub fn size_rank(&self, capacity: u32) -> Option<i64> {
            self.ranked_room_sizes.get(&capacity).copied()
        }
    }
}


pub mod group {
    use serde::{Deserialize, Serialize};

    use super::entity::{Id, Member};

    fn default_true() -> bool {
        true
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RoomTemplate {
        pub id: Id,
        #[serde(default)]
        pub label: String,
        #[serde(default)]
        pub capacity: u32,
        /// Accepted for compatibility; the run-wide flag on the constraint
        /// config is what the engine honours.
        #[serde(default = "default_true")]
        pub allow_empty_beds: bool,
    }

    impl RoomTemplate {
        pub fn new(id: impl Into<Id>, label: impl Into<String>, capacity: u32) -> RoomTemplate {
            RoomTemplate {
                id: id.into(),
                label: label.into(),
                capacity,
                allow_empty_beds: true,
            }
        }
    }

    /// A room together with the members currently placed in it.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Room {
        pub id: Id,
        pub label: String,
        pub capacity: u32,
        #[serde(default)]
        pub members: Vec<Member>,
    }

    impl Room {
        pub fn from_template(template: &RoomTemplate) -> Room {
            Room {
                id: template.id.clone(),
                label: template.label.clone(),
                capacity: template.capacity,
                members: Vec::new(),
            }
        }

        pub fn occupancy(&self) -> usize {
            self.members.len()
        }

        pub fn is_over_capacity(&self) -> bool {
            self.members.len() > self.capacity as usize
        }

        pub fn contains(&self, member_id: &str) -> bool {
            self.members.iter().any(|m| m.id == member_id)
        }

        pub fn capacity_violation(&self) -> String {
            format!(
                "Room {} ({}) over capacity: {}/{}",
                self.label,
                self.id,
                self.members.len(),
                self.capacity
            )
        }
    }

    /// One violation string per room holding more members than beds.
    pub fn capacity_violations(rooms: &[Room]) -> Vec<String> {
        rooms
            .iter()
            .filter(|room| room.is_over_capacity())
            .map(Room::capacity_violation)
            .collect()
    }
}

pub mod condition {
    use std::collections::{BTreeMap, HashSet};

    use serde::{Deserialize, Serialize};

    use super::entity::{Id, Member};
    use super::group::RoomTemplate;
    use crate::error::{Result, RoomError};

    pub type Score = f64;

    /// Directed pairwise scores. A missing entry reads as 0.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AffinityMatrix {
        pub scores: BTreeMap<Id, BTreeMap<Id, Score>>,
    }

    impl AffinityMatrix {
        pub fn new() -> AffinityMatrix {
            AffinityMatrix::default()
        }

        pub fn get(&self, from: &str, to: &str) -> Score {
            self.scores
                .get(from)
                .and_then(|row| row.get(to))
                .copied()
                .unwrap_or(0.0)
        }

        pub fn set(&mut self, from: &str, to: &str, score: Score) {
            self.scores
                .entry(from.to_string())
                .or_default()
                .insert(to.to_string(), score);
        }

        /// Combined weight of the unordered pair: both directed entries summed.
        pub fn get_pair(&self, ids: [&str; 2]) -> Score {
            self.get(ids[0], ids[1]) + self.get(ids[1], ids[0])
        }

        pub fn len(&self) -> usize {
            self.scores.values().map(BTreeMap::len).sum()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HardConstraints {
        #[serde(default)]
        pub mutual_dislike_pairs: Vec<Vec<Id>>,
        /// Reserved; accepted but not enforced.
        #[serde(default)]
        pub max_per_room: BTreeMap<Id, u32>,
        #[serde(default)]
        pub must_together_pairs: Vec<Vec<Id>>,
        #[serde(default)]
        pub must_apart_pairs: Vec<Vec<Id>>,
        #[serde(default)]
        pub fixed_room_assignments: BTreeMap<Id, Id>,
    }

    fn pairs(list: &[Vec<Id>]) -> impl Iterator<Item = (&str, &str)> {
        list.iter()
            .filter(|pair| pair.len() == 2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }

    impl HardConstraints {
        /// Pairs that may not share a room, from both the must-apart and the
        /// mutual-dislike lists. Entries that are not exactly a pair are skipped.
        pub fn apart_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
            pairs(&self.must_apart_pairs).chain(pairs(&self.mutual_dislike_pairs))
        }

        pub fn together_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
            pairs(&self.must_together_pairs)
        }

        pub fn apart(mut self, a: &str, b: &str) -> Self {
            self.must_apart_pairs.push(vec![a.to_string(), b.to_string()]);
            self
        }

        pub fn together(mut self, a: &str, b: &str) -> Self {
            self.must_together_pairs.push(vec![a.to_string(), b.to_string()]);
            self
        }

        pub fn fixed(mut self, member: &str, room: &str) -> Self {
            self.fixed_room_assignments
                .insert(member.to_string(), room.to_string());
            self
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct SoftWeights {
        /// Room-size preference bonus.
        #[serde(default = "SoftWeights::default_alpha")]
        pub alpha: f64,
        /// Empty-bed penalty.
        #[serde(default = "SoftWeights::default_beta")]
        pub beta: f64,
        /// Reserved.
        #[serde(default = "SoftWeights::default_gamma")]
        pub gamma: f64,
    }

    impl SoftWeights {
        fn default_alpha() -> f64 {
            0.2
        }
        fn default_beta() -> f64 {
            0.1
        }
        fn default_gamma() -> f64 {
            0.1
        }

        pub fn zero() -> SoftWeights {
            SoftWeights { alpha: 0.0, beta: 0.0, gamma: 0.0 }
        }
    }

    impl Default for SoftWeights {
        fn default() -> Self {
            SoftWeights {
                alpha: Self::default_alpha(),
                beta: Self::default_beta(),
                gamma: Self::default_gamma(),
            }
        }
    }

    fn default_true() -> bool {
        true
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ConstraintConfig {
        #[serde(default)]
        pub rooms: Vec<RoomTemplate>,
        #[serde(default = "default_true")]
        pub allow_empty_beds: bool,
        /// Upper bound on unfilled beds summed over all rooms.
        #[serde(default)]
        pub empty_bed_budget: Option<u32>,
        #[serde(default)]
        pub hard: HardConstraints,
        #[serde(default, alias = "weights")]
        pub soft: SoftWeights,
        #[serde(default, rename = "pairwiseW")]
        pub pairwise_w: Option<AffinityMatrix>,
    }

    impl Default for ConstraintConfig {
        fn default() -> Self {
            ConstraintConfig {
                rooms: Vec::new(),
                allow_empty_beds: true,
                empty_bed_budget: None,
                hard: HardConstraints::default(),
                soft: SoftWeights::default(),
                pairwise_w: None,
            }
        }
    }

    impl ConstraintConfig {
        pub fn new(rooms: Vec<RoomTemplate>) -> ConstraintConfig {
            ConstraintConfig {
                rooms,
                ..ConstraintConfig::default()
            }
        }

        pub fn from_json_str(s: &str) -> Result<ConstraintConfig> {
            Ok(serde_json::from_str(s)?)
        }

        pub fn to_json_string(&self) -> Result<String> {
            Ok(serde_json::to_string(self)?)
        }

        pub fn with_hard(mut self, hard: HardConstraints) -> Self {
            self.hard = hard;
            self
        }

        pub fn with_soft(mut self, soft: SoftWeights) -> Self {
            self.soft = soft;
            self
        }

        pub fn with_empty_beds(mut self, allow: bool, budget: Option<u32>) -> Self {
            self.allow_empty_beds = allow;
            self.empty_bed_budget = budget;
            self
        }

        pub fn with_affinity(mut self, affinity: AffinityMatrix) -> Self {
            self.pairwise_w = Some(affinity);
            self
        }

        pub fn room(&self, id: &str) -> Result<&RoomTemplate> {
            self.rooms
                .iter()
                .find(|room| room.id == id)
                .ok_or_else(|| RoomError::UnknownRoom(id.to_string()))
        }

        pub fn total_capacity(&self) -> u64 {
            self.rooms.iter().map(|room| room.capacity as u64).sum()
        }

        /// Lists everything the optimizer will skip or cannot honour in this
        /// configuration. The optimizer itself stays lenient; this is for
        /// callers who want to surface the problems.
        pub fn diagnose(&self, members: &[Member]) -> Vec<RoomError> {
            let member_ids: HashSet<&str> = members.iter().map(|m| m.id.as_str()).collect();
            let mut room_ids = HashSet::new();
            let mut problems = Vec::new();

            for room in &self.rooms {
                if !room_ids.insert(room.id.as_str()) {
                    problems.push(RoomError::Config(format!("duplicate room id {}", room.id)));
                }
            }

            let lists = [
                ("mustApartPairs", &self.hard.must_apart_pairs),
                ("mutualDislikePairs", &self.hard.mutual_dislike_pairs),
                ("mustTogetherPairs", &self.hard.must_together_pairs),
            ];
            for (key, list) in lists {
                for pair in list.iter() {
                    if pair.len() != 2 {
                        problems.push(RoomError::Config(format!(
                            "{key} entry {pair:?} is not a pair"
                        )));
                        continue;
                    }
                    for id in pair {
                        if !member_ids.contains(id.as_str()) {
                            problems.push(RoomError::UnknownMember(id.clone()));
                        }
                    }
                }
            }

            for (member, room) in &self.hard.fixed_room_assignments {
                if !member_ids.contains(member.as_str()) {
                    problems.push(RoomError::UnknownMember(member.clone()));
                }
                if !room_ids.contains(room.as_str()) {
                    problems.push(RoomError::UnknownRoom(room.clone()));
                }
            }
            problems
        }
    }
}
