//! Normalization of raw survey rows into [`Member`] records.
//!
//! Reading the file itself is left to the caller; a row is handed over as
//! header/cell pairs.

use std::collections::HashSet;

use itertools::Itertools;
use tracing::warn;

use crate::model::entity::{Attributes, Member};

pub const DEFAULT_MESSINESS: i64 = 3;

/// `"  alice  smith "` -> `"Alice Smith"`.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().map(capitalize).join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Trims a free-text answer and capitalizes every run of letters, so
/// `"late-night"` becomes `"Late-Night"`. Inner spacing is kept.
pub fn title_case(raw: &str) -> String {
    let mut after_letter = false;
    raw.trim()
        .chars()
        .flat_map(|c| {
            let cased: Vec<char> = if !c.is_alphabetic() {
                vec![c]
            } else if after_letter {
                c.to_lowercase().collect()
            } else {
                c.to_uppercase().collect()
            };
            after_letter = c.is_alphabetic();
            cased
        })
        .collect()
}

pub fn member_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Splits a list of names on `;`, `,` or newlines. Output is normalized and
/// deduplicated, keeping first occurrences in order.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split([';', ',', '\n'])
        .map(normalize_name)
        .filter(|name| !name.is_empty())
        .unique()
        .collect()
}

pub fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// One raw row as header/cell pairs.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new<K, V>(cells: impl IntoIterator<Item = (K, V)>) -> RawRow
    where
        K: Into<String>,
        V: Into<String>,
    {
        RawRow {
            cells: cells.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }
}

/// Which header holds which answer, resolved once per table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    pub name: Option<String>,
    pub year: Option<String>,
    pub requests: Option<String>,
    pub avoid: Option<String>,
    pub messiness: Option<String>,
    pub bother: Option<String>,
    pub sleep: Option<String>,
    pub temperature: Option<String>,
    pub room_use: Option<String>,
    pub enforce: Option<String>,
    pub ranks: Vec<(u32, String)>,
}

impl Columns {
    /// Case-insensitive substring match; the first candidate that hits any
    /// header wins, headers are scanned in their original order.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Columns {
        let lowered: Vec<(String, &str)> = headers
            .iter()
            .map(|h| (h.as_ref().trim().to_lowercase(), h.as_ref()))
            .collect();
        let pick = |candidates: &[&str]| -> Option<String> {
            candidates.iter().find_map(|cand| {
                lowered
                    .iter()
                    .find(|(low, _)| low.contains(cand))
                    .map(|(_, orig)| orig.to_string())
            })
        };

        let ranks: Vec<(u32, String)> = [
            (2, ["2p rank", "rank 2"]),
            (3, ["3p rank", "rank 3"]),
            (4, ["4p rank", "rank 4"]),
        ]
        .into_iter()
        .filter_map(|(size, candidates)| pick(&candidates).map(|col| (size, col)))
        .collect();

        Columns {
            name: pick(&["name"]),
            year: pick(&["year"]),
            requests: pick(&["roommate request", "roommate"]),
            avoid: pick(&["avoid", "dislike"]),
            messiness: pick(&["messiness"]),
            bother: pick(&["bother"]),
            sleep: pick(&["sleep"]),
            temperature: pick(&["temp"]),
            room_use: pick(&["room use", "use"]),
            enforce: pick(&["wants preference enforced", "enforce"]),
            ranks,
        }
    }
}

fn cell<'a>(row: &'a RawRow, column: &Option<String>) -> Option<&'a str> {
    column.as_deref().and_then(|c| row.get(c))
}

/// Builds a member from one row. A blank name yields `None`.
pub fn member_from_row(row: &RawRow, columns: &Columns) -> Option<Member> {
    let name_col = columns.name.as_deref().unwrap_or("Name");
    let name = normalize_name(row.get(name_col).unwrap_or(""));
    if name.is_empty() {
        return None;
    }

    let text = |column: &Option<String>| {
        column
            .as_ref()
            .map(|c| row.get(c).unwrap_or("").trim().to_string())
    };
    let titled = |column: &Option<String>| text(column).map(|v| title_case(&v));

    let attributes = Attributes {
        year: text(&columns.year),
        sleep: titled(&columns.sleep),
        temperature: titled(&columns.temperature),
        room_use: titled(&columns.room_use),
        messiness: columns.messiness.as_ref().map(|c| {
            row.get(c)
                .and_then(parse_int)
                .filter(|v| *v != 0)
                .unwrap_or(DEFAULT_MESSINESS)
        }),
        bother: text(&columns.bother),
        enforce: cell(row, &columns.enforce)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "yes" | "true" | "1"))
            .unwrap_or(false),
    };

    let ranked_room_sizes = columns
        .ranks
        .iter()
        .filter_map(|(size, col)| row.get(col).and_then(parse_int).map(|rank| (*size, rank)))
        .collect();

    Some(Member {
        id: member_id(&name),
        year: attributes.year.clone(),
        requested_with: cell(row, &columns.requests).map(split_names).unwrap_or_default(),
        avoid_with: cell(row, &columns.avoid).map(split_names).unwrap_or_default(),
        name,
        attributes,
        ranked_room_sizes,
    })
}

/// Normalizes a whole table. Rows with blank names are dropped, and so is any
/// row whose derived id was already taken by an earlier row.
pub fn ingest_rows(headers: &[String], rows: &[RawRow]) -> Vec<Member> {
    let columns = Columns::resolve(headers);
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| member_from_row(row, &columns))
        .filter(|member| {
            let fresh = seen.insert(member.id.clone());
            if !fresh {
                warn!(member = %member.id, "duplicate member id dropped");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_title_cased() {
        assert_eq!(normalize_name("  alice  smith "), "Alice Smith");
        assert_eq!(normalize_name("mcDONALD"), "Mcdonald");
        assert_eq!(normalize_name("   "), "");
    }

    #[test]
    fn answers_capitalize_after_every_non_letter() {
        assert_eq!(title_case("late-night"), "Late-Night");
        assert_eq!(title_case(" EARLY bird "), "Early Bird");
        assert_eq!(title_case("warm  room"), "Warm  Room");
        assert_eq!(title_case("9am/quiet"), "9Am/Quiet");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn ids_keep_only_alphanumerics() {
        assert_eq!(member_id("Alice Smith"), "alicesmith");
        assert_eq!(member_id("Jean-Luc O'Neil 2"), "jeanluconeil2");
    }

    #[test]
    fn split_dedupes_in_order() {
        assert_eq!(
            split_names("Bob; Carol\n dave, bob;;"),
            vec!["Bob", "Carol", "Dave"]
        );
        assert!(split_names("").is_empty());
    }

    #[test]
    fn columns_resolve_by_substring() {
        let headers = [
            "Full Name",
            "Roommate Requests",
            "Avoid",
            "Messiness Rating",
            "Sleep Schedule",
            "Temperature Preference",
            "2p Rank",
        ];
        let columns = Columns::resolve(&headers);
        assert_eq!(columns.name.as_deref(), Some("Full Name"));
        assert_eq!(columns.requests.as_deref(), Some("Roommate Requests"));
        assert_eq!(columns.temperature.as_deref(), Some("Temperature Preference"));
        assert_eq!(columns.ranks, vec![(2, "2p Rank".to_string())]);
        assert_eq!(columns.year, None);
    }

    #[test]
    fn row_becomes_member() {
        let headers = vec![
            "Name".to_string(),
            "Year".to_string(),
            "Roommate Requests".to_string(),
            "Avoid".to_string(),
            "Messiness Rating".to_string(),
            "Sleep Schedule".to_string(),
            "2p Rank".to_string(),
            "3p Rank".to_string(),
        ];
        let row = RawRow::new([
            ("Name", "  alice  smith "),
            ("Year", "SR"),
            ("Roommate Requests", "Bob; Carol\n dave"),
            ("Avoid", "Eve"),
            ("Messiness Rating", "4"),
            ("Sleep Schedule", "late"),
            ("2p Rank", "1"),
            ("3p Rank", " 2 "),
        ]);
        let members = ingest_rows(&headers, &[row]);
        assert_eq!(members.len(), 1);
        let m = &members[0];
        assert_eq!(m.id, "alicesmith");
        assert_eq!(m.name, "Alice Smith");
        assert_eq!(m.year.as_deref(), Some("SR"));
        assert_eq!(m.requested_with, vec!["Bob", "Carol", "Dave"]);
        assert_eq!(m.avoid_with, vec!["Eve"]);
        assert_eq!(m.attributes.messiness, Some(4));
        assert_eq!(m.attributes.sleep.as_deref(), Some("Late"));
        assert_eq!(m.size_rank(2), Some(1));
        assert_eq!(m.size_rank(3), Some(2));
    }

    #[test]
    fn blank_names_and_duplicates_are_dropped() {
        let headers = vec!["Name".to_string(), "Messiness".to_string()];
        let rows = [
            RawRow::new([("Name", "Bob"), ("Messiness", "n/a")]),
            RawRow::new([("Name", "  "), ("Messiness", "2")]),
            RawRow::new([("Name", "BOB"), ("Messiness", "5")]),
        ];
        let members = ingest_rows(&headers, &rows);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].attributes.messiness, Some(DEFAULT_MESSINESS));
    }
}
