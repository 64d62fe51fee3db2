//! Access tiers used across the store and command handlers.
//!
//! Levels are plain integers so new tiers can be slotted between existing ones
//! without renumbering. Higher values imply a superset of lower capabilities.

pub const GUEST: i32 = 0;
pub const REGISTERED: i32 = 1;
pub const MODERATOR: i32 = 10;
pub const ADMIN: i32 = 100;
pub const OWNER: i32 = 1000;

/// Known tiers in ascending order of privilege.
pub const RANKS: &[(&str, i32)] = &[
    ("GUEST", GUEST),
    ("REGISTERED", REGISTERED),
    ("MODERATOR", MODERATOR),
    ("ADMIN", ADMIN),
    ("OWNER", OWNER),
];

/// Look up a tier threshold by its name, ignoring case.
pub fn level_by_name(name: &str) -> Option<i32> {
    RANKS
        .iter()
        .find(|(rank, _)| rank.eq_ignore_ascii_case(name.trim()))
        .map(|(_, level)| *level)
}

/// Return the name of the highest tier whose threshold does not exceed `level`.
///
/// Anything below `GUEST` is reported as `GUEST`.
pub fn rank_name(level: i32) -> &'static str {
    RANKS
        .iter()
        .rev()
        .find(|(_, threshold)| level >= *threshold)
        .map(|(rank, _)| *rank)
        .unwrap_or("GUEST")
}

/// Parse either a rank name (`admin`) or a raw number (`250`).
pub fn parse_level(input: &str) -> Option<i32> {
    input
        .trim()
        .parse::<i32>()
        .ok()
        .or_else(|| level_by_name(input))
}
