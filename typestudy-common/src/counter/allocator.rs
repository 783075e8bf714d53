//! Sequential participant ID allocation
//!
//! Participant identifiers are `U` followed by a positive integer zero-padded
//! to three digits (`U001`, `U042`, `U1000`). New identifiers always take the
//! lowest free number so gaps left behind by abandoned folders get reused
//! before the sequence grows.

use std::collections::BTreeSet;

/// Prefix shared by every participant identifier
pub const ID_PREFIX: char = 'U';

/// Minimum number of digits after the prefix
pub const ID_WIDTH: usize = 3;

/// Format a participant number as `U###`
pub fn format_participant_id(number: u32) -> String {
    format!("{}{:0width$}", ID_PREFIX, number, width = ID_WIDTH)
}

/// Extract the numeric suffix of a participant identifier
///
/// Returns `None` for anything that is not `U` followed only by ASCII digits,
/// and for `U0`/`U000`, which is never issued.
pub fn parse_participant_id(id: &str) -> Option<u32> {
    let digits = id.strip_prefix(ID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Smallest positive integer not present in `issued`
///
/// Duplicates and zeros in the input are ignored.
pub fn first_missing_positive<I>(issued: I) -> u32
where
    I: IntoIterator<Item = u32>,
{
    let taken: BTreeSet<u32> = issued.into_iter().filter(|n| *n > 0).collect();

    let mut candidate = 1u32;
    for n in taken {
        if n == candidate {
            candidate += 1;
        } else if n > candidate {
            break;
        }
    }
    candidate
}

/// Allocate the next participant identifier from a set of existing names
///
/// Names that do not parse as participant identifiers are skipped, so a raw
/// Drive folder listing can be passed in directly.
pub fn next_participant_id<'a, I>(existing: I) -> (u32, String)
where
    I: IntoIterator<Item = &'a str>,
{
    let number = first_missing_positive(existing.into_iter().filter_map(parse_participant_id));
    (number, format_participant_id(number))
}
