// HTML extraction for the team roster page and the attendance grid.
//
// Both pages are rendered by the league site; the parsers only rely on the
// table shapes documented in `roster` and `attendance`. A whole parse fails
// only when the expected table is missing. Anything wrong with a single row
// or column is recorded in the page's diagnostics and parsing continues.

pub mod attendance;
pub mod roster;

pub use attendance::{parse_attendance, AttendancePage};
pub use roster::{parse_roster, RosterPage};

use scraper::{ElementRef, Selector};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Query parameter on profile links that carries the person id.
pub const PERSON_PARAM: &str = "person";

// ---------------------------------------------------------------------------
// Error / diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The page does not contain the table the parser reads from. This is
    /// what a login or error page served in place of a data page looks like.
    #[error("expected table not found (selector `{selector}`)")]
    MissingTable { selector: &'static str },

    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector {
        selector: &'static str,
        message: String,
    },
}

/// Why a body row contributed nothing to the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The name cell has no profile link.
    MissingLink,
    /// The profile link is not a valid URL.
    InvalidLink,
    /// The profile link has no (or an empty) `person` parameter.
    MissingPlayerId,
    /// The row has fewer cells than the layout requires.
    MissingCells,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MissingLink => "missing profile link",
            SkipReason::InvalidLink => "invalid profile link",
            SkipReason::MissingPlayerId => "profile link has no person id",
            SkipReason::MissingCells => "row has too few cells",
        };
        f.write_str(s)
    }
}

/// A body row that was dropped from the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    /// Zero-based position among the body rows that were examined.
    pub index: usize,
    /// Display name found in the row, if any.
    pub name: String,
    pub reason: SkipReason,
}

// ---------------------------------------------------------------------------
// Helpers shared by both parsers
// ---------------------------------------------------------------------------

pub(crate) fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::InvalidSelector {
        selector: css,
        message: format!("{e:?}"),
    })
}

/// Direct child elements of `parent` with the given tag name.
pub(crate) fn child_elements<'a>(
    parent: ElementRef<'a>,
    tag: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

/// All text under `el`, whitespace runs collapsed and trimmed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// Drop `skip_front` items from the front and `skip_back` from the back.
/// Returns an empty vector when there are not enough items.
pub(crate) fn trim_ends<T>(mut items: Vec<T>, skip_front: usize, skip_back: usize) -> Vec<T> {
    if items.len() < skip_front + skip_back {
        return Vec::new();
    }
    items.truncate(items.len() - skip_back);
    items.drain(..skip_front);
    items
}

/// Pull the person id out of a profile link such as
/// `/zuluru/people/view?person=1234`. Relative links are resolved against a
/// placeholder origin; only the query string matters.
pub fn player_id_from_href(href: &str) -> Result<String, SkipReason> {
    let base = Url::parse("http://localhost/").map_err(|_| SkipReason::InvalidLink)?;
    let url = base.join(href.trim()).map_err(|_| SkipReason::InvalidLink)?;

    url.query_pairs()
        .find(|(key, _)| key == PERSON_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
        .ok_or(SkipReason::MissingPlayerId)
}

pub(crate) fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_from_relative_link() {
        assert_eq!(
            player_id_from_href("/zuluru/people/view?person=1234"),
            Ok("1234".to_string())
        );
    }

    #[test]
    fn player_id_from_absolute_link_with_other_params() {
        assert_eq!(
            player_id_from_href("https://www.ocua.ca/zuluru/people/view?tab=1&person=77"),
            Ok("77".to_string())
        );
    }

    #[test]
    fn player_id_missing_param() {
        assert_eq!(
            player_id_from_href("/zuluru/people/view?team=9"),
            Err(SkipReason::MissingPlayerId)
        );
        assert_eq!(
            player_id_from_href("/zuluru/people/view?person="),
            Err(SkipReason::MissingPlayerId)
        );
    }

    #[test]
    fn player_id_invalid_link() {
        assert_eq!(
            player_id_from_href("http://[::1"),
            Err(SkipReason::InvalidLink)
        );
    }

    #[test]
    fn trim_ends_handles_short_input() {
        assert_eq!(trim_ends(vec![1, 2, 3, 4, 5], 1, 2), vec![2, 3]);
        assert_eq!(trim_ends(vec![1, 2, 3], 1, 2), Vec::<i32>::new());
        assert_eq!(trim_ends(vec![1, 2], 1, 2), Vec::<i32>::new());
    }

    #[test]
    fn normalize_ws_collapses_runs() {
        assert_eq!(normalize_ws("  May 20,\n 2024   6:45PM "), "May 20, 2024 6:45PM");
    }
}
