// Team page roster table.
//
// Layout: a striped table inside `div.related.row`. The first body row is a
// column header and the last is a summary footer; every row in between is a
// player with cells [name + profile link, role link, gender].

use scraper::Html;
use serde::Serialize;
use tracing::debug;

use super::{
    child_elements, element_text, player_id_from_href, selector, trim_ends, ParseError,
    SkipReason, SkippedRow,
};
use crate::model::{Player, Roster};

const ROSTER_TABLE: &str = "div.related.row table.table-striped.table-hover > tbody";
const NAME_CELL: usize = 0;
const ROLE_CELL: usize = 1;
const GENDER_CELL: usize = 2;

/// Parsed team page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterPage {
    pub players: Roster,
    pub skipped: Vec<SkippedRow>,
}

/// Parse the roster table of a team page.
pub fn parse_roster(html: &str) -> Result<RosterPage, ParseError> {
    let document = Html::parse_document(html);
    let table_selector = selector(ROSTER_TABLE)?;
    let link_selector = selector("a")?;

    let body = document
        .select(&table_selector)
        .next()
        .ok_or(ParseError::MissingTable {
            selector: ROSTER_TABLE,
        })?;

    let rows = trim_ends(child_elements(body, "tr").collect(), 1, 1);
    let mut page = RosterPage::default();

    for (index, row) in rows.into_iter().enumerate() {
        let cells: Vec<_> = child_elements(row, "td").collect();
        let link = cells
            .get(NAME_CELL)
            .and_then(|cell| cell.select(&link_selector).next());
        let name = link.map(element_text).unwrap_or_default();

        let mut skip = |reason: SkipReason| {
            debug!(index, %name, %reason, "skipping roster row");
            page.skipped.push(SkippedRow {
                index,
                name: name.clone(),
                reason,
            });
        };

        if cells.len() <= GENDER_CELL {
            skip(SkipReason::MissingCells);
            continue;
        }
        let Some(href) = link.and_then(|a| a.value().attr("href")) else {
            skip(SkipReason::MissingLink);
            continue;
        };
        let id = match player_id_from_href(href) {
            Ok(id) => id,
            Err(reason) => {
                skip(reason);
                continue;
            }
        };

        let role_cell = cells[ROLE_CELL];
        let role = role_cell
            .select(&link_selector)
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(role_cell));

        let gender = element_text(cells[GENDER_CELL])
            .chars()
            .next()
            .map(String::from)
            .unwrap_or_default();

        page.players.insert(
            id.clone(),
            Player {
                id,
                name,
                role,
                gender,
            },
        );
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team_page(rows: &str) -> String {
        format!(
            r#"<html><body>
            <div class="related row">
              <table class="table table-striped table-hover">
                <tbody>
                  <tr><th>Name</th><th>Role</th><th>Gender</th></tr>
                  {rows}
                  <tr><td colspan="3">Total: 2</td></tr>
                </tbody>
              </table>
            </div>
            </body></html>"#
        )
    }

    #[test]
    fn parses_player_rows_between_header_and_footer() {
        let html = team_page(
            r##"
            <tr>
              <td><a href="/zuluru/people/view?person=101">Alice Smith</a></td>
              <td><a href="/zuluru/teams/roster_role">Captain</a></td>
              <td>Woman</td>
            </tr>
            <tr>
              <td><a href="/zuluru/people/view?person=102">Bob Jones</a></td>
              <td><a href="#">Substitute player</a></td>
              <td> Man </td>
            </tr>"##,
        );

        let page = parse_roster(&html).unwrap();
        assert!(page.skipped.is_empty());
        assert_eq!(page.players.len(), 2);

        let alice = &page.players["101"];
        assert_eq!(alice.id, "101");
        assert_eq!(alice.name, "Alice Smith");
        assert_eq!(alice.role, "Captain");
        assert_eq!(alice.gender, "W");

        let bob = &page.players["102"];
        assert_eq!(bob.role, "Substitute player");
        assert_eq!(bob.gender, "M");
        assert!(bob.is_substitute());
    }

    #[test]
    fn keys_always_match_player_ids() {
        let html = team_page(
            r#"
            <tr><td><a href="/p?person=7">G</a></td><td><a>Player</a></td><td>W</td></tr>
            <tr><td><a href="/p?person=8">H</a></td><td><a>Player</a></td><td>M</td></tr>"#,
        );
        let page = parse_roster(&html).unwrap();
        for (key, player) in &page.players {
            assert_eq!(key, &player.id);
        }
    }

    #[test]
    fn rows_without_usable_links_are_skipped_and_recorded() {
        let html = team_page(
            r#"
            <tr><td>No Link</td><td><a>Player</a></td><td>W</td></tr>
            <tr><td><a href="/zuluru/people/view">No Id</a></td><td><a>Player</a></td><td>M</td></tr>
            <tr><td><a href="/zuluru/people/view?person=5">Kept</a></td><td><a>Player</a></td><td>M</td></tr>
            <tr><td><a href="/zuluru/people/view?person=6">Short</a></td></tr>"#,
        );

        let page = parse_roster(&html).unwrap();
        assert_eq!(page.players.len(), 1);
        assert!(page.players.contains_key("5"));

        let reasons: Vec<_> = page.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::MissingLink,
                SkipReason::MissingPlayerId,
                SkipReason::MissingCells
            ]
        );
        assert_eq!(page.skipped[1].name, "No Id");
        assert_eq!(page.skipped[2].index, 3);
    }

    #[test]
    fn role_without_link_falls_back_to_cell_text() {
        let html = team_page(
            r#"<tr><td><a href="?person=9">Dee</a></td><td>Player</td><td>W</td></tr>"#,
        );
        let page = parse_roster(&html).unwrap();
        assert_eq!(page.players["9"].role, "Player");
    }

    #[test]
    fn empty_gender_cell_gives_empty_gender() {
        let html = team_page(
            r#"<tr><td><a href="?person=9">Dee</a></td><td>Player</td><td></td></tr>"#,
        );
        let page = parse_roster(&html).unwrap();
        assert_eq!(page.players["9"].gender, "");
    }

    #[test]
    fn header_and_footer_only_is_empty() {
        let page = parse_roster(&team_page("")).unwrap();
        assert!(page.players.is_empty());
        assert!(page.skipped.is_empty());
    }

    #[test]
    fn missing_table_is_an_error() {
        let html = "<html><body><form id=\"user-login\"></form></body></html>";
        assert_eq!(
            parse_roster(html),
            Err(ParseError::MissingTable {
                selector: ROSTER_TABLE
            })
        );
    }

    #[test]
    fn parsing_is_idempotent() {
        let html = team_page(
            r#"<tr><td><a href="?person=1">A</a></td><td><a>Player</a></td><td>W</td></tr>"#,
        );
        assert_eq!(parse_roster(&html).unwrap(), parse_roster(&html).unwrap());
    }
}
