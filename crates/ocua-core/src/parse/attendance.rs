// Team attendance grid.
//
// Layout: the first table inside `div.teams.attendance`. Header cells are
// [row label, one date per game..., two utility columns]. Each body row is
// [player name + profile link, one status cell per game..., two utility
// cells]. A status cell holds an `<img>` whose title reads
// "Current attendance: Attending" and so on. The roster section ends at the
// first row with an empty name cell; rows below it are never read.

use chrono::{NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::debug;

use super::{
    child_elements, element_text, normalize_ws, player_id_from_href, selector, trim_ends,
    ParseError, SkipReason, SkippedRow,
};
use crate::model::{Attendance, AttendanceStatus};

const ATTENDANCE_TABLE: &str = "div.teams.attendance table";
const HEADER_CELLS: &str = "thead > tr > th";
const BODY_ROWS: &str = "tbody > tr";

/// Leading non-game columns (the player name column).
const LEADING_COLUMNS: usize = 1;
/// Trailing non-game columns.
const TRAILING_COLUMNS: usize = 2;

/// Accepted header formats, tried in order.
const GAMETIME_FORMATS: &[&str] = &["%b %d, %Y %I:%M%p"];
const GAMEDATE_FORMATS: &[&str] = &["%b %d, %Y"];

const STATUS_PREFIX: &str = "current attendance: ";

/// A game column whose header could not be read as a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidColumn {
    /// Zero-based game column index (the name column is not counted).
    pub index: usize,
    pub header: String,
}

/// Parsed attendance grid, one [`Attendance`] per game column in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendancePage {
    pub weeks: Vec<Attendance>,
    pub skipped: Vec<SkippedRow>,
    pub invalid_columns: Vec<InvalidColumn>,
}

struct GridRow {
    player_id: String,
    statuses: Vec<AttendanceStatus>,
}

/// Parse the attendance grid page.
pub fn parse_attendance(html: &str) -> Result<AttendancePage, ParseError> {
    let document = Html::parse_document(html);
    let table_selector = selector(ATTENDANCE_TABLE)?;

    let table = document
        .select(&table_selector)
        .next()
        .ok_or(ParseError::MissingTable {
            selector: ATTENDANCE_TABLE,
        })?;

    let mut page = AttendancePage::default();
    let columns = parse_headers(table, &mut page.invalid_columns)?;
    let rows = parse_body(table, &mut page.skipped)?;

    page.weeks = columns
        .into_iter()
        .enumerate()
        .map(|(col, gametime)| Attendance {
            gametime,
            players: rows
                .iter()
                .map(|row| {
                    let status = row
                        .statuses
                        .get(col)
                        .copied()
                        .unwrap_or(AttendanceStatus::NotApplicable);
                    (row.player_id.clone(), status)
                })
                .collect(),
        })
        .collect();

    Ok(page)
}

/// Read a header cell as a kick-off time. Date-only headers map to midnight.
pub fn parse_gametime(text: &str) -> Option<NaiveDateTime> {
    let text = normalize_ws(text);

    GAMETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
        .or_else(|| {
            GAMEDATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Turn an `<img title>` value into a status: strip the "Current attendance: "
/// prefix (any case) and uppercase the rest.
pub fn parse_status_label(title: &str) -> AttendanceStatus {
    let title = title.trim();
    let rest = match title.get(..STATUS_PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(STATUS_PREFIX) => &title[STATUS_PREFIX.len()..],
        _ => title,
    };
    AttendanceStatus::from_label(&rest.trim().to_uppercase())
}

fn parse_headers(
    table: ElementRef<'_>,
    invalid: &mut Vec<InvalidColumn>,
) -> Result<Vec<Option<NaiveDateTime>>, ParseError> {
    let header_selector = selector(HEADER_CELLS)?;
    let headers = trim_ends(
        table.select(&header_selector).collect(),
        LEADING_COLUMNS,
        TRAILING_COLUMNS,
    );

    Ok(headers
        .into_iter()
        .enumerate()
        .map(|(index, th)| {
            let text = element_text(th);
            let gametime = parse_gametime(&text);
            if gametime.is_none() {
                debug!(index, header = %text, "unreadable attendance column header");
                invalid.push(InvalidColumn {
                    index,
                    header: text,
                });
            }
            gametime
        })
        .collect())
}

fn parse_body(
    table: ElementRef<'_>,
    skipped: &mut Vec<SkippedRow>,
) -> Result<Vec<GridRow>, ParseError> {
    let row_selector = selector(BODY_ROWS)?;
    let link_selector = selector("a")?;
    let marker_selector = selector("img")?;

    let mut rows = Vec::new();

    for (index, row) in table.select(&row_selector).enumerate() {
        let cells: Vec<_> = child_elements(row, "td").collect();
        let Some(&name_cell) = cells.first() else {
            break;
        };
        let name = element_text(name_cell);
        if name.is_empty() {
            break;
        }

        let player_id = name_cell
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or(SkipReason::MissingLink)
            .and_then(player_id_from_href);
        let player_id = match player_id {
            Ok(id) => id,
            Err(reason) => {
                debug!(index, %name, %reason, "skipping attendance row");
                skipped.push(SkippedRow {
                    index,
                    name,
                    reason,
                });
                continue;
            }
        };

        let statuses = trim_ends(cells, LEADING_COLUMNS, TRAILING_COLUMNS)
            .into_iter()
            .map(|cell| {
                cell.select(&marker_selector)
                    .next()
                    .and_then(|img| img.value().attr("title"))
                    .map(parse_status_label)
                    .unwrap_or(AttendanceStatus::NotApplicable)
            })
            .collect();

        rows.push(GridRow {
            player_id,
            statuses,
        });
    }

    Ok(rows)
}
