// Plain-text rendering of attendance reports and week choices.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use ocua_core::{AttendanceReport, Player};
use serde::Serialize;

/// Player ID -> notification handle (e.g. a chat mention).
pub type Handles = HashMap<String, String>;

/// One selectable week: a short label and the `YYYY-MM-DD` value that
/// `report --week` accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekChoice {
    pub label: String,
    pub value: String,
}

impl WeekChoice {
    pub fn for_gametime(gametime: NaiveDateTime) -> Self {
        Self {
            label: gametime.format("%b %-d").to_string(),
            value: gametime.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Render a report as the message posted to the team.
///
/// Sections are separated by blank lines; the unknown and invited sections
/// are left out when empty, and the link line only appears when `link` is
/// set.
pub fn render_report(
    report: &AttendanceReport,
    gametime: NaiveDateTime,
    handles: &Handles,
    link: Option<&str>,
) -> String {
    let mut sections = vec![format!(
        "Current attendance for {}: {}O, {}W",
        gametime.format("%A %b %-d"),
        report.open.len(),
        report.woman.len()
    )];

    if !report.unknown.is_empty() {
        sections.push(format!(
            "Reminder to please update your attendance: {}",
            format_players(&report.unknown, handles)
        ));
    }

    if !report.invited.is_empty() {
        sections.push(format!(
            "The following subs have been invited: {}",
            format_players(&report.invited, handles)
        ));
    }

    if let Some(link) = link.filter(|l| !l.is_empty()) {
        sections.push(format!("[Click here to view game attendance on OCUA]({link})"));
    }

    sections.join("\n\n")
}

/// Comma-separated names in name order, using a player's handle when one is
/// configured.
pub fn format_players(players: &[Player], handles: &Handles) -> String {
    let mut sorted: Vec<&Player> = players.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    sorted
        .into_iter()
        .map(|p| match handles.get(&p.id) {
            Some(handle) if !handle.is_empty() => handle.as_str(),
            _ => p.name.as_str(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
