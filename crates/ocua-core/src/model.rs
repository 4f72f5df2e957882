// Domain records produced by the page parsers and consumed by the report
// generator.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Role label the site gives to players borrowed for a single game.
pub const SUBSTITUTE_ROLE: &str = "Substitute player";

/// Gender marker for players counted against the women's line.
pub const WOMAN_GENDER: &str = "W";

/// Roster keyed by [`Player::id`].
pub type Roster = HashMap<String, Player>;

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One registered member of a team, as listed on the team page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Site person id, taken from the `person` query parameter of the
    /// profile link. Joins roster rows to attendance rows.
    pub id: String,
    pub name: String,
    pub role: String,
    /// First character of the gender column (`"W"`, `"M"`, ...).
    pub gender: String,
}

impl Player {
    pub fn is_substitute(&self) -> bool {
        self.role == SUBSTITUTE_ROLE
    }

    pub fn is_woman(&self) -> bool {
        self.gender == WOMAN_GENDER
    }
}

// ---------------------------------------------------------------------------
// AttendanceStatus
// ---------------------------------------------------------------------------

/// Attendance marker shown in one cell of the attendance grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    #[serde(rename = "ABSENT")]
    Absent,
    #[serde(rename = "ATTENDING")]
    Attending,
    #[serde(rename = "AVAILABLE")]
    Available,
    #[serde(rename = "INVITED")]
    Invited,
    #[serde(rename = "UNKNOWN")]
    Unknown,
    /// The cell had no marker, or its label was not one of the above.
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Attending => "ATTENDING",
            AttendanceStatus::Available => "AVAILABLE",
            AttendanceStatus::Invited => "INVITED",
            AttendanceStatus::Unknown => "UNKNOWN",
            AttendanceStatus::NotApplicable => "N/A",
        }
    }

    /// Map a normalized (uppercase) label to a status. Anything outside the
    /// closed set becomes [`AttendanceStatus::NotApplicable`].
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(AttendanceStatus::NotApplicable)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized attendance status: {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABSENT" => Ok(AttendanceStatus::Absent),
            "ATTENDING" => Ok(AttendanceStatus::Attending),
            "AVAILABLE" => Ok(AttendanceStatus::Available),
            "INVITED" => Ok(AttendanceStatus::Invited),
            "UNKNOWN" => Ok(AttendanceStatus::Unknown),
            "N/A" => Ok(AttendanceStatus::NotApplicable),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Attendance / AttendanceReport
// ---------------------------------------------------------------------------

/// Every player's status for one scheduled game (one grid column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    /// Kick-off time in the league's local time. `None` when the column
    /// header could not be read as a date; the column is still returned so
    /// positions line up with the page.
    pub gametime: Option<NaiveDateTime>,
    pub players: HashMap<String, AttendanceStatus>,
}

impl Attendance {
    pub fn status_of(&self, player_id: &str) -> Option<AttendanceStatus> {
        self.players.get(player_id).copied()
    }
}

/// Actionable buckets for one game. Each list is sorted by player name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceReport {
    /// Attending, not on the women's line.
    pub open: Vec<Player>,
    /// Attending, on the women's line.
    pub woman: Vec<Player>,
    /// Regular roster members who have not answered.
    pub unknown: Vec<Player>,
    /// Substitutes who were asked and have not declined.
    pub invited: Vec<Player>,
}

impl AttendanceReport {
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
            && self.woman.is_empty()
            && self.unknown.is_empty()
            && self.invited.is_empty()
    }
}
