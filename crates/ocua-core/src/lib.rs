// Roster and attendance data for a league team: typed records, the HTML
// parsers that produce them, and the weekly attendance report.

pub mod model;
pub mod parse;
pub mod report;

pub use model::{
    Attendance, AttendanceReport, AttendanceStatus, Player, Roster, SUBSTITUTE_ROLE, WOMAN_GENDER,
};
pub use parse::{parse_attendance, parse_roster, AttendancePage, ParseError, RosterPage};
pub use report::generate_report;
