// Attendance report classification.

use crate::model::{Attendance, AttendanceReport, AttendanceStatus, Player, Roster};

/// Bucket one week's statuses against the roster.
///
/// Players missing from the roster are dropped. Combinations that need no
/// follow-up (absent, available, a substitute who has not been invited,
/// unreadable cells) appear in no bucket. Each bucket is sorted by name, then
/// by id.
pub fn generate_report(week: &Attendance, roster: &Roster) -> AttendanceReport {
    let mut report = AttendanceReport::default();

    for (player_id, status) in &week.players {
        let Some(player) = roster.get(player_id) else {
            continue;
        };

        let bucket = match status {
            AttendanceStatus::Attending if player.is_woman() => &mut report.woman,
            AttendanceStatus::Attending => &mut report.open,
            AttendanceStatus::Unknown if !player.is_substitute() => &mut report.unknown,
            AttendanceStatus::Invited if player.is_substitute() => &mut report.invited,
            _ => continue,
        };
        bucket.push(player.clone());
    }

    for bucket in [
        &mut report.open,
        &mut report.woman,
        &mut report.unknown,
        &mut report.invited,
    ] {
        sort_players(bucket);
    }

    report
}

fn sort_players(players: &mut [Player]) {
    players.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
}
