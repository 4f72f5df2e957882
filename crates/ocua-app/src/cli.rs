// Command-line front end: argument parsing and command output.

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use ocua_core::Player;
use ocua_session::TeamSource;

use crate::service::AttendanceService;

#[derive(Debug, Parser)]
#[command(name = "ocua", version, about = "Weekly attendance reports for an OCUA team")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Attendance report for one game
    Report {
        /// Game date (YYYY-MM-DD); defaults to the next upcoming game
        #[arg(long)]
        week: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// List upcoming game weeks
    Weeks {
        #[arg(long)]
        json: bool,
    },
    /// Print the team roster
    Roster {
        #[arg(long)]
        json: bool,
    },
}

/// Run `command` against `service` and return what should be printed.
/// `now` is the local wall-clock time used to pick upcoming games.
pub async fn execute<S: TeamSource>(
    command: &Command,
    service: &AttendanceService<S>,
    now: NaiveDateTime,
) -> anyhow::Result<String> {
    match command {
        Command::Report { week, json } => {
            let date = match week {
                Some(date) => *date,
                None => {
                    service.refresh_weeks().await?;
                    service
                        .next_game(now)
                        .await
                        .context("no upcoming games on the attendance page")?
                }
            };
            let weekly = service.report_for(date).await?;
            if *json {
                Ok(serde_json::to_string_pretty(&weekly)?)
            } else {
                Ok(service.render(&weekly))
            }
        }
        Command::Weeks { json } => {
            service.refresh_weeks().await?;
            let weeks = service.upcoming_weeks(now).await;
            if *json {
                Ok(serde_json::to_string_pretty(&weeks)?)
            } else {
                Ok(weeks
                    .iter()
                    .map(|w| format!("{:<8} {}", w.label, w.value))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
        Command::Roster { json } => {
            let mut players: Vec<Player> = service.roster().await?.into_values().collect();
            players.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            if *json {
                Ok(serde_json::to_string_pretty(&players)?)
            } else {
                Ok(players
                    .iter()
                    .map(|p| format!("{:<8} {:<24} {:<2} {}", p.id, p.name, p.gender, p.role))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
    }
}
