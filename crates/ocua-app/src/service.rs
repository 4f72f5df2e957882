// Weekly attendance reports on top of a `TeamSource`.
//
// A report needs both the roster and the attendance grid. They are fetched
// concurrently; the attendance list is cached for week listings even when
// the roster request fails.

use chrono::{NaiveDate, NaiveDateTime};
use ocua_core::{generate_report, Attendance, AttendanceReport, Roster};
use ocua_session::{ClientError, TeamSource};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::render::{render_report, Handles, WeekChoice};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to get attendance data: {0}")]
    Attendance(#[source] ClientError),

    #[error("failed to get team data: {0}")]
    Team(#[source] ClientError),

    #[error("no game found on {date}")]
    WeekNotFound { date: NaiveDate },
}

/// A generated report and the game it is for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyReport {
    pub gametime: NaiveDateTime,
    #[serde(flatten)]
    pub report: AttendanceReport,
}

pub struct AttendanceService<S> {
    source: S,
    team_id: String,
    handles: Handles,
    link: Option<String>,
    cache: RwLock<Vec<Attendance>>,
}

impl<S: TeamSource> AttendanceService<S> {
    pub fn new(source: S, team_id: impl Into<String>) -> Self {
        Self {
            source,
            team_id: team_id.into(),
            handles: Handles::new(),
            link: None,
            cache: RwLock::new(Vec::new()),
        }
    }

    pub fn with_handles(mut self, handles: Handles) -> Self {
        self.handles = handles;
        self
    }

    /// Link printed at the bottom of rendered reports.
    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }

    /// Report for the game played on `date`.
    pub async fn report_for(&self, date: NaiveDate) -> Result<WeeklyReport, ReportError> {
        let (team, attendance) = tokio::join!(
            self.source.get_team(&self.team_id),
            self.source.get_attendance(&self.team_id),
        );

        let attendance = attendance.map_err(|e| {
            error!(team = %self.team_id, error = %e, "failed to get attendance data");
            ReportError::Attendance(e)
        })?;
        *self.cache.write().await = attendance.clone();

        let team = team.map_err(|e| {
            error!(team = %self.team_id, error = %e, "failed to get team data");
            ReportError::Team(e)
        })?;

        let (week, gametime) = find_week(&attendance, date).ok_or_else(|| {
            error!(%date, "failed to find matching week");
            ReportError::WeekNotFound { date }
        })?;

        let report = generate_report(week, &team);
        info!(%date, open = report.open.len(), woman = report.woman.len(), "report generated");
        Ok(WeeklyReport { gametime, report })
    }

    pub fn render(&self, weekly: &WeeklyReport) -> String {
        render_report(
            &weekly.report,
            weekly.gametime,
            &self.handles,
            self.link.as_deref(),
        )
    }

    /// Reload the attendance grid into the cache. Returns the number of weeks.
    pub async fn refresh_weeks(&self) -> Result<usize, ReportError> {
        let attendance = self
            .source
            .get_attendance(&self.team_id)
            .await
            .map_err(ReportError::Attendance)?;
        let weeks = attendance.len();
        *self.cache.write().await = attendance;
        debug!(team = %self.team_id, weeks, "attendance cache refreshed");
        Ok(weeks)
    }

    /// Cached weeks whose game is at or after `now`, in page order.
    pub async fn upcoming_weeks(&self, now: NaiveDateTime) -> Vec<WeekChoice> {
        upcoming(&self.cache.read().await, now)
    }

    /// Date of the first cached game at or after `now`.
    pub async fn next_game(&self, now: NaiveDateTime) -> Option<NaiveDate> {
        self.cache
            .read()
            .await
            .iter()
            .filter_map(|week| week.gametime)
            .find(|t| *t >= now)
            .map(|t| t.date())
    }

    pub async fn roster(&self) -> Result<Roster, ReportError> {
        self.source
            .get_team(&self.team_id)
            .await
            .map_err(ReportError::Team)
    }
}

/// First week whose game falls on `date`.
pub fn find_week(weeks: &[Attendance], date: NaiveDate) -> Option<(&Attendance, NaiveDateTime)> {
    weeks.iter().find_map(|week| {
        week.gametime
            .filter(|t| t.date() == date)
            .map(|t| (week, t))
    })
}

fn upcoming(weeks: &[Attendance], now: NaiveDateTime) -> Vec<WeekChoice> {
    weeks
        .iter()
        .filter_map(|week| week.gametime)
        .filter(|t| *t >= now)
        .map(WeekChoice::for_gametime)
        .collect()
}
