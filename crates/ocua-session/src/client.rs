// Shared, session-aware access to the team pages.
//
// Page reads hold the read side of a single RwLock over the browsing
// context, so any number of them run at once. Cookie rotation takes the
// write side and swaps the whole cookie set before releasing it, so a read
// sees either the old session or the new one, never a mix.

use std::sync::Arc;

use async_trait::async_trait;
use ocua_core::parse::{parse_attendance, parse_roster, AttendancePage, ParseError, RosterPage};
use ocua_core::{Attendance, Roster};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};
use url::form_urlencoded;

use crate::fetcher::{BrowsingContext, Cookie, FetchError};

pub const TEAM_PATH: &str = "/zuluru/teams/view";
pub const ATTENDANCE_PATH: &str = "/zuluru/teams/attendance";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },
}

/// The two queries the report front-end needs.
#[async_trait]
pub trait TeamSource: Send + Sync {
    async fn get_team(&self, team_id: &str) -> Result<Roster, ClientError>;

    async fn get_attendance(&self, team_id: &str) -> Result<Vec<Attendance>, ClientError>;
}

#[async_trait]
impl<T: TeamSource + ?Sized> TeamSource for Arc<T> {
    async fn get_team(&self, team_id: &str) -> Result<Roster, ClientError> {
        (**self).get_team(team_id).await
    }

    async fn get_attendance(&self, team_id: &str) -> Result<Vec<Attendance>, ClientError> {
        (**self).get_attendance(team_id).await
    }
}

pub struct Client<C> {
    context: RwLock<C>,
}

impl<C: BrowsingContext> Client<C> {
    pub fn new(context: C) -> Self {
        Self {
            context: RwLock::new(context),
        }
    }

    /// Fetch and parse the team page, including skipped-row diagnostics.
    pub async fn team_page(&self, team_id: &str) -> Result<RosterPage, ClientError> {
        let path = team_path(team_id);
        let markup = self.fetch(&path).await?;

        let page = parse_roster(&markup).map_err(|source| ClientError::Parse {
            path: path.clone(),
            source,
        })?;
        if !page.skipped.is_empty() {
            debug!(%path, skipped = page.skipped.len(), "roster rows skipped");
        }
        Ok(page)
    }

    /// Fetch and parse the attendance grid, including diagnostics.
    pub async fn attendance_page(&self, team_id: &str) -> Result<AttendancePage, ClientError> {
        let path = attendance_path(team_id);
        let markup = self.fetch(&path).await?;

        let page = parse_attendance(&markup).map_err(|source| ClientError::Parse {
            path: path.clone(),
            source,
        })?;
        if !page.skipped.is_empty() {
            debug!(%path, skipped = page.skipped.len(), "attendance rows skipped");
        }
        if !page.invalid_columns.is_empty() {
            warn!(
                %path,
                columns = ?page.invalid_columns,
                "attendance columns with unreadable dates"
            );
        }
        Ok(page)
    }

    /// Replace the context's cookies with `cookies` under the write lock.
    ///
    /// If the replacement fails partway, the previous cookie set is put back
    /// before the lock is released and the error is returned.
    pub async fn install_cookies(&self, cookies: &[Cookie]) -> Result<(), FetchError> {
        let mut context = self.context.write().await;
        let previous = context.cookies().await?;

        let replaced = match context.clear_cookies().await {
            Ok(()) => context.install_cookies(cookies).await,
            Err(e) => Err(e),
        };
        let Err(e) = replaced else {
            return Ok(());
        };

        let restored = match context.clear_cookies().await {
            Ok(()) => context.install_cookies(&previous).await,
            Err(e) => Err(e),
        };
        match restored {
            Ok(()) => warn!(error = %e, "cookie rotation failed, previous session kept"),
            Err(restore) => error!(
                error = %e,
                restore_error = %restore,
                "cookie rotation failed and the previous session could not be restored"
            ),
        }
        Err(e)
    }

    /// Snapshot of the cookies page reads currently use.
    pub async fn cookies(&self) -> Result<Vec<Cookie>, FetchError> {
        self.context.read().await.cookies().await
    }

    async fn fetch(&self, path: &str) -> Result<String, ClientError> {
        let context = self.context.read().await;
        context.fetch(path).await.map_err(|source| ClientError::Fetch {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl<C: BrowsingContext> TeamSource for Client<C> {
    async fn get_team(&self, team_id: &str) -> Result<Roster, ClientError> {
        Ok(self.team_page(team_id).await?.players)
    }

    async fn get_attendance(&self, team_id: &str) -> Result<Vec<Attendance>, ClientError> {
        Ok(self.attendance_page(team_id).await?.weeks)
    }
}

pub fn team_path(team_id: &str) -> String {
    format!("{TEAM_PATH}?team={}", encode(team_id))
}

pub fn attendance_path(team_id: &str) -> String {
    format!("{ATTENDANCE_PATH}?team={}", encode(team_id))
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
