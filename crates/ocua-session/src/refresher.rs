// Background session rotation.
//
// Logs in with a fresh browsing context, takes the resulting cookies and
// installs them into the shared client before the current session expires.
// Failures are logged and retried on a fixed interval; the loop only stops
// when its task is aborted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::Client;
use crate::clock::{Clock, SystemClock};
use crate::fetcher::{Browser, BrowsingContext, Cookie, FetchError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Name prefix of the site's authenticated session cookie.
pub const SESSION_COOKIE_PREFIX: &str = "SSESS";

/// Wait after a failed refresh before trying again.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// How long before the session cookie expires the next rotation happens.
pub const REFRESH_LEAD: TimeDelta = TimeDelta::hours(24);

// ---------------------------------------------------------------------------
// Error / status types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to open a browsing context: {0}")]
    Context(#[source] FetchError),

    #[error("login failed: {0}")]
    Login(#[source] FetchError),

    #[error("failed to read cookies after login: {0}")]
    Cookies(#[source] FetchError),

    #[error("could not find session cookie (prefix `{prefix}`)")]
    SessionCookieNotFound { prefix: String },

    #[error("session cookie `{name}` has no usable expiry")]
    MissingExpiry { name: String },

    #[error("failed to install cookies into the client: {0}")]
    Install(#[source] FetchError),
}

#[derive(Debug, Error)]
#[error("session refresher stopped")]
pub struct RefresherStopped;

/// Observable state of the refresh loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Set by the first successful rotation and never cleared.
    pub ready: bool,
    pub rotations: u64,
    pub consecutive_failures: u32,
    /// Expiry of the installed session cookie.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the loop will next try to refresh.
    pub next_refresh_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Cookies from a fresh login plus the session cookie's expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshSession {
    pub cookies: Vec<Cookie>,
    pub session_cookie: String,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SessionRefresher
// ---------------------------------------------------------------------------

pub struct SessionRefresher<B: Browser, K: Clock = SystemClock> {
    browser: B,
    client: Arc<Client<B::Context>>,
    credentials: Credentials,
    clock: K,
    cookie_prefix: String,
    status: watch::Sender<SessionStatus>,
}

impl<B: Browser> SessionRefresher<B, SystemClock> {
    pub fn new(browser: B, client: Arc<Client<B::Context>>, credentials: Credentials) -> Self {
        Self::with_clock(browser, client, credentials, SystemClock)
    }
}

impl<B: Browser, K: Clock> SessionRefresher<B, K> {
    pub fn with_clock(
        browser: B,
        client: Arc<Client<B::Context>>,
        credentials: Credentials,
        clock: K,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            browser,
            client,
            credentials,
            clock,
            cookie_prefix: SESSION_COOKIE_PREFIX.to_string(),
            status,
        }
    }

    /// Look for the session cookie under a different name prefix.
    pub fn with_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cookie_prefix = prefix.into();
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Log in with a new, cookie-less context and return its cookies. The
    /// context is dropped afterwards.
    pub async fn fresh_session(&self) -> Result<FreshSession, SessionError> {
        let mut context = self
            .browser
            .new_context()
            .await
            .map_err(SessionError::Context)?;

        context
            .login(&self.credentials.username, &self.credentials.password)
            .await
            .map_err(SessionError::Login)?;

        let cookies = context.cookies().await.map_err(SessionError::Cookies)?;

        let session = cookies
            .iter()
            .find(|c| c.name.starts_with(&self.cookie_prefix))
            .ok_or_else(|| SessionError::SessionCookieNotFound {
                prefix: self.cookie_prefix.clone(),
            })?;
        let expires_at = session.expires().ok_or_else(|| SessionError::MissingExpiry {
            name: session.name.clone(),
        })?;
        let session_cookie = session.name.clone();

        Ok(FreshSession {
            cookies,
            session_cookie,
            expires_at,
        })
    }

    /// One rotation: fresh login, then install the cookies into the client.
    /// Returns the new session's expiry.
    pub async fn run_once(&self) -> Result<DateTime<Utc>, SessionError> {
        let session = self.fresh_session().await?;
        debug!(
            cookie = %session.session_cookie,
            count = session.cookies.len(),
            "installing fresh session cookies"
        );
        self.client
            .install_cookies(&session.cookies)
            .await
            .map_err(SessionError::Install)?;
        Ok(session.expires_at)
    }

    /// Delay until the rotation for a session expiring at `expires_at`.
    /// Falls back to the retry interval when the lead time has already passed.
    pub fn rotation_delay(&self, expires_at: DateTime<Utc>) -> Duration {
        (expires_at - REFRESH_LEAD - self.clock.now())
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(RETRY_INTERVAL)
    }

    /// Run the refresh loop forever.
    pub async fn run(self) {
        loop {
            let delay = match self.run_once().await {
                Ok(expires_at) => {
                    let delay = self.rotation_delay(expires_at);
                    let next = self.clock.now() + delay_delta(delay);
                    info!(%expires_at, next_refresh = %next, "session cookies refreshed");
                    self.status.send_modify(|s| {
                        s.ready = true;
                        s.rotations += 1;
                        s.consecutive_failures = 0;
                        s.expires_at = Some(expires_at);
                        s.next_refresh_at = Some(next);
                        s.last_error = None;
                    });
                    delay
                }
                Err(e) => {
                    let next = self.clock.now() + delay_delta(RETRY_INTERVAL);
                    error!(error = %e, retry_at = %next, "failed to refresh session cookies");
                    self.status.send_modify(|s| {
                        s.consecutive_failures += 1;
                        s.next_refresh_at = Some(next);
                        s.last_error = Some(e.to_string());
                    });
                    RETRY_INTERVAL
                }
            };
            self.clock.sleep(delay).await;
        }
    }

    /// Start the loop on the tokio runtime.
    pub fn spawn(self) -> RefresherHandle {
        let status = self.subscribe();
        let task = tokio::spawn(self.run());
        RefresherHandle { status, task }
    }
}

fn delay_delta(delay: Duration) -> TimeDelta {
    TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX)
}

// ---------------------------------------------------------------------------
// RefresherHandle
// ---------------------------------------------------------------------------

/// Handle to a spawned refresh loop.
pub struct RefresherHandle {
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Wait until at least one session has been installed.
    pub async fn wait_ready(&self) -> Result<SessionStatus, RefresherStopped> {
        let mut status = self.status.clone();
        let ready = status
            .wait_for(|s| s.ready)
            .await
            .map_err(|_| RefresherStopped)?;
        Ok(ready.clone())
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
