// Page fetching contract.
//
// A `Browser` hands out independent browsing contexts, each with its own
// cookie jar. The client keeps one long-lived context for page reads; the
// session refresher opens a fresh one for every login.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid url {input:?}: {source}")]
    InvalidUrl {
        input: String,
        source: url::ParseError,
    },

    #[error("login form not found on {url}")]
    LoginFormNotFound { url: String },

    #[error("login was rejected (status {status})")]
    LoginRejected { status: u16 },

    #[error("browsing context unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Cookie
// ---------------------------------------------------------------------------

/// A cookie as seen by a browsing context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Expiry as unix seconds. `None` for cookies that last only as long as
    /// the browsing context.
    pub expires_at: Option<i64>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>, expires_at: Option<i64>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            expires_at,
        }
    }

    /// Expiry as a timestamp, if the cookie has one that fits in range.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One browsing session with its own cookie set.
///
/// Reads take `&self`; anything that changes the cookie set takes `&mut self`
/// so that callers sharing a context must hold exclusive access to mutate it.
#[async_trait]
pub trait BrowsingContext: Send + Sync + 'static {
    /// Sign in with the site's login form. Cookies set by the site are kept
    /// in this context.
    async fn login(&mut self, username: &str, password: &str) -> Result<(), FetchError>;

    /// Fetch a site-relative path (e.g. `/zuluru/teams/view?team=1`) and
    /// return the page markup.
    async fn fetch(&self, path: &str) -> Result<String, FetchError>;

    /// The context's current cookies.
    async fn cookies(&self) -> Result<Vec<Cookie>, FetchError>;

    /// Add cookies, replacing any existing cookie with the same name.
    async fn install_cookies(&mut self, cookies: &[Cookie]) -> Result<(), FetchError>;

    /// Remove every cookie.
    async fn clear_cookies(&mut self) -> Result<(), FetchError>;
}

/// Factory for fresh, cookie-less browsing contexts.
#[async_trait]
pub trait Browser: Send + Sync + 'static {
    type Context: BrowsingContext;

    async fn new_context(&self) -> Result<Self::Context, FetchError>;
}
