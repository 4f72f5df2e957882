// In-memory stand-ins for the league site and the wall clock.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use ocua_session::client::{ATTENDANCE_PATH, TEAM_PATH};
use ocua_session::{Browser, BrowsingContext, Clock, Cookie, FetchError};
use tokio::sync::{Barrier, Notify};

pub const TEAM_HTML: &str = include_str!("../../../ocua-core/tests/fixtures/team.html");
pub const ATTENDANCE_HTML: &str =
    include_str!("../../../ocua-core/tests/fixtures/attendance.html");

/// Fixed starting point for simulated time.
pub fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// The three cookies the site hands out, all tagged with `generation`.
pub fn session_cookies(generation: u32, expires_at: DateTime<Utc>) -> Vec<Cookie> {
    vec![
        Cookie::new(
            "SSESS8f3a",
            format!("gen{generation}"),
            Some(expires_at.timestamp()),
        ),
        Cookie::new("csrfToken", format!("gen{generation}"), None),
        Cookie::new("has_js", format!("gen{generation}"), None),
    ]
}

// ---------------------------------------------------------------------------
// FakeSite
// ---------------------------------------------------------------------------

/// What the site does with the next login attempt.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Accept(Vec<Cookie>),
    Reject,
}

/// Shared state behind every context a `FakeBrowser` hands out.
#[derive(Default)]
pub struct FakeSite {
    logins: Mutex<VecDeque<LoginOutcome>>,
    login_attempts: AtomicUsize,
    fetches: AtomicUsize,
    /// Cookie set seen by each fetch, in order.
    seen: Mutex<Vec<Vec<Cookie>>>,
    /// When set, every fetch waits on this barrier before answering.
    fetch_barrier: Mutex<Option<Arc<Barrier>>>,
    /// When set, installs signal `install_started` and then wait for
    /// `install_release` before touching the cookie set.
    hold_installs: Mutex<bool>,
    /// When set, the next install writes one cookie and then fails.
    fail_next_install: AtomicBool,
    pub install_started: Notify,
    pub install_release: Notify,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the outcome of a future login. Once the queue is empty every
    /// login is rejected.
    pub fn push_login(&self, outcome: LoginOutcome) {
        self.logins.lock().unwrap().push_back(outcome);
    }

    pub fn set_fetch_barrier(&self, barrier: Arc<Barrier>) {
        *self.fetch_barrier.lock().unwrap() = Some(barrier);
    }

    pub fn hold_installs(&self) {
        *self.hold_installs.lock().unwrap() = true;
    }

    pub fn fail_next_install(&self) {
        self.fail_next_install.store(true, Ordering::SeqCst);
    }

    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn seen_cookie_sets(&self) -> Vec<Vec<Cookie>> {
        self.seen.lock().unwrap().clone()
    }

    /// A context that starts with `cookies` already set.
    pub fn context(self: &Arc<Self>, cookies: Vec<Cookie>) -> FakeContext {
        FakeContext {
            site: Arc::clone(self),
            cookies,
        }
    }
}

// ---------------------------------------------------------------------------
// FakeBrowser / FakeContext
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeBrowser {
    pub site: Arc<FakeSite>,
}

impl FakeBrowser {
    pub fn new(site: Arc<FakeSite>) -> Self {
        Self { site }
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    type Context = FakeContext;

    async fn new_context(&self) -> Result<FakeContext, FetchError> {
        Ok(self.site.context(Vec::new()))
    }
}

pub struct FakeContext {
    site: Arc<FakeSite>,
    cookies: Vec<Cookie>,
}

#[async_trait]
impl BrowsingContext for FakeContext {
    async fn login(&mut self, _username: &str, _password: &str) -> Result<(), FetchError> {
        self.site.login_attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .site
            .logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(LoginOutcome::Reject);
        match outcome {
            LoginOutcome::Accept(cookies) => {
                self.cookies = cookies;
                Ok(())
            }
            LoginOutcome::Reject => Err(FetchError::LoginRejected { status: 200 }),
        }
    }

    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        self.site.fetches.fetch_add(1, Ordering::SeqCst);
        self.site.seen.lock().unwrap().push(self.cookies.clone());

        let barrier = self.site.fetch_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        if path.starts_with(TEAM_PATH) {
            Ok(TEAM_HTML.to_string())
        } else if path.starts_with(ATTENDANCE_PATH) {
            Ok(ATTENDANCE_HTML.to_string())
        } else {
            Err(FetchError::Status {
                url: path.to_string(),
                status: 404,
            })
        }
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, FetchError> {
        Ok(self.cookies.clone())
    }

    async fn install_cookies(&mut self, cookies: &[Cookie]) -> Result<(), FetchError> {
        let hold = *self.site.hold_installs.lock().unwrap();
        if hold {
            self.site.install_started.notify_one();
            self.site.install_release.notified().await;
        }
        let fail = self.site.fail_next_install.swap(false, Ordering::SeqCst);
        // One cookie at a time, yielding in between.
        for (i, cookie) in cookies.iter().enumerate() {
            if fail && i == 1 {
                return Err(FetchError::Unavailable("cookie store rejected write".into()));
            }
            self.cookies.retain(|c| c.name != cookie.name);
            self.cookies.push(cookie.clone());
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn clear_cookies(&mut self) -> Result<(), FetchError> {
        self.cookies.clear();
        tokio::task::yield_now().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TestClock
// ---------------------------------------------------------------------------

/// Wall clock driven by tokio's (pausable) time: `now` is `origin()` plus
/// the tokio time elapsed since creation.
#[derive(Clone)]
pub struct TestClock {
    origin: DateTime<Utc>,
    start: tokio::time::Instant,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            origin: origin(),
            start: tokio::time::Instant::now(),
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.origin + TimeDelta::from_std(elapsed).unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::time::sleep(duration).await;
    }
}
