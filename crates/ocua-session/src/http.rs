// Plain HTTP implementation of the page fetching contract.
//
// Each `HttpContext` keeps its own cookie list and sends it explicitly with
// every request, so cookies can be listed, replaced and cleared (which a
// reqwest cookie jar does not allow).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::COOKIE;
use reqwest::{redirect, RequestBuilder, Response};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::fetcher::{Browser, BrowsingContext, Cookie, FetchError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const LOGIN_PATH: &str = "/user/login";

/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Latest cookie expiry kept (9999-12-31T23:59:59Z). Later expiries and
/// oversized `Max-Age` values are clamped to it.
pub const MAX_COOKIE_EXPIRY: i64 = 253_402_300_799;

const USER_AGENT: &str = concat!("ocua-attendance/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// HttpBrowser
// ---------------------------------------------------------------------------

/// Creates cookie-less [`HttpContext`]s for one site.
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    base_url: Url,
    /// Follows redirects; used for page reads.
    http: reqwest::Client,
    /// Never follows redirects, so cookies set on the login redirect are seen.
    login_http: reqwest::Client,
}

impl HttpBrowser {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url).map_err(|source| FetchError::InvalidUrl {
            input: base_url.to_string(),
            source,
        })?;

        let build = |policy: redirect::Policy| {
            reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
                .redirect(policy)
                .build()
                .map_err(|source| FetchError::Http {
                    url: base_url.to_string(),
                    source,
                })
        };

        Ok(Self {
            http: build(redirect::Policy::limited(10))?,
            login_http: build(redirect::Policy::none())?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    type Context = HttpContext;

    async fn new_context(&self) -> Result<HttpContext, FetchError> {
        Ok(HttpContext {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            login_http: self.login_http.clone(),
            cookies: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// HttpContext
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct HttpContext {
    base_url: Url,
    http: reqwest::Client,
    login_http: reqwest::Client,
    cookies: Vec<Cookie>,
}

impl HttpContext {
    fn url(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|source| FetchError::InvalidUrl {
                input: path.to_string(),
                source,
            })
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        Some(pairs.join("; "))
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, FetchError> {
        let request = match self.cookie_header() {
            Some(header) => request.header(COOKIE, header),
            None => request,
        };
        request.send().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Apply `Set-Cookie` headers from a response. Cookies that arrive
    /// already expired are deletions.
    fn record_cookies(&mut self, response: &Response) {
        let now = Utc::now().timestamp();

        for set in response.cookies() {
            let expires_at = cookie_expiry(set.expires(), set.max_age(), now);

            if expires_at.is_some_and(|at| at <= now) {
                debug!(name = set.name(), "cookie removed by server");
                self.cookies.retain(|c| c.name != set.name());
                continue;
            }

            upsert_cookie(
                &mut self.cookies,
                Cookie::new(set.name(), set.value(), expires_at),
            );
        }
    }
}

#[async_trait]
impl BrowsingContext for HttpContext {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), FetchError> {
        let login_url = self.url(LOGIN_PATH)?;

        let response = self.send(self.http.get(login_url.clone()), &login_url).await?;
        self.record_cookies(&response);
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: login_url.to_string(),
                status: status.as_u16(),
            });
        }
        let markup = response.text().await.map_err(|source| FetchError::Http {
            url: login_url.to_string(),
            source,
        })?;

        let form = find_login_form(&markup).ok_or_else(|| FetchError::LoginFormNotFound {
            url: login_url.to_string(),
        })?;
        let action = match form.action.as_deref() {
            Some(action) if !action.is_empty() => {
                login_url
                    .join(action)
                    .map_err(|source| FetchError::InvalidUrl {
                        input: action.to_string(),
                        source,
                    })?
            }
            _ => login_url.clone(),
        };

        let mut fields = form.fields;
        fields.push((form.username_field, username.to_string()));
        fields.push((form.password_field, password.to_string()));

        let response = self
            .send(self.login_http.post(action.clone()).form(&fields), &action)
            .await?;
        self.record_cookies(&response);

        // A successful submit redirects; a failed one re-renders the form.
        let status = response.status();
        if !status.is_redirection() {
            return Err(FetchError::LoginRejected {
                status: status.as_u16(),
            });
        }
        debug!(cookies = self.cookies.len(), "login form accepted");
        Ok(())
    }

    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        let url = self.url(path)?;
        let response = self.send(self.http.get(url.clone()), &url).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }

    async fn cookies(&self) -> Result<Vec<Cookie>, FetchError> {
        Ok(self.cookies.clone())
    }

    async fn install_cookies(&mut self, cookies: &[Cookie]) -> Result<(), FetchError> {
        for cookie in cookies {
            upsert_cookie(&mut self.cookies, cookie.clone());
        }
        Ok(())
    }

    async fn clear_cookies(&mut self) -> Result<(), FetchError> {
        self.cookies.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn upsert_cookie(cookies: &mut Vec<Cookie>, cookie: Cookie) {
    match cookies.iter_mut().find(|c| c.name == cookie.name) {
        Some(existing) => *existing = cookie,
        None => cookies.push(cookie),
    }
}

/// Expiry in unix seconds from a cookie's `Expires` or, failing that, its
/// `Max-Age` relative to `now`. Clamped to `MAX_COOKIE_EXPIRY`.
fn cookie_expiry(expires: Option<SystemTime>, max_age: Option<Duration>, now: i64) -> Option<i64> {
    let at = match (expires, max_age) {
        (Some(time), _) => unix_seconds(time),
        (None, Some(age)) => {
            let age = i64::try_from(age.as_secs()).unwrap_or(i64::MAX);
            now.saturating_add(age)
        }
        (None, None) => return None,
    };
    Some(at.min(MAX_COOKIE_EXPIRY))
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_secs()).map_or(i64::MIN, |s| -s),
    }
}

/// Fields of the site's login form needed to submit it.
#[derive(Debug, PartialEq)]
struct LoginForm {
    action: Option<String>,
    /// Hidden inputs plus the submit button, in page order.
    fields: Vec<(String, String)>,
    username_field: String,
    password_field: String,
}

/// Find the form holding `#edit-name` and collect what a browser would post.
fn find_login_form(markup: &str) -> Option<LoginForm> {
    let document = Html::parse_document(markup);
    let form_selector = Selector::parse("form").ok()?;
    let username_selector = Selector::parse("#edit-name").ok()?;
    let password_selector = Selector::parse("#edit-pass").ok()?;
    let hidden_selector = Selector::parse("input[type=hidden]").ok()?;
    let submit_selector = Selector::parse("#edit-submit, input[type=submit]").ok()?;

    let form = document
        .select(&form_selector)
        .find(|form| form.select(&username_selector).next().is_some())?;

    let field_name = |selector: &Selector, default: &str| {
        form.select(selector)
            .next()
            .and_then(|input| input.value().attr("name"))
            .unwrap_or(default)
            .to_string()
    };
    let username_field = field_name(&username_selector, "name");
    let password_field = field_name(&password_selector, "pass");

    let mut fields: Vec<(String, String)> = form
        .select(&hidden_selector)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    if let Some(submit) = form.select(&submit_selector).next() {
        if let Some(name) = submit.value().attr("name") {
            let value = submit.value().attr("value").unwrap_or_default();
            fields.push((name.to_string(), value.to_string()));
        }
    }

    Some(LoginForm {
        action: form.value().attr("action").map(str::to_string),
        fields,
        username_field,
        password_field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form action="/search" method="get"><input name="q"></form>
        <form action="/user/login?destination=/zuluru" method="post" id="user-login">
          <input type="text" id="edit-name" name="name" value="">
          <input type="password" id="edit-pass" name="pass">
          <input type="hidden" name="form_build_id" value="form-abc123">
          <input type="hidden" name="form_id" value="user_login">
          <input type="submit" id="edit-submit" name="op" value="Log in">
        </form>
        </body></html>"#;

    #[test]
    fn login_form_fields_are_collected() {
        let form = find_login_form(LOGIN_PAGE).unwrap();
        assert_eq!(form.action.as_deref(), Some("/user/login?destination=/zuluru"));
        assert_eq!(form.username_field, "name");
        assert_eq!(form.password_field, "pass");
        assert_eq!(
            form.fields,
            vec![
                ("form_build_id".to_string(), "form-abc123".to_string()),
                ("form_id".to_string(), "user_login".to_string()),
                ("op".to_string(), "Log in".to_string()),
            ]
        );
    }

    #[test]
    fn page_without_login_form() {
        assert!(find_login_form("<html><body><p>Welcome back</p></body></html>").is_none());
    }

    #[test]
    fn upsert_replaces_by_name() {
        let mut cookies = vec![Cookie::new("a", "1", None), Cookie::new("b", "2", Some(10))];
        upsert_cookie(&mut cookies, Cookie::new("b", "3", Some(20)));
        upsert_cookie(&mut cookies, Cookie::new("c", "4", None));
        assert_eq!(
            cookies,
            vec![
                Cookie::new("a", "1", None),
                Cookie::new("b", "3", Some(20)),
                Cookie::new("c", "4", None),
            ]
        );
    }

    #[tokio::test]
    async fn context_cookie_set_is_replaced_and_cleared() {
        let browser = HttpBrowser::new("https://example.org", DEFAULT_TIMEOUT).unwrap();
        let mut context = browser.new_context().await.unwrap();
        assert!(context.cookies().await.unwrap().is_empty());
        assert!(context.cookie_header().is_none());

        context
            .install_cookies(&[
                Cookie::new("SSESSabc", "token", Some(2_000_000_000)),
                Cookie::new("has_js", "1", None),
            ])
            .await
            .unwrap();
        assert_eq!(
            context.cookie_header().as_deref(),
            Some("SSESSabc=token; has_js=1")
        );

        context.clear_cookies().await.unwrap();
        assert!(context.cookies().await.unwrap().is_empty());
    }

    fn response_setting(cookie: &str) -> Response {
        Response::from(
            http::Response::builder()
                .status(302)
                .header(reqwest::header::SET_COOKIE, cookie)
                .body("")
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn huge_max_age_is_clamped() {
        let browser = HttpBrowser::new("https://www.ocua.ca", DEFAULT_TIMEOUT).unwrap();
        let mut context = browser.new_context().await.unwrap();

        context.record_cookies(&response_setting(
            "SSESSx=tok; Max-Age=9223372036854775807",
        ));

        let cookies = context.cookies().await.unwrap();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "tok");
        assert_eq!(cookies[0].expires_at, Some(MAX_COOKIE_EXPIRY));
        assert!(cookies[0].expires().is_some());
    }

    #[tokio::test]
    async fn max_age_counts_from_now_and_zero_deletes() {
        let browser = HttpBrowser::new("https://www.ocua.ca", DEFAULT_TIMEOUT).unwrap();
        let mut context = browser.new_context().await.unwrap();

        let before = Utc::now().timestamp();
        context.record_cookies(&response_setting("SSESSx=tok; Max-Age=2000000"));
        let expires_at = context.cookies().await.unwrap()[0].expires_at.unwrap();
        assert!(expires_at >= before + 2_000_000 && expires_at <= Utc::now().timestamp() + 2_000_000);

        context.record_cookies(&response_setting("SSESSx=gone; Max-Age=0"));
        assert!(context.cookies().await.unwrap().is_empty());
    }

    #[test]
    fn cookie_expiry_prefers_expires_and_clamps() {
        let far = UNIX_EPOCH + Duration::from_secs(400_000_000_000);
        assert_eq!(cookie_expiry(Some(far), None, 0), Some(MAX_COOKIE_EXPIRY));
        assert_eq!(
            cookie_expiry(
                Some(UNIX_EPOCH + Duration::from_secs(1_000)),
                Some(Duration::from_secs(5)),
                100
            ),
            Some(1_000)
        );
        assert_eq!(cookie_expiry(None, Some(Duration::from_secs(5)), 100), Some(105));
        assert_eq!(cookie_expiry(None, Some(Duration::MAX), 100), Some(MAX_COOKIE_EXPIRY));
        assert_eq!(cookie_expiry(None, None, 100), None);
    }

    #[test]
    fn paths_resolve_against_base_url() {
        let browser = HttpBrowser::new("https://www.ocua.ca", DEFAULT_TIMEOUT).unwrap();
        let context = HttpContext {
            base_url: browser.base_url().clone(),
            http: browser.http.clone(),
            login_http: browser.login_http.clone(),
            cookies: Vec::new(),
        };
        assert_eq!(
            context.url("/zuluru/teams/view?team=1").unwrap().as_str(),
            "https://www.ocua.ca/zuluru/teams/view?team=1"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpBrowser::new("not a url", DEFAULT_TIMEOUT),
            Err(FetchError::InvalidUrl { .. })
        ));
    }
}
