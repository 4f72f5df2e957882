// Authenticated access to the league site: the page fetching contract, an
// HTTP implementation of it, the shared client and the background session
// refresher that keeps the client logged in.

pub mod client;
pub mod clock;
pub mod fetcher;
pub mod http;
pub mod refresher;

pub use client::{Client, ClientError, TeamSource};
pub use clock::{Clock, SystemClock};
pub use fetcher::{Browser, BrowsingContext, Cookie, FetchError};
pub use http::{HttpBrowser, HttpContext};
pub use refresher::{
    Credentials, RefresherHandle, SessionError, SessionRefresher, SessionStatus,
};
