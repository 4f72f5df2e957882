// OCUA attendance entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (stderr, so stdout carries only command output)
// 3. Load config
// 4. Build the HTTP browser and the shared client
// 5. Spawn the session refresher and wait for the first login
// 6. Run the command and print its output
// 7. Stop the refresher

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ocua_app::cli::{self, Cli};
use ocua_app::config;
use ocua_app::service::AttendanceService;
use ocua_session::{Browser, Client, HttpBrowser, SessionRefresher};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Parse arguments
    let cli = Cli::parse();

    // 2. Initialize tracing
    init_tracing()?;

    // 3. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: site={}, team={}",
        config.site.base_url, config.team.id
    );
    let credentials = config
        .session_credentials()
        .context("login credentials are not configured")?;

    // 4. HTTP browser and shared client
    let browser = HttpBrowser::new(&config.site.base_url, config.http.timeout())
        .context("failed to build HTTP client")?;
    let context = browser
        .new_context()
        .await
        .context("failed to open browsing context")?;
    let client = Arc::new(Client::new(context));

    // 5. Session refresher
    let refresher = SessionRefresher::new(browser, Arc::clone(&client), credentials).spawn();
    let status = {
        let mut status = refresher.subscribe();
        let first = status
            .wait_for(|s| s.ready || s.consecutive_failures > 0)
            .await
            .context("session refresher stopped before logging in")?;
        first.clone()
    };
    if !status.ready {
        refresher.abort();
        anyhow::bail!(
            "login failed: {}",
            status.last_error.unwrap_or_else(|| "unknown error".into())
        );
    }
    info!(expires_at = ?status.expires_at, "Session ready");

    // 6. Run the command
    let service = AttendanceService::new(Arc::clone(&client), config.team.id.clone())
        .with_handles(config.handles.clone())
        .with_link(config.team.attendance_link.clone());
    let now = chrono::Local::now().naive_local();
    let result = cli::execute(&cli.command, &service, now).await;

    // 7. Stop the refresher (it loops forever)
    refresher.abort();

    let output = result?;
    println!("{output}");
    Ok(())
}

/// Initialize tracing to stderr.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ocua=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
