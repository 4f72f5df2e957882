// Configuration loading and parsing (ocua.toml, credentials.toml, handles).

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use ocua_session::Credentials;

use crate::render::Handles;

/// Environment variable that overrides `credentials.toml`'s username.
pub const USERNAME_ENV: &str = "OCUA_USERNAME";
/// Environment variable that overrides `credentials.toml`'s password.
pub const PASSWORD_ENV: &str = "OCUA_PASSWORD";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub site: SiteConfig,
    pub team: TeamConfig,
    pub http: HttpConfig,
    pub credentials: CredentialsConfig,
    /// Player ID -> notification handle.
    pub handles: Handles,
}

impl Config {
    /// Login credentials, once both halves are present.
    pub fn session_credentials(&self) -> Option<Credentials> {
        match (&self.credentials.username, &self.credentials.password) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ocua.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire ocua.toml file.
#[derive(Debug, Clone, Deserialize)]
struct OcuaFile {
    site: SiteConfig,
    team: TeamConfig,
    #[serde(default)]
    http: HttpConfig,
    #[serde(default)]
    handles: HandlesSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    pub id: String,
    /// Printed under every report when set.
    #[serde(default)]
    pub attendance_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HandlesSection {
    path: Option<String>,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/ocua.toml`, (optionally)
/// `config/credentials.toml` and the handles file, all relative to
/// `base_dir`. Credentials from the process environment take precedence.
///
/// Does not auto-copy defaults; `load_config()` does.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    load_config_with_env(base_dir, |key| std::env::var(key).ok())
}

/// `load_config_from` with an explicit environment lookup.
pub(crate) fn load_config_with_env(
    base_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- ocua.toml (required) ---
    let ocua_path = config_dir.join("ocua.toml");
    let ocua_file: OcuaFile = parse_file(&ocua_path)?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let mut credentials: CredentialsConfig = if credentials_path.exists() {
        parse_file(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };
    if let Some(username) = env(USERNAME_ENV).filter(|v| !v.is_empty()) {
        credentials.username = Some(username);
    }
    if let Some(password) = env(PASSWORD_ENV).filter(|v| !v.is_empty()) {
        credentials.password = Some(password);
    }

    // --- handles (optional, path relative to base_dir) ---
    let handles = match &ocua_file.handles.path {
        Some(path) => parse_file(&base_dir.join(path))?,
        None => HashMap::new(),
    };

    let config = Config {
        site: ocua_file.site,
        team: ocua_file.team,
        http: ocua_file.http,
        credentials,
        handles,
    };

    validate(&config)?;

    Ok(config)
}

/// What `ensure_config_files` found in `defaults/`.
#[derive(Debug, Default, PartialEq)]
pub struct DefaultsReport {
    /// Files copied into `config/` on this run.
    pub copied: Vec<PathBuf>,
    /// `.example` templates whose filled-in copy is not in `config/` yet.
    pub pending_templates: Vec<PathBuf>,
}

/// Copy every default file that `config/` lacks. `.example` templates are
/// never copied; the ones the user has not filled in yet are listed instead.
pub fn ensure_config_files(base_dir: &Path) -> Result<DefaultsReport, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        // A deployed config/ without defaults/ is fine.
        if config_dir.exists() {
            return Ok(DefaultsReport::default());
        }
        return Err(defaults_error(format!(
            "neither defaults/ nor config/ directory found in {}; \
             run from the ocua-app directory or ensure defaults/ is present",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| defaults_error(format!("failed to create config directory: {e}")))?;

    let mut report = DefaultsReport::default();
    for source in default_files(&defaults_dir)? {
        let Some(file_name) = source.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match file_name.strip_suffix(".example") {
            Some(filled_in) => {
                if !config_dir.join(filled_in).exists() {
                    report.pending_templates.push(source);
                }
            }
            None => {
                let target = config_dir.join(file_name);
                if copy_if_missing(&source, &target)? {
                    report.copied.push(target);
                }
            }
        }
    }

    Ok(report)
}

/// Loads config relative to the current working directory, copying default
/// config files into place first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;

    let defaults = ensure_config_files(&cwd)?;
    for path in &defaults.copied {
        info!(path = %path.display(), "copied default config file");
    }
    for template in &defaults.pending_templates {
        info!(template = %template.display(), "config template not filled in");
    }

    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Regular files in `dir`, sorted by path.
fn default_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| defaults_error(format!("failed to read defaults directory: {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| defaults_error(format!("failed to read defaults entry: {e}")))?
            .path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Copy `source` to `target` unless `target` already exists. Returns whether
/// a copy was made.
fn copy_if_missing(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(defaults_error(format!(
                "failed to create {}: {e}",
                target.display()
            )))
        }
    };

    let content = std::fs::read(source)
        .map_err(|e| defaults_error(format!("failed to read {}: {e}", source.display())))?;
    dest.write_all(&content)
        .map_err(|e| defaults_error(format!("failed to write {}: {e}", target.display())))?;
    Ok(true)
}

fn defaults_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = read_file(path)?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let base_url = config.site.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "site.base_url".into(),
            message: format!("must be an http(s) URL, got {base_url:?}"),
        });
    }

    if config.team.id.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "team.id".into(),
            message: "must not be empty".into(),
        });
    }

    if config.http.timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "http.timeout_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    let credential_fields: &[(&str, &str, &Option<String>)] = &[
        ("credentials.username", USERNAME_ENV, &config.credentials.username),
        ("credentials.password", PASSWORD_ENV, &config.credentials.password),
    ];
    for (field, env, value) in credential_fields {
        if value.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError {
                field: field.to_string(),
                message: format!(
                    "must be set in config/credentials.toml \
                     (see defaults/credentials.toml.example) or via {env}"
                ),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
