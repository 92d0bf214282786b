//! Runtime configuration: environment variables plus the `config.json` batch
//! file. Everything is validated up front so a misconfigured deploy fails
//! before a browser is ever launched.

use std::path::{Path, PathBuf};

use exporter_core::ExportSpec;
use exporter_engine::Credentials;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Every missing variable is collected before this is raised, so one
    /// failed deploy surfaces the full list at once.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),
    #[error("invalid login url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("could not read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct AppConfig {
    pub credentials: Credentials,
    pub login_url: Url,
    pub sheet_id: String,
    pub service_account_path: PathBuf,
    pub headless: bool,
    pub specs: Vec<ExportSpec>,
    pub cache_path: PathBuf,
}

/// Batch cache lives next to the config file, like the legacy deployment.
const CACHE_FILE: &str = ".exports_cache.json";

impl AppConfig {
    /// Reads everything from the process environment and `config_path`.
    pub fn from_env(config_path: &Path) -> Result<Self, ConfigError> {
        let env = EnvValues::collect()?;

        let login_url = match &env.login_url {
            Some(explicit) => explicit.clone(),
            // Validated by EnvValues: base is present when login_url is not.
            None => format!("{}/login", env.base_url.as_deref().unwrap_or("").trim_end_matches('/')),
        };
        let login_url = Url::parse(&login_url).map_err(|source| ConfigError::InvalidUrl {
            url: login_url,
            source,
        })?;

        let text = std::fs::read_to_string(config_path).map_err(|source| ConfigError::Io {
            path: config_path.to_path_buf(),
            source,
        })?;
        let specs = exporter_core::parse_batch(&text).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;

        let cache_path = config_path
            .parent()
            .map(|dir| dir.join(CACHE_FILE))
            .unwrap_or_else(|| PathBuf::from(CACHE_FILE));

        Ok(Self {
            credentials: Credentials {
                username: env.username,
                password: env.password,
            },
            login_url,
            sheet_id: env.sheet_id,
            service_account_path: env.service_account_path,
            headless: env.headless,
            specs,
            cache_path,
        })
    }
}

#[derive(Debug)]
struct EnvValues {
    username: String,
    password: String,
    base_url: Option<String>,
    login_url: Option<String>,
    sheet_id: String,
    service_account_path: PathBuf,
    headless: bool,
}

impl EnvValues {
    fn collect() -> Result<Self, ConfigError> {
        Self::collect_with(|name| std::env::var(name).ok())
    }

    /// Validates against an arbitrary lookup; every missing variable is
    /// gathered before failing, so one run reports the full list.
    fn collect_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let first = |names: &[&str]| -> Option<String> {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty())
        };
        let mut missing = Vec::new();

        let username = first(&["SITE_USERNAME", "SITE_USER"]);
        if username.is_none() {
            missing.push("SITE_USERNAME".to_string());
        }
        let password = first(&["SITE_PASSWORD", "SITE_PASS"]);
        if password.is_none() {
            missing.push("SITE_PASSWORD".to_string());
        }
        let base_url = first(&["SITE_BASE_URL"]);
        let login_url = first(&["SITE_LOGIN_URL"]);
        if base_url.is_none() && login_url.is_none() {
            missing.push("SITE_BASE_URL or SITE_LOGIN_URL".to_string());
        }
        let sheet_id = first(&["SHEET_ID"]);
        if sheet_id.is_none() {
            missing.push("SHEET_ID".to_string());
        }
        let service_account_path = first(&["GOOGLE_APPLICATION_CREDENTIALS"]);
        if service_account_path.is_none() {
            missing.push("GOOGLE_APPLICATION_CREDENTIALS".to_string());
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnv(missing));
        }

        Ok(Self {
            username: username.unwrap_or_default(),
            password: password.unwrap_or_default(),
            base_url,
            login_url,
            sheet_id: sheet_id.unwrap_or_default(),
            service_account_path: PathBuf::from(service_account_path.unwrap_or_default()),
            headless: headless_from(first(&["HEADLESS"]).as_deref()),
        })
    }
}

/// Headless unless explicitly "false"; any other value, or no value, keeps
/// the browser headless so a typo never pops a window on a server.
pub fn headless_from(value: Option<&str>) -> bool {
    !value.is_some_and(|v| v.trim().eq_ignore_ascii_case("false"))
}
