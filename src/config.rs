use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{BugzillaError, Result};

pub const DEFAULT_USER_AGENT: &str = "bugzilla_api";
pub const DEFAULT_COOLDOWN_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const LOCAL_CONFIG_FILE: &str = ".config.json";
const PRODUCTION_ENV_VAR: &str = "PRODUCTION";

/// How the API key travels with each request. Bugzilla 5.x reads the
/// `Bugzilla_api_key` query parameter, 6.x the `X-BUGZILLA-API-KEY` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStyle {
    QueryParam,
    Header,
}

#[derive(Clone, Debug)]
pub struct BugzillaConfig {
    pub base_url: String,
    pub api_key: String,
    pub auth_style: AuthStyle,
    pub user_agent: String,
    pub cooldown: Duration,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl BugzillaConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            auth_style: AuthStyle::QueryParam,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn with_auth_style(mut self, style: AuthStyle) -> Self {
        self.auth_style = style;
        self
    }

    pub fn with_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn with_cooldown(mut self, duration: Duration) -> Self {
        self.cooldown = duration;
        self
    }

    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    pub fn with_connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = duration;
        self
    }

    /// REST root with exactly one trailing slash, ready for path joins.
    pub fn api_root(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    /// Browser-facing Bugzilla root, i.e. the REST endpoint minus its `/rest` suffix.
    pub fn web_url(&self) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        trimmed.strip_suffix("/rest").unwrap_or(trimmed).to_string()
    }
}

/// Which profile of the config file to use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Production,
    Testing,
}

impl Environment {
    /// Selects the profile from the `PRODUCTION` environment variable: set means
    /// production, unset means testing. Nothing outside this loader reads the
    /// environment.
    pub fn detect() -> Self {
        if env::var_os(PRODUCTION_ENV_VAR).is_some() {
            Environment::Production
        } else {
            Environment::Testing
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Testing => "testing",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConfigProfile {
    pub url: String,
    pub api_key: String,
}

/// On-disk configuration document holding one endpoint/key pair per environment.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    production: Option<ConfigProfile>,
    #[serde(default)]
    testing: Option<ConfigProfile>,
}

impl ConfigFile {
    /// Candidate config locations, in priority order: a `.config.json` next to the
    /// process, then the per-user config directory.
    pub fn load_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "bugzilla_api") {
            paths.push(dirs.config_dir().join("config.json"));
        }
        paths
    }

    /// Loads the first config file that exists among `load_paths`.
    pub fn load() -> Result<Self> {
        for path in Self::load_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        let candidates: Vec<String> = Self::load_paths()
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        Err(BugzillaError::Config(format!(
            "no config file found; looked for {}",
            candidates.join(", ")
        )))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("loading config from {}", path.display());
        let content = fs::read_to_string(path)?;
        let file = serde_json::from_str(&content)
            .map_err(|err| BugzillaError::Config(format!("{}: {}", path.display(), err)))?;
        Ok(file)
    }

    pub fn profile(&self, environment: Environment) -> Result<&ConfigProfile> {
        let profile = match environment {
            Environment::Production => self.production.as_ref(),
            Environment::Testing => self.testing.as_ref(),
        };
        profile.ok_or_else(|| {
            BugzillaError::Config(format!(
                "config file has no `{}` profile",
                environment.key()
            ))
        })
    }

    /// Resolves the selected profile into a full client config.
    pub fn into_config(self, environment: Environment) -> Result<BugzillaConfig> {
        let profile = self.profile(environment)?;
        Ok(BugzillaConfig::new(
            profile.url.clone(),
            profile.api_key.clone(),
        ))
    }
}
