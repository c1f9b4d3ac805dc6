//! Client configuration: server location, credentials, proxies, polling and cache settings.
//!
//! A `LimConfig` is built once (from the environment or a TOML file) and handed
//! to the client at construction. Nothing in the library reads ambient state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::engine::PollPolicy;

pub const ENV_SERVER: &str = "LIMSERVER";
pub const ENV_USERNAME: &str = "LIMUSERNAME";
pub const ENV_PASSWORD: &str = "LIMPASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("parse config TOML: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Polling settings as they appear in the `[poll]` TOML table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_tries")]
    pub tries: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
}

fn default_tries() -> u32 {
    50
}

fn default_interval_secs() -> f64 {
    2.5
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            tries: default_tries(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LimConfig {
    /// Base URL, e.g. `https://lim.example.com`.
    pub server: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub http_proxy: Option<String>,
    #[serde(default)]
    pub https_proxy: Option<String>,
    /// Directory holding `<md5>.parquet` cache entries.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub poll: PollSettings,
}

impl fmt::Debug for LimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimConfig")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"***")
            .field("http_proxy", &self.http_proxy)
            .field("https_proxy", &self.https_proxy)
            .field("cache_dir", &self.cache_dir)
            .field("poll", &self.poll)
            .finish()
    }
}

impl LimConfig {
    pub fn new(
        server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            password: password.into(),
            http_proxy: None,
            https_proxy: None,
            cache_dir: default_cache_dir(),
            poll: PollSettings::default(),
        }
    }

    /// Read `LIMSERVER`, `LIMUSERNAME`, `LIMPASSWORD` and the proxy variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Double quotes are stripped from the required
    /// values since they are commonly exported quoted.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.replace('"', ""))
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVar(key))
        };
        let optional = |lower: &str, upper: &str| {
            lookup(lower)
                .or_else(|| lookup(upper))
                .filter(|v| !v.is_empty())
        };

        let config = Self {
            server: required(ENV_SERVER)?,
            username: required(ENV_USERNAME)?,
            password: required(ENV_PASSWORD)?,
            http_proxy: optional("http_proxy", "HTTP_PROXY"),
            https_proxy: optional("https_proxy", "HTTPS_PROXY"),
            cache_dir: default_cache_dir(),
            poll: PollSettings::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the server URL and polling settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.server.starts_with("http://") || self.server.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "server must be an http(s) URL, got '{}'",
                self.server
            )));
        }
        if self.poll.tries == 0 {
            return Err(ConfigError::Invalid("poll.tries must be at least 1".into()));
        }
        if !self.poll.interval_secs.is_finite() || self.poll.interval_secs < 0.0 {
            return Err(ConfigError::Invalid(
                "poll.interval_secs must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            self.poll.tries,
            Duration::from_secs_f64(self.poll.interval_secs),
        )
    }

    fn base(&self) -> &str {
        self.server.trim_end_matches('/')
    }

    /// `{server}/rs/api/datarequests`
    pub fn datarequests_url(&self) -> String {
        format!("{}/rs/api/datarequests", self.base())
    }

    /// Schema relations listing for a symbol, children and date ranges included.
    pub fn relations_url(&self, symbol: &str) -> String {
        format!(
            "{}/rs/api/schema/relations/{symbol}?showChildren=true&desc=true&showColumns=false&dateRange=true",
            self.base()
        )
    }

    /// Upload endpoint using the server's default parser.
    pub fn upload_url(&self) -> String {
        format!(
            "{}/rs/upload?username={}&parsername=DefaultParser",
            self.base(),
            self.username
        )
    }

    pub fn upload_status_url(&self, job_id: &str) -> String {
        format!("{}/rs/upload/jobreport/{job_id}", self.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn from_lookup_strips_quotes() {
        let vars = env(&[
            ("LIMSERVER", "\"https://lim.example.com\""),
            ("LIMUSERNAME", "\"alice\""),
            ("LIMPASSWORD", "secret"),
        ]);
        let config = LimConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.server, "https://lim.example.com");
        assert_eq!(config.username, "alice");
        assert_eq!(config.password, "secret");
        assert_eq!(config.http_proxy, None);
        assert_eq!(config.poll, PollSettings::default());
    }

    #[test]
    fn from_lookup_reports_missing_variable() {
        let vars = env(&[("LIMSERVER", "https://lim.example.com")]);
        let err = LimConfig::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("LIMUSERNAME")));
    }

    #[test]
    fn proxies_accept_upper_case() {
        let vars = env(&[
            ("LIMSERVER", "https://lim.example.com"),
            ("LIMUSERNAME", "u"),
            ("LIMPASSWORD", "p"),
            ("HTTPS_PROXY", "http://proxy:3128"),
        ]);
        let config = LimConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.https_proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn toml_with_poll_section() {
        let config = LimConfig::from_toml(
            r#"
server = "https://lim.example.com/"
username = "u"
password = "p"
cache_dir = "/tmp/lim"

[poll]
tries = 5
interval_secs = 0.5
"#,
        )
        .unwrap();
        assert_eq!(config.poll.tries, 5);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/lim"));
        assert_eq!(
            config.datarequests_url(),
            "https://lim.example.com/rs/api/datarequests"
        );
        let policy = config.poll_policy();
        assert_eq!(policy.tries(), 5);
        assert_eq!(policy.interval(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_zero_tries() {
        let err = LimConfig::from_toml(
            "server = \"https://x\"\nusername = \"u\"\npassword = \"p\"\n[poll]\ntries = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn endpoint_urls() {
        let config = LimConfig::new("https://lim.example.com", "bob", "pw");
        assert_eq!(
            config.relations_url("FB"),
            "https://lim.example.com/rs/api/schema/relations/FB?showChildren=true&desc=true&showColumns=false&dateRange=true"
        );
        assert_eq!(
            config.upload_url(),
            "https://lim.example.com/rs/upload?username=bob&parsername=DefaultParser"
        );
        assert_eq!(
            config.upload_status_url("77"),
            "https://lim.example.com/rs/upload/jobreport/77"
        );
    }

    #[test]
    fn debug_redacts_password() {
        let config = LimConfig::new("https://x", "u", "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
