//! Configuration types for Recplay

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv6Addr;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{RecplayError, Result};

/// Port the test proxy serves TLS on by default
pub const DEFAULT_PROXY_PORT: u16 = 5001;

/// Default proxy host
pub const DEFAULT_PROXY_HOST: &str = "localhost";

/// Operating mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward to the real service and store the exchange
    Record,
    /// Serve responses from a stored recording
    Playback,
    /// Bypass the proxy entirely
    Live,
}

impl Mode {
    /// Path segment and header value for this mode
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Record => "record",
            Mode::Playback => "playback",
            Mode::Live => "live",
        }
    }

    /// Check if mode is Live
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Mode::Live)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RecplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Mode::Record),
            "playback" => Ok(Mode::Playback),
            "live" => Ok(Mode::Live),
            other => Err(RecplayError::ConfigError(format!(
                "Unknown mode '{other}', expected record, playback or live"
            ))),
        }
    }
}

/// Scheme used to reach the proxy
///
/// Always configured explicitly; the port number says nothing about
/// whether the proxy terminates TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    #[default]
    Https,
}

impl Scheme {
    /// URI scheme string
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = RecplayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(RecplayError::ConfigError(format!(
                "Unknown scheme '{other}', expected http or https"
            ))),
        }
    }
}

/// Where the proxy listens and how sessions against it behave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Proxy host
    #[serde(default = "default_host")]
    pub host: String,
    /// Proxy port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Scheme (http/https)
    #[serde(default)]
    pub scheme: Scheme,
    /// Session mode
    pub mode: Mode,
}

fn default_host() -> String {
    DEFAULT_PROXY_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PROXY_PORT
}

impl ProxyEndpoint {
    /// Endpoint on the default host and port with TLS
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PROXY_PORT,
            scheme: Scheme::default(),
            mode,
        }
    }

    /// `host:port`, with IPv6 literals bracketed
    #[must_use]
    pub fn authority(&self) -> String {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `scheme://host:port`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }

    /// URL of a lifecycle action, e.g. `https://localhost:5001/record/start`
    #[must_use]
    pub fn action_url(&self, action: &str) -> String {
        format!("{}/{}/{action}", self.base_url(), self.mode)
    }

    /// Validate the endpoint
    ///
    /// # Errors
    ///
    /// Returns error if host is empty or port is 0
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RecplayError::ConfigError(
                "Proxy host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(RecplayError::ConfigError(
                "Proxy port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Route traffic through the proxy at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Proxy connection parameters
    pub proxy: ProxyEndpoint,
    /// Stable root under which `recordings/` lives
    #[serde(default = "default_root")]
    pub recording_root: PathBuf,
}

fn default_enabled() -> bool {
    true
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecplayError::ConfigError(format!("Failed to read config file: {e}")))?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| RecplayError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.recording_root = absolute_root(&config.recording_root)?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `KEY VALUE` env file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a value is invalid
    pub fn from_env_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecplayError::ConfigError(format!("Failed to read env file: {e}")))?;

        let vars = parse_env_file(&content);
        let mut config = Self::from_lookup(|key| vars.get(key).cloned())?;

        // Recordings live next to the env file unless told otherwise
        if !vars.contains_key(env::RECORDING_ROOT) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.recording_root = absolute_root(parent)?;
            }
        }

        Ok(config)
    }

    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup
    ///
    /// `USE_PROXY` defaults to true. Proxy settings are only required when
    /// the proxy is in use.
    ///
    /// # Errors
    ///
    /// Returns error if a variable holds an invalid value
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = match lookup(env::USE_PROXY) {
            Some(value) => parse_bool(env::USE_PROXY, &value)?,
            None => true,
        };

        let mode = match lookup(env::PROXY_MODE) {
            Some(value) => value.parse()?,
            None if enabled => {
                return Err(RecplayError::ConfigError(format!(
                    "{} must be set when the proxy is enabled",
                    env::PROXY_MODE
                )))
            }
            None => Mode::Live,
        };

        let mut proxy = ProxyEndpoint::new(mode);

        if let Some(host) = lookup(env::PROXY_HOST) {
            proxy.host = host;
        }

        if let Some(port) = lookup(env::PROXY_PORT) {
            proxy.port = port.trim().parse().map_err(|e| {
                RecplayError::ConfigError(format!("Invalid {} '{port}': {e}", env::PROXY_PORT))
            })?;
        }

        if let Some(scheme) = lookup(env::PROXY_SCHEME) {
            proxy.scheme = scheme.parse()?;
        }

        let recording_root =
            absolute_root(&lookup(env::RECORDING_ROOT).map_or_else(default_root, PathBuf::from))?;

        let config = Self {
            enabled,
            proxy,
            recording_root,
        };

        config.validate()?;
        Ok(config)
    }

    /// Whether sessions should go through the proxy
    #[must_use]
    pub fn routes_through_proxy(&self) -> bool {
        self.enabled && !self.proxy.mode.is_live()
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        self.proxy.validate()?;

        if self.recording_root.as_os_str().is_empty() {
            return Err(RecplayError::ConfigError(
                "Recording root cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Environment variable names read by [`Config::from_lookup`]
pub mod env {
    /// Whether to route through the proxy (`true`/`false`)
    pub const USE_PROXY: &str = "USE_PROXY";
    /// record, playback or live
    pub const PROXY_MODE: &str = "PROXY_MODE";
    /// Proxy host
    pub const PROXY_HOST: &str = "PROXY_HOST";
    /// Proxy port
    pub const PROXY_PORT: &str = "PROXY_PORT";
    /// http or https
    pub const PROXY_SCHEME: &str = "PROXY_SCHEME";
    /// Root directory for recordings
    pub const RECORDING_ROOT: &str = "RECORDING_ROOT";
}

/// Parse an env file made of `KEY VALUE` lines
///
/// Lines that do not split into exactly two space-separated fields are
/// skipped, as are `#` comments. Trailing carriage returns are dropped.
#[must_use]
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split(' ');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(key), Some(value), None) if !key.is_empty() => {
                    Some((key.to_string(), value.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// Resolve a recording root against the current directory
///
/// The proxy runs in its own working directory, so the root it is sent
/// must be absolute. `.` components are dropped.
///
/// # Errors
///
/// Returns error if the current directory cannot be read
pub fn absolute_root(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Ok(path
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "t" => Ok(true),
        "false" | "0" | "f" => Ok(false),
        other => Err(RecplayError::ConfigError(format!(
            "Invalid boolean for {key}: '{other}'"
        ))),
    }
}
