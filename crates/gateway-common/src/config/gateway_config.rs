//! Gateway client configuration
//!
//! Built once at startup from environment variables (and an optional `.env` file),
//! then handed to the client by value. Nothing below the binary reads the
//! environment on its own.

use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub app: AppSettings,
    pub endpoint: EndpointConfig,
    pub credential: Credential,
    pub identity: ClientIdentity,
    pub timeouts: TimeoutConfig,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// WebSocket URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    Ws,
    #[default]
    Wss,
}

impl Scheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Wss => "wss",
        }
    }
}

/// Where the gateway lives
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub scheme: Scheme,
    /// Host, optionally with `:port`
    pub addr: String,
    /// Protocol version sent as the `v` query parameter
    pub version: u8,
}

impl EndpointConfig {
    /// Full gateway URL, e.g. `wss://gateway.discord.gg/?v=6&encoding=json`
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{}://{}/?v={}&encoding=json",
            self.scheme.as_str(),
            self.addr,
            self.version
        )
    }
}

/// Authorization credential
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Client metadata announced in the identify payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl ClientIdentity {
    /// Host OS label with the client name for browser and device
    #[must_use]
    pub fn for_client(name: &str) -> Self {
        Self {
            os: env::consts::OS.to_string(),
            browser: name.to_string(),
            device: name.to_string(),
        }
    }
}

/// Connection timing knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Bound on the transport open
    pub connect: Duration,
    /// How long a graceful close waits for the server before forcing
    pub close: Duration,
    /// Periodic status log, disabled when `None`
    pub status_interval: Option<Duration>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(default_connect_timeout_ms()),
            close: Duration::from_millis(default_close_timeout_ms()),
            status_interval: None,
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "gateway-client".to_string()
}

fn default_addr() -> String {
    "gateway.discord.gg".to_string()
}

fn default_version() -> u8 {
    6
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_close_timeout_ms() -> u64 {
    1_000
}

impl GatewayConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if the credential is missing or a value does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// # Errors
    /// Returns an error if the credential is missing or a value does not parse
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("APP_NAME").unwrap_or_else(default_app_name);
        let env = match lookup("APP_ENV") {
            Some(raw) => Environment::parse(&raw)
                .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            None => Environment::default(),
        };

        let scheme = match lookup("GATEWAY_SCHEME").as_deref() {
            None | Some("wss") => Scheme::Wss,
            Some("ws") => Scheme::Ws,
            Some(other) => {
                return Err(ConfigError::InvalidValue("GATEWAY_SCHEME", other.to_string()))
            }
        };

        let token = lookup("DISCORDTOKEN")
            .or_else(|| lookup("GATEWAY_TOKEN"))
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("DISCORDTOKEN"))?;

        let fallback = ClientIdentity::for_client(&name);
        let identity = ClientIdentity {
            os: lookup("GATEWAY_CLIENT_OS").unwrap_or(fallback.os),
            browser: lookup("GATEWAY_CLIENT_BROWSER").unwrap_or(fallback.browser),
            device: lookup("GATEWAY_CLIENT_DEVICE").unwrap_or(fallback.device),
        };

        let status_interval = parse_var::<u64, _>(&lookup, "GATEWAY_STATUS_INTERVAL_MS")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            app: AppSettings { name, env },
            endpoint: EndpointConfig {
                scheme,
                addr: lookup("GATEWAY_ADDR").unwrap_or_else(default_addr),
                version: parse_var(&lookup, "GATEWAY_VERSION")?.unwrap_or_else(default_version),
            },
            credential: Credential::new(token),
            identity,
            timeouts: TimeoutConfig {
                connect: Duration::from_millis(
                    parse_var(&lookup, "GATEWAY_CONNECT_TIMEOUT_MS")?
                        .unwrap_or_else(default_connect_timeout_ms),
                ),
                close: Duration::from_millis(
                    parse_var(&lookup, "GATEWAY_CLOSE_TIMEOUT_MS")?
                        .unwrap_or_else(default_close_timeout_ms),
                ),
                status_interval,
            },
        })
    }

    /// Configuration pointing at `addr` with everything else defaulted
    #[must_use]
    pub fn new(scheme: Scheme, addr: impl Into<String>, credential: Credential) -> Self {
        let name = default_app_name();
        Self {
            identity: ClientIdentity::for_client(&name),
            app: AppSettings {
                name,
                env: Environment::default(),
            },
            endpoint: EndpointConfig {
                scheme,
                addr: addr.into(),
                version: default_version(),
            },
            credential,
            timeouts: TimeoutConfig::default(),
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
