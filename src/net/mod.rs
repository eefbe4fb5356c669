//! Outbound connection targets and the callback-driven connection itself.

pub mod connection;

pub use connection::{Connection, ConnectionState};

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{ConfigError, NetError, ValueError};
use crate::settings::Settings;

/// Default connect timeout, seconds.
const DEFAULT_TIMEOUT_SECS: f64 = 30.0;

/// Address-family hint for outbound dials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    #[default]
    Unspec,
    V4,
    V6,
}

impl Family {
    pub fn matches(&self, addr: &SocketAddr) -> bool {
        match self {
            Family::Unspec => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Family {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspec" => Ok(Family::Unspec),
            "v4" => Ok(Family::V4),
            "v6" => Ok(Family::V6),
            other => Err(ValueError {
                input: other.to_owned(),
                wanted: "address family (unspec, v4, v6)",
            }),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Unspec => f.write_str("unspec"),
            Family::V4 => f.write_str("v4"),
            Family::V6 => f.write_str("v6"),
        }
    }
}

/// Identity of an outbound connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub family: Family,
    pub host: String,
    pub port: u16,
}

impl Target {
    /// Build a target from the `host`, `port` and `net/address_family`
    /// settings.
    ///
    /// `port` is required and its absence is reported synchronously, before
    /// any reactor interaction; `host` defaults to `localhost`.
    pub fn from_settings(settings: &Settings) -> Result<Target, ConfigError> {
        let port: u16 = settings.get("port")?;
        let host: String = settings.get_or("host", "localhost".to_owned())?;
        let family: Family = settings.get_or("net/address_family", Family::Unspec)?;
        Ok(Target { family, host, port })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Read the `net/timeout` setting (seconds), falling back to the default.
pub fn timeout_from_settings(settings: &Settings) -> Result<Duration, ConfigError> {
    let secs: f64 = settings.get_or("net/timeout", DEFAULT_TIMEOUT_SECS)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ConfigError::Invalid {
            key: "net/timeout".to_owned(),
            source: ValueError {
                input: secs.to_string(),
                wanted: "positive number of seconds",
            },
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Resolve a target to the first address matching its family hint.
pub async fn resolve(target: &Target) -> Result<SocketAddr, NetError> {
    let addrs = tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|_| NetError::DnsLookup(target.host.clone()))?;
    addrs
        .into_iter()
        .find(|addr| target.family.matches(addr))
        .ok_or_else(|| NetError::DnsLookup(target.host.clone()))
}
