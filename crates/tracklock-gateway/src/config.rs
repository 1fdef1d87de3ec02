//! Environment-based gateway configuration.
//!
//! All knobs come from process environment variables:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `HOST` | Control surface bind host | `127.0.0.1` |
//! | `PORT` | Control surface bind port | `8000` |
//! | `LOCK_HOST` | Device listener bind host | value of `HOST` |
//! | `LOCK_PORT` | Device listener bind port | `21105` |
//! | `ENDPOINT` | Event collector URL | *(required)* |
//! | `ENDPOINT_AUTH_HEADER` | `Authorization` header for the collector | *(none)* |
//! | `LABELS` | Static labels `k=v,k2=v2` folded into events | *(none)* |
//! | `CRC_SECRET` | Checksum seed override, hex | `ffff` |

use tracklock_core::constants::DEFAULT_CRC_SECRET;
use tracklock_core::{Error, Result};

/// Runtime configuration for the gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Control surface bind host.
    pub control_host: String,

    /// Control surface bind port.
    pub control_port: u16,

    /// Device listener bind host.
    pub device_host: String,

    /// Device listener bind port.
    pub device_port: u16,

    /// Event collector URL.
    pub endpoint: String,

    /// Optional `Authorization` header value for the collector.
    pub endpoint_auth_header: Option<String>,

    /// Static label set folded into every event record.
    pub labels: Vec<(String, String)>,

    /// Checksum seed shared with the device fleet.
    pub crc_secret: u16,
}

impl GatewayConfig {
    /// Load the configuration from the process environment.
    ///
    /// # Errors
    /// Returns `Error::MissingConfig` when `ENDPOINT` is unset and
    /// `Error::Config` when a value fails to parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let control_host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let control_port = parse_port("PORT", lookup("PORT"), 8000)?;
        let device_host = lookup("LOCK_HOST").unwrap_or_else(|| control_host.clone());
        let device_port = parse_port("LOCK_PORT", lookup("LOCK_PORT"), 21105)?;

        let endpoint = lookup("ENDPOINT")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::MissingConfig("ENDPOINT".to_string()))?;
        let endpoint_auth_header = lookup("ENDPOINT_AUTH_HEADER").filter(|v| !v.is_empty());

        let labels = match lookup("LABELS").filter(|v| !v.is_empty()) {
            Some(raw) => parse_labels(&raw)?,
            None => Vec::new(),
        };

        let crc_secret = match lookup("CRC_SECRET").filter(|v| !v.is_empty()) {
            Some(raw) => parse_secret(&raw)?,
            None => DEFAULT_CRC_SECRET,
        };

        Ok(GatewayConfig {
            control_host,
            control_port,
            device_host,
            device_port,
            endpoint,
            endpoint_auth_header,
            labels,
            crc_secret,
        })
    }

    /// Bind address of the control surface.
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.control_host, self.control_port)
    }

    /// Bind address of the device listener.
    pub fn device_addr(&self) -> String {
        format!("{}:{}", self.device_host, self.device_port)
    }
}

fn parse_port(key: &str, value: Option<String>, default: u16) -> Result<u16> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{key} must be a port number, got {raw:?}"))),
        None => Ok(default),
    }
}

/// Parse a `k=v,k2=v2` label list.
fn parse_labels(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| Error::Config(format!("LABELS entry {pair:?} is not k=v")))
        })
        .collect()
}

/// Parse the checksum seed as hex, with or without a `0x` prefix.
fn parse_secret(raw: &str) -> Result<u16> {
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
        .map_err(|_| Error::Config(format!("CRC_SECRET must be a 16-bit hex value, got {raw:?}")))
}
