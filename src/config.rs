// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Bridge bind address | `127.0.0.1` |
//! | `PORT` | Bridge bind port | `8787` |
//! | `DATA_DIR` | Directory of the credential database | `./data` |
//! | `STORAGE_PARTITION` | Credential partition key | `default` |
//! | `IDP_AUTHORIZE_URL` | Identity provider authorization endpoint | Required |
//! | `IDP_TOKEN_URL` | Identity provider refresh endpoint | Required |
//! | `IDP_PROFILE_URL` | Identity provider profile endpoint | Optional |
//! | `IDP_CLIENT_ID` | Client id sent with authorization requests | Optional |
//! | `AUTH_REDIRECT_URI` | Callback URL registered with the provider | `http://127.0.0.1:8787/auth/callback` |
//! | `AUTH_SCOPE` | Requested scope | `openid profile email` |
//! | `BRIDGE_ALLOWED_ORIGINS` | Comma-separated browser origins allowed to call the bridge | Origin of `AUTH_REDIRECT_URI` |
//! | `FAUCET_API_URL` | Faucet backend base URL | Required |
//! | `CLAIM_COOLDOWN_SECS` | Cooldown projected after a claim | `86400` |
//! | `ELIGIBILITY_RESYNC_SECS` | Eligibility resync interval | `60` |
//! | `REFRESH_MARGIN_SECS` | Refresh credentials this long before expiry | `300` |
//! | `AUTHORIZATION_TTL_SECS` | Lifetime of a pending authorization | `600` |
//! | `HTTP_TIMEOUT_SECS` | Outbound request timeout | `15` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use url::Url;

/// Environment variable name for the credential database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// File name of the credential database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "session.redb";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PARTITION: &str = "default";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8787/auth/callback";
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// One day.
pub const DEFAULT_CLAIM_COOLDOWN_SECS: i64 = 86_400;
pub const DEFAULT_RESYNC_SECS: i64 = 60;
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 300;
pub const DEFAULT_AUTHORIZATION_TTL_SECS: i64 = 600;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

/// Upper bound for every `*_SECS` duration (366 days).
pub const MAX_DURATION_SECS: i64 = 31_622_400;

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    Missing(String),

    #[error("invalid value for `{name}`: {reason}")]
    Invalid { name: String, reason: String },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match env_optional("LOG_FORMAT").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub partition: String,
    pub authorize_url: Url,
    pub token_url: Url,
    pub profile_url: Option<Url>,
    pub client_id: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
    /// Serialized origins (`scheme://host[:port]`) browsers may call from.
    pub allowed_origins: Vec<String>,
    pub faucet_url: Url,
    pub claim_cooldown: TimeDelta,
    pub resync_interval: TimeDelta,
    pub refresh_margin: TimeDelta,
    pub authorization_ttl: TimeDelta,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", DEFAULT_HOST);
        let port: u16 = parse_or_default("PORT", DEFAULT_PORT)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| invalid("HOST", e))?;
        let redirect_uri = env_or_default("AUTH_REDIRECT_URI", DEFAULT_REDIRECT_URI);
        let allowed_origins = match env_optional("BRIDGE_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| origin_of("BRIDGE_ALLOWED_ORIGINS", entry))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![origin_of("AUTH_REDIRECT_URI", &redirect_uri)?],
        };

        Ok(Self {
            bind_addr,
            data_dir: PathBuf::from(env_or_default(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            partition: env_or_default("STORAGE_PARTITION", DEFAULT_PARTITION),
            authorize_url: url_required("IDP_AUTHORIZE_URL")?,
            token_url: url_required("IDP_TOKEN_URL")?,
            profile_url: env_optional("IDP_PROFILE_URL")
                .map(|raw| Url::parse(&raw).map_err(|e| invalid("IDP_PROFILE_URL", e)))
                .transpose()?,
            client_id: env_optional("IDP_CLIENT_ID"),
            redirect_uri,
            scope: env_or_default("AUTH_SCOPE", DEFAULT_SCOPE),
            allowed_origins,
            faucet_url: url_required("FAUCET_API_URL")?,
            claim_cooldown: seconds("CLAIM_COOLDOWN_SECS", DEFAULT_CLAIM_COOLDOWN_SECS)?,
            resync_interval: seconds("ELIGIBILITY_RESYNC_SECS", DEFAULT_RESYNC_SECS)?,
            refresh_margin: seconds("REFRESH_MARGIN_SECS", DEFAULT_REFRESH_MARGIN_SECS)?,
            authorization_ttl: seconds("AUTHORIZATION_TTL_SECS", DEFAULT_AUTHORIZATION_TTL_SECS)?,
            http_timeout: Duration::from_secs(parse_or_default(
                "HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
        })
    }

    /// Path of the credential database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn invalid(name: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_required(name: &str) -> Result<String, ConfigError> {
    env_optional(name).ok_or_else(|| ConfigError::Missing(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn url_required(name: &str) -> Result<Url, ConfigError> {
    let raw = env_required(name)?;
    Url::parse(&raw).map_err(|e| invalid(name, e))
}

/// Serialized origin of a URL, as browsers send it in `Origin`.
fn origin_of(name: &str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(name, e))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(invalid(name, format!("`{raw}` has no origin")));
    }
    Ok(origin.ascii_serialization())
}

fn parse_or_default<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(name) {
        Some(raw) => raw.parse().map_err(|e| invalid(name, e)),
        None => Ok(default),
    }
}

/// Positive number of seconds, at most [`MAX_DURATION_SECS`].
fn seconds(name: &str, default: i64) -> Result<TimeDelta, ConfigError> {
    let secs: i64 = parse_or_default(name, default)?;
    if secs <= 0 {
        return Err(invalid(name, "must be a positive number of seconds"));
    }
    if secs > MAX_DURATION_SECS {
        return Err(invalid(
            name,
            format!("must be at most {MAX_DURATION_SECS} seconds"),
        ));
    }
    TimeDelta::try_seconds(secs).ok_or_else(|| invalid(name, "out of range"))
}
