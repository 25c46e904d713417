use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use tapestry_api::Settings;
use tapestry_core::GroupUncomplete;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "secret",
];

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TAPESTRY_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,
    #[error("TAPESTRY_JWT_SECRET must be at least {MIN_SECRET_LEN} characters")]
    WeakSecret,
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            _ => Err("expected development, staging or production".into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err("expected text or json".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub environment: Environment,
    pub token_ttl_minutes: i64,
    pub cors_origins: CorsOrigins,
    pub log_format: LogFormat,
    pub reset_ttl_minutes: i64,
    pub qr_ttl_seconds: i64,
    pub qr_url_base: String,
    pub group_uncomplete: GroupUncomplete,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("TAPESTRY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }

        let host = lookup("TAPESTRY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(&lookup, "TAPESTRY_PORT", 8000)?;
        let addr = format!("{host}:{port}")
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "TAPESTRY_HOST",
                value: host.clone(),
                reason: e.to_string(),
            })?;

        let cors_origins = match lookup("TAPESTRY_CORS_ORIGINS") {
            Some(raw) => parse_origins(&raw),
            None => CorsOrigins::List(vec!["http://localhost:3000".into()]),
        };

        Ok(Self {
            jwt_secret,
            db_path: lookup("TAPESTRY_DB_PATH")
                .unwrap_or_else(|| "tapestry.db".into())
                .into(),
            addr,
            environment: parse_or(&lookup, "TAPESTRY_ENVIRONMENT", Environment::Development)?,
            token_ttl_minutes: positive(parse_or(&lookup, "TAPESTRY_TOKEN_TTL_MINUTES", 60 * 24 * 7)?, "TAPESTRY_TOKEN_TTL_MINUTES")?,
            cors_origins,
            log_format: parse_or(&lookup, "TAPESTRY_LOG_FORMAT", LogFormat::Text)?,
            reset_ttl_minutes: positive(parse_or(&lookup, "TAPESTRY_RESET_TTL_MINUTES", 60)?, "TAPESTRY_RESET_TTL_MINUTES")?,
            qr_ttl_seconds: positive(parse_or(&lookup, "TAPESTRY_QR_TTL_SECONDS", 300)?, "TAPESTRY_QR_TTL_SECONDS")?,
            qr_url_base: lookup("TAPESTRY_QR_URL_BASE").unwrap_or_else(|| "tapestry://login".into()),
            group_uncomplete: parse_or(&lookup, "TAPESTRY_GROUP_UNCOMPLETE", GroupUncomplete::default())?,
        })
    }

    /// The subset handlers need at request time.
    pub fn settings(&self) -> Settings {
        Settings {
            jwt_secret: self.jwt_secret.clone(),
            token_ttl: Duration::minutes(self.token_ttl_minutes),
            reset_ttl: Duration::minutes(self.reset_ttl_minutes),
            qr_ttl: Duration::seconds(self.qr_ttl_seconds),
            qr_url_base: self.qr_url_base.clone(),
            expose_reset_tokens: self.environment == Environment::Development,
            group_uncomplete: self.group_uncomplete,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive(value: i64, key: &'static str) -> Result<i64, ConfigError> {
    if value <= 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be positive".into(),
        });
    }
    Ok(value)
}

fn parse_origins(raw: &str) -> CorsOrigins {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect();
    if origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}
