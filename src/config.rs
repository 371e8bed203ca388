use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    /// Without a database the engine runs on the in-memory store.
    pub database_url: Option<String>,
    pub seed_path: Option<String>,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub notification_webhook_url: Option<Url>,
    pub public_rps: u32,
    pub max_violations: u32,
    pub submit_grace_seconds: i64,
    pub sweep_interval_seconds: u64,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let notification_webhook_url = match optional_env("NOTIFICATION_WEBHOOK_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| {
                Error::Config(format!("Invalid value for NOTIFICATION_WEBHOOK_URL: {}", e))
            })?),
            None => None,
        };

        let log_format = match optional_env("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => {
                return Err(Error::Config(format!("Invalid value for LOG_FORMAT: {}", other)))
            }
        };

        Ok(Self {
            server_address: optional_env("SERVER_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: optional_env("DATABASE_URL"),
            seed_path: optional_env("SEED_PATH"),
            jwt_secret: get_env("JWT_SECRET")?,
            webhook_secret: optional_env("WEBHOOK_SECRET").unwrap_or_default(),
            notification_webhook_url,
            public_rps: get_env_parse_or("PUBLIC_RPS", 20)?,
            max_violations: get_env_parse_or("MAX_VIOLATIONS", 10)?,
            submit_grace_seconds: get_env_parse_or("SUBMIT_GRACE_SECONDS", 30)?,
            sweep_interval_seconds: get_env_parse_or("SWEEP_INTERVAL_SECONDS", 60)?,
            log_format,
        })
    }
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn get_env(name: &str) -> Result<String> {
    optional_env(name).ok_or_else(|| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        None => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
