use crate::error::ConfigError;
use std::{net::SocketAddr, str::FromStr, time::Duration};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_QUESTION: &str = "Which option do you like best?";
const DEFAULT_OPTIONS: &str = "Option A,Option B,Option C";

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the service keeps tallies in memory.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub question: String,
    /// Option texts used to seed an empty store.
    pub seed_options: Vec<String>,
    pub db_max_connections: u32,
    pub ws_send_timeout: Duration,
    pub ws_ping_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let bind_addr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR)?;
        let question = lookup("POLL_QUESTION").unwrap_or_else(|| DEFAULT_QUESTION.to_string());

        let seed_options = split_options(
            &lookup("POLL_OPTIONS").unwrap_or_else(|| DEFAULT_OPTIONS.to_string()),
        );

        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", "20")?;
        let send_secs: u64 = parse_or(&lookup, "WS_SEND_TIMEOUT_SECS", "10")?;
        let ping_secs: u64 = parse_or(&lookup, "WS_PING_INTERVAL_SECS", "30")?;

        if ping_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "WS_PING_INTERVAL_SECS",
                value: ping_secs.to_string(),
            });
        }

        Ok(Config {
            database_url,
            bind_addr,
            question,
            seed_options,
            db_max_connections,
            ws_send_timeout: Duration::from_secs(send_secs),
            ws_ping_interval: Duration::from_secs(ping_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn split_options(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(String::from)
        .collect()
}
