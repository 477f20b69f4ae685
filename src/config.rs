use crate::dedup::DEFAULT_WINDOW_SECS;
use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub dedup_window: chrono::Duration,
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: load("PORT", 3001),
            database_path: env::var("APP_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/visitors.db")),
            dedup_window: chrono::Duration::seconds(load("DEDUP_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
            store_timeout: Duration::from_millis(load("STORE_TIMEOUT_MS", 5_000)),
        }
    }
}

fn load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or_else(|err| {
            warn!("invalid {key} value {value:?} ({err}), using default {default}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default {default}");
            default
        }
    }
}
