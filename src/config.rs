use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::{info, warn};

use crate::crypto::DEFAULT_PBKDF2_ITERATIONS;

pub const DEFAULT_STAFF_PASSWORD: &str = "emad123";
pub const DEFAULT_EMAIL_DOMAIN: &str = "emad.hmsj";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit data directory; the desktop shell falls back to the OS app data dir.
    pub data_dir: Option<PathBuf>,
    pub pbkdf2_iterations: u32,
    pub default_staff_password: String,
    pub email_domain: String,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            default_staff_password: DEFAULT_STAFF_PASSWORD.to_string(),
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self {
            data_dir: var("EMAD_DATA_DIR")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from),
            pbkdf2_iterations: try_load::<u32>(
                "EMAD_PBKDF2_ITERATIONS",
                DEFAULT_PBKDF2_ITERATIONS,
            )
            .max(1),
            default_staff_password: try_load("EMAD_DEFAULT_PASSWORD", DEFAULT_STAFF_PASSWORD.to_string()),
            email_domain: try_load("EMAD_EMAIL_DOMAIN", DEFAULT_EMAIL_DOMAIN.to_string()),
            log_filter: try_load("EMAD_LOG", DEFAULT_LOG_FILTER.to_string()),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations.max(1);
        self
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not set, using default");
    })
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value: {e}; using default: {default}");
            default
        }),
        Err(()) => default,
    }
}
