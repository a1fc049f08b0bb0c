use std::collections::HashMap;
use std::env::{self, VarError};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_STATE_FILE: &str = "user_data.json";
pub const DEFAULT_SCRIPTS_DIR: &str = "scripts";
pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_TENANT: &str = "console";

const KEYS: &[&str] = &[
    "SUPERVISOR_STATE_FILE",
    "SUPERVISOR_SCRIPTS_DIR",
    "SUPERVISOR_INTERPRETER",
    "SUPERVISOR_SWEEP_INTERVAL_MS",
    "SUPERVISOR_TENANT",
    "ADMINS",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub state_file: PathBuf,
    pub scripts_dir: PathBuf,
    pub interpreter: PathBuf,
    pub sweep_interval: Duration,
    pub admins: Vec<String>,
    pub tenant: String,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(collect_vars(|key| env::var(key))?)
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let sweep_ms = match lookup(&vars, "SUPERVISOR_SWEEP_INTERVAL_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "SUPERVISOR_SWEEP_INTERVAL_MS",
                    value: raw.to_string(),
                })?,
            None => DEFAULT_SWEEP_INTERVAL_MS,
        };

        let admins: Vec<String> = lookup(&vars, "ADMINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Config {
            state_file: lookup(&vars, "SUPERVISOR_STATE_FILE")
                .unwrap_or(DEFAULT_STATE_FILE)
                .into(),
            scripts_dir: lookup(&vars, "SUPERVISOR_SCRIPTS_DIR")
                .unwrap_or(DEFAULT_SCRIPTS_DIR)
                .into(),
            interpreter: lookup(&vars, "SUPERVISOR_INTERPRETER")
                .unwrap_or(DEFAULT_INTERPRETER)
                .into(),
            sweep_interval: Duration::from_millis(sweep_ms),
            admins,
            tenant: lookup(&vars, "SUPERVISOR_TENANT").unwrap_or(DEFAULT_TENANT).to_string(),
        })
    }
}

/// Reads only the keys this crate knows. A non-UTF-8 value is a config error
/// rather than a panic.
fn collect_vars(
    read: impl Fn(&'static str) -> Result<String, VarError>,
) -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = HashMap::new();
    for &key in KEYS {
        match read(key) {
            Ok(value) => {
                vars.insert(key.to_string(), value);
            }
            Err(VarError::NotPresent) => {}
            Err(VarError::NotUnicode(raw)) => {
                return Err(ConfigError::Invalid {
                    key,
                    value: raw.to_string_lossy().into_owned(),
                });
            }
        }
    }
    Ok(vars)
}

fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|value| value.trim()).filter(|value| !value.is_empty())
}
