#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_STORAGE_DIR: &str = "app/videos";
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://ytdlapi.onrender.com/videos/";
pub const DEFAULT_EXPIRY_HOURS: u64 = 24;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
/// Upper bounds for the two timing knobs; anything larger falls back to the
/// default.
pub const MAX_EXPIRY_HOURS: u64 = 24 * 365 * 10;
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 60 * 60 * 24 * 30;
const SECS_PER_HOUR: u64 = 60 * 60;

const STORAGE_DIR_KEY: &str = "TUBEDROP_STORAGE_DIR";
const PUBLIC_BASE_URL_KEY: &str = "TUBEDROP_PUBLIC_BASE_URL";
const HOST_KEY: &str = "TUBEDROP_HOST";
const PORT_KEY: &str = "TUBEDROP_PORT";
const EXPIRY_HOURS_KEY: &str = "TUBEDROP_EXPIRY_HOURS";
const SWEEP_INTERVAL_KEY: &str = "TUBEDROP_SWEEP_INTERVAL_SECS";
const YTDLP_BIN_KEY: &str = "TUBEDROP_YTDLP_BIN";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    pub host: String,
    pub port: u16,
    pub expiry: Duration,
    pub sweep_interval: Duration,
    pub ytdlp_bin: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub storage_dir: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub env_path: Option<PathBuf>,
}

/// Builds the runtime configuration. Precedence, highest first: explicit
/// overrides, process environment, the `.env` file, built-in defaults.
pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    Ok(build_runtime_config_with_overrides(
        &file_vars,
        env_var_string,
        overrides,
    ))
}

#[cfg(test)]
fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> RuntimeConfig {
    build_runtime_config_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> RuntimeConfig {
    let lookup = |key: &str| lookup_value(key, file_vars, &env_lookup);

    let storage_dir = overrides
        .storage_dir
        .or_else(|| lookup(STORAGE_DIR_KEY).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    let public_base_url = non_blank(overrides.public_base_url)
        .or_else(|| lookup(PUBLIC_BASE_URL_KEY))
        .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string());
    let host = non_blank(overrides.host)
        .or_else(|| lookup(HOST_KEY))
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = overrides
        .port
        .or_else(|| lookup(PORT_KEY).and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let expiry_secs = lookup(EXPIRY_HOURS_KEY)
        .and_then(|value| parse_bounded(&value, MAX_EXPIRY_HOURS))
        .unwrap_or(DEFAULT_EXPIRY_HOURS)
        .checked_mul(SECS_PER_HOUR)
        .unwrap_or(DEFAULT_EXPIRY_HOURS * SECS_PER_HOUR);
    let sweep_secs = lookup(SWEEP_INTERVAL_KEY)
        .and_then(|value| parse_bounded(&value, MAX_SWEEP_INTERVAL_SECS))
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    let ytdlp_bin = lookup(YTDLP_BIN_KEY)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(crate::ytdlp::DEFAULT_YTDLP_BIN));

    RuntimeConfig {
        storage_dir,
        public_base_url,
        host,
        port,
        expiry: Duration::from_secs(expiry_secs),
        sweep_interval: Duration::from_secs(sweep_secs),
        ytdlp_bin,
    }
}

/// Parses a positive integer no larger than `max`.
fn parse_bounded(value: &str, max: u64) -> Option<u64> {
    value
        .parse::<u64>()
        .ok()
        .filter(|parsed| (1..=max).contains(parsed))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn env_var_string(key: &str) -> Option<String> {
    non_blank(env::var(key).ok())
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| non_blank(file_vars.get(key).cloned()))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
