//! Collector configuration
//!
//! Settings come from the process environment. A dotenv-style file can seed the
//! environment first; its path is the first CLI argument, else
//! `FIREHOSE_CONFIG_FILE`, else `./firehose.env` when that file exists.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use firehose_domain::backoff::BackoffConfig;
use firehose_domain::dispatch::DEFAULT_BACKLOG_WARN_THRESHOLD;
use firehose_domain::supervisor::SupervisorConfig;
use firehose_domain::window::WindowConfig;
use firehose_http::HttpStreamConfig;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "./firehose.env";
const OPTION_PREFIX: &str = "FIREHOSE_OPT_";

/// Errors detected while loading the configuration; all of them are fatal
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration file {path}: {reason}")]
    File { path: String, reason: String },
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Read `FIREHOSE_LOG_FORMAT`, falling back to text
    pub fn from_env() -> Self {
        match std::env::var("FIREHOSE_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Everything the collector needs to start
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub stream: HttpStreamConfig,
    pub supervisor: SupervisorConfig,
    /// Consumer names, in configuration order
    pub process_types: Vec<String>,
    /// Extra consumer options (`FIREHOSE_OPT_<NAME>`), keyed by lower-cased name
    pub options: HashMap<String, String>,
    pub backlog_warn_threshold: usize,
}

/// Pick the configuration file to load, if any
pub fn config_path(cli_arg: Option<String>, env_var: Option<String>) -> Option<PathBuf> {
    cli_arg
        .or(env_var)
        .map(PathBuf::from)
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        })
}

/// Seed the process environment from a dotenv-style file
///
/// Variables already set in the environment win over the file.
pub fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    dotenvy::from_path(path)
        .map(|_| ())
        .map_err(|e| ConfigError::File {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

impl CollectorConfig {
    /// Build the configuration from the current process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Build the configuration from key/value pairs
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let url = get("FIREHOSE_STREAM_URL").ok_or(ConfigError::Missing("FIREHOSE_STREAM_URL"))?;
        let stream_name =
            get("FIREHOSE_STREAM_NAME").ok_or(ConfigError::Missing("FIREHOSE_STREAM_NAME"))?;
        let username = get("FIREHOSE_USERNAME").ok_or(ConfigError::Missing("FIREHOSE_USERNAME"))?;
        let password = get("FIREHOSE_PASSWORD").ok_or(ConfigError::Missing("FIREHOSE_PASSWORD"))?;
        let file_path = get("FIREHOSE_FILE_PATH").unwrap_or("./data");

        let process_types: Vec<String> = get("FIREHOSE_PROCESS_TYPE")
            .ok_or(ConfigError::Missing("FIREHOSE_PROCESS_TYPE"))?
            .split(',')
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let mut stream = HttpStreamConfig::new(url, username, password);
        stream.keep_alive = Duration::from_secs(parse(&vars, "FIREHOSE_KEEP_ALIVE", 30u64)?);

        let window = WindowConfig {
            roll_duration: Duration::from_secs(parse(&vars, "FIREHOSE_ROLL_DURATION", 3600u64)?),
            max_buf_size: parse(&vars, "FIREHOSE_MAX_BUF_SIZE", 4 * 1024 * 1024usize)?,
            max_roll_size: parse(&vars, "FIREHOSE_MAX_ROLL_SIZE", 1024 * 1024 * 1024u64)?,
        };

        let backoff = BackoffConfig {
            factor: parse(&vars, "FIREHOSE_DELAY_FACTOR", 1.5f64)?,
            delay_min: seconds(&vars, "FIREHOSE_DELAY_MIN", 0.1)?,
            delay_max: seconds(&vars, "FIREHOSE_DELAY_MAX", 150.0)?,
            reset_after: seconds(&vars, "FIREHOSE_DELAY_RESET", 600.0)?,
        };
        if !backoff.factor.is_finite() || backoff.factor < 1.0 {
            return Err(invalid(
                "FIREHOSE_DELAY_FACTOR",
                backoff.factor,
                "must be a finite number of at least 1.0",
            ));
        }
        if backoff.delay_min > backoff.delay_max {
            return Err(invalid(
                "FIREHOSE_DELAY_MIN",
                backoff.delay_min.as_secs_f64(),
                "must not exceed FIREHOSE_DELAY_MAX",
            ));
        }

        let chunk_size: usize = parse(&vars, "FIREHOSE_CHUNK_SIZE", 128 * 1024usize)?;
        if chunk_size == 0 {
            return Err(invalid("FIREHOSE_CHUNK_SIZE", chunk_size, "must be positive"));
        }

        let mut supervisor = SupervisorConfig::new(stream_name, file_path);
        supervisor.compressed = parse_bool(&vars, "FIREHOSE_COMPRESSED", true)?;
        supervisor.chunk_size = chunk_size;
        supervisor.window = window;
        supervisor.backoff = backoff;

        let options = vars
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(OPTION_PREFIX)
                    .map(|name| (name.to_lowercase(), value.clone()))
            })
            .collect();

        Ok(Self {
            stream,
            supervisor,
            process_types,
            options,
            backlog_warn_threshold: parse(
                &vars,
                "FIREHOSE_BACKLOG_WARN",
                DEFAULT_BACKLOG_WARN_THRESHOLD,
            )?,
        })
    }
}

fn invalid(key: &'static str, value: impl Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T>(vars: &HashMap<String, String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| invalid(key, raw, &e.to_string())),
    }
}

fn seconds(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: f64,
) -> Result<Duration, ConfigError> {
    let secs: f64 = parse(vars, key, default)?;
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(key, secs, &e.to_string()))
}

fn parse_bool(
    vars: &HashMap<String, String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(invalid(key, other, "expected a boolean")),
    }
}
