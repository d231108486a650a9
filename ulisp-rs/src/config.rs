//! Bridge configuration file parser.
//!
//! A config file is a list of `key = value` settings:
//!
//! | Key               | Default    | Meaning                                   |
//! |-------------------|------------|-------------------------------------------|
//! | `max_heap`        | `10000`    | interpreter heap bound, in cells          |
//! | `task_limit`      | `9999`     | default task-iteration limit per script   |
//! | `output_capacity` | `10485760` | output buffer size in bytes               |
//! | `answer_capacity` | `64`       | callback answer buffer size in bytes      |
//!
//! Lines starting with `;` are comments.  Unknown keys and bad values are
//! reported but do not stop the rest of the file from loading.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::warn;

pub const DEFAULT_MAX_HEAP: u32 = 10_000;
pub const DEFAULT_TASK_LIMIT: u32 = 9_999;
pub const DEFAULT_OUTPUT_CAPACITY: usize = 10 * 1024 * 1024;
pub const DEFAULT_ANSWER_CAPACITY: usize = 64;

/// Smallest answer buffer that still holds `()` and its terminator.
const MIN_ANSWER_CAPACITY: usize = 3;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Sizing and limits for script execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeConfig {
    pub max_heap: u32,
    pub task_limit: u32,
    pub output_capacity: usize,
    pub answer_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_heap: DEFAULT_MAX_HEAP,
            task_limit: DEFAULT_TASK_LIMIT,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
            answer_capacity: DEFAULT_ANSWER_CAPACITY,
        }
    }
}

impl BridgeConfig {
    /// Parse a config string on top of the defaults.
    ///
    /// Returns the config and every error found on the way.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = BridgeConfig::default();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected 'key = value', got '{line}'"),
                });
                continue;
            };

            if let Err(message) = config.apply(key.trim(), value.trim()) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        for e in &errors {
            warn!(line = e.line, "config: {}", e.message);
        }
        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "max_heap" => self.max_heap = parse_positive(key, value)?,
            "task_limit" => self.task_limit = parse_positive(key, value)?,
            "output_capacity" => self.output_capacity = parse_positive(key, value)?,
            "answer_capacity" => {
                let n: usize = parse_positive(key, value)?;
                if n < MIN_ANSWER_CAPACITY {
                    return Err(format!(
                        "answer_capacity must be at least {MIN_ANSWER_CAPACITY}, got {n}"
                    ));
                }
                self.answer_capacity = n;
            }
            _ => return Err(format!("unknown setting '{key}'")),
        }
        Ok(())
    }
}

/// Parse a strictly positive integer, allowing `_` digit separators.
fn parse_positive<T>(key: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let cleaned: String = value.chars().filter(|&c| c != '_').collect();
    match cleaned.parse::<T>() {
        Ok(n) if n != T::default() => Ok(n),
        Ok(_) => Err(format!("{key} must be greater than zero")),
        Err(_) => Err(format!("{key}: invalid number '{value}'")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
