//! Layered settings for awsq.
//!
//! Built-in defaults, then `~/.config/awsq/config.toml` (or `--config`), then
//! `AWSQ__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::backoff::BackoffPolicy;
use crate::cache::CacheRoot;
use crate::error::Result;

const DEFAULT_CONFIG: &str = r#"
[query]
output   = "json"
relative = "1h"

[poll]
floor_secs   = 3
step_secs    = 1
ceiling_secs = 30

[cache]
root = ""

[display]
color = true
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub query: QueryConfig,
    pub poll: PollConfig,
    pub cache: CacheConfig,
    pub display: DisplayConfig,
}

/// `[query]`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub output: String,
    pub relative: String,
}

/// `[poll]`
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    pub floor_secs: u64,
    pub step_secs: u64,
    pub ceiling_secs: u64,
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Empty means the temp-dir default.
    pub root: String,
}

/// `[display]`
#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    pub color: bool,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        let config = Self::builder()
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(config::Environment::with_prefix("AWSQ").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Built-in defaults only; never touches the filesystem.
    #[cfg(test)]
    pub fn defaults() -> Self {
        Self::builder()
            .build()
            .and_then(config::Config::try_deserialize)
            .expect("built-in default config must deserialize")
    }

    fn builder() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.poll.floor_secs),
            Duration::from_secs(self.poll.step_secs),
            Duration::from_secs(self.poll.ceiling_secs),
        )
    }

    pub fn cache_root(&self) -> CacheRoot {
        match self.cache.root.trim() {
            "" => CacheRoot::default_location(),
            root => CacheRoot::new(root),
        }
    }
}

fn config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("awsq")
        .join("config.toml")
}
