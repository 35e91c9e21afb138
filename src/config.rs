// ⚙️ Runtime Configuration
// Everything is read from the environment with sane defaults, so a cron
// entry only needs REGTRACK_DATABASE to point at the right file.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Federal Register public API root
pub const DEFAULT_API_BASE: &str = "https://www.federalregister.gov/api/v1";

/// Documents requested per sync run
pub const DEFAULT_BATCH_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite database file (":memory:" for a throwaway store)
    pub database_path: PathBuf,

    /// Upstream API root, without trailing slash
    pub api_base: String,

    /// Page size requested from the upstream source per sync run
    pub batch_size: u32,

    /// Timeout enforced by the fetch client
    pub http_timeout: Duration,

    /// Address the API server binds to
    pub bind_addr: String,

    /// Page size for regulation listings
    pub items_per_page: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("regtrack.db"),
            api_base: DEFAULT_API_BASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            http_timeout: Duration::from_secs(20),
            bind_addr: "0.0.0.0:3000".to_string(),
            items_per_page: 10,
        }
    }
}

impl Config {
    /// Load configuration from `REGTRACK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup (used by tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let database_path = lookup("REGTRACK_DATABASE")
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let api_base = lookup("REGTRACK_API_BASE")
            .map(|base| base.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);

        let batch_size = parse_number(&lookup, "REGTRACK_BATCH_SIZE")?.unwrap_or(defaults.batch_size);

        let http_timeout = parse_number::<u64, _>(&lookup, "REGTRACK_HTTP_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout);

        let bind_addr = lookup("REGTRACK_BIND").unwrap_or(defaults.bind_addr);

        let items_per_page =
            parse_number(&lookup, "REGTRACK_ITEMS_PER_PAGE")?.unwrap_or(defaults.items_per_page);

        Ok(Config {
            database_path,
            api_base,
            batch_size,
            http_timeout,
            bind_addr,
            items_per_page,
        })
    }
}

fn parse_number<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config { key, value: raw }),
    }
}
