use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use supabase_sdk::{BackendError, SupabaseConfig};
use thiserror::Error;

use tracing::level_filters::LevelFilter;

use crate::logging::LogConfig;

pub const SUPABASE_URL_VAR: &str = "MITSUMORI_SUPABASE_URL";
pub const SUPABASE_KEY_VAR: &str = "MITSUMORI_SUPABASE_KEY";
pub const SEED_VAR: &str = "MITSUMORI_SEED";
pub const QUOTES_TABLE_VAR: &str = "MITSUMORI_QUOTES_TABLE";
pub const CACHE_PATH_VAR: &str = "MITSUMORI_CACHE_PATH";
pub const LOG_FILTER_VAR: &str = "MITSUMORI_LOG_FILTER";
pub const LOG_LEVEL_VAR: &str = "MITSUMORI_LOG_LEVEL";
pub const LOG_FILE_VAR: &str = "MITSUMORI_LOG_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Startup configuration of one bridge instance.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub supabase: SupabaseConfig,
    /// Opaque to the bridge; handed to the UI core through [`UiFlags`].
    pub seed: u32,
    /// `None` selects the platform data directory.
    pub cache_path: Option<PathBuf>,
    /// Used by [`crate::Bridge::launch`] to install the global subscriber.
    pub log: LogConfig,
}

/// Init flags for the UI core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiFlags {
    pub seed: u32,
    pub supabase: SupabaseFlags,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupabaseFlags {
    pub supabase_url: String,
    pub supabase_key: String,
}

impl BridgeConfig {
    /// Reads the `MITSUMORI_*` variables, after loading a `.env` file when
    /// one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let url = read(SUPABASE_URL_VAR).ok_or(ConfigError::Missing(SUPABASE_URL_VAR))?;
        let key = read(SUPABASE_KEY_VAR).ok_or(ConfigError::Missing(SUPABASE_KEY_VAR))?;
        let mut supabase = SupabaseConfig::new(&url, key.trim())?;
        if let Some(table) = read(QUOTES_TABLE_VAR) {
            supabase = supabase.with_quotes_table(table.trim());
        }

        let seed = match read(SEED_VAR) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|err| ConfigError::Invalid {
                var: SEED_VAR,
                reason: err.to_string(),
            })?,
            None => rand::random(),
        };

        let mut log = LogConfig {
            file: read(LOG_FILE_VAR).map(PathBuf::from),
            filter: read(LOG_FILTER_VAR),
            ..LogConfig::default()
        };
        if let Some(raw) = read(LOG_LEVEL_VAR) {
            log.level = raw.trim().parse::<LevelFilter>().map_err(|err| ConfigError::Invalid {
                var: LOG_LEVEL_VAR,
                reason: err.to_string(),
            })?;
        }

        Ok(Self {
            supabase,
            seed,
            cache_path: read(CACHE_PATH_VAR).map(PathBuf::from),
            log,
        })
    }

    pub fn ui_flags(&self) -> UiFlags {
        UiFlags {
            seed: self.seed,
            supabase: SupabaseFlags {
                supabase_url: self.supabase.url.as_str().trim_end_matches('/').to_string(),
                supabase_key: self.supabase.api_key.clone(),
            },
        }
    }
}
