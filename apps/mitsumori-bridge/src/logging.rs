//! Process-wide log subscriber for embedders that do not install their own.
//!
//! [`crate::Bridge::launch`] calls [`init`] with the configured [`LogConfig`];
//! hosts that already run a `tracing` subscriber should use
//! [`crate::Bridge::from_config`] instead.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Targets emitted by this workspace. Below `info` only these are raised, the
/// HTTP stack stays at `info`.
const OWN_TARGETS: &[&str] = &["mitsumori", "mitsumori_bridge", "supabase_sdk", "quote_cache"];

#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: LevelFilter,
    /// Appends to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
    /// Full `EnvFilter` directive; wins over `level`.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            file: None,
            filter: None,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to configure logger: {0}")]
    Configure(String),
}

/// Keeps the non-blocking writer flushing for the life of the process.
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber. Once one is installed, later calls return
/// `Ok` without touching it.
pub fn init(config: &LogConfig) -> Result<(), InitError> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(config)?;
    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(config.level >= LevelFilter::TRACE)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .try_init()
        .map_err(|err| InitError::Configure(err.to_string()))?;

    let _ = GUARD.set(guard);
    tracing::debug!(
        target: "mitsumori::bridge",
        level = %config.level,
        file = ?config.file,
        "logging initialised"
    );
    Ok(())
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter, InitError> {
    let directives = match &config.filter {
        Some(filter) => filter.clone(),
        None => directives_for(config.level),
    };
    EnvFilter::try_new(&directives)
        .map_err(|err| InitError::Configure(format!("invalid filter '{directives}': {err}")))
}

fn directives_for(level: LevelFilter) -> String {
    if level <= LevelFilter::INFO {
        return level.to_string().to_lowercase();
    }
    let level = level.to_string().to_lowercase();
    OWN_TARGETS
        .iter()
        .fold(String::from("info"), |mut directives, target| {
            directives.push_str(&format!(",{target}={level}"));
            directives
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_levels_apply_globally() {
        assert_eq!(directives_for(LevelFilter::WARN), "warn");
        assert_eq!(directives_for(LevelFilter::INFO), "info");
        assert_eq!(directives_for(LevelFilter::OFF), "off");
    }

    #[test]
    fn verbose_levels_only_raise_own_targets() {
        let directives = directives_for(LevelFilter::DEBUG);
        assert!(directives.starts_with("info,"));
        assert!(directives.contains("mitsumori=debug"));
        assert!(directives.contains("supabase_sdk=debug"));
        assert!(!directives.contains("reqwest"));
    }

    #[test]
    fn explicit_filter_overrides_level() {
        let config = LogConfig {
            level: LevelFilter::TRACE,
            filter: Some("warn,mitsumori::bridge=debug".into()),
            ..LogConfig::default()
        };
        let rendered = build_filter(&config).unwrap().to_string().to_lowercase();
        assert!(rendered.contains("mitsumori::bridge=debug"));
        assert!(!rendered.contains("trace"));
    }

    #[test]
    fn invalid_filter_is_rejected_before_installing() {
        let config = LogConfig {
            filter: Some("mitsumori=loud".into()),
            ..LogConfig::default()
        };
        assert!(matches!(init(&config), Err(InitError::Configure(_))));
        assert!(GUARD.get().is_none());
    }
}
