//! Logging setup for applications embedding the client.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Filter used when neither `AGENTX_LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "warn,agentx_client=info,agentx_codebase=info";

const DEFAULT_LOG_FILE: &str = "agentx.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// Where and how much the client logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    /// `EnvFilter` directives.
    pub filter: String,
    /// JSONL output file; compact stdout output when unset.
    pub json_log_path: Option<PathBuf>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_LOG_FILTER.to_string(),
            json_log_path: None,
        }
    }
}

impl ObservabilitySettings {
    /// Reads the settings from the process environment.
    ///
    /// - `AGENTX_OBSERVABILITY_ENABLED` / `AGENTX_OBSERVABILITY`: on/off flag,
    ///   default on. Unrecognized values leave logging on.
    /// - `AGENTX_LOG_LEVEL`, then `RUST_LOG`: filter directives. Invalid
    ///   directives fall back to [`DEFAULT_LOG_FILTER`].
    /// - `AGENTX_JSON_LOG_PATH`: write JSONL to this file instead of stdout.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ["AGENTX_OBSERVABILITY_ENABLED", "AGENTX_OBSERVABILITY"]
            .into_iter()
            .find_map(|key| lookup(key))
            .map(|value| parse_flag(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = ["AGENTX_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let json_log_path = lookup("AGENTX_JSON_LOG_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            json_log_path,
        }
    }

    /// Directory and file name for the JSONL writer.
    fn log_file(&self) -> Option<(&Path, &str)> {
        let path = self.json_log_path.as_deref()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_LOG_FILE);
        Some((dir, file))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Installs the global subscriber from the process environment. Only the
/// first call in a process has any effect.
pub fn init_observability() {
    init_observability_with(ObservabilitySettings::from_env());
}

/// Installs the global subscriber from explicit settings. Only the first call
/// in a process has any effect; a subscriber installed by the host
/// application is left in place.
pub fn init_observability_with(settings: ObservabilitySettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = EnvFilter::try_new(&settings.filter)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let json = settings.log_file().map(|(dir, file)| {
            let _ = std::fs::create_dir_all(dir);
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(tracing_appender::rolling::never(dir, file))
        });
        let console = json.is_none().then(|| {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stdout)
        });

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(console)
            .try_init();
    });
}
