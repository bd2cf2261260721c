use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENABLED_KEYS: [&str; 2] = [
    "WEATHER_AGENT_OBSERVABILITY_ENABLED",
    "WEATHER_AGENT_OBSERVABILITY",
];
const LEVEL_KEY: &str = "WEATHER_AGENT_LOG_LEVEL";
const JSON_PATH_KEY: &str = "WEATHER_AGENT_JSON_LOG_PATH";
const DEFAULT_JSON_FILE: &str = "weather-agent.logs.jsonl";

/// Where and how much the client logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    /// Install a subscriber at all.
    pub enabled: bool,
    /// `EnvFilter` directive; `RUST_LOG` or `warn` when unset.
    pub filter: Option<String>,
    /// JSON-lines log file. Console output on stderr when unset.
    pub json_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            json_path: None,
        }
    }
}

impl LogSettings {
    /// Reads settings from the process environment.
    ///
    /// - `WEATHER_AGENT_OBSERVABILITY_ENABLED` / `WEATHER_AGENT_OBSERVABILITY`: on/off switch, default on.
    /// - `WEATHER_AGENT_LOG_LEVEL`: filter directive (`info`, `weather_agent_stream=debug`, ...).
    /// - `WEATHER_AGENT_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ENABLED_KEYS
            .iter()
            .find_map(|key| lookup(*key))
            .map(|value| parse_switch(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = lookup(LEVEL_KEY).filter(|level| !level.trim().is_empty());
        let json_path = lookup(JSON_PATH_KEY)
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self {
            enabled,
            filter,
            json_path,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.filter
            .as_deref()
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn"))
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log path into the directory and file name the appender wants.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_JSON_FILE)
        .to_string();
    (dir, file)
}

/// Installs logging from [`LogSettings::from_env`], once per process.
pub fn init_observability() {
    init_observability_with(LogSettings::from_env());
}

/// Installs logging from explicit settings. Only the first call in a process
/// has any effect; a subscriber installed elsewhere is left in place.
pub fn init_observability_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let json_layer = settings.json_path.as_deref().map(|path| {
            let (dir, file) = split_log_path(path);
            let _ = std::fs::create_dir_all(&dir);
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(tracing_appender::rolling::never(dir, file))
        });
        // Console output stays on stderr; stdout carries the reply.
        let console_layer = json_layer.is_none().then(|| {
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
        });

        let _ = tracing_subscriber::registry()
            .with(settings.env_filter())
            .with(json_layer)
            .with(console_layer)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn switch_accepts_common_spellings() {
        assert_eq!(parse_switch(" YES "), Some(true));
        assert_eq!(parse_switch("off"), Some(false));
        assert_eq!(parse_switch("maybe"), None);
    }

    #[test]
    fn empty_environment_logs_to_console() {
        assert_eq!(settings_from(&[]), LogSettings::default());
    }

    #[test]
    fn first_enabled_key_wins_and_garbage_means_on() {
        let off = settings_from(&[
            ("WEATHER_AGENT_OBSERVABILITY_ENABLED", "no"),
            ("WEATHER_AGENT_OBSERVABILITY", "yes"),
        ]);
        assert!(!off.enabled);
        assert!(settings_from(&[("WEATHER_AGENT_OBSERVABILITY", "sure")]).enabled);
    }

    #[test]
    fn level_and_json_path_are_read() {
        let settings = settings_from(&[
            ("WEATHER_AGENT_LOG_LEVEL", "debug"),
            ("WEATHER_AGENT_JSON_LOG_PATH", "logs/agent.jsonl"),
        ]);
        assert_eq!(settings.filter.as_deref(), Some("debug"));
        assert_eq!(settings.json_path, Some(PathBuf::from("logs/agent.jsonl")));
    }

    #[test]
    fn log_path_splits_into_dir_and_file() {
        assert_eq!(
            split_log_path(Path::new("logs/agent.jsonl")),
            (PathBuf::from("logs"), "agent.jsonl".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("agent.jsonl")),
            (PathBuf::from("."), "agent.jsonl".to_string())
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_observability_with(LogSettings {
            enabled: false,
            ..LogSettings::default()
        });
        init_observability();
    }
}
