//! Service settings - YAML file layered with environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::SettingsError;

/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "SYMBOLSCOUT_CONFIG";

/// Default settings file
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Prefix for environment overrides, e.g. `SYMBOLSCOUT__CHECK_INTERVAL=300`
const ENV_PREFIX: &str = "SYMBOLSCOUT";

/// Top-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub symbolscout_endpoint: String,
    pub check_interval: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub news_monitoring: NewsMonitoring,
    #[serde(default)]
    pub symbol_exclusion_strategy: Option<ExclusionStrategy>,
    #[serde(default)]
    pub symbol_list_sync: Option<ListSyncSettings>,
    #[serde(default)]
    pub notifications: Option<NotificationSettings>,
    pub passivbot: PassivbotSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// HTTP client tuning for feed and list fetches
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Which news events count; empty lists disable that criterion
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NewsMonitoring {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub title_keywords: Vec<String>,
    #[serde(default)]
    pub quote_currencies: Vec<String>,
}

/// How an exclusion set is applied to a bot config
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExclusionStrategy {
    pub remove_from_approved_coins: bool,
    pub add_to_ignored_coins: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Intersection,
    Union,
}

/// Watch-list sync mode; replaces news mode when enabled
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListSyncSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub symbolscout_watchlist: Option<ListSource>,
    #[serde(default)]
    pub remotepairlist: Option<ListSource>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ListSource {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
}

impl ListSource {
    /// Endpoint when this source is switched on
    pub fn active_endpoint(source: &Option<ListSource>) -> Option<&str> {
        source
            .as_ref()
            .filter(|s| s.enabled)
            .map(|s| s.endpoint.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub webhook_urls: Vec<String>,
    #[serde(default)]
    pub notify_on: NotifyOn,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct NotifyOn {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub config_updates: bool,
    #[serde(default)]
    pub new_news: bool,
    #[serde(default)]
    pub startup: bool,
}

impl NotifyOn {
    pub fn any(&self) -> bool {
        self.errors || self.config_updates || self.new_news || self.startup
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    #[default]
    Tmuxp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PassivbotSettings {
    #[serde(default)]
    pub passivbot_folder: String,
    #[serde(default)]
    pub mode: RestartMode,
    #[serde(default)]
    pub trading_quote_currency: Option<String>,
    #[serde(default)]
    pub symbol_exclusion_strategy: Option<ExclusionStrategy>,
    pub tmuxp: TmuxpSettings,
    #[serde(default)]
    pub passivbot_config_files: Vec<ConfigFileEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmuxpSettings {
    #[serde(default)]
    pub tmux_config_file: String,
    #[serde(default)]
    pub tmux_session_name: String,
    pub stop_command: String,
    pub start_command: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigFileEntry {
    pub config_file: String,
}

impl Settings {
    /// Load settings from a YAML file plus `SYMBOLSCOUT__*` environment overrides
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;

        info!("Configuration loaded and validated from {}", path.display());
        Ok(settings)
    }

    /// Load from the path in `SYMBOLSCOUT_CONFIG`, defaulting to `config.yml`
    pub fn from_env() -> Result<Self, SettingsError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    /// Parse and validate inline YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.check_interval == 0 {
            return Err(invalid("check_interval must be greater than zero"));
        }
        if self.http.timeout_secs == 0 {
            return Err(invalid("http.timeout_secs must be greater than zero"));
        }
        if self.http.max_attempts == 0 {
            return Err(invalid("http.max_attempts must be at least 1"));
        }
        if self.passivbot.passivbot_config_files.is_empty() {
            return Err(invalid("passivbot.passivbot_config_files must not be empty"));
        }
        if self.exclusion_strategy().is_none() {
            return Err(invalid("symbol_exclusion_strategy is required"));
        }

        match &self.symbol_list_sync {
            Some(sync) if sync.enabled => {
                for (name, source) in [
                    ("symbolscout_watchlist", &sync.symbolscout_watchlist),
                    ("remotepairlist", &sync.remotepairlist),
                ] {
                    if let Some(endpoint) = ListSource::active_endpoint(source) {
                        if endpoint.trim().is_empty() {
                            return Err(invalid(&format!(
                                "symbol_list_sync.{}.endpoint is required when enabled",
                                name
                            )));
                        }
                    }
                }
            }
            _ => {
                if self.symbolscout_endpoint.trim().is_empty() {
                    return Err(invalid("symbolscout_endpoint is required in news mode"));
                }
            }
        }

        Ok(())
    }

    /// Exclusion strategy, top-level first, then the one nested under `passivbot`
    pub fn exclusion_strategy(&self) -> Option<ExclusionStrategy> {
        self.symbol_exclusion_strategy
            .or(self.passivbot.symbol_exclusion_strategy)
    }

    /// Active list-sync settings, if list mode is on
    pub fn list_sync(&self) -> Option<&ListSyncSettings> {
        self.symbol_list_sync.as_ref().filter(|s| s.enabled)
    }

    pub fn notify_on(&self) -> NotifyOn {
        self.notifications
            .as_ref()
            .map(|n| n.notify_on)
            .unwrap_or_default()
    }

    pub fn webhook_urls(&self) -> &[String] {
        self.notifications
            .as_ref()
            .map(|n| n.webhook_urls.as_slice())
            .unwrap_or(&[])
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Bot folder with `~` and environment variables expanded
    pub fn passivbot_folder(&self) -> PathBuf {
        expand_path(&self.passivbot.passivbot_folder)
    }

    /// Target bot config files with templates and paths expanded
    pub fn target_config_files(&self) -> Vec<PathBuf> {
        let folder = self.passivbot.passivbot_folder.as_str();
        self.passivbot
            .passivbot_config_files
            .iter()
            .map(|entry| {
                expand_path(&substitute(
                    &entry.config_file,
                    &[("passivbot_folder", folder)],
                ))
            })
            .collect()
    }

    /// Stop/start commands with tmux placeholders filled in
    pub fn restart_commands(&self) -> (String, String) {
        let tmux = &self.passivbot.tmuxp;
        let config_file = expand_path(&substitute(
            &tmux.tmux_config_file,
            &[("passivbot_folder", self.passivbot.passivbot_folder.as_str())],
        ));
        let config_file = config_file.to_string_lossy().into_owned();
        let vars = [
            ("tmux_session_name", tmux.tmux_session_name.as_str()),
            ("tmux_config_file", config_file.as_str()),
            ("passivbot_folder", self.passivbot.passivbot_folder.as_str()),
        ];
        (
            substitute(&tmux.stop_command, &vars),
            substitute(&tmux.start_command, &vars),
        )
    }
}

fn invalid(message: &str) -> SettingsError {
    SettingsError::Invalid(message.to_string())
}

/// Replace `{name}` placeholders; unknown placeholders are kept
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references. Unset variables stay verbatim.
pub fn expand_path(raw: &str) -> PathBuf {
    let expanded = expand_env(raw);

    if expanded == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = expanded.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    PathBuf::from(expanded)
}

fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let value = if name.is_empty() {
            None
        } else {
            std::env::var(name).ok()
        };
        match value {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    out
}

fn default_state_file() -> String { "last_processed_state.json".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 8000 }

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
symbolscout_endpoint: "https://symbolscout.example/api/news/breaking"
check_interval: 600
news_monitoring:
  categories: ["DELISTING", "TOKEN_SWAP"]
  quote_currencies: ["USDT", "USDC"]
passivbot:
  passivbot_folder: "/opt/passivbot"
  symbol_exclusion_strategy:
    remove_from_approved_coins: true
    add_to_ignored_coins: false
  mode: "tmuxp"
  tmuxp:
    tmux_config_file: "{passivbot_folder}/tmux.yml"
    tmux_session_name: "passivbot_instances"
    stop_command: "tmux has-session -t {tmux_session_name} && tmux kill-session -t {tmux_session_name} || true"
    start_command: "tmuxp load -d {tmux_config_file}"
  passivbot_config_files:
    - config_file: "{passivbot_folder}/configs/forager/bybit_01.json"
"#;

    #[test]
    fn test_valid_settings() {
        let settings = Settings::from_yaml_str(VALID).unwrap();
        assert_eq!(settings.check_interval, 600);
        assert_eq!(settings.news_monitoring.categories.len(), 2);
        assert_eq!(settings.state_file, "last_processed_state.json");
        assert_eq!(settings.http, HttpSettings::default());
        assert!(settings.list_sync().is_none());
        assert!(!settings.notify_on().any());
    }

    #[test]
    fn test_nested_exclusion_strategy_is_used() {
        let settings = Settings::from_yaml_str(VALID).unwrap();
        assert_eq!(
            settings.exclusion_strategy(),
            Some(ExclusionStrategy {
                remove_from_approved_coins: true,
                add_to_ignored_coins: false,
            })
        );
    }

    #[test]
    fn test_non_integer_interval_rejected() {
        let yaml = VALID.replace("check_interval: 600", "check_interval: \"not an integer\"");
        assert!(matches!(
            Settings::from_yaml_str(&yaml),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let yaml = VALID.replace("check_interval: 600", "check_interval: 0");
        assert!(matches!(
            Settings::from_yaml_str(&yaml),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let yaml = format!("{}\nhttp:\n  timeout_secs: 0\n", VALID);
        assert!(matches!(
            Settings::from_yaml_str(&yaml),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_endpoint_rejected_in_news_mode() {
        let yaml = VALID.replace(
            "symbolscout_endpoint: \"https://symbolscout.example/api/news/breaking\"",
            "",
        );
        assert!(matches!(
            Settings::from_yaml_str(&yaml),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_list_sync_mode_does_not_need_news_endpoint() {
        let yaml = format!(
            "{}\nsymbol_list_sync:\n  enabled: true\n  merge_strategy: union\n  remotepairlist:\n    enabled: true\n    endpoint: \"http://pairs\"\n",
            VALID.replace(
                "symbolscout_endpoint: \"https://symbolscout.example/api/news/breaking\"",
                ""
            )
        );
        let settings = Settings::from_yaml_str(&yaml).unwrap();
        let sync = settings.list_sync().unwrap();
        assert_eq!(sync.merge_strategy, MergeStrategy::Union);
        assert_eq!(ListSource::active_endpoint(&sync.remotepairlist), Some("http://pairs"));
        assert_eq!(ListSource::active_endpoint(&sync.symbolscout_watchlist), None);
    }

    #[test]
    fn test_templates_are_substituted() {
        let settings = Settings::from_yaml_str(VALID).unwrap();
        assert_eq!(
            settings.target_config_files(),
            vec![PathBuf::from("/opt/passivbot/configs/forager/bybit_01.json")]
        );

        let (stop, start) = settings.restart_commands();
        assert_eq!(
            stop,
            "tmux has-session -t passivbot_instances && tmux kill-session -t passivbot_instances || true"
        );
        assert_eq!(start, "tmuxp load -d /opt/passivbot/tmux.yml");
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("SYMBOLSCOUT_TEST_DIR", "/data/bots");
        assert_eq!(
            expand_path("$SYMBOLSCOUT_TEST_DIR/a.json"),
            PathBuf::from("/data/bots/a.json")
        );
        assert_eq!(
            expand_path("${SYMBOLSCOUT_TEST_DIR}/b.json"),
            PathBuf::from("/data/bots/b.json")
        );
        assert_eq!(
            expand_path("$SYMBOLSCOUT_UNSET_VAR_XYZ/c.json"),
            PathBuf::from("$SYMBOLSCOUT_UNSET_VAR_XYZ/c.json")
        );
    }

    #[test]
    fn test_expand_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/passivbot"), home.join("passivbot"));
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, VALID).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.passivbot.tmuxp.tmux_session_name, "passivbot_instances");
    }

    #[test]
    fn test_env_overrides_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, VALID).unwrap();

        std::env::set_var("SYMBOLSCOUT__CHECK_INTERVAL", "300");
        let loaded = Settings::load(&path);
        std::env::remove_var("SYMBOLSCOUT__CHECK_INTERVAL");

        assert_eq!(loaded.unwrap().check_interval, 300);
    }
}
