//! Bridge configuration: a single TOML document loaded at startup.
//!
//! Mirrors the teacher's `crate::config` pattern — a schema struct with
//! `#[derive(Deserialize)]`, `Default` impls for optional sections, and a
//! small loader that resolves the config path via CLI/env/`directories`.
//! The bridge has no feature that writes configuration back to disk, so
//! there is nothing here guarding a read-modify-write cycle; loading is a
//! single read at startup, done once before any other task runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_platform_prefix_irc() -> String {
    "I".into()
}
fn default_platform_prefix_telegram() -> String {
    "T".into()
}
fn default_platform_prefix_discord() -> String {
    "D".into()
}
fn default_max_lines() -> usize {
    5
}
fn default_system_message_window_secs() -> i64 {
    600
}
fn default_spam_base_url() -> String {
    "https://tg-cleaner.toolforge.org".into()
}
fn default_spam_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IrcConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub ssl: bool,
    pub nick: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default)]
    pub upload_long_msg: bool,
    #[serde(default = "default_platform_prefix_irc")]
    pub platform_prefix: String,
    #[serde(default = "default_system_message_window_secs")]
    pub system_message_window_secs: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NickStyle {
    Username,
    Name,
    Nickname,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_session_name")]
    pub session: String,
    pub api_id: i32,
    pub api_hash: String,
    pub bot_token: String,
    #[serde(default = "default_nick_style_username")]
    pub nick_style: NickStyle,
    #[serde(default = "default_platform_prefix_telegram")]
    pub platform_prefix: String,
}

fn default_session_name() -> String {
    "bridge".into()
}
fn default_nick_style_username() -> NickStyle {
    NickStyle::Username
}
fn default_nick_style_nickname() -> NickStyle {
    NickStyle::Nickname
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
    #[serde(default = "default_nick_style_nickname")]
    pub nick_style: NickStyle,
    #[serde(default = "default_platform_prefix_discord")]
    pub platform_prefix: String,
}

/// Backing store for the bridged-message record. The actual persistence
/// engine (Mongo in the original design) is an external collaborator; this
/// bridge embeds a SQLite file instead, so the config only needs a path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("bridge.sqlite3"),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeTopologyConfig {
    /// Each inner list is one bridged group; members relay to every other
    /// member of the same group (see `crate::topology`).
    pub groups: Vec<Vec<String>>,
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            path: None,
            level: default_log_level(),
        }
    }
}

fn default_upload_mode() -> String {
    "self".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    pub path: PathBuf,
    pub url: String,
    #[serde(default = "default_upload_mode")]
    pub upload: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("files"),
            url: String::new(),
            upload: default_upload_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpamCheckConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_spam_base_url")]
    pub base_url: String,
    #[serde(default = "default_spam_delay_ms")]
    pub delay_ms: u64,
}

impl SpamCheckConfig {
    /// Per spec.md §7: "Config missing for optional subsystems ... treat as
    /// disabled".
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    #[serde(rename = "IRC", default)]
    pub irc: Option<IrcConfig>,
    #[serde(rename = "Telegram", default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(rename = "Discord", default)]
    pub discord: Option<DiscordConfig>,
    #[serde(rename = "Store", default)]
    pub store: StoreConfig,
    #[serde(rename = "Bridge", default)]
    pub bridge: BridgeTopologyConfig,
    #[serde(rename = "Logging", default)]
    pub logging: LoggingConfig,
    #[serde(rename = "Files", default)]
    pub files: FilesConfig,
    #[serde(rename = "SpamCheck", default)]
    pub spam_check: SpamCheckConfig,
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading bridge config at {}", path.display()))?;
        let config: BridgeConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing bridge config at {}", path.display()))?;
        Ok(config)
    }
}

/// Resolves which config file to load: an explicit CLI path always wins; if
/// the default path doesn't exist in the current directory, fall back to
/// the user's XDG config directory (`~/.config/meshrelay/<name>` on Linux).
pub fn resolve_config_path(cli_path: Option<&Path>, default_name: &str) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    let cwd_default = PathBuf::from(default_name);
    if cwd_default.exists() {
        return cwd_default;
    }
    directories::ProjectDirs::from("", "", "meshrelay")
        .map(|dirs| dirs.config_dir().join(default_name))
        .unwrap_or(cwd_default)
}

/// A single filter rule loaded from the separate filter document (§6.1).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterRule {
    #[serde(default = "default_event")]
    pub event: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub fwd_from: Option<String>,
    #[serde(default = "default_true")]
    pub filter_reply: bool,
}

fn default_event() -> String {
    "send".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilterConfig {
    #[serde(default)]
    pub filters: Vec<FilterRule>,
}

impl FilterConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading filter config at {}", path.display()))?;
        let config: FilterConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing filter config at {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn write_sample(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    #[test]
    fn load_minimal_config() {
        let file = write_sample(
            r#"
            [IRC]
            host = "irc.libera.chat"
            port = 6697
            ssl = true
            nick = "bridgebot"

            [Bridge]
            groups = [["irc/#a", "telegram/100"]]
            "#,
        );

        let config = BridgeConfig::load(file.path()).unwrap();
        let irc = config.irc.expect("irc section present");
        assert_eq!(irc.host, "irc.libera.chat");
        assert_eq!(irc.platform_prefix, "I");
        assert_eq!(irc.max_lines, 5);
        assert_eq!(config.bridge.groups, vec![vec![
            "irc/#a".to_string(),
            "telegram/100".to_string()
        ]]);
        assert!(!config.spam_check.is_enabled());
    }

    #[test]
    fn spam_check_enabled_when_api_key_present() {
        let file = write_sample(
            r#"
            [Bridge]
            groups = []

            [SpamCheck]
            api_key = "secret"
            "#,
        );
        let config = BridgeConfig::load(file.path()).unwrap();
        assert!(config.spam_check.is_enabled());
        assert_eq!(config.spam_check.base_url, "https://tg-cleaner.toolforge.org");
    }
}
