//! CLI configuration.
//!
//! Resolved once at startup. Each value comes from the command line, then its
//! environment variable, then the TOML config file
//! (`--config` > `TALENTDESK_CONFIG` > `~/.talentdesk/config.toml`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use talentdesk_chat::ChatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Parser)]
#[command(
    name = "talentdesk",
    version,
    about = "Chat with the TalentDesk recruitment assistant"
)]
pub struct Cli {
    /// WebSocket URL of the chat agent
    #[arg(long, env = "TALENTDESK_WS_URL")]
    pub ws_url: Option<String>,

    /// Base URL of the auth service (user lookup)
    #[arg(long, env = "TALENTDESK_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Base URL of the chat service (conversations and history)
    #[arg(long, env = "TALENTDESK_CHAT_URL")]
    pub chat_url: Option<String>,

    #[arg(short, long, env = "TALENTDESK_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "TALENTDESK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Config file path
    #[arg(long, env = "TALENTDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory (logs, default config)
    #[arg(long, env = "TALENTDESK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "TALENTDESK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    ws_url: Option<String>,
    auth_url: Option<String>,
    chat_url: Option<String>,
    username: Option<String>,
    token: Option<String>,
    #[serde(default)]
    reconnect: ReconnectSection,
    #[serde(default)]
    retry: RetrySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReconnectSection {
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrySection {
    interval_ms: Option<u64>,
    max_retries: Option<u32>,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub chat: ChatConfig,
    pub auth_url: String,
    pub chat_url: String,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn resolve(cli: Cli) -> anyhow::Result<Self> {
        let data_dir = match cli.data_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("HOME directory not found")?
                .join(".talentdesk"),
        };

        let file = match &cli.config {
            Some(path) => load_file(path)?,
            None => {
                let default_path = data_dir.join("config.toml");
                if default_path.exists() {
                    load_file(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        let ws_url = required("ws-url", cli.ws_url.or(file.ws_url))?;
        let auth_url = required("auth-url", cli.auth_url.or(file.auth_url))?;
        let chat_url = required("chat-url", cli.chat_url.or(file.chat_url))?;
        let username = required("username", cli.username.or(file.username))?;
        let token = cli.token.or(file.token).unwrap_or_default();

        let mut chat = ChatConfig::new(ws_url, username, token);
        if let Some(ms) = file.reconnect.base_delay_ms {
            chat.reconnect.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.reconnect.max_delay_ms {
            chat.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(max) = file.reconnect.max_attempts {
            chat.reconnect.max_attempts = max;
        }
        if let Some(ms) = file.retry.interval_ms {
            if ms == 0 {
                bail!("retry.interval_ms must be greater than zero");
            }
            chat.retry.interval = Duration::from_millis(ms);
        }
        if let Some(max) = file.retry.max_retries {
            chat.retry.max_retries = max;
        }

        Ok(Settings {
            chat,
            auth_url,
            chat_url,
            data_dir,
            log_format: cli.log_format,
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn load_file(path: &Path) -> anyhow::Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn required(name: &str, value: Option<String>) -> anyhow::Result<String> {
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(v) => Ok(v),
        None => bail!("missing --{name} (flag, environment, or config file)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["talentdesk"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse args")
    }

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"
                ws_url = "ws://file/chat"
                auth_url = "http://file-auth"
                chat_url = "http://file-chat"
                username = "file-user"
                token = "file-token"
            "#,
        );

        let settings = Settings::resolve(cli(&[
            "--config",
            path.to_str().unwrap(),
            "--data-dir",
            dir.path().to_str().unwrap(),
            "--username",
            "flag-user",
        ]))
        .expect("resolve");

        assert_eq!(settings.chat.username, "flag-user");
        assert_eq!(settings.chat.ws_url, "ws://file/chat");
        assert_eq!(settings.chat.token, "file-token");
        assert_eq!(settings.log_dir(), dir.path().join("logs"));
    }

    #[test]
    fn default_config_lives_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            r#"
                ws_url = "ws://agent/chat"
                auth_url = "http://auth"
                chat_url = "http://chat"
                username = "alice"

                [reconnect]
                max_attempts = 3
                base_delay_ms = 250

                [retry]
                max_retries = 2
            "#,
        );

        let settings =
            Settings::resolve(cli(&["--data-dir", dir.path().to_str().unwrap()])).unwrap();

        assert_eq!(settings.chat.reconnect.max_attempts, 3);
        assert_eq!(settings.chat.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(settings.chat.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(settings.chat.retry.max_retries, 2);
        assert!(settings.chat.token.is_empty());
    }

    #[test]
    fn missing_required_value_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::resolve(cli(&[
            "--data-dir",
            dir.path().to_str().unwrap(),
            "--ws-url",
            "ws://agent/chat",
            "--auth-url",
            "http://auth",
            "--chat-url",
            "http://chat",
        ]))
        .unwrap_err();

        assert!(err.to_string().contains("--username"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "websocket = \"ws://typo\"\n");
        let err = Settings::resolve(cli(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("parsing config file"));
    }
}
