use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::secret::SecretString;

/// Environment variable that always wins over the token in the config file.
pub const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub expand: ExpandConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    #[serde(default)]
    pub token: SecretString,
    /// Treat every bot-authored message as our own and never expand it
    #[serde(default = "default_ignore_bots")]
    pub ignore_bots: bool,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: SecretString::default(),
            ignore_bots: default_ignore_bots(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpandConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_embed_color")]
    pub embed_color: u32,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            embed_color: default_embed_color(),
        }
    }
}

impl ExpandConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn default_ignore_bots() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_embed_color() -> u32 {
    0x7fffff
}

impl Config {
    /// Load from a TOML file, then apply the environment override.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.with_env_token(std::env::var(TOKEN_ENV_VAR).ok())
    }

    /// Defaults plus the token from the environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_token(std::env::var(TOKEN_ENV_VAR).ok())
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.expand.fetch_timeout_secs == 0 {
            anyhow::bail!("expand.fetch_timeout_secs must be greater than zero");
        }
        Ok(config)
    }

    fn with_env_token(mut self, env_token: Option<String>) -> Result<Self> {
        if let Some(token) = env_token.filter(|t| !t.trim().is_empty()) {
            self.discord.token = SecretString::new(token);
        }
        if self.discord.token.is_empty() {
            anyhow::bail!(
                "No bot token configured: set {} or discord.token in the config file",
                TOKEN_ENV_VAR
            );
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.discord.ignore_bots);
        assert_eq!(config.expand.fetch_timeout_secs, 10);
        assert_eq!(config.expand.embed_color, 0x7fffff);
        assert_eq!(config.expand.fetch_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
[discord]
token = "file-token"
ignore_bots = false

[expand]
fetch_timeout_secs = 3
embed_color = 0xff0000
"#,
        )
        .unwrap();
        assert_eq!(config.discord.token.reveal(), "file-token");
        assert!(!config.discord.ignore_bots);
        assert_eq!(config.expand.fetch_timeout_secs, 3);
        assert_eq!(config.expand.embed_color, 0xff0000);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::parse("[expand]\nfetch_timeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("fetch_timeout_secs"));
    }

    #[test]
    fn test_env_token_overrides_file() {
        let config = Config::parse("[discord]\ntoken = \"file-token\"\n")
            .unwrap()
            .with_env_token(Some("env-token".to_string()))
            .unwrap();
        assert_eq!(config.discord.token.reveal(), "env-token");
    }

    #[test]
    fn test_blank_env_token_keeps_file_token() {
        let config = Config::parse("[discord]\ntoken = \"file-token\"\n")
            .unwrap()
            .with_env_token(Some("   ".to_string()))
            .unwrap();
        assert_eq!(config.discord.token.reveal(), "file-token");
    }

    #[test]
    fn test_missing_token_is_error() {
        let err = Config::default().with_env_token(None).unwrap_err();
        assert!(err.to_string().contains(TOKEN_ENV_VAR));
    }

    #[test]
    fn test_debug_output_masks_token() {
        let config = Config::default()
            .with_env_token(Some("very-secret".to_string()))
            .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("*****"));
    }
}
