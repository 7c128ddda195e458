use crate::community::CommunityConfig;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} must be a valid {expected}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse community config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub database_url: String,
    pub community_config_path: String,
    pub dev_guild_id: Option<u64>,
    pub register_commands: bool,
    pub status_message: String,
    pub cooldown_cache_capacity: usize,
    pub message_cache_capacity: usize,
    pub community: CommunityConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> Result<Self, ConfigError> {
        let community_config_path =
            env::var("COMMUNITY_CONFIG").unwrap_or_else(|_| "community.toml".to_string());
        let community = Self::load_community(&community_config_path)?;

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| ConfigError::Missing("DISCORD_TOKEN"))?,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "data/mcb.db".to_string()),
            community_config_path,
            dev_guild_id: match env::var("DEV_GUILD_ID") {
                Ok(id) => Some(id.parse().map_err(|_| ConfigError::Invalid {
                    name: "DEV_GUILD_ID",
                    expected: "u64",
                })?),
                Err(_) => None,
            },
            register_commands: env::var("REGISTER_COMMANDS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "Watching over the community".to_string()),
            cooldown_cache_capacity: env::var("COOLDOWN_CACHE_CAPACITY")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            message_cache_capacity: env::var("MESSAGE_CACHE_CAPACITY")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .unwrap_or(5_000),
            community,
        })
    }

    /// Reads the community file if present; a missing file yields the inert defaults.
    pub fn load_community(path: &str) -> Result<CommunityConfig, ConfigError> {
        if !Path::new(path).exists() {
            warn!("Community config {} not found, using defaults", path);
            return Ok(CommunityConfig::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let community = CommunityConfig::from_toml(&content)?;
        info!("Loaded community config from {}", path);
        Ok(community)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("database_url", &self.database_url)
            .field("community_config_path", &self.community_config_path)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("status_message", &self.status_message)
            .field("cooldown_cache_capacity", &self.cooldown_cache_capacity)
            .field("message_cache_capacity", &self.message_cache_capacity)
            .finish_non_exhaustive()
    }
}

/// Discord embed field values are capped at 1024 characters
pub const EMBED_FIELD_LIMIT: usize = 1024;
/// Embed titles are capped at 256 characters
pub const EMBED_TITLE_LIMIT: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_logic() {
        env::set_var("COMMUNITY_CONFIG", "/nonexistent/community.toml");

        // 1. Test missing vars
        env::remove_var("DISCORD_TOKEN");
        let result = Config::build();
        assert!(matches!(result, Err(ConfigError::Missing("DISCORD_TOKEN"))));

        // 2. Test defaults
        env::set_var("DISCORD_TOKEN", "test_token");
        env::remove_var("DEV_GUILD_ID");
        let config = Config::build().unwrap();
        assert_eq!(config.discord_token, "test_token");
        assert_eq!(config.dev_guild_id, None);
        assert_eq!(config.community.points.daily_amount, 10);

        // 3. Test invalid guild id
        env::set_var("DEV_GUILD_ID", "not-a-number");
        assert!(matches!(
            Config::build(),
            Err(ConfigError::Invalid {
                name: "DEV_GUILD_ID",
                ..
            })
        ));
        env::set_var("DEV_GUILD_ID", "42");
        assert_eq!(Config::build().unwrap().dev_guild_id, Some(42));

        // 4. Test debug redaction
        let debug_output = format!("{:?}", Config::build().unwrap());
        assert!(!debug_output.contains("test_token"));
        assert!(debug_output.contains("[REDACTED]"));

        // Cleanup
        env::remove_var("DISCORD_TOKEN");
        env::remove_var("DEV_GUILD_ID");
        env::remove_var("COMMUNITY_CONFIG");
    }
}
