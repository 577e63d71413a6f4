use serde::{Deserialize, Serialize};
use std::fs;

use crate::cache::SNAPSHOT_TTL_SECONDS;
use crate::rates::RATE_TTL_SECONDS;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    /// Without a URL the service runs on the in-memory store (dev/mock)
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub pg_max_connections: Option<u32>,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub snapshot_ttl_secs: Option<u64>,
    #[serde(default)]
    pub rails: RailsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RatesConfig {
    /// Rate service GraphQL endpoint; unset = fixed-rate provider
    pub endpoint: Option<String>,
    #[serde(default)]
    pub secret_key: String,
    pub ttl_secs: u64,
    /// Local units per stable unit, used by the fixed provider
    pub fixed_local_per_stable: String,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            secret_key: String::new(),
            ttl_secs: RATE_TTL_SECONDS,
            fixed_local_per_stable: "1600".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RailsConfig {
    #[serde(default)]
    pub mock: MockRailConfig,
    #[serde(default)]
    pub card: Option<CardRailConfig>,
    #[serde(default)]
    pub agent: Option<AgentRailConfig>,
    #[serde(default)]
    pub chain: Option<ChainRailConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MockRailConfig {
    pub enabled: bool,
    pub webhook_secret: String,
}

impl Default for MockRailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_secret: "whsec_mock".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CardRailConfig {
    pub base_url: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentRailConfig {
    pub endpoint: String,
    pub secret_key: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Webhook source-IP allowlist
    #[serde(default)]
    pub allowed_sources: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChainRailConfig {
    pub rpc_url: String,
    pub min_confirmations: u64,
    pub webhook_secret: String,
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {config_path}: {e}"))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn snapshot_ttl_secs(&self) -> u64 {
        self.snapshot_ttl_secs.unwrap_or(SNAPSHOT_TTL_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses() {
        let yaml = r#"
log_level: info
log_dir: logs
log_file: wallet.log
use_json: false
rotation: daily
server:
  host: 0.0.0.0
  port: 8080
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.postgres_url.is_none());
        assert!(config.rails.mock.enabled);
        assert_eq!(config.rates.ttl_secs, RATE_TTL_SECONDS);
    }

    #[test]
    fn test_rails_config_parses() {
        let yaml = r#"
log_level: info
log_dir: logs
log_file: wallet.log
use_json: true
rotation: hourly
server:
  host: 127.0.0.1
  port: 9090
postgres_url: postgres://localhost/coopwise
rails:
  mock:
    enabled: false
    webhook_secret: whsec
  card:
    base_url: https://processor.example
    secret_key: sk_card
    webhook_secret: whsec_card
  agent:
    endpoint: https://agents.example/graphql
    secret_key: sk_agent
    allowed_sources: ["203.0.113.7"]
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.rails.mock.enabled);
        assert!(config.rails.card.is_some());
        assert_eq!(
            config.rails.agent.as_ref().unwrap().allowed_sources,
            vec!["203.0.113.7"]
        );
        assert!(config.rails.chain.is_none());
    }
}
