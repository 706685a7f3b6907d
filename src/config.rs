//! Configuration management for the presale SDK
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! (`PRESALE_CONFIG`, falling back to `config/presale.toml`), then `PRESALE__*`
//! environment variables. A `.env` file in the working directory is honoured.

pub mod chains;

pub use chains::{ChainDescriptor, ChainRegistry};

use crate::error::Error;
use crate::presale::pricing::{PricingSchedule, PricingTier};
use crate::presale::receipt::PollPolicy;
use crate::wallet::blocklist::Blocklist;
use bigdecimal::BigDecimal;
use config::{Config as ConfigLoader, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const ENV_PREFIX: &str = "PRESALE";
const DEFAULT_CONFIG_PATH: &str = "config/presale";

/// Network selection and RPC settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Chain the buyer intends to purchase on
    pub selected_chain_id: u64,
    /// Chain holding the aggregate tokens-sold counter
    pub canonical_chain_id: u64,
    /// Per-request timeout for direct RPC calls (seconds)
    pub rpc_timeout_secs: u64,
    /// Chain id → replacement RPC endpoint list
    pub rpc_overrides: HashMap<String, Vec<String>>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            selected_chain_id: chains::ETHEREUM,
            canonical_chain_id: chains::ETHEREUM,
            rpc_timeout_secs: 30,
            rpc_overrides: HashMap::new(),
        }
    }
}

/// One configured pricing tier (whole-token ranges, USD price as a decimal string)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSettings {
    pub label: String,
    pub range_start: u64,
    pub range_end: u64,
    pub usd_price: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    pub tiers: Vec<TierSettings>,
    pub total_supply_for_sale: u64,
    /// Holder discount in basis points (3000 = 30% off)
    pub holder_discount_bps: u32,
    /// Upward buffer applied to native-asset payment estimates
    pub native_safety_multiplier: String,
    /// Chain id → native asset USD price, overriding the registry defaults
    pub native_usd_estimates: HashMap<String, String>,
}

impl Default for PricingSettings {
    fn default() -> Self {
        let tier = |label: &str, start: u64, end: u64, price: &str| TierSettings {
            label: label.to_string(),
            range_start: start,
            range_end: end,
            usd_price: price.to_string(),
        };
        Self {
            tiers: vec![
                tier("Seed", 0, 200_000_000, "0.01"),
                tier("Early", 200_000_000, 400_000_000, "0.012"),
                tier("Growth", 400_000_000, 600_000_000, "0.015"),
                tier("Momentum", 600_000_000, 800_000_000, "0.018"),
                tier("Final", 800_000_000, 1_000_000_000, "0.02"),
            ],
            total_supply_for_sale: 1_000_000_000,
            holder_discount_bps: 3000,
            native_safety_multiplier: "1.5".to_string(),
            native_usd_estimates: HashMap::new(),
        }
    }
}

impl PricingSettings {
    /// Build the validated tier partition
    pub fn schedule(&self) -> Result<PricingSchedule, Error> {
        let tiers = self
            .tiers
            .iter()
            .map(|t| {
                let price = BigDecimal::from_str(&t.usd_price).map_err(|e| {
                    Error::Config(format!("Invalid price '{}' for tier {}: {}", t.usd_price, t.label, e))
                })?;
                Ok(PricingTier::new(
                    t.range_start as u128,
                    t.range_end as u128,
                    price,
                    &t.label,
                ))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        PricingSchedule::new(tiers, self.total_supply_for_sale as u128)
    }

    pub fn safety_multiplier(&self) -> Result<BigDecimal, Error> {
        let multiplier = BigDecimal::from_str(&self.native_safety_multiplier).map_err(|e| {
            Error::Config(format!(
                "Invalid native safety multiplier '{}': {}",
                self.native_safety_multiplier, e
            ))
        })?;
        if multiplier < BigDecimal::from(1) {
            return Err(Error::Config(format!(
                "Native safety multiplier must be at least 1, got {}",
                multiplier
            )));
        }
        Ok(multiplier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    /// Approval size in whole payment-token units
    pub ceiling_tokens: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            ceiling_tokens: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            max_attempts: 60,
        }
    }
}

impl PollingSettings {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(self.interval_ms), self.max_attempts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub target_tokens: u64,
    /// Minimum sold figure ever displayed (0 disables the floor)
    pub marketing_floor_tokens: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            target_tokens: 1_000_000_000,
            marketing_floor_tokens: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Scan incrementally from a per-buyer block checkpoint instead of full history
    pub checkpointing: bool,
    pub from_block: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Regexes matched case-insensitively against `0x`-prefixed addresses
    pub blocked_patterns: Vec<String>,
    /// Hex suffixes of known-compromised addresses
    pub blocked_suffixes: Vec<String>,
}

impl SecuritySettings {
    pub fn blocklist(&self) -> Result<Blocklist, Error> {
        Blocklist::new(&self.blocked_patterns, &self.blocked_suffixes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AbiSettings {
    /// Interface name (`IERC20`, `IERC721`, `IPresale`) → exported ABI JSON replacing the bundled one
    pub files: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (compact, pretty, full)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Complete presale client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresaleConfig {
    pub network: NetworkSettings,
    pub pricing: PricingSettings,
    pub approval: ApprovalSettings,
    pub polling: PollingSettings,
    pub progress: ProgressSettings,
    pub ledger: LedgerSettings,
    pub security: SecuritySettings,
    pub webhook: WebhookSettings,
    pub abi: AbiSettings,
    pub logging: LoggingConfig,
}

impl PresaleConfig {
    /// Load from `.env`, the config file and the environment
    pub fn load() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        let path = env::var("PRESALE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from a specific file (missing file is not an error) plus environment
    pub fn load_from(path: &str) -> Result<Self, Error> {
        let settings = ConfigLoader::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PresaleConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Chain registry with configured RPC and price overrides applied
    pub fn registry(&self) -> Result<ChainRegistry, Error> {
        let rpc_overrides = parse_chain_keys(&self.network.rpc_overrides)?;
        let estimates = parse_chain_keys(&self.pricing.native_usd_estimates)?;
        ChainRegistry::builtin()
            .with_rpc_overrides(&rpc_overrides)
            .with_native_usd_estimates(&estimates)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.network.rpc_timeout_secs)
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), Error> {
        let registry = self.registry()?;
        registry.get(self.network.selected_chain_id)?;
        registry.get(self.network.canonical_chain_id)?;

        self.pricing.schedule()?;
        self.pricing.safety_multiplier()?;
        if self.pricing.holder_discount_bps > 10_000 {
            return Err(Error::Config(format!(
                "holder_discount_bps {} exceeds 10000",
                self.pricing.holder_discount_bps
            )));
        }

        if self.polling.interval_ms == 0 || self.polling.max_attempts == 0 {
            return Err(Error::Config(
                "Polling interval and attempt count must be positive".to_string(),
            ));
        }
        if self.progress.target_tokens == 0 {
            return Err(Error::Config("Progress target must be positive".to_string()));
        }

        self.security.blocklist()?;
        Ok(())
    }
}

fn parse_chain_keys<V: Clone>(map: &HashMap<String, V>) -> Result<HashMap<u64, V>, Error> {
    map.iter()
        .map(|(key, value)| {
            key.parse::<u64>()
                .map(|id| (id, value.clone()))
                .map_err(|_| Error::Config(format!("Invalid chain id key '{}'", key)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PresaleConfig::default();
        config.validate().unwrap();
        assert_eq!(config.polling.interval_ms, 2_000);
        assert_eq!(config.polling.max_attempts, 60);
        assert_eq!(config.pricing.holder_discount_bps, 3000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presale.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[network]
selected_chain_id = 56

[network.rpc_overrides]
"56" = ["http://localhost:8545"]

[progress]
marketing_floor_tokens = 150000000

[security]
blocked_suffixes = ["dead"]
"#
        )
        .unwrap();

        let config = PresaleConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.network.selected_chain_id, 56);
        assert_eq!(config.progress.marketing_floor_tokens, 150_000_000);
        assert_eq!(config.polling.max_attempts, 60);

        let registry = config.registry().unwrap();
        assert_eq!(
            registry.get(56).unwrap().rpc_urls,
            vec!["http://localhost:8545".to_string()]
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let config = PresaleConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.network.canonical_chain_id, chains::ETHEREUM);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("presale.toml");

        let mut config = PresaleConfig::default();
        config.network.selected_chain_id = chains::POLYGON;
        config.ledger.checkpointing = true;
        config.save(&path).unwrap();

        let loaded = PresaleConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.network.selected_chain_id, chains::POLYGON);
        assert!(loaded.ledger.checkpointing);
        assert_eq!(loaded.pricing.tiers.len(), 5);
    }

    #[test]
    fn test_unknown_selected_chain_is_rejected() {
        let mut config = PresaleConfig::default();
        config.network.selected_chain_id = 31337;
        assert!(matches!(config.validate(), Err(Error::UnknownChain(31337))));
    }

    #[test]
    fn test_gapped_tiers_are_rejected() {
        let mut config = PresaleConfig::default();
        config.pricing.tiers[1].range_start += 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiplier_below_one_is_rejected() {
        let mut config = PresaleConfig::default();
        config.pricing.native_safety_multiplier = "0.9".to_string();
        assert!(config.validate().is_err());
    }
}
