//! Configuration management for the reward distributor
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chain::BackoffConfig;

/// Default recipients per transaction, chosen to stay under the gas limit
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default gas limit for a `distribute` call
pub const DEFAULT_GAS_LIMIT: u64 = 8_000_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub finality: FinalityConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: Network,
    /// Explicit RPC endpoints, tried in order. Overrides the preset.
    #[serde(default)]
    pub rpc_urls: Vec<String>,
    pub chain_id: Option<u64>,
}

/// Known Flare-family networks
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Coston,
    Coston2,
    Songbird,
    Flare,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Coston => 16,
            Network::Coston2 => 114,
            Network::Songbird => 19,
            Network::Flare => 14,
        }
    }

    pub fn default_rpc(&self) -> &'static str {
        match self {
            Network::Coston => "https://coston-api.flare.network/ext/bc/C/rpc",
            Network::Coston2 => "https://coston2-api.flare.network/ext/bc/C/rpc",
            Network::Songbird => "https://songbird-api.flare.network/ext/bc/C/rpc",
            Network::Flare => "https://flare-api.flare.network/ext/bc/C/rpc",
        }
    }

    /// Environment variable that overrides the preset RPC endpoint
    pub fn rpc_env_var(&self) -> &'static str {
        match self {
            Network::Coston => "COSTON_RPC",
            Network::Coston2 => "COSTON2_RPC",
            Network::Songbird => "SONGBIRD_RPC",
            Network::Flare => "FLARE_RPC",
        }
    }

    /// Deployed RNat contract, where one exists
    pub fn rnat_address(&self) -> Option<&'static str> {
        match self {
            Network::Coston2 => Some("0x221D27529e7788B929E13533edc3b00ec1ac5e8A"),
            Network::Flare => Some("0x26d460c3Cf931Fb2014FA436a49e3Af08619810e"),
            Network::Coston | Network::Songbird => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

/// Which contract method a batch is encoded as
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    #[default]
    Dist,
    Rnat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionConfig {
    pub contract_address: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub call: CallKind,
    pub project_id: Option<u64>,
    #[serde(default = "default_project_id_env")]
    pub project_id_env: String,
    pub month: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_fee_history_blocks")]
    pub fee_history_blocks: u64,
    /// Blocks behind the head where the fee-history window ends
    #[serde(default = "default_fee_history_lag")]
    pub fee_history_lag: u64,
    #[serde(default = "default_history_markup")]
    pub history_markup_percent: u64,
    #[serde(default = "default_fallback_markup")]
    pub fallback_markup_percent: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            fee_history_blocks: default_fee_history_blocks(),
            fee_history_lag: default_fee_history_lag(),
            history_markup_percent: default_history_markup(),
            fallback_markup_percent: default_fallback_markup(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FinalityConfig {
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: u64,
    #[serde(default = "default_confirmation_retries")]
    pub confirmation_retries: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_escalations")]
    pub max_escalations: u32,
    pub max_wait_secs: Option<u64>,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            confirmation_blocks: default_confirmation_blocks(),
            confirmation_retries: default_confirmation_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            backoff_factor: default_backoff_factor(),
            max_escalations: default_max_escalations(),
            max_wait_secs: None,
        }
    }
}

impl FinalityConfig {
    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            base_delay: Duration::from_millis(self.poll_interval_ms),
            factor: self.backoff_factor,
            max_escalations: self.max_escalations,
            max_elapsed: self.max_wait_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Where to write the Prometheus text exposition at the end of a run
    pub textfile_path: Option<PathBuf>,
}

fn default_private_key_env() -> String {
    "PRIVATE_KEY".to_string()
}

fn default_project_id_env() -> String {
    "PROJECT_ID".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_fee_history_blocks() -> u64 {
    50
}

fn default_fee_history_lag() -> u64 {
    3
}

fn default_history_markup() -> u64 {
    200
}

fn default_fallback_markup() -> u64 {
    150
}

fn default_confirmation_blocks() -> u64 {
    2
}

fn default_confirmation_retries() -> u32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_max_escalations() -> u32 {
    8
}

impl Settings {
    /// Load settings from the given path, or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(input: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.distribution.batch_size == 0 {
            anyhow::bail!("distribution.batch_size must be at least 1");
        }
        if self.gas.history_markup_percent < 100 || self.gas.fallback_markup_percent < 100 {
            anyhow::bail!("Gas markups must be at least 100 percent");
        }
        if self.gas.fee_history_blocks == 0 {
            anyhow::bail!("gas.fee_history_blocks must be at least 1");
        }
        let factor = self.finality.backoff_factor;
        if !factor.is_finite() || factor < 1.0 {
            anyhow::bail!("finality.backoff_factor must be a finite number of at least 1.0");
        }
        if self.finality.confirmation_retries == 0 {
            anyhow::bail!("finality.confirmation_retries must be at least 1");
        }
        if self.network.rpc_urls.iter().any(|url| url.trim().is_empty()) {
            anyhow::bail!("Network {:?} has an empty RPC URL", self.network.name);
        }

        Ok(())
    }

    /// RPC endpoints in failover order
    pub fn rpc_urls(&self) -> Vec<String> {
        if !self.network.rpc_urls.is_empty() {
            return self.network.rpc_urls.clone();
        }
        let network = self.network.name;
        vec![env::var(network.rpc_env_var())
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| network.default_rpc().to_string())]
    }

    pub fn chain_id(&self) -> u64 {
        self.network
            .chain_id
            .unwrap_or_else(|| self.network.name.chain_id())
    }

    /// Contract the batches are sent to, falling back to the network's RNat deployment
    pub fn contract_address(&self) -> Result<String> {
        if let Some(address) = self
            .distribution
            .contract_address
            .as_ref()
            .filter(|a| !a.is_empty())
        {
            return Ok(address.clone());
        }
        match self.distribution.call {
            CallKind::Rnat => self
                .network
                .name
                .rnat_address()
                .map(str::to_string)
                .with_context(|| {
                    format!("No RNat deployment known for {:?}", self.network.name)
                }),
            CallKind::Dist => anyhow::bail!("distribution.contract_address is required"),
        }
    }

    /// RNat project id from config or the configured environment variable
    pub fn project_id(&self) -> Result<u64> {
        if let Some(id) = self.distribution.project_id {
            return Ok(id);
        }
        let var = &self.distribution.project_id_env;
        let raw = env::var(var).with_context(|| format!("{} env variable is required", var))?;
        raw.trim()
            .parse()
            .with_context(|| format!("{} is not a valid project id", var))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
