//! Configuration for the bundler core.
//!
//! A `clap::Parser` CLI flag points at a JSON config file; `serde` supplies
//! defaults for optional keys, and a `LiteralOrEnv<T>` wrapper lets secrets
//! (executor private keys) be given either literally or as a
//! `$VAR`/`${VAR}` environment reference.

use alloy_primitives::{Address, B256};
use clap::Parser;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::chain::ChainType;

#[derive(Parser, Debug)]
#[command(name = "bundler-core")]
#[command(about = "ERC-4337 bundler core: mempool, gas-price manager, sender manager")]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    pub config: PathBuf,
}

/// A config value that may be given literally or as a `$VAR` / `${VAR}`
/// environment-variable reference, resolved at deserialize time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(pub T);

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for LiteralOrEnv<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

fn parse_env_var_syntax(raw: &str) -> Option<String> {
    let var_name = raw
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .or_else(|| raw.strip_prefix('$'))?;
    std::env::var(var_name).ok()
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let resolved = parse_env_var_syntax(&raw).unwrap_or(raw);
        resolved.parse::<T>().map(LiteralOrEnv).map_err(D::Error::custom)
    }
}

impl<T> Serialize for LiteralOrEnv<T>
where
    T: fmt::Display,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// A 32-byte EVM private key, validated as 32 bytes of hex on parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmPrivateKey(pub B256);

impl FromStr for EvmPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = alloy_primitives::hex::decode(trimmed).map_err(|e| e.to_string())?;
        if bytes.len() != 32 {
            return Err(format!("expected 32-byte private key, got {} bytes", bytes.len()));
        }
        Ok(EvmPrivateKey(B256::from_slice(&bytes)))
    }
}

impl fmt::Display for EvmPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", alloy_primitives::hex::encode(self.0))
    }
}

pub type ExecutorPrivateKeys = Vec<LiteralOrEnv<EvmPrivateKey>>;

fn default_gas_price_bump() -> u64 {
    100
}

fn default_gas_price_expiry() -> usize {
    600
}

fn default_gas_price_refresh_interval_secs() -> u64 {
    10
}

fn default_max_executors() -> usize {
    8
}

/// The bundler core's configuration: one instance per `(entryPoint, chain)`
/// pair it serves.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain_id: u64,
    #[serde(default)]
    pub chain_type: ChainType,
    pub entry_point: Address,
    pub rpc_http: Url,
    /// Polygon gas station v2 endpoint, used in place of `eth_feeHistory`
    /// when `chain_type` is `Polygon` or `PolygonMumbai`.
    #[serde(default)]
    pub gas_station_http: Option<Url>,

    #[serde(default = "default_gas_price_bump")]
    pub gas_price_bump: u64,
    /// Maximum number of entries retained per gas-price history queue (not a
    /// time span, despite the name).
    #[serde(default = "default_gas_price_expiry")]
    pub gas_price_expiry: usize,
    #[serde(default = "default_gas_price_refresh_interval_secs")]
    pub gas_price_refresh_interval_secs: u64,
    #[serde(default)]
    pub legacy_transactions: bool,

    #[serde(default = "default_max_executors")]
    pub max_executors: usize,
    pub executor_private_keys: ExecutorPrivateKeys,
    /// When set, the sender manager leases wallets from this Redis list
    /// instead of an in-process pool, so multiple bundler instances can
    /// share one fleet of executor wallets.
    #[serde(default)]
    pub redis_queue_endpoint: Option<LiteralOrEnv<Url>>,
}

impl Config {
    pub fn gas_price_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.gas_price_refresh_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    /// Parses CLI args, reads the configured path, and deserializes it.
    pub fn load() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::load_from_path(&args.config)
    }

    pub fn load_from_path(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn literal_or_env_parses_literal_value() {
        let _guard = ENV_LOCK.lock().unwrap();
        let valid = format!("\"0x{}\"", "11".repeat(32));
        let parsed: LiteralOrEnv<EvmPrivateKey> = serde_json::from_str(&valid).unwrap();
        assert_eq!(parsed.0.0, B256::repeat_byte(0x11));
    }

    #[test]
    fn literal_or_env_resolves_dollar_brace_syntax() {
        let _guard = ENV_LOCK.lock().unwrap();
        let key = format!("0x{}", "22".repeat(32));
        // Safety: guarded by ENV_LOCK, restored at the end of the test.
        unsafe {
            std::env::set_var("TEST_EXECUTOR_KEY", &key);
        }
        let parsed: LiteralOrEnv<EvmPrivateKey> =
            serde_json::from_str("\"${TEST_EXECUTOR_KEY}\"").unwrap();
        assert_eq!(parsed.0.0, B256::repeat_byte(0x22));
        // Safety: guarded by ENV_LOCK.
        unsafe {
            std::env::remove_var("TEST_EXECUTOR_KEY");
        }
    }

    #[test]
    fn evm_private_key_rejects_wrong_length() {
        assert!(EvmPrivateKey::from_str("0x1234").is_err());
    }

    #[test]
    fn config_load_from_path_reads_minimal_document() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("bundler-core-config-test-{:?}.json", std::thread::current().id()));
        let key = format!("0x{}", "33".repeat(32));
        let document = serde_json::json!({
            "chain_id": 137,
            "chain_type": "polygon",
            "entry_point": "0x0000000000000000000000000000000000000001",
            "rpc_http": "https://rpc.example/",
            "executor_private_keys": [key],
        });
        fs::write(&path, document.to_string()).unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.chain_id, 137);
        assert_eq!(config.gas_price_bump, 100);
        fs::remove_file(&path).ok();
    }
}
