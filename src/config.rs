//! Configuration module for the market data handler
//!
//! Values are layered: built-in defaults, then an optional `market-depth.*`
//! file, then `MARKET_DEPTH_*` environment variables.

use serde::{Deserialize, Deserializer};
use std::path::Path;

use crate::error::{MarketDataError, Result};

const ENV_PREFIX: &str = "MARKET_DEPTH";
const DEFAULT_CONFIG_FILE: &str = "market-depth";
/// Binance rejects depth requests above this limit.
const MAX_SNAPSHOT_LIMIT: usize = 5000;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Trading symbols to track (e.g., ["BTCUSDT", "ETHUSDT"])
    #[serde(deserialize_with = "deserialize_symbols")]
    pub symbols: Vec<String>,

    /// WebSocket endpoint for Binance raw streams
    pub ws_endpoint: String,

    /// REST API endpoint for snapshots
    pub rest_endpoint: String,

    /// IPC socket path for publishing reports; disabled when unset
    #[serde(default)]
    pub ipc_socket_path: Option<String>,

    /// Number of levels per side requested in a snapshot
    pub depth_levels: usize,

    /// Updates kept per instrument while waiting for a snapshot
    pub buffer_capacity: usize,

    /// Period between volume reports
    pub report_interval_secs: u64,

    /// Reconnection and retry settings
    pub reconnect_delay_ms: u64,
    pub bootstrap_retry_delay_ms: u64,
    pub max_backoff_ms: u64,

    /// Listen address of the health/metrics server
    pub health_addr: String,
}

impl Config {
    /// Load configuration from defaults, `market-depth.*` and the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::build(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Load configuration from an explicit file, still honouring the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        let raw = config::Config::builder()
            .set_default("symbols", defaults.symbols.clone())?
            .set_default("ws_endpoint", defaults.ws_endpoint.clone())?
            .set_default("rest_endpoint", defaults.rest_endpoint.clone())?
            .set_default("depth_levels", defaults.depth_levels as i64)?
            .set_default("buffer_capacity", defaults.buffer_capacity as i64)?
            .set_default("report_interval_secs", defaults.report_interval_secs as i64)?
            .set_default("reconnect_delay_ms", defaults.reconnect_delay_ms as i64)?
            .set_default(
                "bootstrap_retry_delay_ms",
                defaults.bootstrap_retry_delay_ms as i64,
            )?
            .set_default("max_backoff_ms", defaults.max_backoff_ms as i64)?
            .set_default("health_addr", defaults.health_addr.clone())?
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Config = raw.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rest of the system cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(MarketDataError::ConfigError(
                "at least one symbol must be configured".to_string(),
            ));
        }
        if self.depth_levels == 0 || self.depth_levels > MAX_SNAPSHOT_LIMIT {
            return Err(MarketDataError::ConfigError(format!(
                "depth_levels must be within 1..={}, got {}",
                MAX_SNAPSHOT_LIMIT, self.depth_levels
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(MarketDataError::ConfigError(
                "buffer_capacity must be positive".to_string(),
            ));
        }
        if self.report_interval_secs == 0 {
            return Err(MarketDataError::ConfigError(
                "report_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            ws_endpoint: "wss://stream.binance.com:9443/ws".to_string(),
            rest_endpoint: "https://api.binance.com/api/v3".to_string(),
            ipc_socket_path: None,
            depth_levels: 1000,
            buffer_capacity: 1000,
            report_interval_secs: 10,
            reconnect_delay_ms: 1000,
            bootstrap_retry_delay_ms: 500,
            max_backoff_ms: 60_000,
            health_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Accepts either a list or a comma-separated string, so `MARKET_DEPTH_SYMBOLS`
/// can be set as `btcusdt, ethusdt`.
fn deserialize_symbols<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SymbolList {
        Joined(String),
        List(Vec<String>),
    }

    let raw = match SymbolList::deserialize(deserializer)? {
        SymbolList::Joined(s) => s.split(',').map(str::to_string).collect(),
        SymbolList::List(list) => list,
    };

    let mut symbols: Vec<String> = Vec::with_capacity(raw.len());
    for symbol in raw {
        let symbol = symbol.trim().to_uppercase();
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_is_valid() {
        assert_ok!(Config::default().validate());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.symbols.clear();
        assert_err!(config.validate());

        let mut config = Config::default();
        config.buffer_capacity = 0;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.depth_levels = MAX_SNAPSHOT_LIMIT + 1;
        assert_err!(config.validate());

        let mut config = Config::default();
        config.report_interval_secs = 0;
        assert_err!(config.validate());
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let file = write_config(
            r#"
            symbols = ["btcusdt", " ethusdt ", "BTCUSDT"]
            depth_levels = 5
            report_interval_secs = 2
            ipc_socket_path = "/tmp/depth.sock"
            "#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        assert_eq!(config.depth_levels, 5);
        assert_eq!(config.report_interval_secs, 2);
        assert_eq!(config.ipc_socket_path.as_deref(), Some("/tmp/depth.sock"));
        assert_eq!(config.buffer_capacity, Config::default().buffer_capacity);
    }

    #[test]
    fn test_symbols_accept_comma_separated_string() {
        let file = write_config(r#"symbols = "solusdt,bnbusdt,""#);

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.symbols, vec!["SOLUSDT", "BNBUSDT"]);
    }

    #[test]
    fn test_from_file_validates() {
        let file = write_config("buffer_capacity = 0");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(MarketDataError::ConfigError(_))
        ));
    }
}
