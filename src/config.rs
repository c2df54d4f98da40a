//! Configuration management with validation and defaults
//!
//! Deployment parameters (house cut, prize ladder, entry fee policy, oracle
//! backend) live here rather than in the engine, so different deployments of
//! the same game can differ only in their TOML file.

use crate::errors::{ConfigurationError, DealResult};
use crate::games::prize_pool::PrizeLadder;
use crate::games::types::{Amount, Denomination, PlayerId};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 0.1 of a unit with 18 decimals
pub const DEFAULT_ENTRY_FEE: u64 = 100_000_000_000_000_000;

/// Complete deployment configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DealConfig {
    pub game: GameConfig,
    pub oracle: OracleConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
}

/// Whether every game costs the same or players choose their stake
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryFeeMode {
    /// `entry_fee` is the only accepted amount
    Fixed,
    /// `entry_fee` is the minimum accepted amount
    Custom,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenominationKind {
    Native,
    Token,
}

/// Game rules for this deployment
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Share of expected value offered by the banker
    pub house_percentage: u8,
    pub prize_ladder: PrizeLadder,
    pub entry_fee_mode: EntryFeeMode,
    pub entry_fee: u64,
    pub denomination: DenominationKind,
    pub token_symbol: String,
    /// Identity allowed to move house funds
    pub owner: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            house_percentage: 75,
            prize_ladder: PrizeLadder::Standard,
            entry_fee_mode: EntryFeeMode::Fixed,
            entry_fee: DEFAULT_ENTRY_FEE,
            denomination: DenominationKind::Native,
            token_symbol: "gMON".to_string(),
            owner: "house".to_string(),
        }
    }
}

impl GameConfig {
    pub fn denomination(&self) -> Denomination {
        match self.denomination {
            DenominationKind::Native => Denomination::Native,
            DenominationKind::Token => Denomination::Token {
                symbol: self.token_symbol.clone(),
            },
        }
    }

    pub fn owner_id(&self) -> PlayerId {
        PlayerId::new(self.owner.clone())
    }

    pub fn entry_fee_amount(&self) -> Amount {
        Amount::from(self.entry_fee)
    }
}

/// Oracle backend selection
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OracleBackend {
    /// Local deterministic source, fulfills synchronously
    Instant,
    /// schnorrkel VRF, fulfills asynchronously via the delivery worker
    Vrf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub backend: OracleBackend,
    /// Fee quoted per randomness request
    pub fee: u64,
    /// Entropy seed for the instant backend
    pub seed: u64,
    /// Hex-encoded 32-byte VRF secret; empty generates a fresh key
    pub vrf_secret: String,
    /// Delivery worker period for deferred backends
    pub fulfillment_interval_ms: u64,
    /// Identity allowed to push external fulfillments
    pub operator: String,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::Instant,
            fee: 0,
            seed: 0,
            vrf_secret: String::new(),
            fulfillment_interval_ms: 500,
            operator: "oracle".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// RocksDB persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "./DB/dealornot".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
        }
    }
}

impl DealConfig {
    /// 1000x top prize, 75% offers
    pub fn high_stakes() -> Self {
        Self {
            game: GameConfig {
                prize_ladder: PrizeLadder::HighStakes,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Token deposits with player-chosen stakes and a VRF oracle
    pub fn token_custom_fee() -> Self {
        Self {
            game: GameConfig {
                house_percentage: 50,
                entry_fee_mode: EntryFeeMode::Custom,
                entry_fee: 1_000_000_000_000_000,
                denomination: DenominationKind::Token,
                ..Default::default()
            },
            oracle: OracleConfig {
                backend: OracleBackend::Vrf,
                fee: 1_000_000_000_000_000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> DealResult<()> {
        if self.game.house_percentage == 0 || self.game.house_percentage > 100 {
            return Err(invalid(
                "game.house_percentage",
                self.game.house_percentage,
                "must be between 1 and 100",
            ));
        }

        if self.game.entry_fee_mode == EntryFeeMode::Fixed && self.game.entry_fee == 0 {
            return Err(invalid("game.entry_fee", 0, "fixed entry fee cannot be zero"));
        }

        if self.game.owner.is_empty() {
            return Err(ConfigurationError::MissingRequired("game.owner".to_string()).into());
        }

        if self.game.denomination == DenominationKind::Token && self.game.token_symbol.is_empty() {
            return Err(ConfigurationError::MissingRequired("game.token_symbol".to_string()).into());
        }

        if self.oracle.backend == OracleBackend::Vrf && self.oracle.fulfillment_interval_ms == 0 {
            return Err(invalid(
                "oracle.fulfillment_interval_ms",
                0,
                "deferred oracle needs a delivery interval",
            ));
        }

        if self.oracle.operator.is_empty() {
            return Err(ConfigurationError::MissingRequired("oracle.operator".to_string()).into());
        }

        if self.api.port == 0 {
            return Err(invalid("api.port", 0, "Port cannot be zero"));
        }

        if self.storage.enabled && self.storage.db_path.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.db_path".to_string()).into());
        }

        Ok(())
    }

    pub fn fulfillment_interval(&self) -> Duration {
        Duration::from_millis(self.oracle.fulfillment_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::errors::DealError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> DealResult<DealConfig> {
        let mut config = match &self.config_path {
            Some(path) => Self::load_from_file(path)?,
            None => DealConfig::default(),
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    fn load_from_file(path: &Path) -> DealResult<DealConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Save configuration to file
    pub fn save(&self, config: &DealConfig, path: &Path) -> DealResult<()> {
        let toml_string = toml::to_string_pretty(config).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, toml_string).map_err(|e| {
            ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path.display(), e))
                .into()
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String, reason: &str) -> DealResult<T> {
    value.parse().map_err(|_| {
        ConfigurationError::InvalidValue {
            field: key.to_string(),
            value,
            reason: reason.to_string(),
        }
        .into()
    })
}

/// Apply `DEALORNOT_*` environment variable overrides
fn apply_env_overrides(config: &mut DealConfig) -> DealResult<()> {
    if let Ok(value) = env::var("DEALORNOT_HOUSE_PERCENTAGE") {
        config.game.house_percentage =
            parse_env("DEALORNOT_HOUSE_PERCENTAGE", value, "Invalid percentage")?;
    }
    if let Ok(value) = env::var("DEALORNOT_ENTRY_FEE") {
        config.game.entry_fee = parse_env("DEALORNOT_ENTRY_FEE", value, "Invalid amount")?;
    }
    if let Ok(owner) = env::var("DEALORNOT_OWNER") {
        config.game.owner = owner;
    }
    if let Ok(value) = env::var("DEALORNOT_ORACLE_FEE") {
        config.oracle.fee = parse_env("DEALORNOT_ORACLE_FEE", value, "Invalid amount")?;
    }
    if let Ok(secret) = env::var("DEALORNOT_VRF_SECRET") {
        config.oracle.vrf_secret = secret;
    }
    if let Ok(host) = env::var("DEALORNOT_API_HOST") {
        config.api.host = host;
    }
    if let Ok(value) = env::var("DEALORNOT_API_PORT") {
        config.api.port = parse_env("DEALORNOT_API_PORT", value, "Invalid port number")?;
    }
    if let Ok(path) = env::var("DEALORNOT_DB_PATH") {
        config.storage.db_path = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = DealConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.game.house_percentage, 75);
        assert_eq!(config.api.port, 8080);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(DealConfig::high_stakes().validate().is_ok());
        let token = DealConfig::token_custom_fee();
        assert!(token.validate().is_ok());
        assert!(token.game.denomination().requires_allowance());
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = DealConfig::default();
        config.game.house_percentage = 0;
        assert!(config.validate().is_err());

        let mut config = DealConfig::default();
        config.game.house_percentage = 101;
        assert!(config.validate().is_err());

        let mut config = DealConfig::default();
        config.game.entry_fee = 0;
        assert!(config.validate().is_err());

        config.game.entry_fee_mode = EntryFeeMode::Custom;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_config() -> DealResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let original = DealConfig::token_custom_fee();

        ConfigLoader::new().save(&original, temp_file.path())?;
        let loaded = ConfigLoader::new().with_path(temp_file.path()).load()?;

        assert_eq!(loaded.game.entry_fee_mode, EntryFeeMode::Custom);
        assert_eq!(loaded.game.house_percentage, 50);
        assert_eq!(loaded.oracle.backend, OracleBackend::Vrf);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[game]\nprize_ladder = \"high_stakes\"\n").unwrap();
        let loaded = ConfigLoader::new().with_path(temp_file.path()).load().unwrap();
        assert_eq!(loaded.game.prize_ladder, PrizeLadder::HighStakes);
        assert_eq!(loaded.game.house_percentage, 75);
    }

    #[test]
    fn test_duration_conversions() {
        let config = DealConfig::default();
        assert_eq!(config.fulfillment_interval(), Duration::from_millis(500));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
