//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CAJA_DB_PATH=/srv/caja/caja.db                                     │
//! │     CAJA_TX_TIMEOUT_MS=3000                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/caja/caja.toml (Linux)                                   │
//! │     ~/Library/Application Support/mx.caja.caja/caja.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     16% tax, MXN, 5 s transactions, 3 retries                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/caja/caja.db"
//! max_connections = 5
//! busy_timeout_ms = 2000
//!
//! [sales]
//! tax_rate_bps = 1600
//! currency = "MXN"
//!
//! [transactions]
//! timeout_ms = 5000
//! max_retries = 3
//! initial_backoff_ms = 50
//! max_backoff_ms = 1000
//!
//! [listing]
//! page_size = 50
//! ```

use caja_core::validation::validate_tax_rate_bps;
use caja_core::TaxRate;
use caja_db::DbConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::retry::RetryPolicy;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on the SQLite lock.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    2000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    /// Tax rate in basis points applied to tax-exclusive catalog prices.
    #[serde(default = "default_tax_rate")]
    pub tax_rate_bps: u32,

    /// ISO 4217 code, informational.
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_tax_rate() -> u32 {
    TaxRate::IVA.bps()
}

fn default_currency() -> String {
    "MXN".to_string()
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            tax_rate_bps: default_tax_rate(),
            currency: default_currency(),
        }
    }
}

/// Bounds on every persistence operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSettings {
    /// Per-attempt timeout.
    #[serde(default = "default_tx_timeout")]
    pub timeout_ms: u64,

    /// Additional attempts after a retryable failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_tx_timeout() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    50
}
fn default_max_backoff() -> u64 {
    1000
}

impl Default for TransactionSettings {
    fn default() -> Self {
        TransactionSettings {
            timeout_ms: default_tx_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSettings {
    /// Rows fetched per page by pending-shift and unconciliated listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    50
}

impl Default for ListingSettings {
    fn default() -> Self {
        ListingSettings {
            page_size: default_page_size(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sales: SalesSettings,

    #[serde(default)]
    pub transactions: TransactionSettings,

    #[serde(default)]
    pub listing: ListingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (caja.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> EngineResult<()> {
        validate_tax_rate_bps(self.sales.tax_rate_bps)?;

        let currency = &self.sales.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(EngineError::Config(format!(
                "currency must be a 3-letter ISO code, got '{}'",
                currency
            )));
        }

        if self.transactions.timeout_ms == 0 {
            return Err(EngineError::Config(
                "transactions.timeout_ms must be greater than 0".into(),
            ));
        }

        if self.transactions.initial_backoff_ms > self.transactions.max_backoff_ms {
            return Err(EngineError::Config(
                "initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        if self.listing.page_size == 0 {
            return Err(EngineError::Config(
                "listing.page_size must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CAJA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(bps) = std::env::var("CAJA_TAX_RATE_BPS") {
            match bps.parse::<u32>() {
                Ok(v) => self.sales.tax_rate_bps = v,
                Err(_) => warn!(value = %bps, "Ignoring invalid CAJA_TAX_RATE_BPS"),
            }
        }

        if let Ok(currency) = std::env::var("CAJA_CURRENCY") {
            self.sales.currency = currency.to_uppercase();
        }

        if let Ok(ms) = std::env::var("CAJA_TX_TIMEOUT_MS") {
            if let Ok(v) = ms.parse::<u64>() {
                debug!(timeout_ms = v, "Overriding transaction timeout from environment");
                self.transactions.timeout_ms = v;
            }
        }

        if let Ok(n) = std::env::var("CAJA_MAX_RETRIES") {
            if let Ok(v) = n.parse::<u32>() {
                self.transactions.max_retries = v;
            }
        }

        if let Ok(ms) = std::env::var("CAJA_INITIAL_BACKOFF_MS") {
            if let Ok(v) = ms.parse::<u64>() {
                self.transactions.initial_backoff_ms = v;
            }
        }

        if let Ok(ms) = std::env::var("CAJA_MAX_BACKOFF_MS") {
            if let Ok(v) = ms.parse::<u64>() {
                self.transactions.max_backoff_ms = v;
            }
        }

        if let Ok(size) = std::env::var("CAJA_PAGE_SIZE") {
            if let Ok(v) = size.parse::<u32>() {
                self.listing.page_size = v;
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("mx", "caja", "caja")
    }

    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("caja.toml"))
    }

    // =========================================================================
    // Derived settings
    // =========================================================================

    /// Configured database path, else `<data dir>/caja.db`, else `./caja.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("caja.db")))
            .unwrap_or_else(|| PathBuf::from("caja.db"))
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_path())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.sales.tax_rate_bps)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.transactions.timeout_ms),
            max_retries: self.transactions.max_retries,
            initial_backoff: Duration::from_millis(self.transactions.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.transactions.max_backoff_ms),
        }
    }
}
