//! Runtime configuration: JSON file (optional) plus environment overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agrochain_billing::PriceTable;
use agrochain_core::FarmerId;
use agrochain_harvest::{DuplicateInvoicePolicy, Farmer};
use agrochain_infra::RetryPolicy;
use agrochain_observability::LoggingConfig;

/// Names the JSON configuration file.
pub const CONFIG_ENV: &str = "AGROCHAIN_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {var}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry and timing settings shared by every emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    pub poll_interval_ms: u64,
    pub callback_timeout_ms: u64,
    /// In-flight deliveries older than this are attempted again.
    pub claim_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            jitter: 0.1,
            poll_interval_ms: 100,
            callback_timeout_ms: 5_000,
            claim_timeout_ms: 300_000,
        }
    }
}

impl DeliveryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_jitter(self.jitter)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_millis(self.claim_timeout_ms)
    }
}

/// Supply item created at startup if missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplySeed {
    pub name: String,
    pub stock: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub harvest_addr: SocketAddr,
    pub supply_addr: SocketAddr,
    pub billing_addr: SocketAddr,
    /// Snapshot directory; in-memory stores when absent.
    pub data_dir: Option<PathBuf>,
    /// Base URL of the harvest service for billing callbacks; in-process when absent.
    pub harvest_callback_url: Option<String>,
    pub allow_negative_stock: bool,
    pub duplicate_invoice_policy: DuplicateInvoicePolicy,
    pub prices: PriceTable,
    pub delivery: DeliveryConfig,
    pub farmers: Vec<Farmer>,
    pub supplies: Vec<SupplySeed>,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            harvest_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            supply_addr: SocketAddr::from(([0, 0, 0, 0], 8082)),
            billing_addr: SocketAddr::from(([0, 0, 0, 0], 8083)),
            data_dir: None,
            harvest_callback_url: None,
            allow_negative_stock: false,
            duplicate_invoice_policy: DuplicateInvoicePolicy::default(),
            prices: PriceTable::default(),
            delivery: DeliveryConfig::default(),
            farmers: default_farmers(),
            supplies: vec![
                SupplySeed {
                    name: "Fertilizante NPK".to_string(),
                    stock: 500.0,
                },
                SupplySeed {
                    name: "Semilla Arroz Oro".to_string(),
                    stock: 200.0,
                },
            ],
            logging: LoggingConfig::default(),
        }
    }
}

fn default_farmers() -> Vec<Farmer> {
    vec![
        Farmer::new(
            FarmerId::from_uuid(Uuid::from_u128(0x0192_0000_0000_7000_8000_0000_0000_0001)),
            "Juan Pérez",
        ),
        Farmer::new(
            FarmerId::from_uuid(Uuid::from_u128(0x0192_0000_0000_7000_8000_0000_0000_0002)),
            "María Gómez",
        ),
    ]
}

impl AppConfig {
    /// Load from `AGROCHAIN_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::from_sources(file.as_deref(), |var| std::env::var(var).ok())
    }

    pub fn from_sources(
        file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = env("ALLOW_NEGATIVE_STOCK") {
            self.allow_negative_stock = parse_bool("ALLOW_NEGATIVE_STOCK", &value)?;
        }
        if let Some(value) = env("HARVEST_CALLBACK_URL") {
            let value = value.trim();
            self.harvest_callback_url = (!value.is_empty()).then(|| value.to_string());
        }
        if let Some(value) = env("AGROCHAIN_DATA_DIR") {
            let value = value.trim();
            self.data_dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = env("HARVEST_ADDR") {
            self.harvest_addr = parse_addr("HARVEST_ADDR", &value)?;
        }
        if let Some(value) = env("SUPPLY_ADDR") {
            self.supply_addr = parse_addr("SUPPLY_ADDR", &value)?;
        }
        if let Some(value) = env("BILLING_ADDR") {
            self.billing_addr = parse_addr("BILLING_ADDR", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prices
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.delivery.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "delivery.maxAttempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.delivery.jitter) {
            return Err(ConfigError::Invalid(
                "delivery.jitter must be between 0 and 1".to_string(),
            ));
        }
        if self.delivery.claim_timeout_ms <= self.delivery.callback_timeout_ms {
            return Err(ConfigError::Invalid(
                "delivery.claimTimeoutMs must exceed delivery.callbackTimeoutMs".to_string(),
            ));
        }
        if let Some(url) = &self.harvest_callback_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "harvestCallbackUrl must be an http(s) URL, got {url}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_addr(var: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::Env {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
