use crate::domain::types::Money;
use crate::error::{RentalError, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use rentwise_common::logging::LogFormat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "rentwise.toml";
const ENV_PREFIX: &str = "RENTWISE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RentalConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub settings: RentalSettings,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub environment: String,
    pub service_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            service_id: "rentwise-engine".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://rentwise@localhost:5432/rentwise".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Business settings consulted by pricing and invoicing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalSettings {
    /// GST percentage applied to rent, e.g. `18`
    pub gst_rate: Decimal,
    pub late_fee_per_day: Money,
}

impl Default for RentalSettings {
    fn default() -> Self {
        Self {
            gst_rate: Decimal::from(18),
            late_fee_per_day: Money::from_major(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

impl RentalConfig {
    /// Defaults, then `path` (or `rentwise.toml` when present), then `RENTWISE_*`
    /// environment variables with `__` separating sections.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(RentalConfig::default()));

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(RentalError::Configuration(format!(
                        "config file {} does not exist",
                        path.display()
                    )));
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    figment = figment.merge(Toml::file(default_path));
                }
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: RentalConfig = figment
            .extract()
            .map_err(|e| RentalError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(RentalError::Configuration(
                "database.url must not be empty".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(RentalError::Configuration(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if self.settings.gst_rate.is_sign_negative() || self.settings.gst_rate > Decimal::ONE_HUNDRED
        {
            return Err(RentalError::Configuration(format!(
                "settings.gst_rate {} must be between 0 and 100",
                self.settings.gst_rate
            )));
        }
        if self.settings.late_fee_per_day.is_negative() {
            return Err(RentalError::Configuration(format!(
                "settings.late_fee_per_day {} must not be negative",
                self.settings.late_fee_per_day
            )));
        }
        if self.notifications.queue_capacity == 0 {
            return Err(RentalError::Configuration(
                "notifications.queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generate_example() -> Result<String> {
        toml::to_string_pretty(&RentalConfig::default())
            .map_err(|e| RentalError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = RentalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings.gst_rate, dec!(18));
        assert_eq!(config.settings.late_fee_per_day, Money::from_major(100));
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RentalConfig::default();
        config.settings.gst_rate = dec!(101);
        assert!(config.validate().is_err());

        let mut config = RentalConfig::default();
        config.settings.late_fee_per_day = Money::from_major(-1);
        assert!(config.validate().is_err());

        let mut config = RentalConfig::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());

        let mut config = RentalConfig::default();
        config.notifications.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = RentalConfig::default();
        config.database.url = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(RentalError::Configuration(_))
        ));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[settings]
gst_rate = "12"
late_fee_per_day = "250.50"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = RentalConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.settings.gst_rate, dec!(12));
        assert_eq!(
            config.settings.late_fee_per_day,
            Money::from_decimal(dec!(250.50))
        );
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RentalConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(RentalError::Configuration(_))));
    }

    #[test]
    fn test_generated_example_parses_back() {
        let text = RentalConfig::generate_example().unwrap();
        let parsed: RentalConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.settings, RentalSettings::default());
    }
}
