//! Configuration for wayfarer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::TripError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wayfarer")
}

/// Key used when running with `--dev-mode` and no cipher key configured
pub const DEV_CIPHER_KEY: &str = "dev-only-insecure-cipher-key-0123456789abcdef";

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Shared secret for decoding check-in payloads and salting receipts
    #[serde(default)]
    pub cipher_key: String,

    /// How long an issued receipt stays valid
    #[serde(default = "default_receipt_ttl")]
    pub receipt_ttl_secs: u64,

    /// Upper bound on outstanding receipts
    #[serde(default = "default_max_receipts")]
    pub max_receipts: usize,

    /// Page size for place listings
    #[serde(default = "default_page_size")]
    pub places_on_page: u32,

    /// Page size for route listings
    #[serde(default = "default_page_size")]
    pub routes_on_page: u32,
}

fn default_http_port() -> u16 {
    8080
}

fn default_receipt_ttl() -> u64 {
    600
}

fn default_max_receipts() -> usize {
    10_000
}

fn default_page_size() -> u32 {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            cipher_key: String::new(),
            receipt_ttl_secs: default_receipt_ttl(),
            max_receipts: default_max_receipts(),
            places_on_page: default_page_size(),
            routes_on_page: default_page_size(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Check values that would make the service unusable
    pub fn validate(&self) -> Result<(), TripError> {
        if self.cipher_key.is_empty() {
            return Err(TripError::Config(
                "cipher_key is required (set CIPHER_KEY or use --dev-mode)".to_string(),
            ));
        }
        if self.receipt_ttl_secs == 0 {
            return Err(TripError::Config("receipt_ttl_secs must be > 0".to_string()));
        }
        if self.max_receipts == 0 {
            return Err(TripError::Config("max_receipts must be > 0".to_string()));
        }
        if self.places_on_page == 0 || self.routes_on_page == 0 {
            return Err(TripError::Config("page sizes must be > 0".to_string()));
        }
        Ok(())
    }

    /// Get SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.storage_dir.join("wayfarer.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_need_a_key() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            cipher_key: "secret".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(r#"cipher_key = "abc""#).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.receipt_ttl_secs, 600);
        assert_eq!(config.places_on_page, 20);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            http_port: 9999,
            cipher_key: "k".into(),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.http_port, 9999);
        assert_eq!(loaded.cipher_key, "k");
        assert_eq!(loaded.storage_dir, dir.path());
    }
}
