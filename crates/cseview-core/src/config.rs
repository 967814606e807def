//! Session configuration types.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How far an on-demand expansion reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExpansionMode {
    /// Resolve every descendant of the expanded branch in one pass.
    #[default]
    Full,
    /// Fetch only the direct children of the expanded branch.
    Shallow,
}

/// Configuration for a browsing session, fixed at startup.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncConfig {
    /// Address of the base container.
    pub base_address: String,

    /// Originator sent with every request.
    #[builder(default = "default_originator()")]
    #[serde(default = "default_originator")]
    pub originator: String,

    /// Request identifier sent with every request.
    #[builder(default = "default_request_id()")]
    #[serde(default = "default_request_id")]
    pub request_id: String,

    /// Number of top-level branches expanded concurrently per batch.
    #[builder(default = "30")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between background batches, in milliseconds.
    #[builder(default = "2000")]
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// How long the final 100% report stays up, in milliseconds.
    #[builder(default = "1000")]
    #[serde(default = "default_finish_grace_ms")]
    pub finish_grace_ms: u64,

    /// Reach of on-demand expansion.
    #[builder(default)]
    #[serde(default)]
    pub expansion_mode: ExpansionMode,

    /// Maximum listing requests in flight within one subtree expansion.
    #[builder(default = "8")]
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Per-request timeout in milliseconds (None = client default).
    #[builder(default)]
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_originator() -> String {
    "S{{aei}}".to_string()
}

fn default_request_id() -> String {
    "12345".to_string()
}

fn default_batch_size() -> usize {
    30
}

fn default_batch_delay_ms() -> u64 {
    2000
}

fn default_finish_grace_ms() -> u64 {
    1000
}

fn default_max_in_flight() -> usize {
    8
}

impl SyncConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.base_address {
            Some(ref base) if base.trim().is_empty() => {
                return Err("Base address cannot be empty".to_string());
            }
            None => return Err("Base address is required".to_string()),
            _ => {}
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }
        if self.max_in_flight == Some(0) {
            return Err("In-flight request limit must be at least 1".to_string());
        }
        Ok(())
    }
}

impl SyncConfig {
    /// Create a new config builder.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Create a config with defaults for everything but the base address.
    pub fn new(base_address: impl Into<String>) -> Self {
        Self {
            base_address: base_address.into(),
            originator: default_originator(),
            request_id: default_request_id(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            finish_grace_ms: default_finish_grace_ms(),
            expansion_mode: ExpansionMode::default(),
            max_in_flight: default_max_in_flight(),
            request_timeout_ms: None,
        }
    }

    /// Pause between background batches.
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Delay before the progress indicator is dismissed.
    pub fn finish_grace(&self) -> Duration {
        Duration::from_millis(self.finish_grace_ms)
    }

    /// Per-request timeout, if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Batch size clamped to at least one entry.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Base address without trailing slashes.
    pub fn base(&self) -> &str {
        self.base_address.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = SyncConfig::builder()
            .base_address("http://localhost:8080/cse-in")
            .batch_size(10usize)
            .expansion_mode(ExpansionMode::Shallow)
            .build()
            .unwrap();

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_delay(), Duration::from_secs(2));
        assert_eq!(config.expansion_mode, ExpansionMode::Shallow);
        assert_eq!(config.originator, "S{{aei}}");
    }

    #[test]
    fn test_config_requires_base() {
        assert!(SyncConfig::builder().build().is_err());
        assert!(SyncConfig::builder().base_address("  ").build().is_err());
        assert!(
            SyncConfig::builder()
                .base_address("http://cse")
                .batch_size(0usize)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_config_simple() {
        let config = SyncConfig::new("http://localhost:8080/cse-in/");
        assert_eq!(config.base(), "http://localhost:8080/cse-in");
        assert_eq!(config.batch_size, 30);
        assert_eq!(config.finish_grace(), Duration::from_secs(1));
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"base_address": "http://cse", "expansion_mode": "shallow"}"#)
                .unwrap();
        assert_eq!(config.batch_delay_ms, 2000);
        assert_eq!(config.max_in_flight, 8);
        assert_eq!(config.expansion_mode, ExpansionMode::Shallow);
    }

    #[test]
    fn test_expansion_mode_parse() {
        assert_eq!("shallow".parse::<ExpansionMode>().unwrap(), ExpansionMode::Shallow);
        assert_eq!(ExpansionMode::Full.to_string(), "full");
    }
}
