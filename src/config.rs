//! Engine configuration.
//!
//! Configuration is plain JSON:
//!
//! ```json
//! {
//!   "profile": "polar",
//!   "devices": [
//!     { "id": "127.0.0.1:4000", "name": "Bench WearLink" }
//!   ]
//! }
//! ```
//!
//! Every field is optional; the defaults are the Zephyr profile and no
//! devices.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::ProfileKind;
use crate::transport::DeviceHandle;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Sensor frame format.
    pub profile: ProfileKind,
    /// Endpoints for address-based transports such as TCP.
    pub devices: Vec<DeviceHandle>,
}

impl EngineConfig {
    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HrError;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config.profile, ProfileKind::Zephyr);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = EngineConfig::from_json(
            r#"{
                "profile": "polar",
                "devices": [{ "id": "10.0.0.2:4000", "name": "WearLink" }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.profile, ProfileKind::Polar);
        assert_eq!(
            config.devices,
            vec![DeviceHandle::new("10.0.0.2:4000", "WearLink")]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = EngineConfig::from_json(r#"{ "profil": "polar" }"#).unwrap_err();
        assert!(matches!(err, HrError::Config(_)));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig {
            profile: ProfileKind::Polar,
            devices: vec![DeviceHandle::new("a:1", "A")],
        };
        let parsed = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file("/nonexistent/hrlink.json").unwrap_err();
        assert!(matches!(err, HrError::Io(_)));
    }
}
