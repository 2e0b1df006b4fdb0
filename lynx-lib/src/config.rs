//! Per-device configuration: which distributors and fuses the installation
//! actually has. Owned externally and read-only here; a missing file means
//! everything at its default (no distributors installed, all fuses
//! installed once their distributor is).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::poller::DISTRIBUTOR_COUNT;
use crate::status::DistributorConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub custom_name: Option<String>,
    #[serde(default)]
    pub distributors: [DistributorConfig; DISTRIBUTOR_COUNT],
}

impl DeviceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(DeviceConfig::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}
