use crate::device::DeviceOptions;
use crate::oracle::KeySlot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "pixie.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PixieConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Fuse image, relative to `data_dir` unless absolute.
    #[serde(default = "default_fuse_image")]
    pub fuse_image: PathBuf,

    /// Secure partition image, relative to `data_dir` unless absolute.
    #[serde(default = "default_partition")]
    pub partition: PathBuf,

    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_attest_key_slot")]
    pub attest_key_slot: u8,
    #[serde(default = "default_false")]
    pub reveal_test_mnemonic: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            attest_key_slot: default_attest_key_slot(),
            reveal_test_mnemonic: default_false(),
        }
    }
}

impl From<&DeviceConfig> for DeviceOptions {
    fn from(config: &DeviceConfig) -> Self {
        DeviceOptions {
            attest_key_slot: KeySlot(config.attest_key_slot),
            reveal_test_mnemonic: config.reveal_test_mnemonic,
        }
    }
}

// Defaults
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".pixie"))
        .unwrap_or_else(|| PathBuf::from(".pixie"))
}
fn default_fuse_image() -> PathBuf {
    PathBuf::from("efuse.json")
}
fn default_partition() -> PathBuf {
    PathBuf::from("nvs.db")
}
fn default_attest_key_slot() -> u8 {
    2
}
fn default_false() -> bool {
    false
}

impl PixieConfig {
    pub fn load_or_default(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config: {:?}", config_path))?;
            let mut config: PixieConfig = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config: {:?}", config_path))?;
            config.data_dir = data_dir.to_path_buf();
            return Ok(config);
        }

        Ok(Self::default_with_dir(data_dir))
    }

    pub fn default_with_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            fuse_image: default_fuse_image(),
            partition: default_partition(),
            device: DeviceConfig::default(),
        }
    }

    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let config_path = self.data_dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn fuse_image_path(&self) -> PathBuf {
        self.data_dir.join(&self.fuse_image)
    }

    pub fn partition_path(&self) -> PathBuf {
        self.data_dir.join(&self.partition)
    }

    pub fn device_options(&self) -> DeviceOptions {
        DeviceOptions::from(&self.device)
    }
}
