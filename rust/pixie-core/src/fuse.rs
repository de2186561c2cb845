//! One-time-programmable fuse blocks.
//!
//! The device-info block holds the per-unit identity written at manufacture
//! (format version, model number, serial number). Key blocks hold HMAC keys
//! that only the signing peripheral can read; on the host they are exposed to
//! the [`crate::oracle::SoftwareOracle`] simulation through [`FuseImage`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Words per fuse block (256 bits).
pub const WORDS_PER_BLOCK: usize = 8;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FuseBlockId {
    /// User data block carrying the device identity.
    DeviceInfo,
    /// Key block `KEYn`, addressed by its HMAC key slot.
    Key(u8),
}

impl fmt::Display for FuseBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuseBlockId::DeviceInfo => write!(f, "BLK3"),
            FuseBlockId::Key(slot) => write!(f, "KEY{}", slot),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FuseError {
    #[error("fuse: word {word} out of range for block {block}")]
    WordOutOfRange { block: FuseBlockId, word: usize },
    #[error("fuse: block {0} is read-protected")]
    ReadProtected(FuseBlockId),
}

pub trait FuseBlock: Send + Sync {
    fn read_word(&self, block: FuseBlockId, word: usize) -> Result<u32, FuseError>;
}

/// Fuse contents as burned on a unit. Serialized as JSON for the host
/// simulator; words are little-endian as the eFuse controller reports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuseImage {
    #[serde(default)]
    pub device_info: [u32; WORDS_PER_BLOCK],
    #[serde(default, with = "hex_key_map")]
    pub key_blocks: BTreeMap<u8, [u8; KEY_LEN]>,
}

impl FuseImage {
    pub fn with_identity(version: u32, model: u32, serial: u32) -> Self {
        let mut image = Self::default();
        image.device_info[0] = version;
        image.device_info[1] = model;
        image.device_info[2] = serial;
        image
    }

    pub fn burn_key(&mut self, slot: u8, key: [u8; KEY_LEN]) {
        self.key_blocks.insert(slot, key);
    }

    /// Host-side stand-in for the peripheral's private read of a key block.
    pub fn key_block(&self, slot: u8) -> Option<&[u8; KEY_LEN]> {
        self.key_blocks.get(&slot)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fuse image: {:?}", path))?;
        let image = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse fuse image: {:?}", path))?;
        Ok(image)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl FuseBlock for FuseImage {
    fn read_word(&self, block: FuseBlockId, word: usize) -> Result<u32, FuseError> {
        if word >= WORDS_PER_BLOCK {
            return Err(FuseError::WordOutOfRange { block, word });
        }
        match block {
            FuseBlockId::DeviceInfo => Ok(self.device_info[word]),
            // Key blocks are read-protected; only the signing peripheral sees them.
            FuseBlockId::Key(_) => Err(FuseError::ReadProtected(block)),
        }
    }
}

mod hex_key_map {
    use super::KEY_LEN;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(value: &BTreeMap<u8, [u8; KEY_LEN]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: BTreeMap<String, String> = value
            .iter()
            .map(|(slot, key)| (slot.to_string(), hex::encode(key)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<u8, [u8; KEY_LEN]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut out = BTreeMap::new();
        for (slot, key) in encoded {
            let slot: u8 = slot.parse().map_err(serde::de::Error::custom)?;
            let bytes = hex::decode(&key).map_err(serde::de::Error::custom)?;
            let key: [u8; KEY_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
                serde::de::Error::custom(format!(
                    "expected {}-byte key, got {} bytes",
                    KEY_LEN,
                    v.len()
                ))
            })?;
            out.insert(slot, key);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identity_words() {
        let image = FuseImage::with_identity(1, 0x0101, 42);
        assert_eq!(image.read_word(FuseBlockId::DeviceInfo, 0).unwrap(), 1);
        assert_eq!(image.read_word(FuseBlockId::DeviceInfo, 1).unwrap(), 0x0101);
        assert_eq!(image.read_word(FuseBlockId::DeviceInfo, 2).unwrap(), 42);
        assert_eq!(image.read_word(FuseBlockId::DeviceInfo, 7).unwrap(), 0);
    }

    #[test]
    fn test_word_out_of_range() {
        let image = FuseImage::default();
        assert!(matches!(
            image.read_word(FuseBlockId::DeviceInfo, WORDS_PER_BLOCK),
            Err(FuseError::WordOutOfRange { .. })
        ));
    }

    #[test]
    fn test_key_blocks_are_read_protected() {
        let mut image = FuseImage::default();
        image.burn_key(2, [9u8; KEY_LEN]);
        assert!(matches!(
            image.read_word(FuseBlockId::Key(2), 0),
            Err(FuseError::ReadProtected(FuseBlockId::Key(2)))
        ));
        assert_eq!(image.key_block(2), Some(&[9u8; KEY_LEN]));
        assert_eq!(image.key_block(3), None);
    }

    #[test]
    fn test_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("efuse.json");

        let mut image = FuseImage::with_identity(1, 0x0102, 7);
        image.burn_key(2, [0xab; KEY_LEN]);
        image.persist(&path).unwrap();

        let loaded = FuseImage::load(&path).unwrap();
        assert_eq!(loaded.device_info, image.device_info);
        assert_eq!(loaded.key_block(2), Some(&[0xab; KEY_LEN]));
    }

    #[test]
    fn test_load_rejects_short_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("efuse.json");
        fs::write(&path, r#"{"device_info":[1,2,3,0,0,0,0,0],"key_blocks":{"2":"abcd"}}"#)
            .unwrap();
        assert!(FuseImage::load(&path).is_err());
    }
}
