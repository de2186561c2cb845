//! Host-side device simulation.
//!
//! A simulated unit lives in the configured data directory: a JSON fuse image
//! (identity words plus the HMAC key block) and a SQLite partition image with
//! the wrapped attestation key, proof and public modulus. The signing
//! peripheral is a [`SoftwareOracle`] loaded from the fuse image.

use crate::config::PixieConfig;
use crate::device::Device;
use crate::fuse::{FuseImage, KEY_LEN};
use crate::identity::IDENTITY_FORMAT_VERSION;
use crate::oracle::{KeySlot, SoftwareOracle, RSA_LEN};
use crate::partition::SqlitePartition;
use crate::secure_material::{
    ATTEST_PROOF_BLOB, ATTEST_PROOF_LEN, NAMESPACE, PARTITION_LABEL, PUBLIC_MODULUS_BLOB,
    WRAPPED_KEY_BLOB,
};
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use zeroize::Zeroizing;

pub struct Provisioning<'a> {
    pub model_number: u32,
    pub serial_number: u32,
    pub rsa_key: &'a RsaPrivateKey,
    pub attest_proof: [u8; ATTEST_PROOF_LEN],
}

/// Writes a fresh simulated unit into `config.data_dir`, replacing any
/// existing one. A new fuse HMAC key is generated each time, so previously
/// derived test keys do not survive re-provisioning.
pub fn provision(config: &PixieConfig, request: &Provisioning<'_>) -> Result<()> {
    if request.rsa_key.size() != RSA_LEN {
        return Err(anyhow!(
            "attestation key must be RSA-{}, got RSA-{}",
            RSA_LEN * 8,
            request.rsa_key.size() * 8
        ));
    }

    let slot = KeySlot(config.device.attest_key_slot);
    let mut fuse_key = Zeroizing::new([0u8; KEY_LEN]);
    rand::rng().fill(&mut fuse_key[..]);

    let mut fuses = FuseImage::with_identity(
        IDENTITY_FORMAT_VERSION,
        request.model_number,
        request.serial_number,
    );
    fuses.burn_key(slot.0, *fuse_key);

    let oracle = SoftwareOracle::new().with_key(slot, *fuse_key);
    let wrapped = oracle
        .wrap_key(slot, request.rsa_key)
        .context("Failed to wrap attestation key")?;

    let mut modulus = [0u8; RSA_LEN];
    let n = request.rsa_key.n().to_bytes_be();
    modulus[RSA_LEN - n.len()..].copy_from_slice(&n);

    config.persist()?;

    let partition_path = config.partition_path();
    if let Some(parent) = partition_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let partition = SqlitePartition::create(&partition_path, PARTITION_LABEL)
        .with_context(|| format!("Failed to create partition: {:?}", partition_path))?;
    partition.write_blob(NAMESPACE, WRAPPED_KEY_BLOB, wrapped.as_bytes())?;
    partition.write_blob(NAMESPACE, ATTEST_PROOF_BLOB, &request.attest_proof)?;
    partition.write_blob(NAMESPACE, PUBLIC_MODULUS_BLOB, &modulus)?;

    fuses.persist(&config.fuse_image_path())?;

    log::info!(
        "provisioned simulated device model {:#x} serial {} in {:?}",
        request.model_number,
        request.serial_number,
        config.data_dir
    );
    Ok(())
}

/// Builds a device from the simulated images. Missing images behave like a
/// blank unit: no fuse image reads as unburned fuses, no partition image
/// fails secure material loading.
pub fn open_device(config: &PixieConfig) -> Result<Device> {
    let fuse_path = config.fuse_image_path();
    let fuses = if fuse_path.exists() {
        FuseImage::load(&fuse_path)?
    } else {
        log::debug!("no fuse image at {:?}, using blank fuses", fuse_path);
        FuseImage::default()
    };

    let oracle = Arc::new(SoftwareOracle::from_fuses(&fuses));
    let partition = SqlitePartition::new(config.partition_path());

    Ok(Device::new(Box::new(fuses), Box::new(partition), oracle)
        .with_options(config.device_options()))
}

/// Reads an RSA private key in PKCS#1 or PKCS#8 PEM form.
pub fn load_rsa_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = Zeroizing::new(
        fs::read_to_string(path).with_context(|| format!("Failed to read key: {:?}", path))?,
    );
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| anyhow!("Failed to parse RSA key {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::InitStatus;
    use tempfile::TempDir;

    #[test]
    fn test_blank_data_dir() {
        let dir = TempDir::new().unwrap();
        let config = PixieConfig::default_with_dir(dir.path());
        let device = open_device(&config).unwrap();
        assert_eq!(device.initialize(), InitStatus::MissingFuseData);
    }

    #[test]
    fn test_fuses_without_partition() {
        let dir = TempDir::new().unwrap();
        let config = PixieConfig::default_with_dir(dir.path());
        FuseImage::with_identity(1, 0x0101, 5)
            .persist(&config.fuse_image_path())
            .unwrap();

        let device = open_device(&config).unwrap();
        assert_eq!(device.initialize(), InitStatus::MissingSecureMaterial);
    }

    #[test]
    fn test_load_rsa_key_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.pem");
        fs::write(&path, "not a key").unwrap();
        assert!(load_rsa_key(&path).is_err());
        assert!(load_rsa_key(&dir.path().join("absent.pem")).is_err());
    }
}
