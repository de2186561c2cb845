//! Deterministic test-key derivation.
//!
//! The device signs a fingerprint of its own wrapped key with the reserved
//! internal nonce. The signature is stable for the lifetime of the
//! provisioning, so hashing it yields entropy for a BIP-39 mnemonic that
//! only this device can reproduce. Keys follow the Ethereum BIP-44 path
//! `m/44'/60'/{account}'/0/0`.
//!
//! These keys are for development and testing. They are as strong as the
//! attestation key but are recoverable by anyone holding the device.

mod mnemonic;

pub use mnemonic::{seed_from_mnemonic, test_mnemonic, SensitiveSeed};

use crate::attestation::{Attestor, INTERNAL_NONCE};
use crate::crypto::{self, keccak256, EthAddress, Hash256};
use crate::secure_material::SecureMaterial;
use crate::device::DeviceError;
use bip32::{ChildNumber, XPrv};
use bip39::Mnemonic;
use k256::ecdsa::SigningKey;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

pub const ENTROPY_LEN: usize = 16;
pub const MAX_ACCOUNT: u32 = 0x7fff_ffff;

const PURPOSE: u32 = 44;
const COIN_TYPE_ETH: u32 = 60;

#[derive(Debug, thiserror::Error)]
pub enum DerivationError {
    #[error("derivation: account {0} exceeds {max}", max = MAX_ACCOUNT)]
    InvalidAccount(u32),
    #[error("derivation: mnemonic: {0}")]
    Mnemonic(String),
    #[error("derivation: bip32: {0}")]
    Bip32(String),
    #[error("derivation: secp256k1: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationPath {
    pub account: u32,
}

impl DerivationPath {
    pub fn new(account: u32) -> Result<Self, DerivationError> {
        if account > MAX_ACCOUNT {
            return Err(DerivationError::InvalidAccount(account));
        }
        Ok(Self { account })
    }

    fn children(&self) -> [(u32, bool); 5] {
        [
            (PURPOSE, true),
            (COIN_TYPE_ETH, true),
            (self.account, true),
            (0, false),
            (0, false),
        ]
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}'/{}'/{}'/0/0", PURPOSE, COIN_TYPE_ETH, self.account)
    }
}

/// A derived secp256k1 private key. Wiped on drop; `Debug` never shows the
/// key bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct TestPrivateKey {
    bytes: [u8; 32],
    account: u32,
}

impl TestPrivateKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn account(&self) -> u32 {
        self.account
    }

    pub fn path(&self) -> DerivationPath {
        DerivationPath {
            account: self.account,
        }
    }

    pub fn signing_key(&self) -> Result<SigningKey, DerivationError> {
        SigningKey::from_slice(&self.bytes).map_err(|e| DerivationError::InvalidKey(e.to_string()))
    }

    pub fn address(&self) -> Result<EthAddress, DerivationError> {
        Ok(crypto::eth_address(&self.signing_key()?))
    }

    /// EIP-55 checksummed address.
    pub fn checksum_address(&self) -> Result<String, DerivationError> {
        Ok(crypto::checksum_address(&self.address()?))
    }
}

impl fmt::Debug for TestPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestPrivateKey")
            .field("path", &self.path().to_string())
            .finish_non_exhaustive()
    }
}

pub fn key_from_mnemonic(mnemonic: &Mnemonic, account: u32) -> Result<TestPrivateKey, DerivationError> {
    let path = DerivationPath::new(account)?;
    let seed = seed_from_mnemonic(mnemonic);

    let mut xprv = XPrv::new(seed.as_ref()).map_err(|e| DerivationError::Bip32(e.to_string()))?;
    for (index, hardened) in path.children() {
        let child = ChildNumber::new(index, hardened)
            .map_err(|_| DerivationError::InvalidAccount(account))?;
        xprv = xprv
            .derive_child(child)
            .map_err(|e| DerivationError::Bip32(e.to_string()))?;
    }

    let mut key = TestPrivateKey {
        bytes: [0u8; 32],
        account,
    };
    let mut private_key_bytes = xprv.private_key().to_bytes();
    key.bytes.copy_from_slice(&private_key_bytes);
    private_key_bytes.as_mut_slice().zeroize();

    Ok(key)
}

pub fn key_from_entropy(entropy: &[u8; ENTROPY_LEN], account: u32) -> Result<TestPrivateKey, DerivationError> {
    let mnemonic = test_mnemonic(entropy)?;
    key_from_mnemonic(&mnemonic, account)
}

/// `keccak256(signature)[..16]`
pub fn entropy_from_signature(signature: &[u8]) -> Zeroizing<[u8; ENTROPY_LEN]> {
    let mut digest = Zeroizing::new(keccak256(signature));
    let mut entropy = Zeroizing::new([0u8; ENTROPY_LEN]);
    entropy.copy_from_slice(&digest[..ENTROPY_LEN]);
    digest.zeroize();
    entropy
}

/// `keccak256(wrapped_key)`, the challenge signed with the internal nonce.
pub(crate) fn wrapped_key_digest(material: &SecureMaterial) -> Zeroizing<Hash256> {
    Zeroizing::new(keccak256(material.wrapped_key().as_bytes()))
}

/// Runs the full pipeline for `account`. `reveal_mnemonic`, when given, is a
/// once-per-process latch: the first caller to flip it logs the mnemonic.
pub(crate) fn derive_test_key(
    attestor: &Attestor<'_>,
    account: u32,
    reveal_mnemonic: Option<&AtomicBool>,
) -> Result<TestPrivateKey, DeviceError> {
    if account > MAX_ACCOUNT {
        return Err(DeviceError::InvalidAccount(account));
    }

    let digest = wrapped_key_digest(attestor.material);
    let signature = attestor.sign_payload(&INTERNAL_NONCE, &digest)?;
    let entropy = entropy_from_signature(&signature[..]);
    drop(signature);

    let mnemonic = test_mnemonic(&entropy)?;
    if let Some(latch) = reveal_mnemonic {
        if !latch.swap(true, Ordering::SeqCst) {
            log::warn!("test mnemonic (debug only): {}", mnemonic);
        }
    }

    let key = key_from_mnemonic(&mnemonic, account)?;
    match key.checksum_address() {
        Ok(address) => log::info!("derived test key {} address {}", key.path(), address),
        Err(e) => log::warn!("derived test key {} has no address: {}", key.path(), e),
    }
    Ok(key)
}
