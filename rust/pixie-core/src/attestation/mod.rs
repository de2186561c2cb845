//! Challenge-response attestation.
//!
//! A record binds a caller's 32-byte challenge and a device nonce to the
//! device identity and RSA public modulus, signed by the signing peripheral
//! with the hardware-wrapped attestation key.

mod pkcs1;
mod record;
mod verification;

pub use pkcs1::{attestation_payload, pkcs1_sha256_block, PAYLOAD_LEN, SHA256_DIGEST_INFO_PREFIX};
pub use record::{AttestationRecord, RecordError, RECORD_WIRE_LEN};
pub use verification::{public_key, verify_attestation, VerificationError, RSA_PUBLIC_EXPONENT};

use crate::crypto::{oracle_byte_order, sha256};
use crate::device::DeviceError;
use crate::identity::DeviceIdentity;
use crate::oracle::{KeySlot, SigningOracle, RSA_LEN};
use crate::secure_material::SecureMaterial;
use rand::Rng;
use zeroize::Zeroizing;

pub const ATTESTATION_VERSION: u8 = 1;
pub const NONCE_LEN: usize = 16;
pub const CHALLENGE_LEN: usize = 32;

/// Nonce reserved for internal signing. Public nonces always have the top bit
/// of byte 0 clear, so an externally requested record can never reproduce a
/// signature used for key derivation.
pub(crate) const INTERNAL_NONCE: [u8; NONCE_LEN] = {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[0] = 0x80;
    nonce
};

pub fn public_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill(&mut nonce);
    nonce[0] &= 0x7f;
    nonce
}

/// Everything needed to sign for a provisioned device.
pub(crate) struct Attestor<'a> {
    pub identity: &'a DeviceIdentity,
    pub material: &'a SecureMaterial,
    pub oracle: &'a dyn SigningOracle,
    pub key_slot: KeySlot,
}

impl Attestor<'_> {
    pub fn attest(&self, challenge: &[u8; CHALLENGE_LEN]) -> Result<AttestationRecord, DeviceError> {
        self.attest_with_nonce(&public_nonce(), challenge)
    }

    pub fn attest_with_nonce(
        &self,
        nonce: &[u8; NONCE_LEN],
        challenge: &[u8; CHALLENGE_LEN],
    ) -> Result<AttestationRecord, DeviceError> {
        let signature = self.sign_payload(nonce, challenge)?;
        Ok(AttestationRecord {
            version: ATTESTATION_VERSION,
            nonce: *nonce,
            challenge: *challenge,
            model_number: self.identity.model_number,
            serial_number: self.identity.serial_number,
            rsa_modulus: *self.material.rsa_modulus(),
            attest_proof: *self.material.attest_proof(),
            signature: *signature,
        })
    }

    /// Signs `version || nonce || challenge` and returns the big-endian
    /// signature.
    pub fn sign_payload(
        &self,
        nonce: &[u8; NONCE_LEN],
        challenge: &[u8; CHALLENGE_LEN],
    ) -> Result<Zeroizing<[u8; RSA_LEN]>, DeviceError> {
        let block = signing_block(nonce, challenge);
        let signature = self
            .oracle
            .sign(&block, self.material.wrapped_key(), self.key_slot)
            .map_err(|e| {
                log::warn!("attestation signing failed on {}: {}", self.key_slot, e);
                DeviceError::SigningFailed
            })?;

        let mut signature = Zeroizing::new(signature);
        oracle_byte_order(&mut signature[..]);
        Ok(signature)
    }
}

/// PKCS#1 block for `version || nonce || challenge`, already in the oracle's
/// little-endian operand order.
pub(crate) fn signing_block(
    nonce: &[u8; NONCE_LEN],
    challenge: &[u8; CHALLENGE_LEN],
) -> Zeroizing<[u8; RSA_LEN]> {
    let payload = Zeroizing::new(attestation_payload(nonce, challenge));
    let digest = Zeroizing::new(sha256(&payload[..]));
    let mut block = Zeroizing::new(pkcs1_sha256_block(&digest));
    oracle_byte_order(&mut block[..]);
    block
}
