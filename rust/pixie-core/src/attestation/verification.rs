use super::record::AttestationRecord;
use super::ATTESTATION_VERSION;
use crate::oracle::RSA_LEN;
use rsa::signature::Verifier as RsaVerifier;
use rsa::{BigUint, RsaPublicKey};
use sha2::Sha256;

/// Public exponent the provisioning line uses for every device key.
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("verification: unsupported record version {0}")]
    UnsupportedVersion(u8),
    #[error("verification: public modulus rejected: {0}")]
    InvalidPublicKey(String),
    #[error("verification: invalid signature")]
    InvalidSignature,
}

/// Checks the record's PKCS#1 v1.5 / SHA-256 signature against the modulus it
/// carries. This proves possession of the key; whether the key belongs to a
/// genuine device is established by the attestation proof, not checked here.
pub fn verify_attestation(record: &AttestationRecord) -> Result<(), VerificationError> {
    if record.version != ATTESTATION_VERSION {
        return Err(VerificationError::UnsupportedVersion(record.version));
    }

    let key = public_key(&record.rsa_modulus)?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
    let signature = rsa::pkcs1v15::Signature::try_from(&record.signature[..])
        .map_err(|_| VerificationError::InvalidSignature)?;

    verifying_key
        .verify(&record.signed_payload(), &signature)
        .map_err(|_| VerificationError::InvalidSignature)
}

pub fn public_key(modulus: &[u8; RSA_LEN]) -> Result<RsaPublicKey, VerificationError> {
    RsaPublicKey::new(
        BigUint::from_bytes_be(modulus),
        BigUint::from(RSA_PUBLIC_EXPONENT),
    )
    .map_err(|e| VerificationError::InvalidPublicKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::{CHALLENGE_LEN, NONCE_LEN};
    use crate::secure_material::ATTEST_PROOF_LEN;

    #[test]
    fn test_rejects_garbage_signature() {
        let mut modulus = [0xc3u8; RSA_LEN];
        modulus[RSA_LEN - 1] |= 1;
        let record = AttestationRecord {
            version: ATTESTATION_VERSION,
            nonce: [0; NONCE_LEN],
            challenge: [0; CHALLENGE_LEN],
            model_number: 0x0101,
            serial_number: 1,
            rsa_modulus: modulus,
            attest_proof: [0; ATTEST_PROOF_LEN],
            signature: [0x01; RSA_LEN],
        };
        assert!(matches!(
            verify_attestation(&record),
            Err(VerificationError::InvalidSignature)
        ));
    }

    #[test]
    fn test_rejects_other_versions() {
        let record = AttestationRecord {
            version: 9,
            nonce: [0; NONCE_LEN],
            challenge: [0; CHALLENGE_LEN],
            model_number: 0,
            serial_number: 0,
            rsa_modulus: [0; RSA_LEN],
            attest_proof: [0; ATTEST_PROOF_LEN],
            signature: [0; RSA_LEN],
        };
        assert!(matches!(
            verify_attestation(&record),
            Err(VerificationError::UnsupportedVersion(9))
        ));
    }
}
