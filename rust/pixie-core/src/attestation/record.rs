use serde::{Deserialize, Serialize};

use super::pkcs1::{attestation_payload, PAYLOAD_LEN};
use super::{ATTESTATION_VERSION, CHALLENGE_LEN, NONCE_LEN};
use crate::oracle::RSA_LEN;
use crate::secure_material::ATTEST_PROOF_LEN;

/// Packed wire size: every field in declaration order, `u32`s big-endian.
pub const RECORD_WIRE_LEN: usize =
    1 + NONCE_LEN + CHALLENGE_LEN + 4 + 4 + RSA_LEN + ATTEST_PROOF_LEN + RSA_LEN;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("attestation record must be {expected} bytes, got {actual}")]
    WireLength { expected: usize, actual: usize },
    #[error("unsupported attestation record version {0}")]
    UnsupportedVersion(u8),
}

/// A signed statement that `challenge` was processed by the device holding
/// `rsa_modulus`. The signature covers [`AttestationRecord::signed_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub version: u8,
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_LEN],
    #[serde(with = "hex_array")]
    pub challenge: [u8; CHALLENGE_LEN],
    pub model_number: u32,
    pub serial_number: u32,
    #[serde(with = "hex_array")]
    pub rsa_modulus: [u8; RSA_LEN],
    #[serde(with = "hex_array")]
    pub attest_proof: [u8; ATTEST_PROOF_LEN],
    #[serde(with = "hex_array")]
    pub signature: [u8; RSA_LEN],
}

impl AttestationRecord {
    pub fn signed_payload(&self) -> [u8; PAYLOAD_LEN] {
        attestation_payload(&self.nonce, &self.challenge)
    }

    pub fn to_bytes(&self) -> [u8; RECORD_WIRE_LEN] {
        let mut out = [0u8; RECORD_WIRE_LEN];
        let mut w = Writer { buf: &mut out, pos: 0 };
        w.put(&[self.version]);
        w.put(&self.nonce);
        w.put(&self.challenge);
        w.put(&self.model_number.to_be_bytes());
        w.put(&self.serial_number.to_be_bytes());
        w.put(&self.rsa_modulus);
        w.put(&self.attest_proof);
        w.put(&self.signature);
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, RecordError> {
        if data.len() != RECORD_WIRE_LEN {
            return Err(RecordError::WireLength {
                expected: RECORD_WIRE_LEN,
                actual: data.len(),
            });
        }
        let mut r = Reader { buf: data, pos: 0 };
        let [version] = r.take::<1>();
        if version != ATTESTATION_VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }

        Ok(Self {
            version,
            nonce: r.take(),
            challenge: r.take(),
            model_number: u32::from_be_bytes(r.take()),
            serial_number: u32::from_be_bytes(r.take()),
            rsa_modulus: r.take(),
            attest_proof: r.take(),
            signature: r.take(),
        })
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

// Callers check the total length up front, so `take` cannot run past the end.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(value: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let mut out = [0u8; N];
        hex::decode_to_slice(encoded.trim_start_matches("0x"), &mut out)
            .map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}
