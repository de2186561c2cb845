use crate::crypto::Hash256;
use crate::oracle::RSA_LEN;

use super::{ATTESTATION_VERSION, CHALLENGE_LEN, NONCE_LEN};

pub const PAYLOAD_LEN: usize = 1 + NONCE_LEN + CHALLENGE_LEN;

/// DER `DigestInfo` prefix for SHA-256 (RFC 8017 section 9.2, note 1).
pub const SHA256_DIGEST_INFO_PREFIX: [u8; 19] = [
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];

const PADDING_LEN: usize = RSA_LEN - 3 - SHA256_DIGEST_INFO_PREFIX.len() - 32;

pub fn attestation_payload(nonce: &[u8; NONCE_LEN], challenge: &[u8; CHALLENGE_LEN]) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0] = ATTESTATION_VERSION;
    payload[1..1 + NONCE_LEN].copy_from_slice(nonce);
    payload[1 + NONCE_LEN..].copy_from_slice(challenge);
    payload
}

/// EMSA-PKCS1-v1_5 encoding of a SHA-256 digest, big-endian:
/// `00 01 ff..ff 00 DigestInfo digest`.
pub fn pkcs1_sha256_block(digest: &Hash256) -> [u8; RSA_LEN] {
    let mut block = [0xffu8; RSA_LEN];
    block[0] = 0x00;
    block[1] = 0x01;
    let mut offset = 2 + PADDING_LEN;
    block[offset] = 0x00;
    offset += 1;
    block[offset..offset + SHA256_DIGEST_INFO_PREFIX.len()]
        .copy_from_slice(&SHA256_DIGEST_INFO_PREFIX);
    offset += SHA256_DIGEST_INFO_PREFIX.len();
    block[offset..].copy_from_slice(digest);
    block
}
