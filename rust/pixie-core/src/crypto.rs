use k256::ecdsa::SigningKey;
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

pub type Hash256 = [u8; 32];
pub type EthAddress = [u8; 20];

pub fn sha256(data: &[u8]) -> Hash256 {
    let result = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Keccak-256 as used by Ethereum (original padding, not SHA3-256).
pub fn keccak256(data: &[u8]) -> Hash256 {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Converts between conventional big-endian RSA operands and the
/// little-endian order the signing peripheral consumes and produces.
/// Applying it twice restores the input.
pub fn oracle_byte_order(buffer: &mut [u8]) {
    buffer.reverse();
}

/// address = keccak256(uncompressed_pubkey[1..])[12..]
pub fn eth_address(signing_key: &SigningKey) -> EthAddress {
    let point = signing_key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// EIP-55 mixed-case checksum encoding, `0x`-prefixed.
pub fn checksum_address(address: &EthAddress) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
