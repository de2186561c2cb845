mod software;
mod types;

pub use software::SoftwareOracle;
pub use types::*;

use std::sync::Arc;

/// The signing peripheral: computes a raw RSA private-key operation with a
/// key it unwraps internally using the HMAC key in `slot`.
///
/// `block` and the returned signature are in the peripheral's native
/// little-endian order. Callers convert with [`crate::crypto::oracle_byte_order`].
/// The peripheral is a single hardware unit, so implementations may serialize
/// concurrent calls.
pub trait SigningOracle: Send + Sync {
    fn sign(
        &self,
        block: &[u8; RSA_LEN],
        wrapped: &WrappedKey,
        slot: KeySlot,
    ) -> Result<[u8; RSA_LEN], OracleError>;
}

pub type OracleHandle = Arc<dyn SigningOracle>;

/// Fuse slot of the HMAC key that unlocks the attestation key.
pub const ATTEST_KEY_SLOT: KeySlot = KeySlot(2);
