use std::collections::TryReserveError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// RSA-3072 operand size in bytes.
pub const RSA_LEN: usize = 384;

/// The parameter block layout consumed by the signing peripheral: an RSA
/// length word, a 16-byte IV and the encrypted key parameters.
pub const WRAPPED_KEY_LENGTH_WORD_LEN: usize = 4;
pub const WRAPPED_KEY_IV_LEN: usize = 16;
pub const WRAPPED_KEY_CIPHERTEXT_LEN: usize = 1584;
pub const WRAPPED_KEY_LEN: usize =
    WRAPPED_KEY_LENGTH_WORD_LEN + WRAPPED_KEY_IV_LEN + WRAPPED_KEY_CIPHERTEXT_LEN;

/// Value of the RSA length word for 3072-bit keys (`bits / 32 - 1`).
pub const RSA_3072_LENGTH_WORD: u32 = 3072 / 32 - 1;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle: peripheral returned error code {0:#x}")]
    Hardware(i32),
    #[error("oracle: no HMAC key burned in slot {0}")]
    EmptyKeySlot(KeySlot),
    #[error("oracle: wrapped key rejected: {0}")]
    InvalidWrappedKey(String),
    #[error("oracle: operand is not smaller than the modulus")]
    OperandOutOfRange,
    #[error("oracle: out of memory")]
    OutOfMemory,
}

/// HMAC key slot (`HMAC_KEYn`) holding the fuse key that unlocks a wrapped
/// key blob. The key itself never leaves the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeySlot(pub u8);

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HMAC_KEY{}", self.0)
    }
}

/// Hardware-wrapped RSA key parameters. Opaque to software: the only thing
/// this crate does with the contents is hand them to a [`super::SigningOracle`]
/// and fingerprint them.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct WrappedKey(Box<[u8]>);

impl WrappedKey {
    /// Allocates a zeroed parameter block. The peripheral reads the block
    /// directly, so the buffer is reserved exactly once and never moved.
    pub fn zeroed() -> Result<Self, TryReserveError> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(WRAPPED_KEY_LEN)?;
        buffer.resize(WRAPPED_KEY_LEN, 0);
        Ok(Self(buffer.into_boxed_slice()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != WRAPPED_KEY_LEN {
            return None;
        }
        Some(Self(bytes.to_vec().into_boxed_slice()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn length_word(&self) -> u32 {
        let mut word = [0u8; WRAPPED_KEY_LENGTH_WORD_LEN];
        word.copy_from_slice(&self.0[..WRAPPED_KEY_LENGTH_WORD_LEN]);
        u32::from_le_bytes(word)
    }

    pub fn iv(&self) -> &[u8] {
        &self.0[WRAPPED_KEY_LENGTH_WORD_LEN..WRAPPED_KEY_LENGTH_WORD_LEN + WRAPPED_KEY_IV_LEN]
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.0[WRAPPED_KEY_LENGTH_WORD_LEN + WRAPPED_KEY_IV_LEN..]
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedKey")
            .field("len", &self.0.len())
            .field("length_word", &self.length_word())
            .finish_non_exhaustive()
    }
}
