use super::{KeySlot, OracleError, SigningOracle, WrappedKey, RSA_3072_LENGTH_WORD, RSA_LEN};
use super::{WRAPPED_KEY_IV_LEN, WRAPPED_KEY_LENGTH_WORD_LEN};
use crate::fuse::{FuseImage, KEY_LEN};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hmac::{Hmac, Mac};
use rand::Rng;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use zeroize::{Zeroize, Zeroizing};

const AEAD_NONCE_LEN: usize = 12;
/// Plaintext layout: private exponent, modulus, reserved (all big-endian).
const PARAMS_LEN: usize = 1568;

/// Host simulation of the signing peripheral. Wrapped blobs are sealed with
/// ChaCha20-Poly1305 under a key derived from the fuse HMAC key, so a blob
/// only opens with the slot it was wrapped for.
pub struct SoftwareOracle {
    keys: BTreeMap<u8, Zeroizing<[u8; KEY_LEN]>>,
    invocations: AtomicU64,
}

impl Default for SoftwareOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareOracle {
    pub fn new() -> Self {
        Self {
            keys: BTreeMap::new(),
            invocations: AtomicU64::new(0),
        }
    }

    pub fn from_fuses(fuses: &FuseImage) -> Self {
        let mut oracle = Self::new();
        for (slot, key) in &fuses.key_blocks {
            oracle.keys.insert(*slot, Zeroizing::new(*key));
        }
        oracle
    }

    pub fn with_key(mut self, slot: KeySlot, key: [u8; KEY_LEN]) -> Self {
        self.keys.insert(slot.0, Zeroizing::new(key));
        self
    }

    /// Number of signing operations performed so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Provisioning-side counterpart of the peripheral: seals an RSA-3072
    /// private key for `slot`.
    pub fn wrap_key(&self, slot: KeySlot, key: &RsaPrivateKey) -> Result<WrappedKey, OracleError> {
        if key.size() != RSA_LEN {
            return Err(OracleError::InvalidWrappedKey(format!(
                "expected {}-bit modulus, got {} bits",
                RSA_LEN * 8,
                key.size() * 8
            )));
        }
        let cipher = self.cipher(slot)?;

        let mut params = Zeroizing::new(vec![0u8; PARAMS_LEN]);
        write_be_padded(&mut params[..RSA_LEN], key.d());
        write_be_padded(&mut params[RSA_LEN..2 * RSA_LEN], key.n());

        let mut wrapped = WrappedKey::zeroed().map_err(|_| OracleError::OutOfMemory)?;
        let length_word = RSA_3072_LENGTH_WORD.to_le_bytes();
        let mut iv = [0u8; WRAPPED_KEY_IV_LEN];
        rand::rng().fill(&mut iv);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&iv[..AEAD_NONCE_LEN]),
                Payload {
                    msg: &params,
                    aad: &length_word,
                },
            )
            .map_err(|_| OracleError::InvalidWrappedKey("encryption failed".into()))?;

        let out = wrapped.as_mut_bytes();
        out[..WRAPPED_KEY_LENGTH_WORD_LEN].copy_from_slice(&length_word);
        out[WRAPPED_KEY_LENGTH_WORD_LEN..WRAPPED_KEY_LENGTH_WORD_LEN + WRAPPED_KEY_IV_LEN]
            .copy_from_slice(&iv);
        out[WRAPPED_KEY_LENGTH_WORD_LEN + WRAPPED_KEY_IV_LEN..].copy_from_slice(&ciphertext);
        Ok(wrapped)
    }

    fn cipher(&self, slot: KeySlot) -> Result<ChaCha20Poly1305, OracleError> {
        let fuse_key = self.keys.get(&slot.0).ok_or(OracleError::EmptyKeySlot(slot))?;

        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(fuse_key.as_slice())
            .map_err(|e| OracleError::InvalidWrappedKey(e.to_string()))?;
        mac.update(&[0xff; 32]);
        let mut aead_key = Zeroizing::new([0u8; 32]);
        aead_key.copy_from_slice(&mac.finalize().into_bytes());

        ChaCha20Poly1305::new_from_slice(aead_key.as_slice())
            .map_err(|e| OracleError::InvalidWrappedKey(e.to_string()))
    }
}

impl SigningOracle for SoftwareOracle {
    fn sign(
        &self,
        block: &[u8; RSA_LEN],
        wrapped: &WrappedKey,
        slot: KeySlot,
    ) -> Result<[u8; RSA_LEN], OracleError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let cipher = self.cipher(slot)?;
        if wrapped.length_word() != RSA_3072_LENGTH_WORD {
            return Err(OracleError::InvalidWrappedKey(format!(
                "unsupported rsa length word {}",
                wrapped.length_word()
            )));
        }

        let length_word = RSA_3072_LENGTH_WORD.to_le_bytes();
        let params = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&wrapped.iv()[..AEAD_NONCE_LEN]),
                    Payload {
                        msg: wrapped.ciphertext(),
                        aad: &length_word,
                    },
                )
                .map_err(|_| OracleError::InvalidWrappedKey("authentication failed".into()))?,
        );
        if params.len() != PARAMS_LEN {
            return Err(OracleError::InvalidWrappedKey("bad parameter length".into()));
        }

        let mut d = BigUint::from_bytes_be(&params[..RSA_LEN]);
        let n = BigUint::from_bytes_be(&params[RSA_LEN..2 * RSA_LEN]);

        let m = BigUint::from_bytes_le(block);
        if m >= n {
            d.zeroize();
            return Err(OracleError::OperandOutOfRange);
        }

        let s = m.modpow(&d, &n);
        d.zeroize();

        let mut signature = [0u8; RSA_LEN];
        let le = s.to_bytes_le();
        signature[..le.len()].copy_from_slice(&le);
        Ok(signature)
    }
}

fn write_be_padded(out: &mut [u8], value: &BigUint) {
    let bytes = Zeroizing::new(value.to_bytes_be());
    let offset = out.len() - bytes.len();
    out[offset..].copy_from_slice(&bytes);
}
