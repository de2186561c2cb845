use super::{DerivationError, ENTROPY_LEN};
use bip39::{Language, Mnemonic};
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveSeed([u8; 64]);

impl AsRef<[u8]> for SensitiveSeed {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 12-word English mnemonic for 128 bits of entropy.
pub fn test_mnemonic(entropy: &[u8; ENTROPY_LEN]) -> Result<Mnemonic, DerivationError> {
    Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| DerivationError::Mnemonic(e.to_string()))
}

/// BIP-39 seed with an empty passphrase.
pub fn seed_from_mnemonic(mnemonic: &Mnemonic) -> SensitiveSeed {
    let mut seed = mnemonic.to_seed("");
    let sensitive = SensitiveSeed(seed);
    seed.zeroize();
    sensitive
}
