use crate::oracle::{WrappedKey, RSA_LEN, WRAPPED_KEY_LEN};
use crate::partition::{PartitionError, SecurePartition};
use std::fmt;

pub const PARTITION_LABEL: &str = "attest";
pub const NAMESPACE: &str = "secure";

pub const WRAPPED_KEY_BLOB: &str = "cipherdata";
pub const ATTEST_PROOF_BLOB: &str = "attest";
pub const PUBLIC_MODULUS_BLOB: &str = "pubkey-n";

/// Manufacturer-issued proof over the device public key.
pub const ATTEST_PROOF_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum MaterialError {
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error("blob {key}: expected {expected} bytes, found {actual}")]
    SizeMismatch {
        key: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
}

/// Provisioned attestation material. Loaded once at initialization and
/// read-only afterwards; the wrapped key is never decrypted here.
pub struct SecureMaterial {
    wrapped_key: WrappedKey,
    attest_proof: [u8; ATTEST_PROOF_LEN],
    rsa_modulus: [u8; RSA_LEN],
}

impl SecureMaterial {
    /// Loads all three blobs or none. Buffers filled before a failure are
    /// dropped (the wrapped key wipes itself) before the error returns.
    pub fn load(partition: &dyn SecurePartition) -> Result<Self, MaterialError> {
        let namespace = partition.open_namespace(PARTITION_LABEL, NAMESPACE)?;

        let mut wrapped_key =
            WrappedKey::zeroed().map_err(|_| MaterialError::OutOfMemory(WRAPPED_KEY_LEN))?;
        read_exact(&*namespace, WRAPPED_KEY_BLOB, wrapped_key.as_mut_bytes())?;

        let mut attest_proof = [0u8; ATTEST_PROOF_LEN];
        read_exact(&*namespace, ATTEST_PROOF_BLOB, &mut attest_proof)?;

        let mut rsa_modulus = [0u8; RSA_LEN];
        read_exact(&*namespace, PUBLIC_MODULUS_BLOB, &mut rsa_modulus)?;

        Ok(Self {
            wrapped_key,
            attest_proof,
            rsa_modulus,
        })
    }

    pub fn wrapped_key(&self) -> &WrappedKey {
        &self.wrapped_key
    }

    pub fn attest_proof(&self) -> &[u8; ATTEST_PROOF_LEN] {
        &self.attest_proof
    }

    pub fn rsa_modulus(&self) -> &[u8; RSA_LEN] {
        &self.rsa_modulus
    }
}

impl fmt::Debug for SecureMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureMaterial")
            .field("wrapped_key", &self.wrapped_key)
            .field("attest_proof", &hex::encode(self.attest_proof))
            .field("rsa_modulus", &hex::encode(&self.rsa_modulus[..8]))
            .finish()
    }
}

fn read_exact(
    namespace: &dyn crate::partition::NamespaceReader,
    key: &'static str,
    out: &mut [u8],
) -> Result<(), MaterialError> {
    let expected = out.len();
    let actual = match namespace.read_blob(key, out) {
        Ok(actual) => actual,
        Err(PartitionError::InvalidLength { actual, .. }) => actual,
        Err(e) => return Err(e.into()),
    };
    if actual != expected {
        return Err(MaterialError::SizeMismatch {
            key,
            expected,
            actual,
        });
    }
    Ok(())
}
