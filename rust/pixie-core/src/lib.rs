pub mod api;
pub mod attestation;
pub mod config;
pub mod crypto;
pub mod derivation;
pub mod device;
pub mod fuse;
pub mod identity;
pub mod oracle;
pub mod partition;
pub mod secure_material;
pub mod simulator;

// Re-export common types
pub use crate::attestation::{verify_attestation, AttestationRecord, VerificationError};
pub use crate::config::PixieConfig;
pub use crate::derivation::{DerivationPath, TestPrivateKey};
pub use crate::device::{Device, DeviceError, DeviceOptions, InitStatus};
pub use crate::fuse::{FuseBlock, FuseImage};
pub use crate::identity::{DeviceIdentity, ModelName};
pub use crate::oracle::{SigningOracle, SoftwareOracle};
pub use crate::partition::{MemoryPartition, SecurePartition, SqlitePartition};
pub use crate::secure_material::SecureMaterial;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::oracle::{KeySlot, OracleError, SigningOracle, WrappedKey, RSA_LEN};
    use crate::partition::MemoryPartition;
    use crate::secure_material::{
        SecureMaterial, ATTEST_PROOF_BLOB, ATTEST_PROOF_LEN, NAMESPACE, PARTITION_LABEL,
        PUBLIC_MODULUS_BLOB, WRAPPED_KEY_BLOB,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Returns its operand unchanged.
    #[derive(Default)]
    pub struct EchoOracle {
        invocations: AtomicU64,
        last_slot: Mutex<Option<KeySlot>>,
    }

    impl EchoOracle {
        pub fn invocations(&self) -> u64 {
            self.invocations.load(Ordering::SeqCst)
        }

        pub fn last_slot(&self) -> Option<KeySlot> {
            *self.last_slot.lock().unwrap()
        }
    }

    impl SigningOracle for EchoOracle {
        fn sign(
            &self,
            block: &[u8; RSA_LEN],
            _wrapped: &WrappedKey,
            slot: KeySlot,
        ) -> Result<[u8; RSA_LEN], OracleError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            *self.last_slot.lock().unwrap() = Some(slot);
            Ok(*block)
        }
    }

    pub struct FailingOracle;

    impl SigningOracle for FailingOracle {
        fn sign(
            &self,
            _block: &[u8; RSA_LEN],
            _wrapped: &WrappedKey,
            _slot: KeySlot,
        ) -> Result<[u8; RSA_LEN], OracleError> {
            Err(OracleError::Hardware(0x103))
        }
    }

    pub fn provisioned_partition(wrapped: &[u8]) -> MemoryPartition {
        MemoryPartition::new(PARTITION_LABEL)
            .with_blob(NAMESPACE, WRAPPED_KEY_BLOB, wrapped)
            .with_blob(NAMESPACE, ATTEST_PROOF_BLOB, &[0xa5; ATTEST_PROOF_LEN])
            .with_blob(NAMESPACE, PUBLIC_MODULUS_BLOB, &[0xc3; RSA_LEN])
    }

    pub fn material(wrapped: &[u8]) -> SecureMaterial {
        SecureMaterial::load(&provisioned_partition(wrapped)).unwrap()
    }
}
