use crate::derivation::DerivationError;
use crate::oracle::{KeySlot, ATTEST_KEY_SLOT};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InitStatus {
    NotInitialized,
    Ok,
    /// Generic failure code from the firmware status table. Initialization
    /// reports one of the specific failures below instead.
    Failed,
    MissingFuseData,
    MissingSecureMaterial,
    OutOfMemory,
}

impl InitStatus {
    /// Stable numeric code shared with the firmware status reporting.
    pub fn code(&self) -> i32 {
        match self {
            InitStatus::Ok => 0,
            InitStatus::Failed => -1,
            InitStatus::NotInitialized => -10,
            InitStatus::MissingFuseData => -40,
            InitStatus::MissingSecureMaterial => -41,
            InitStatus::OutOfMemory => -50,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == InitStatus::Ok
    }
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitStatus::NotInitialized => "not initialized",
            InitStatus::Ok => "ok",
            InitStatus::Failed => "failed",
            InitStatus::MissingFuseData => "missing fuse data",
            InitStatus::MissingSecureMaterial => "missing secure material",
            InitStatus::OutOfMemory => "out of memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("device not ready: {0}")]
    NotReady(InitStatus),
    #[error("account {0} has the hardened bit set")]
    InvalidAccount(u32),
    #[error("signing failed")]
    SigningFailed,
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    pub attest_key_slot: KeySlot,
    /// Log the test mnemonic once per process. Bench debugging only.
    pub reveal_test_mnemonic: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            attest_key_slot: ATTEST_KEY_SLOT,
            reveal_test_mnemonic: false,
        }
    }
}
