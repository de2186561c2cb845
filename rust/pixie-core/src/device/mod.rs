mod types;

pub use types::{DeviceError, DeviceOptions, InitStatus};

use crate::attestation::{AttestationRecord, Attestor, CHALLENGE_LEN};
use crate::derivation::{self, TestPrivateKey};
use crate::fuse::FuseBlock;
use crate::identity::{render_model_name, DeviceIdentity, ModelName, Truncated};
use crate::oracle::OracleHandle;
use crate::partition::SecurePartition;
use crate::secure_material::{MaterialError, SecureMaterial};
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

/// A Pixie unit: identity fuses, the secure partition and the signing
/// peripheral, plus the one-time initialization result.
pub struct Device {
    fuses: Box<dyn FuseBlock>,
    partition: Box<dyn SecurePartition>,
    oracle: OracleHandle,
    options: DeviceOptions,
    state: OnceLock<DeviceState>,
    account0: Mutex<Option<TestPrivateKey>>,
    mnemonic_revealed: AtomicBool,
}

enum DeviceState {
    Ready(Provisioned),
    Failed(InitStatus),
}

impl DeviceState {
    fn status(&self) -> InitStatus {
        match self {
            DeviceState::Ready(_) => InitStatus::Ok,
            DeviceState::Failed(status) => *status,
        }
    }
}

struct Provisioned {
    identity: DeviceIdentity,
    material: SecureMaterial,
}

impl Device {
    pub fn new(
        fuses: Box<dyn FuseBlock>,
        partition: Box<dyn SecurePartition>,
        oracle: OracleHandle,
    ) -> Self {
        Self {
            fuses,
            partition,
            oracle,
            options: DeviceOptions::default(),
            state: OnceLock::new(),
            account0: Mutex::new(None),
            mnemonic_revealed: AtomicBool::new(false),
        }
    }

    pub fn with_options(mut self, options: DeviceOptions) -> Self {
        self.options = options;
        self
    }

    /// Reads the identity fuses, then the secure material. Runs once; later
    /// and concurrent callers get the stored result.
    pub fn initialize(&self) -> InitStatus {
        self.state.get_or_init(|| self.provision()).status()
    }

    fn provision(&self) -> DeviceState {
        let identity = match DeviceIdentity::read(self.fuses.as_ref()) {
            Ok(identity) => identity,
            Err(e) => {
                log::warn!("device identity unavailable: {}", e);
                return DeviceState::Failed(InitStatus::MissingFuseData);
            }
        };

        let material = match SecureMaterial::load(self.partition.as_ref()) {
            Ok(material) => material,
            Err(MaterialError::OutOfMemory(len)) => {
                log::error!("out of memory loading secure material ({} bytes)", len);
                return DeviceState::Failed(InitStatus::OutOfMemory);
            }
            Err(e) => {
                log::warn!("secure material unavailable: {}", e);
                return DeviceState::Failed(InitStatus::MissingSecureMaterial);
            }
        };

        log::info!(
            "initialized {} serial {}",
            ModelName::Model(identity.model_number),
            identity.serial_number
        );
        DeviceState::Ready(Provisioned { identity, material })
    }

    pub fn status(&self) -> InitStatus {
        self.state
            .get()
            .map(DeviceState::status)
            .unwrap_or(InitStatus::NotInitialized)
    }

    fn provisioned(&self) -> Result<&Provisioned, DeviceError> {
        match self.state.get() {
            Some(DeviceState::Ready(provisioned)) => Ok(provisioned),
            Some(DeviceState::Failed(status)) => Err(DeviceError::NotReady(*status)),
            None => Err(DeviceError::NotReady(InitStatus::NotInitialized)),
        }
    }

    fn attestor<'a>(&'a self, provisioned: &'a Provisioned) -> Attestor<'a> {
        Attestor {
            identity: &provisioned.identity,
            material: &provisioned.material,
            oracle: self.oracle.as_ref(),
            key_slot: self.options.attest_key_slot,
        }
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.provisioned().ok().map(|p| p.identity)
    }

    pub fn model_number(&self) -> Option<u32> {
        self.identity().map(|identity| identity.model_number)
    }

    pub fn serial_number(&self) -> Option<u32> {
        self.identity().map(|identity| identity.serial_number)
    }

    pub fn model_name(&self) -> ModelName {
        match self.state.get() {
            None => ModelName::Uninitialized,
            Some(DeviceState::Failed(_)) => ModelName::Failed,
            Some(DeviceState::Ready(p)) => ModelName::Model(p.identity.model_number),
        }
    }

    pub fn write_model_name<'a>(&self, out: &'a mut [u8]) -> Result<&'a str, Truncated> {
        render_model_name(self.model_name(), out)
    }

    pub fn can_attest(&self) -> bool {
        self.status().is_ok()
    }

    pub fn attest(&self, challenge: &[u8; CHALLENGE_LEN]) -> Result<AttestationRecord, DeviceError> {
        let provisioned = self.provisioned()?;
        self.attestor(provisioned).attest(challenge)
    }

    /// Derives the test key for `account`. Account 0 is computed once and
    /// cached; concurrent first callers wait for the single computation.
    pub fn derive_test_key(&self, account: u32) -> Result<TestPrivateKey, DeviceError> {
        let provisioned = self.provisioned()?;
        if account > derivation::MAX_ACCOUNT {
            return Err(DeviceError::InvalidAccount(account));
        }
        let attestor = self.attestor(provisioned);
        let reveal = self
            .options
            .reveal_test_mnemonic
            .then_some(&self.mnemonic_revealed);

        if account != 0 {
            return derivation::derive_test_key(&attestor, account, reveal);
        }

        let mut cached = self.account0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let started = Instant::now();
        let key = derivation::derive_test_key(&attestor, 0, reveal)?;
        log::info!("account 0 test key ready in {:?}", started.elapsed());
        *cached = Some(key.clone());
        Ok(key)
    }
}
