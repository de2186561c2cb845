//! Pixie API - process-wide device access
//!
//! Firmware components reach the device through free functions instead of
//! carrying a handle around. A [`Device`] is installed once at startup and cannot be replaced; every
//! call below then forwards to it. Before a device is installed the calls
//! behave like an uninitialized device.

use crate::attestation::{AttestationRecord, CHALLENGE_LEN};
use crate::derivation::TestPrivateKey;
use crate::device::{Device, DeviceError, InitStatus};
use crate::identity::{render_model_name, ModelName, Truncated};
use std::sync::{Arc, PoisonError, RwLock};

// =============================================================================
// Global State Management
// =============================================================================

lazy_static::lazy_static! {
    static ref GLOBAL_DEVICE: RwLock<Option<Arc<Device>>> = RwLock::new(None);
}

/// Installs `device` as the process-wide device. Only the first install
/// takes effect; later calls drop their device and return the installed one.
pub fn install(device: Device) -> Arc<Device> {
    let mut global = GLOBAL_DEVICE.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = global.as_ref() {
        log::warn!(
            "device already installed ({}); ignoring replacement",
            existing.status()
        );
        return existing.clone();
    }
    let device = Arc::new(device);
    *global = Some(device.clone());
    device
}

pub fn device() -> Option<Arc<Device>> {
    GLOBAL_DEVICE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn not_installed() -> DeviceError {
    DeviceError::NotReady(InitStatus::NotInitialized)
}

// =============================================================================
// Device Operations
// =============================================================================

pub fn initialize() -> InitStatus {
    match device() {
        Some(device) => device.initialize(),
        None => {
            log::warn!("initialize called before a device was installed");
            InitStatus::NotInitialized
        }
    }
}

pub fn status() -> InitStatus {
    device()
        .map(|d| d.status())
        .unwrap_or(InitStatus::NotInitialized)
}

pub fn model_number() -> Option<u32> {
    device().and_then(|d| d.model_number())
}

pub fn serial_number() -> Option<u32> {
    device().and_then(|d| d.serial_number())
}

pub fn model_name() -> ModelName {
    device()
        .map(|d| d.model_name())
        .unwrap_or(ModelName::Uninitialized)
}

pub fn write_model_name(out: &mut [u8]) -> Result<&str, Truncated> {
    render_model_name(model_name(), out)
}

pub fn can_attest() -> bool {
    device().is_some_and(|d| d.can_attest())
}

pub fn attest(challenge: &[u8; CHALLENGE_LEN]) -> Result<AttestationRecord, DeviceError> {
    device().ok_or_else(not_installed)?.attest(challenge)
}

pub fn derive_test_key(account: u32) -> Result<TestPrivateKey, DeviceError> {
    device().ok_or_else(not_installed)?.derive_test_key(account)
}
