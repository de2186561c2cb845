mod model;

pub use model::{render_model_name, ModelName, Truncated};

use crate::fuse::{FuseBlock, FuseBlockId, FuseError};
use serde::{Deserialize, Serialize};

pub const IDENTITY_FORMAT_VERSION: u32 = 1;

const VERSION_WORD: usize = 0;
const MODEL_WORD: usize = 1;
const SERIAL_WORD: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity: unsupported fuse format version {0}")]
    UnsupportedVersion(u32),
    #[error("identity: model number not provisioned")]
    MissingModel,
    #[error("identity: serial number not provisioned")]
    MissingSerial,
    #[error(transparent)]
    Fuse(#[from] FuseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub format_version: u32,
    pub model_number: u32,
    pub serial_number: u32,
}

impl DeviceIdentity {
    /// Reads the identity words from the device-info fuse block. An
    /// unprovisioned unit (format version other than 1, or a zero model or
    /// serial) has no identity.
    pub fn read(fuses: &dyn FuseBlock) -> Result<Self, IdentityError> {
        let format_version = fuses.read_word(FuseBlockId::DeviceInfo, VERSION_WORD)?;
        let model_number = fuses.read_word(FuseBlockId::DeviceInfo, MODEL_WORD)?;
        let serial_number = fuses.read_word(FuseBlockId::DeviceInfo, SERIAL_WORD)?;

        if format_version != IDENTITY_FORMAT_VERSION {
            return Err(IdentityError::UnsupportedVersion(format_version));
        }
        if model_number == 0 {
            return Err(IdentityError::MissingModel);
        }
        if serial_number == 0 {
            return Err(IdentityError::MissingSerial);
        }

        Ok(Self {
            format_version,
            model_number,
            serial_number,
        })
    }
}
