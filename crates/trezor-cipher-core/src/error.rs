//! Run-level errors and their process exit codes
//!
//! Every error is terminal: nothing is retried and nothing is written to
//! stdout once one has occurred.

use thiserror::Error;

use crate::codec::CodecError;
use crate::device::{DeviceError, ResultStatus};
use crate::input::InputError;
use crate::prompt::{AskpassNotFound, PromptError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_NO_DEVICE: i32 = 1;
pub const EXIT_RESET_FAILED: i32 = 2;
pub const EXIT_DEVICE_FAILED: i32 = 3;
pub const EXIT_NO_ASKPASS: i32 = 6;
/// getopt-style usage error (`EINVAL`).
pub const EXIT_USAGE: i32 = 22;
pub const EXIT_FATAL: i32 = 255;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error(transparent)]
    AskpassNotFound(#[from] AskpassNotFound),

    #[error("cannot start the PIN/passphrase prompt: {0}")]
    PromptSetup(#[source] PromptError),

    #[error("{0}")]
    NoDevice(#[source] DeviceError),

    #[error("cannot set the device state to the initial state: {0}")]
    ResetFailed(#[source] DeviceError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("device operation failed: {0}")]
    Device(#[source] DeviceError),

    #[error("device answered with unexpected status: {0}")]
    ProtocolViolation(ResultStatus),
}

impl CipherError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AskpassNotFound(_) => EXIT_NO_ASKPASS,
            Self::NoDevice(_) => EXIT_NO_DEVICE,
            Self::ResetFailed(_) => EXIT_RESET_FAILED,
            Self::Device(_) | Self::ProtocolViolation(_) => EXIT_DEVICE_FAILED,
            Self::PromptSetup(_) | Self::Input(_) | Self::Codec(_) => EXIT_FATAL,
        }
    }
}
