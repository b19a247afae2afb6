//! Device session facade
//!
//! Everything that talks to the hardware sits behind [`Wallet`]. The rest of
//! the crate only needs four things from a device:
//!
//! - [`Wallet::reset`] puts the session into its initial state;
//! - [`Wallet::set_get_pin_callback`] / [`Wallet::set_get_confirm_callback`]
//!   register the host-side prompts the device calls back into,
//!   synchronously, while an operation is running;
//! - [`Wallet::cipher_key_value`] runs the symmetric cipher-key-value
//!   operation.
//!
//! # Payload contract
//!
//! - **encrypt**: `value` is the raw plaintext; the device aligns it to
//!   [`BLOCK_LEN`](crate::codec::BLOCK_LEN) bytes itself.
//! - **decrypt**: `value` is the ciphertext as hex text, already padded to a
//!   whole number of blocks. A zero-length value must be rejected with
//!   [`DeviceError::EmptyPayload`].

use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::dummy::DummyWallet;
use crate::memory::SecretBuffer;
use crate::prompt::{PromptError, PromptRequest};

/// BIP-32 style path of the key subtree used for value encryption.
pub const DERIVATION_PATH: &str = "m/10019'/1'";

/// Fixed IV shared by the paired encrypt/decrypt operations.
///
/// This is a protocol constant, not a nonce: both directions must agree on it.
pub const DEFAULT_IV: [u8; 16] = *b"trezorCipher IV\0";

/// Key name used when none is configured.
pub const DEFAULT_KEY_NAME: &str = "unnamed key";

/// Host callback answering PIN and passphrase requests.
pub type PinCallback = Box<dyn FnMut(&PromptRequest) -> Result<SecretBuffer, PromptError>>;

/// Host callback answering yes/no confirmation requests.
pub type ConfirmCallback = Box<dyn FnMut(&PromptRequest) -> Result<bool, PromptError>>;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no trezor devices found")]
    NotFound,
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("device session is not initialized; reset it first")]
    NotInitialized,
    #[error("no data to decrypt")]
    EmptyPayload,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("invalid PIN")]
    PinInvalid,
    #[error("device requested a PIN but no prompt is registered")]
    NoPinCallback,
    #[error("prompt failed: {0}")]
    Prompt(#[from] PromptError),
    #[error("device failure: {0}")]
    Failure(String),
}

/// Outcome reported by the device alongside a cipher-key-value reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    Success,
    CipheredKeyValue,
    Failure,
    ButtonRequest,
    PinMatrixRequest,
    PassphraseRequest,
    Other(u16),
}

impl ResultStatus {
    /// Only these two outcomes carry a usable value.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Success | Self::CipheredKeyValue)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "unknown message type {}", code),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One cipher-key-value request.
#[derive(Clone, Copy)]
pub struct CipherKeyValue<'a> {
    pub path: &'a str,
    pub encrypt: bool,
    pub key_name: &'a str,
    pub value: &'a [u8],
    pub iv: &'a [u8; 16],
    pub ask_on_encrypt: bool,
    pub ask_on_decrypt: bool,
}

impl fmt::Debug for CipherKeyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKeyValue")
            .field("path", &self.path)
            .field("encrypt", &self.encrypt)
            .field("key_name", &self.key_name)
            .field("value_len", &self.value.len())
            .field("ask_on_encrypt", &self.ask_on_encrypt)
            .field("ask_on_decrypt", &self.ask_on_decrypt)
            .finish_non_exhaustive()
    }
}

/// Device answer to [`CipherKeyValue`].
pub struct CipherKeyValueReply {
    pub value: Zeroizing<Vec<u8>>,
    pub status: ResultStatus,
}

impl fmt::Debug for CipherKeyValueReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKeyValueReply")
            .field("value_len", &self.value.len())
            .field("status", &self.status)
            .finish()
    }
}

/// A hardware wallet session.
pub trait Wallet {
    /// Human-readable device name for diagnostics.
    fn name(&self) -> &str;

    /// Return the session to its initial state.
    fn reset(&mut self) -> Result<(), DeviceError>;

    fn set_get_pin_callback(&mut self, callback: PinCallback);

    fn set_get_confirm_callback(&mut self, callback: ConfirmCallback);

    fn cipher_key_value(
        &mut self,
        request: &CipherKeyValue<'_>,
    ) -> Result<CipherKeyValueReply, DeviceError>;
}

/// Locate a device to talk to.
///
/// `dummy` selects the built-in software device. No hardware transport is
/// bundled with this crate, so any other lookup reports
/// [`DeviceError::NotFound`].
pub fn find_device(dummy: bool) -> Result<Box<dyn Wallet>, DeviceError> {
    if dummy {
        log::info!("Using the dummy device.");
        return Ok(Box::new(DummyWallet::new()));
    }
    Err(DeviceError::NotFound)
}
