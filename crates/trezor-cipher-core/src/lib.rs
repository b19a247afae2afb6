//! trezor-cipher core
//!
//! Encrypts or decrypts a single value with a key that never leaves a
//! hardware wallet, using the device's symmetric cipher-key-value operation.
//!
//! # Pipeline
//!
//! input ([`input`]) → padding ([`codec`]) → device ([`device`]) → output.
//! PINs and passphrases are collected through a [`prompt`] backend that the
//! device calls back into while the operation runs.
//!
//! # Ciphertext format
//!
//! AES-256-CBC under the key derived on the device from `m/10019'/1'` and the
//! key name, with a fixed IV and zero padding to 16-byte blocks. Decrypted
//! plaintext keeps those trailing zero bytes.

pub mod codec;
pub mod device;
pub mod dummy;
pub mod error;
pub mod input;
pub mod memory;
pub mod operation;
pub mod prompt;

pub use device::{find_device, DeviceError, ResultStatus, Wallet};
pub use error::CipherError;
pub use input::{InputSource, PayloadBuffer};
pub use operation::{run, CipherParams, Invocation, OperationMode};
pub use prompt::{PromptBackend, PromptSettings, PromptStrategy};
