//! Deterministic software device
//!
//! Stands in for real hardware (`--dummy`) and backs the test-suite. It
//! follows the same cipher-key-value shape as the hardware:
//!
//! - per-request key: first 32 bytes of
//!   `HMAC-SHA512(seed, path || 0x00 || key_name || "E0"/"E1" || "D0"/"D1")`
//! - AES-256-CBC with the request IV over zero-aligned 16-byte blocks
//!
//! so the same key name, path and ask flags always round-trip.
//!
//! Knobs for exercising the host side: a PIN ([`DummyWallet::with_pin`]),
//! a reconnect confirmation ([`DummyWallet::with_reconnect_confirmation`]),
//! a failing reset and a forced result status. Every call is recorded in
//! [`DummyWallet::calls`].

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::codec::BLOCK_LEN;
use crate::device::{
    CipherKeyValue, CipherKeyValueReply, ConfirmCallback, DeviceError, PinCallback, ResultStatus,
    Wallet,
};
use crate::prompt::PromptRequest;

type HmacSha512 = Hmac<Sha512>;

/// Fixed master secret of every dummy device.
const DUMMY_SEED: &[u8; 32] = b"trezor-cipher dummy device seed!";

const AES_KEY_LEN: usize = 32;

/// Something the dummy device was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Reset,
    PinRequested { title: String },
    ConfirmRequested { title: String },
    CipherKeyValue {
        encrypt: bool,
        key_name: String,
        value_len: usize,
    },
}

pub struct DummyWallet {
    pin: Option<Zeroizing<Vec<u8>>>,
    reconnect_confirmation: bool,
    fail_reset: bool,
    status: ResultStatus,
    initialized: bool,
    unlocked: bool,
    get_pin: Option<PinCallback>,
    get_confirm: Option<ConfirmCallback>,
    calls: Vec<DeviceCall>,
}

impl DummyWallet {
    pub fn new() -> Self {
        Self {
            pin: None,
            reconnect_confirmation: false,
            fail_reset: false,
            status: ResultStatus::CipheredKeyValue,
            initialized: false,
            unlocked: false,
            get_pin: None,
            get_confirm: None,
            calls: Vec::new(),
        }
    }

    /// Require `pin` once per session before any operation.
    pub fn with_pin(mut self, pin: &[u8]) -> Self {
        self.pin = Some(Zeroizing::new(pin.to_vec()));
        self
    }

    /// Ask the host to confirm a reconnect before every operation.
    pub fn with_reconnect_confirmation(mut self) -> Self {
        self.reconnect_confirmation = true;
        self
    }

    /// Make [`Wallet::reset`] fail.
    pub fn with_failing_reset(mut self) -> Self {
        self.fail_reset = true;
        self
    }

    /// Report `status` with every reply.
    pub fn with_status(mut self, status: ResultStatus) -> Self {
        self.status = status;
        self
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    fn unlock(&mut self) -> Result<(), DeviceError> {
        let Some(expected) = self.pin.as_ref() else {
            return Ok(());
        };
        if self.unlocked {
            return Ok(());
        }

        let request = PromptRequest::new(
            "PIN",
            "Enter the PIN of the dummy device",
            "OK",
            "Cancel",
        );
        self.calls.push(DeviceCall::PinRequested {
            title: request.title.clone(),
        });
        let callback = self.get_pin.as_mut().ok_or(DeviceError::NoPinCallback)?;
        let entered = callback(&request)?;

        if entered.as_slice() != expected.as_slice() {
            return Err(DeviceError::PinInvalid);
        }
        self.unlocked = true;
        Ok(())
    }

    fn confirm_reconnect(&mut self) -> Result<(), DeviceError> {
        let request = PromptRequest::new(
            "Reconnect",
            "The device was disconnected. Reconnect?",
            "Reconnect",
            "Cancel",
        );
        self.calls.push(DeviceCall::ConfirmRequested {
            title: request.title.clone(),
        });

        let confirmed = match self.get_confirm.as_mut() {
            Some(callback) => callback(&request)?,
            None => false,
        };
        if !confirmed {
            return Err(DeviceError::Unavailable(
                "reconnect confirmation declined".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DummyWallet {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyWallet")
            .field("has_pin", &self.pin.is_some())
            .field("initialized", &self.initialized)
            .field("unlocked", &self.unlocked)
            .field("status", &self.status)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl Wallet for DummyWallet {
    fn name(&self) -> &str {
        "dummy"
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Reset);
        if self.fail_reset {
            return Err(DeviceError::Unavailable("reset rejected".into()));
        }
        self.initialized = true;
        self.unlocked = false;
        Ok(())
    }

    fn set_get_pin_callback(&mut self, callback: PinCallback) {
        self.get_pin = Some(callback);
    }

    fn set_get_confirm_callback(&mut self, callback: ConfirmCallback) {
        self.get_confirm = Some(callback);
    }

    fn cipher_key_value(
        &mut self,
        request: &CipherKeyValue<'_>,
    ) -> Result<CipherKeyValueReply, DeviceError> {
        self.calls.push(DeviceCall::CipherKeyValue {
            encrypt: request.encrypt,
            key_name: request.key_name.to_string(),
            value_len: request.value.len(),
        });

        if !self.initialized {
            return Err(DeviceError::NotInitialized);
        }
        if self.reconnect_confirmation {
            self.confirm_reconnect()?;
        }
        self.unlock()?;

        let key = derive_key(request)?;
        let value = if request.encrypt {
            encrypt(&key, request.iv, request.value)
        } else {
            decrypt(&key, request.iv, request.value)?
        };

        log::debug!(
            "dummy device {} {} bytes",
            if request.encrypt { "encrypted" } else { "decrypted" },
            value.len()
        );

        Ok(CipherKeyValueReply {
            value,
            status: self.status,
        })
    }
}

fn derive_key(request: &CipherKeyValue<'_>) -> Result<Zeroizing<[u8; AES_KEY_LEN]>, DeviceError> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(DUMMY_SEED)
        .map_err(|e| DeviceError::Failure(e.to_string()))?;
    mac.update(request.path.as_bytes());
    mac.update(&[0]);
    mac.update(request.key_name.as_bytes());
    mac.update(if request.ask_on_encrypt { b"E1" } else { b"E0" });
    mac.update(if request.ask_on_decrypt { b"D1" } else { b"D0" });

    let mut digest = mac.finalize().into_bytes();
    let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
    key.copy_from_slice(&digest[..AES_KEY_LEN]);
    digest.as_mut_slice().zeroize();
    Ok(key)
}

/// Zero-pad to whole blocks (an empty value becomes one block) and encrypt.
fn encrypt(key: &[u8; AES_KEY_LEN], iv: &[u8; 16], value: &[u8]) -> Zeroizing<Vec<u8>> {
    let blocks = value.len().div_ceil(BLOCK_LEN).max(1);
    let mut plaintext = Zeroizing::new(value.to_vec());
    plaintext.resize(blocks * BLOCK_LEN, 0);

    let ciphertext = cbc::Encryptor::<Aes256>::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(&plaintext);
    Zeroizing::new(ciphertext)
}

/// Decode the hex ciphertext and decrypt it.
fn decrypt(
    key: &[u8; AES_KEY_LEN],
    iv: &[u8; 16],
    hex_value: &[u8],
) -> Result<Zeroizing<Vec<u8>>, DeviceError> {
    if hex_value.is_empty() {
        return Err(DeviceError::EmptyPayload);
    }

    let ciphertext = hex::decode(hex_value)
        .map_err(|e| DeviceError::InvalidPayload(format!("ciphertext is not hex: {}", e)))?;
    if ciphertext.len() % BLOCK_LEN != 0 {
        return Err(DeviceError::InvalidPayload(format!(
            "ciphertext length {} is not a multiple of {}",
            ciphertext.len(),
            BLOCK_LEN
        )));
    }

    let plaintext = cbc::Decryptor::<Aes256>::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(&ciphertext)
        .map_err(|e| DeviceError::Failure(e.to_string()))?;
    Ok(Zeroizing::new(plaintext))
}
