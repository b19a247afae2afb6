//! One encrypt or decrypt run, end to end
//!
//! The order is fixed and nothing is retried:
//!
//! 1. install the PIN prompt and the always-deny confirmation callback;
//! 2. reset the device session;
//! 3. read the input value;
//! 4. decrypt only: hex-pad the ciphertext to whole blocks;
//! 5. run cipher-key-value and check the result status;
//! 6. encrypt only: hex-encode the result on request.
//!
//! The caller prints the returned bytes as-is.

use std::fmt;
use std::io::Read;

use crate::codec::{encode_output, hex_pad_for_decrypt};
use crate::device::{
    CipherKeyValue, Wallet, DEFAULT_IV, DEFAULT_KEY_NAME, DERIVATION_PATH,
};
use crate::error::CipherError;
use crate::input::{InputSource, PayloadBuffer};
use crate::prompt::{deny_confirmation, PromptBackend, PromptRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Encrypt,
    Decrypt,
}

impl OperationMode {
    /// Exactly one of the two flags must be set.
    pub fn from_flags(encrypt: bool, decrypt: bool) -> Option<Self> {
        match (encrypt, decrypt) {
            (true, false) => Some(Self::Encrypt),
            (false, true) => Some(Self::Decrypt),
            _ => None,
        }
    }

    pub fn is_encrypt(self) -> bool {
        self == Self::Encrypt
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encrypt => f.write_str("encrypt"),
            Self::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Protocol constants, injected so tests can substitute them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParams {
    pub derivation_path: String,
    pub iv: [u8; 16],
    pub ask_on_encrypt: bool,
    pub ask_on_decrypt: bool,
}

impl Default for CipherParams {
    fn default() -> Self {
        Self {
            derivation_path: DERIVATION_PATH.to_string(),
            iv: DEFAULT_IV,
            ask_on_encrypt: true,
            ask_on_decrypt: true,
        }
    }
}

/// What the operator asked for.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub mode: OperationMode,
    pub key_name: String,
    /// Ciphertext is hex text: read as hex on decrypt, printed as hex on encrypt.
    pub hex: bool,
    pub input: InputSource,
}

impl Invocation {
    pub fn new(mode: OperationMode, input: InputSource) -> Self {
        Self {
            mode,
            key_name: DEFAULT_KEY_NAME.to_string(),
            hex: false,
            input,
        }
    }
}

/// Run one operation against `wallet`, prompting through `prompt`.
///
/// `stdin` is read only when the input source is standard input.
pub fn run(
    wallet: &mut dyn Wallet,
    mut prompt: Box<dyn PromptBackend>,
    params: &CipherParams,
    invocation: &Invocation,
    stdin: &mut dyn Read,
) -> Result<PayloadBuffer, CipherError> {
    wallet.set_get_pin_callback(Box::new(move |request: &PromptRequest| {
        prompt.get_secret(request)
    }));
    wallet.set_get_confirm_callback(Box::new(deny_confirmation));

    log::info!(
        "Setting the {} device state to the initial state.",
        wallet.name()
    );
    wallet.reset().map_err(CipherError::ResetFailed)?;

    let data = invocation.input.read(stdin)?;
    let payload = match invocation.mode {
        OperationMode::Encrypt => data,
        OperationMode::Decrypt => hex_pad_for_decrypt(&data, invocation.hex)?,
    };

    log::info!("Sent a request to the device (please confirm the operation if required).");
    let request = CipherKeyValue {
        path: &params.derivation_path,
        encrypt: invocation.mode.is_encrypt(),
        key_name: &invocation.key_name,
        value: &payload,
        iv: &params.iv,
        ask_on_encrypt: params.ask_on_encrypt,
        ask_on_decrypt: params.ask_on_decrypt,
    };
    let reply = wallet
        .cipher_key_value(&request)
        .map_err(CipherError::Device)?;

    if !reply.status.is_accepted() {
        return Err(CipherError::ProtocolViolation(reply.status));
    }
    log::debug!("device answered {} with {} bytes", reply.status, reply.value.len());

    Ok(match invocation.mode {
        OperationMode::Encrypt => encode_output(&reply.value, invocation.hex),
        OperationMode::Decrypt => reply.value,
    })
}
