//! Padding codec around the cipher block boundary
//!
//! The cipher-key-value operation works on 16-byte blocks. The two directions
//! are shaped differently:
//!
//! - **Decrypt**: the ciphertext is carried as hex text and must already be
//!   block aligned, because the device does not pad on decrypt. Raw input is
//!   hex-encoded first, then right-padded with `"00"` pairs up to a multiple
//!   of [`HEX_BLOCK_LEN`] characters.
//! - **Encrypt**: plaintext goes to the device untouched (the device aligns
//!   it). The only duty here is hex-encoding the result on request.

use thiserror::Error;
use zeroize::Zeroizing;

use crate::input::PayloadBuffer;

/// Cipher block size in bytes.
pub const BLOCK_LEN: usize = 16;

/// Cipher block size in hex characters.
pub const HEX_BLOCK_LEN: usize = BLOCK_LEN * 2;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("internal error: hex payload length {0} is odd")]
    OddHexLength(usize),
}

/// Number of `'0'` characters needed to align `hex_len` to a whole block.
pub fn hex_padding_len(hex_len: usize) -> usize {
    (HEX_BLOCK_LEN - hex_len % HEX_BLOCK_LEN) % HEX_BLOCK_LEN
}

/// Shape a ciphertext into the block-aligned hex text the device expects.
///
/// With `already_hex` the input is taken as hex text (surrounding ASCII
/// whitespace, such as the newline `echo` leaves behind, is ignored);
/// otherwise the raw bytes are hex-encoded first. Empty input produces an
/// empty payload.
pub fn hex_pad_for_decrypt(data: &[u8], already_hex: bool) -> Result<PayloadBuffer, CodecError> {
    let mut hexed = if already_hex {
        Zeroizing::new(data.trim_ascii().to_vec())
    } else {
        Zeroizing::new(hex::encode(data).into_bytes())
    };

    if hexed.len() % 2 != 0 {
        return Err(CodecError::OddHexLength(hexed.len()));
    }

    let padding = hex_padding_len(hexed.len());
    hexed.reserve_exact(padding);
    while hexed.len() % HEX_BLOCK_LEN != 0 {
        hexed.extend_from_slice(b"00");
    }

    Ok(hexed)
}

/// Encode the encrypt-side device output for printing.
pub fn encode_output(result: &[u8], hex_output: bool) -> PayloadBuffer {
    if hex_output {
        Zeroizing::new(hex::encode(result).into_bytes())
    } else {
        Zeroizing::new(result.to_vec())
    }
}
