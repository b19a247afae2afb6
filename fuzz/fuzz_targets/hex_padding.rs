#![no_main]

use libfuzzer_sys::fuzz_target;
use trezor_cipher_core::codec::{hex_pad_for_decrypt, HEX_BLOCK_LEN};

fuzz_target!(|data: &[u8]| {
    // Raw ciphertext always pads cleanly to whole hex blocks.
    let padded = hex_pad_for_decrypt(data, false).expect("raw input never fails");
    assert_eq!(padded.len() % HEX_BLOCK_LEN, 0);
    assert!(padded.len() >= data.len() * 2);

    // Hex text either pads or reports an odd length, never panics.
    if let Ok(padded) = hex_pad_for_decrypt(data, true) {
        assert_eq!(padded.len() % HEX_BLOCK_LEN, 0);
    }
});
