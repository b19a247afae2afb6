#![no_main]

use libfuzzer_sys::fuzz_target;
use trezor_cipher_core::prompt::pinentry::{parse_response, percent_decode, percent_encode};

fuzz_target!(|data: &[u8]| {
    // Any line a misbehaving pinentry sends must parse to some Response.
    let _ = parse_response(data);

    let decoded = percent_decode(data);
    assert!(decoded.len() <= data.len());

    // Escaping then unescaping is the identity on text arguments.
    if let Ok(s) = std::str::from_utf8(data) {
        assert_eq!(percent_decode(percent_encode(s).as_bytes()), s.as_bytes());
    }
});
