//! Security-specific tests.
//!
//! These tests verify:
//! 1. Secrets never show up in `Debug` output
//! 2. Malformed ciphertext and agent replies are rejected without panicking
//! 3. Nothing is produced once any stage fails

use std::io::Cursor;

use trezor_cipher_core::codec::{hex_pad_for_decrypt, CodecError, HEX_BLOCK_LEN};
use trezor_cipher_core::device::{
    CipherKeyValue, DeviceError, Wallet, DEFAULT_IV, DEFAULT_KEY_NAME, DERIVATION_PATH,
};
use trezor_cipher_core::dummy::DummyWallet;
use trezor_cipher_core::memory::SecretBuffer;
use trezor_cipher_core::prompt::pinentry::{parse_response, percent_decode};
use trezor_cipher_core::prompt::{trim_line_endings, PromptSettings, PromptStrategy};
use trezor_cipher_core::{run, CipherError, CipherParams, InputSource, Invocation, OperationMode};
use zeroize::Zeroizing;

// ============================================================================
// 1. Redaction
// ============================================================================

#[test]
fn test_secret_buffer_debug_is_redacted() {
    let secret = SecretBuffer::from(&b"hunter2-pin"[..]);
    let rendered = format!("{:?}", secret);
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("len: 11"));
}

#[test]
fn test_invocation_debug_is_redacted() {
    let invocation = Invocation::new(
        OperationMode::Encrypt,
        InputSource::Direct(Zeroizing::new(b"my disk key".to_vec())),
    );
    let rendered = format!("{:?}", invocation);
    assert!(!rendered.contains("my disk key"));
    assert!(rendered.contains("11 bytes"));
}

#[test]
fn test_device_reply_debug_is_redacted() {
    let mut wallet = DummyWallet::new();
    wallet.reset().unwrap();
    let request = CipherKeyValue {
        path: DERIVATION_PATH,
        encrypt: true,
        key_name: DEFAULT_KEY_NAME,
        value: b"plaintext!",
        iv: &DEFAULT_IV,
        ask_on_encrypt: true,
        ask_on_decrypt: true,
    };
    let reply = wallet.cipher_key_value(&request).unwrap();
    let rendered = format!("{:?} {:?}", request, reply);
    assert!(!rendered.contains("plaintext!"));
    assert!(!rendered.contains(&hex::encode(&*reply.value)));
}

// ============================================================================
// 2. Malformed input
// ============================================================================

#[test]
fn test_odd_hex_ciphertext_is_rejected() {
    for odd in [&b"a"[..], b"abc", b" abcde \n"] {
        assert!(matches!(
            hex_pad_for_decrypt(odd, true),
            Err(CodecError::OddHexLength(_))
        ));
    }
}

#[test]
fn test_padding_never_shrinks_or_misaligns() {
    for len in 0..80usize {
        let data = vec![0xA5u8; len];
        let padded = hex_pad_for_decrypt(&data, false).unwrap();
        assert_eq!(padded.len() % HEX_BLOCK_LEN, 0);
        assert!(padded.len() >= len * 2);
        assert!(padded[len * 2..].iter().all(|&c| c == b'0'));
    }
}

#[test]
fn test_non_hex_ciphertext_is_a_device_error() {
    let mut wallet = DummyWallet::new();
    let mut invocation = Invocation::new(OperationMode::Decrypt, InputSource::Stdin);
    invocation.hex = true;
    let settings = PromptSettings {
        askpass_path: Some("/nonexistent/askpass".into()),
        pty_relay: false,
        ..PromptSettings::default()
    };
    let prompt = PromptStrategy::select(&settings, None).unwrap().build().unwrap();

    let err = run(
        &mut wallet,
        prompt,
        &CipherParams::default(),
        &invocation,
        &mut Cursor::new(b"zz".repeat(16)),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CipherError::Device(DeviceError::InvalidPayload(_))
    ));
}

#[test]
fn test_garbage_agent_lines_do_not_panic() {
    let samples: [&[u8]; 9] = [
        b"",
        b" ",
        b"ERR",
        b"ERR notanumber",
        b"ERR 99",
        b"D %",
        b"D %4",
        b"D %zz%41",
        b"\xff\xfe\x00",
    ];
    for sample in samples {
        let _ = parse_response(sample);
        let _ = percent_decode(sample);
    }
    assert_eq!(percent_decode(b"%zz%41"), b"%zzA");
}

#[test]
fn test_askpass_answer_trimming_keeps_inner_bytes() {
    assert_eq!(trim_line_endings(b"pass\r\n\n"), b"pass");
    assert_eq!(trim_line_endings(b"pa\nss\n"), b"pa\nss");
    assert_eq!(trim_line_endings(b" pass \n"), b" pass ");
    assert_eq!(trim_line_endings(b"\n\r"), b"");
}

// ============================================================================
// 3. Fail closed
// ============================================================================

#[test]
fn test_wrong_pin_produces_no_output() {
    let mut wallet = DummyWallet::new().with_pin(b"1234");
    let invocation = Invocation::new(
        OperationMode::Encrypt,
        InputSource::Direct(Zeroizing::new(b"value".to_vec())),
    );
    let settings = PromptSettings {
        askpass_path: Some("/nonexistent/askpass".into()),
        pty_relay: false,
        ..PromptSettings::default()
    };
    let prompt = PromptStrategy::select(&settings, None).unwrap().build().unwrap();

    // The askpass program cannot be started, so the PIN callback fails.
    let result = run(
        &mut wallet,
        prompt,
        &CipherParams::default(),
        &invocation,
        &mut Cursor::new(Vec::new()),
    );
    assert!(matches!(
        result,
        Err(CipherError::Device(DeviceError::Prompt(_)))
    ));
}
