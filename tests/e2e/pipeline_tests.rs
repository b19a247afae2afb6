//! End-to-end pipeline scenarios against the dummy device.
//!
//! Each test walks the same path as the binary:
//! 1. Prompt strategy selection (fails before any device call)
//! 2. Device reset
//! 3. Input acquisition and padding
//! 4. cipher-key-value and status check
//! 5. Output encoding

use std::ffi::OsStr;
use std::io::Cursor;
use std::path::Path;

use trezor_cipher_core::codec::HEX_BLOCK_LEN;
use trezor_cipher_core::device::{DeviceError, ResultStatus, DEFAULT_KEY_NAME};
use trezor_cipher_core::dummy::{DeviceCall, DummyWallet};
use trezor_cipher_core::error::{EXIT_DEVICE_FAILED, EXIT_NO_ASKPASS, EXIT_RESET_FAILED};
use trezor_cipher_core::input::InputSource;
use trezor_cipher_core::prompt::{PromptSettings, PromptStrategy};
use trezor_cipher_core::{run, CipherError, CipherParams, Invocation, OperationMode, PayloadBuffer};
use zeroize::Zeroizing;

/// Askpass that is never started: the dummy device has no PIN by default.
const IDLE_ASKPASS: &str = "/nonexistent/askpass";

fn idle_settings() -> PromptSettings {
    PromptSettings {
        askpass_path: Some(IDLE_ASKPASS.into()),
        pty_relay: false,
        ..PromptSettings::default()
    }
}

/// Strategy selection, backend construction and the run, in binary order.
fn pipeline(
    wallet: &mut DummyWallet,
    settings: &PromptSettings,
    path_env: Option<&OsStr>,
    invocation: &Invocation,
    stdin: &[u8],
) -> Result<PayloadBuffer, CipherError> {
    let strategy = PromptStrategy::select(settings, path_env)?;
    let prompt = strategy.build().map_err(CipherError::PromptSetup)?;
    run(
        wallet,
        prompt,
        &CipherParams::default(),
        invocation,
        &mut Cursor::new(stdin.to_vec()),
    )
}

fn invocation(mode: OperationMode, hex: bool) -> Invocation {
    let mut invocation = Invocation::new(mode, InputSource::Stdin);
    invocation.hex = hex;
    invocation
}

fn encrypt(wallet: &mut DummyWallet, value: &[u8], hex: bool) -> PayloadBuffer {
    pipeline(
        wallet,
        &idle_settings(),
        None,
        &invocation(OperationMode::Encrypt, hex),
        value,
    )
    .unwrap()
}

fn decrypt(wallet: &mut DummyWallet, ciphertext: &[u8], hex: bool) -> PayloadBuffer {
    pipeline(
        wallet,
        &idle_settings(),
        None,
        &invocation(OperationMode::Decrypt, hex),
        ciphertext,
    )
    .unwrap()
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_some_key_round_trip_is_zero_padded() {
    let mut wallet = DummyWallet::new();
    let ciphertext = encrypt(&mut wallet, b"Some key", false);
    assert_eq!(ciphertext.len(), 16);

    let plaintext = decrypt(&mut wallet, &ciphertext, false);
    assert_eq!(plaintext.as_slice(), b"Some key\0\0\0\0\0\0\0\0");
}

#[test]
fn test_test_data_from_env_style_input_in_hex() {
    let mut wallet = DummyWallet::new();
    let mut encrypt_hex = invocation(OperationMode::Encrypt, true);
    encrypt_hex.input = InputSource::select(Some(b"test data".to_vec()), Path::new("-"));

    let ciphertext = pipeline(&mut wallet, &idle_settings(), None, &encrypt_hex, b"").unwrap();
    assert_eq!(ciphertext.len() % 2, 0);
    assert_eq!(ciphertext.len() % HEX_BLOCK_LEN, 0);

    let plaintext = decrypt(&mut wallet, &ciphertext, true);
    assert_eq!(&plaintext[..9], b"test data");
    assert!(plaintext[9..].iter().all(|&b| b == 0));
}

#[test]
fn test_hex_ciphertext_with_trailing_newline_decrypts() {
    let mut wallet = DummyWallet::new();
    let mut ciphertext = encrypt(&mut wallet, b"echoed", true).to_vec();
    ciphertext.push(b'\n');

    let plaintext = decrypt(&mut wallet, &ciphertext, true);
    assert!(plaintext.starts_with(b"echoed"));
}

#[test]
fn test_multi_block_value() {
    let value = vec![0x5Au8; 100];
    let mut wallet = DummyWallet::new();
    let ciphertext = encrypt(&mut wallet, &value, false);
    assert_eq!(ciphertext.len(), 112);

    let plaintext = decrypt(&mut wallet, &ciphertext, false);
    assert_eq!(&plaintext[..100], value.as_slice());
    assert_eq!(&plaintext[100..], &[0u8; 12]);
}

#[test]
fn test_ciphertext_is_bound_to_key_name() {
    let mut wallet = DummyWallet::new();
    let ciphertext = encrypt(&mut wallet, b"bound", false);

    let mut other_key = invocation(OperationMode::Decrypt, false);
    other_key.key_name = "another key".into();
    let plaintext = pipeline(&mut wallet, &idle_settings(), None, &other_key, &ciphertext).unwrap();
    assert_ne!(&plaintext[..5], b"bound");
}

#[test]
fn test_file_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("value");
    std::fs::write(&path, b"file value").unwrap();

    let mut wallet = DummyWallet::new();
    let mut from_file = invocation(OperationMode::Encrypt, false);
    from_file.input = InputSource::select(None, &path);
    let a = pipeline(&mut wallet, &idle_settings(), None, &from_file, b"").unwrap();
    let b = encrypt(&mut wallet, b"file value", false);
    assert_eq!(a, b);
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn test_empty_encrypt_produces_one_block() {
    let mut wallet = DummyWallet::new();
    assert_eq!(encrypt(&mut wallet, b"", false).len(), 16);
    assert_eq!(encrypt(&mut wallet, b"", true).len(), HEX_BLOCK_LEN);
}

#[test]
fn test_empty_decrypt_reaches_the_device_and_fails() {
    let mut wallet = DummyWallet::new();
    let err = pipeline(
        &mut wallet,
        &idle_settings(),
        None,
        &invocation(OperationMode::Decrypt, false),
        b"",
    )
    .unwrap_err();

    assert!(matches!(err, CipherError::Device(DeviceError::EmptyPayload)));
    assert_eq!(err.exit_code(), EXIT_DEVICE_FAILED);
    assert_eq!(
        wallet.calls().last(),
        Some(&DeviceCall::CipherKeyValue {
            encrypt: false,
            key_name: DEFAULT_KEY_NAME.into(),
            value_len: 0,
        })
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_missing_askpass_fails_before_reset() {
    let empty_path = tempfile::tempdir().unwrap();

    let mut wallet = DummyWallet::new();
    let settings = PromptSettings {
        pty_relay: false,
        askpass_candidates: vec![
            empty_path.path().join("askpass"),
            "systemd-ask-password".into(),
        ],
        ..PromptSettings::default()
    };
    let err = pipeline(
        &mut wallet,
        &settings,
        Some(empty_path.path().as_os_str()),
        &invocation(OperationMode::Encrypt, false),
        b"value",
    )
    .unwrap_err();

    assert!(matches!(err, CipherError::AskpassNotFound(_)));
    assert_eq!(err.exit_code(), EXIT_NO_ASKPASS);
    assert!(wallet.calls().is_empty(), "device must not be touched");
}

#[test]
fn test_confirmation_request_means_unavailable() {
    let mut wallet = DummyWallet::new().with_reconnect_confirmation();
    let err = pipeline(
        &mut wallet,
        &idle_settings(),
        None,
        &invocation(OperationMode::Encrypt, false),
        b"value",
    )
    .unwrap_err();

    assert!(matches!(err, CipherError::Device(DeviceError::Unavailable(_))));
    assert_eq!(err.exit_code(), EXIT_DEVICE_FAILED);
}

#[test]
fn test_reset_failure() {
    let mut wallet = DummyWallet::new().with_failing_reset();
    let err = pipeline(
        &mut wallet,
        &idle_settings(),
        None,
        &invocation(OperationMode::Encrypt, false),
        b"value",
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), EXIT_RESET_FAILED);
    assert_eq!(wallet.calls(), &[DeviceCall::Reset]);
}

#[test]
fn test_failure_status_is_rejected() {
    let mut wallet = DummyWallet::new().with_status(ResultStatus::Failure);
    let err = pipeline(
        &mut wallet,
        &idle_settings(),
        None,
        &invocation(OperationMode::Encrypt, true),
        b"value",
    )
    .unwrap_err();
    assert!(matches!(err, CipherError::ProtocolViolation(ResultStatus::Failure)));
    assert_eq!(err.exit_code(), EXIT_DEVICE_FAILED);
}

#[test]
fn test_direct_value_ignores_stdin() {
    let mut wallet = DummyWallet::new();
    let mut direct = invocation(OperationMode::Encrypt, false);
    direct.input = InputSource::Direct(Zeroizing::new(b"direct".to_vec()));

    let a = pipeline(&mut wallet, &idle_settings(), None, &direct, b"stdin value").unwrap();
    let b = encrypt(&mut wallet, b"direct", false);
    assert_eq!(a, b);
}
