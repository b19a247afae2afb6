//! PIN entry through real helper processes.
//!
//! The dummy device is given a PIN, so every run has to go through the
//! selected prompt backend. The helpers are small shell scripts.

#![cfg(unix)]

use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use trezor_cipher_core::device::DeviceError;
use trezor_cipher_core::dummy::{DeviceCall, DummyWallet};
use trezor_cipher_core::error::EXIT_DEVICE_FAILED;
use trezor_cipher_core::input::InputSource;
use trezor_cipher_core::prompt::{PromptError, PromptSettings, PromptStrategy};
use trezor_cipher_core::{run, CipherError, CipherParams, Invocation, OperationMode, PayloadBuffer};

const PIN: &[u8] = b"246810";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let script = dir.join(name);
    std::fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o700)).unwrap();
    script
}

fn askpass_script(dir: &Path, answer: &str) -> PathBuf {
    write_script(
        dir,
        "askpass.sh",
        &format!("printf '%s: ' \"$1\" >&2\nprintf '{}\\n'\n", answer),
    )
}

/// Minimal pinentry: answers GETPIN with `getpin_reply`, everything else with OK.
fn pinentry_script(dir: &Path, getpin_reply: &str) -> PathBuf {
    write_script(
        dir,
        "pinentry.sh",
        &format!(
            "echo 'OK Pleased to meet you'\n\
             while read -r cmd rest; do\n\
               case \"$cmd\" in\n\
                 GETPIN) {} ;;\n\
                 BYE) echo OK; exit 0 ;;\n\
                 *) echo OK ;;\n\
               esac\n\
             done\n",
            getpin_reply
        ),
    )
}

fn encrypt_with(
    wallet: &mut DummyWallet,
    settings: &PromptSettings,
    value: &[u8],
) -> Result<PayloadBuffer, CipherError> {
    let prompt = PromptStrategy::select(settings, None)?
        .build()
        .map_err(CipherError::PromptSetup)?;
    let invocation = Invocation::new(
        OperationMode::Encrypt,
        InputSource::Direct(value.to_vec().into()),
    );
    run(
        wallet,
        prompt,
        &CipherParams::default(),
        &invocation,
        &mut Cursor::new(Vec::new()),
    )
}

fn askpass_settings(program: PathBuf, pty_relay: bool) -> PromptSettings {
    PromptSettings {
        askpass_path: Some(program),
        pty_relay,
        ..PromptSettings::default()
    }
}

fn pinentry_settings(program: PathBuf) -> PromptSettings {
    PromptSettings {
        use_pinentry: true,
        pinentry_program: program,
        ..PromptSettings::default()
    }
}

fn reference_ciphertext(value: &[u8]) -> PayloadBuffer {
    let settings = askpass_settings("/nonexistent/askpass".into(), false);
    encrypt_with(&mut DummyWallet::new(), &settings, value).unwrap()
}

#[test]
fn test_askpass_supplies_the_pin() {
    let dir = tempfile::tempdir().unwrap();
    let program = askpass_script(dir.path(), "246810");

    let mut wallet = DummyWallet::new().with_pin(PIN);
    let out = encrypt_with(&mut wallet, &askpass_settings(program, false), b"value").unwrap();

    assert_eq!(out, reference_ciphertext(b"value"));
    assert!(wallet.calls().contains(&DeviceCall::PinRequested {
        title: "PIN".into()
    }));
}

#[test]
fn test_pty_askpass_supplies_the_pin() {
    let dir = tempfile::tempdir().unwrap();
    let program = askpass_script(dir.path(), "246810");

    let mut wallet = DummyWallet::new().with_pin(PIN);
    let out = encrypt_with(&mut wallet, &askpass_settings(program, true), b"value").unwrap();
    assert_eq!(out, reference_ciphertext(b"value"));
}

#[test]
fn test_pty_askpass_reading_the_terminal() {
    let dir = tempfile::tempdir().unwrap();
    // Insists on a terminal like cryptsetup's askpass does.
    let program = write_script(
        dir.path(),
        "tty-askpass.sh",
        "[ -t 0 ] || exit 1\nprintf '246810\\n'\n",
    );

    let mut wallet = DummyWallet::new().with_pin(PIN);
    let out = encrypt_with(&mut wallet, &askpass_settings(program, true), b"value").unwrap();
    assert_eq!(out, reference_ciphertext(b"value"));
}

#[test]
fn test_wrong_askpass_answer() {
    let dir = tempfile::tempdir().unwrap();
    let program = askpass_script(dir.path(), "000000");

    let mut wallet = DummyWallet::new().with_pin(PIN);
    let err = encrypt_with(&mut wallet, &askpass_settings(program, false), b"value").unwrap_err();
    assert!(matches!(err, CipherError::Device(DeviceError::PinInvalid)));
    assert_eq!(err.exit_code(), EXIT_DEVICE_FAILED);
}

#[test]
fn test_pinentry_supplies_the_pin() {
    let dir = tempfile::tempdir().unwrap();
    let program = pinentry_script(dir.path(), "echo 'D 246810'; echo OK");

    let mut wallet = DummyWallet::new().with_pin(PIN);
    let out = encrypt_with(&mut wallet, &pinentry_settings(program), b"value").unwrap();
    assert_eq!(out, reference_ciphertext(b"value"));
}

#[test]
fn test_pinentry_percent_escaped_pin() {
    let dir = tempfile::tempdir().unwrap();
    // "24%25" decodes to "24%"
    let program = pinentry_script(dir.path(), "echo 'D 24%25'; echo OK");

    let mut wallet = DummyWallet::new().with_pin(b"24%");
    assert!(encrypt_with(&mut wallet, &pinentry_settings(program), b"value").is_ok());
}

#[test]
fn test_pinentry_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let program = pinentry_script(dir.path(), "echo 'ERR 83886179 Operation cancelled <Pinentry>'");

    let mut wallet = DummyWallet::new().with_pin(PIN);
    let err = encrypt_with(&mut wallet, &pinentry_settings(program), b"value").unwrap_err();
    assert!(matches!(
        err,
        CipherError::Device(DeviceError::Prompt(PromptError::Cancelled))
    ));
    assert_eq!(err.exit_code(), EXIT_DEVICE_FAILED);
}

#[test]
fn test_missing_pinentry_fails_setup() {
    let mut wallet = DummyWallet::new().with_pin(PIN);
    let settings = pinentry_settings("/nonexistent/pinentry".into());
    let err = encrypt_with(&mut wallet, &settings, b"value").unwrap_err();
    assert!(matches!(err, CipherError::PromptSetup(_)));
    assert!(wallet.calls().is_empty());
}
