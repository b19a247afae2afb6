//! trezor-cipher — encrypt or decrypt a value with a Trezor-held key
//!
//! Reads one value (stdin, a file or `$TREZOR_CIPHER_VALUE`), runs it through
//! the device's cipher-key-value operation and writes the raw result to
//! stdout without a trailing newline. Diagnostics go to stderr.
//!
//! # Usage
//!
//! ```bash
//! echo -n "Some key" | trezor-cipher -e -H > key.enc
//! trezor-cipher -d -H -i key.enc
//! TREZOR_CIPHER_VALUE="test data" trezor-cipher -e -H --dummy
//! ```

mod config;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

use trezor_cipher_core::error::{EXIT_FATAL, EXIT_SUCCESS, EXIT_USAGE};
use trezor_cipher_core::input::STDIN_SENTINEL;
use trezor_cipher_core::memory;
use trezor_cipher_core::{
    find_device, CipherError, CipherParams, InputSource, Invocation, OperationMode,
    PromptStrategy,
};

use config::CipherConfig;

const ENVIRONMENT_HELP: &str = "\
ENVIRONMENT VARIABLES:
    TREZOR_CIPHER_VALUE       Input value; takes precedence over --input-value-file.
                              The environment of a process is readable by other
                              processes of the same user, so prefer stdin or a file
                              for long-lived secrets.
    TREZOR_CIPHER_CONFIG      Config file path (when --config is not given)
    TREZOR_CIPHER_KEY_NAME    Key name
    TREZOR_CIPHER_ASKPASS     Askpass program
    TREZOR_CIPHER_PINENTRY    Pinentry program
    TREZOR_CIPHER_LOG_LEVEL   Log level (off/error/warn/info/debug/trace)

EXIT CODES:
    0 success, 1 no device found, 2 device reset failed, 3 device operation failed,
    6 no askpass utility found, 22 usage error, 255 any other error";

#[derive(Parser, Debug)]
#[command(
    name = "trezor-cipher",
    version,
    about = "Encrypt or decrypt a value with a key held by a Trezor device",
    after_help = ENVIRONMENT_HELP
)]
struct Cli {
    /// Encrypt the input value
    #[arg(short, long)]
    encrypt: bool,

    /// Decrypt the input value
    #[arg(short, long)]
    decrypt: bool,

    /// Use a software dummy device instead of a real Trezor
    #[arg(short = 'D', long)]
    dummy: bool,

    /// Ciphertext is HEX-encoded (for both --encrypt and --decrypt)
    #[arg(short = 'H', long)]
    hex: bool,

    /// Print messages about what is going on (-vv for debug output)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Name of the key to encrypt/decrypt with [default: "unnamed key"]
    #[arg(short, long, value_name = "NAME")]
    key_name: Option<String>,

    /// Program asking for the PIN/passphrase
    /// [default: "/lib/cryptsetup/askpass", "systemd-ask-password"]
    #[arg(short = 'p', long, value_name = "PATH")]
    askpass_path: Option<PathBuf>,

    /// Ask for the PIN/passphrase with pinentry instead of askpass
    #[arg(short = 'P', long)]
    use_pinentry: bool,

    /// File to read the input value from ("-" for stdin)
    #[arg(short, long, value_name = "PATH", default_value = STDIN_SENTINEL)]
    input_value_file: PathBuf,

    /// Run askpass directly instead of behind a pseudo-terminal
    #[arg(long)]
    no_pty: bool,

    /// Pinentry program used with --use-pinentry [default: "pinentry"]
    #[arg(long, value_name = "PATH")]
    pinentry_program: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Flags win over everything the config and environment set.
    fn apply_to(&self, config: &mut CipherConfig) {
        if let Some(name) = &self.key_name {
            config.cipher.key_name = name.clone();
        }
        if self.hex {
            config.cipher.hex = true;
        }
        if let Some(path) = &self.askpass_path {
            config.prompt.askpass_path = Some(path.clone());
        }
        if self.use_pinentry {
            config.prompt.use_pinentry = true;
        }
        if let Some(program) = &self.pinentry_program {
            config.prompt.pinentry_program = program.clone();
        }
        if self.no_pty {
            config.prompt.pty_relay = false;
        }
        match self.verbose {
            0 => {}
            1 => config.log.level = "info".into(),
            2 => config.log.level = "debug".into(),
            _ => config.log.level = "trace".into(),
        }
    }
}

fn main() -> ExitCode {
    // Keep PINs and plaintext out of core files
    memory::disable_core_dumps();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_SUCCESS,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            return exit_code(code);
        }
    };

    let Some(mode) = OperationMode::from_flags(cli.encrypt, cli.decrypt) else {
        eprintln!("Error: exactly one of --encrypt or --decrypt is required.\n");
        eprintln!("For more information, try '--help'.");
        return exit_code(EXIT_USAGE);
    };

    match execute(&cli, mode) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("run failed: {:?}", e);
            eprintln!("Error: {:#}", e);
            exit_code(
                e.downcast_ref::<CipherError>()
                    .map_or(EXIT_FATAL, CipherError::exit_code),
            )
        }
    }
}

fn execute(cli: &Cli, mode: OperationMode) -> Result<()> {
    let mut cipher_config =
        CipherConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cipher_config.apply_env_overrides();
    cli.apply_to(&mut cipher_config);
    cipher_config
        .validate()
        .context("Configuration validation failed")?;

    init_logger(&cipher_config.log.level);

    let path_env = std::env::var_os("PATH");
    let strategy = PromptStrategy::select(&cipher_config.prompt_settings(), path_env.as_deref())
        .map_err(CipherError::from)?;
    let prompt = strategy.build().map_err(CipherError::PromptSetup)?;

    let mut wallet = find_device(cli.dummy).map_err(CipherError::NoDevice)?;

    let invocation = Invocation {
        mode,
        key_name: cipher_config.cipher.key_name.clone(),
        hex: cipher_config.cipher.hex,
        input: InputSource::from_env(&cli.input_value_file),
    };
    log::debug!("{} with {:?}", mode, invocation);

    let output = trezor_cipher_core::run(
        wallet.as_mut(),
        prompt,
        &CipherParams::default(),
        &invocation,
        &mut io::stdin().lock(),
    )?;

    let mut stdout = io::stdout().lock();
    stdout
        .write_all(&output)
        .and_then(|()| stdout.flush())
        .context("Failed to write the result to stdout")?;
    Ok(())
}

fn init_logger(level: &str) {
    env_logger::Builder::new()
        .parse_filters(level)
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}
