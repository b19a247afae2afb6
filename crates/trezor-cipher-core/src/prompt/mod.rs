//! PIN / passphrase acquisition
//!
//! The device asks for credentials in the middle of an operation by calling
//! back into the host. [`PromptBackend`] is the single capability those
//! callbacks rely on; the concrete strategy is chosen once at startup:
//!
//! | Strategy | Module | Secret travels through |
//! |----------|--------|------------------------|
//! | secure-entry agent | [`pinentry`] | Assuan pipe to a `pinentry` process |
//! | askpass | [`askpass`] | stdout pipe of an askpass program |
//! | askpass behind a pty | [`pty`] | stdout pipe, with the program driving a pseudo-terminal |
//!
//! Answers come back as [`SecretBuffer`]s and are never logged.

pub mod askpass;
pub mod pinentry;
#[cfg(unix)]
pub mod pty;

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::memory::SecretBuffer;

/// `cryptsetup`'s askpass helper, preferred when installed.
pub const CRYPTSETUP_ASKPASS: &str = "/lib/cryptsetup/askpass";

/// systemd's password agent frontend, looked up on `$PATH`.
pub const SYSTEMD_ASKPASS: &str = "systemd-ask-password";

/// Askpass programs tried in order when none is configured.
pub const DEFAULT_ASKPASS_CANDIDATES: &[&str] = &[CRYPTSETUP_ASKPASS, SYSTEMD_ASKPASS];

/// Default secure-entry agent program.
pub const DEFAULT_PINENTRY_PROGRAM: &str = "pinentry";

/// What the device wants the operator to be asked.
///
/// Lives for one prompt round trip only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub title: String,
    pub description: String,
    pub ok_label: String,
    pub cancel_label: String,
}

impl PromptRequest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        ok_label: impl Into<String>,
        cancel_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ok_label: ok_label.into(),
            cancel_label: cancel_label.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("the prompt was cancelled")]
    Cancelled,
    #[error("prompt I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("pinentry agent error: {0}")]
    Agent(String),
}

/// Source of PINs and passphrases.
pub trait PromptBackend {
    /// Ask the operator for a secret described by `request`.
    fn get_secret(&mut self, request: &PromptRequest) -> Result<SecretBuffer, PromptError>;
}

/// Answer to every confirmation request: deny.
///
/// A device asking to confirm a reconnect is treated as gone; the pending
/// operation then fails instead of starting an interactive reconnect flow.
pub fn deny_confirmation(request: &PromptRequest) -> Result<bool, PromptError> {
    log::warn!(
        "Declining device confirmation request {:?}; treating the device as disconnected.",
        request.title
    );
    Ok(false)
}

/// Raised before any device interaction when no prompt program is usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error(
    "there's no askpass utility found; use --use-pinentry or --askpass-path to select a utility to enter a PIN-code and a passphrase"
)]
pub struct AskpassNotFound;

/// Operator preferences for prompting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSettings {
    /// Use the secure-entry agent; overrides everything else.
    pub use_pinentry: bool,
    pub pinentry_program: PathBuf,
    /// Explicit askpass program, used as given without an existence check.
    pub askpass_path: Option<PathBuf>,
    /// Run askpass behind a pseudo-terminal relay.
    pub pty_relay: bool,
    /// Askpass programs tried in order when `askpass_path` is unset.
    pub askpass_candidates: Vec<PathBuf>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            use_pinentry: false,
            pinentry_program: PathBuf::from(DEFAULT_PINENTRY_PROGRAM),
            askpass_path: None,
            pty_relay: true,
            askpass_candidates: DEFAULT_ASKPASS_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .collect(),
        }
    }
}

/// The backend a run will use, resolved from [`PromptSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStrategy {
    Pinentry { program: PathBuf },
    Askpass { program: PathBuf, pty_relay: bool },
}

impl PromptStrategy {
    /// Resolve the strategy. `path_env` is the `$PATH` used for discovery.
    pub fn select(
        settings: &PromptSettings,
        path_env: Option<&OsStr>,
    ) -> Result<Self, AskpassNotFound> {
        if settings.use_pinentry {
            return Ok(Self::Pinentry {
                program: settings.pinentry_program.clone(),
            });
        }

        let program = match &settings.askpass_path {
            Some(path) => path.clone(),
            None => askpass::find_askpass(&settings.askpass_candidates, path_env)
                .ok_or(AskpassNotFound)?,
        };

        Ok(Self::Askpass {
            program,
            pty_relay: settings.pty_relay,
        })
    }

    /// Construct the backend. Starts the agent process for [`PromptStrategy::Pinentry`].
    pub fn build(&self) -> Result<Box<dyn PromptBackend>, PromptError> {
        match self {
            Self::Pinentry { program } => {
                log::info!("Using {} for PIN/passphrase entry.", program.display());
                Ok(Box::new(pinentry::Pinentry::spawn(program)?))
            }
            Self::Askpass { program, pty_relay } => {
                log::info!("Using {} for PIN/passphrase entry.", program.display());
                Ok(askpass_backend(program, *pty_relay))
            }
        }
    }
}

#[cfg(unix)]
fn askpass_backend(program: &Path, pty_relay: bool) -> Box<dyn PromptBackend> {
    if pty_relay {
        Box::new(pty::PtyAskpass::new(program))
    } else {
        Box::new(askpass::Askpass::new(program))
    }
}

#[cfg(not(unix))]
fn askpass_backend(program: &Path, pty_relay: bool) -> Box<dyn PromptBackend> {
    if pty_relay {
        log::warn!("pseudo-terminal relay is unavailable on this platform; running askpass directly");
    }
    Box::new(askpass::Askpass::new(program))
}

/// Strip trailing `\n` and `\r` bytes from an askpass answer.
pub fn trim_line_endings(answer: &[u8]) -> &[u8] {
    let end = answer
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    &answer[..end]
}
