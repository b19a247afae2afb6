//! Askpass programs: discovery and the plain (no pty) backend.
//!
//! An askpass utility is invoked as `<program> <title>` and prints the
//! secret on its stdout. stdin and stderr are shared with us so the program
//! can talk to the operator.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use zeroize::Zeroizing;

use super::{trim_line_endings, PromptBackend, PromptError, PromptRequest};
use crate::memory::SecretBuffer;

/// Whether `name` refers to an existing file.
///
/// Absolute paths are checked directly; bare names are looked up in every
/// directory of `path_env`.
pub fn executable_exists(name: &Path, path_env: Option<&OsStr>) -> bool {
    if name.as_os_str().is_empty() {
        return false;
    }
    if name.is_absolute() {
        return name.exists();
    }

    path_env
        .map(|paths| std::env::split_paths(paths).any(|dir| dir.join(name).exists()))
        .unwrap_or(false)
}

/// First candidate that exists, in preference order.
pub fn find_askpass<P: AsRef<Path>>(candidates: &[P], path_env: Option<&OsStr>) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|candidate| candidate.as_ref())
        .find(|candidate| executable_exists(candidate, path_env))
        .map(Path::to_path_buf)
}

/// Runs the askpass program directly and captures its stdout.
#[derive(Debug, Clone)]
pub struct Askpass {
    program: PathBuf,
}

impl Askpass {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl PromptBackend for Askpass {
    fn get_secret(&mut self, request: &PromptRequest) -> Result<SecretBuffer, PromptError> {
        log::info!(
            "Running command \"{} {}\"",
            self.program.display(),
            request.title
        );

        let output = Command::new(&self.program)
            .arg(&request.title)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .stdout(Stdio::piped())
            .output()?;

        let answer = Zeroizing::new(output.stdout);
        if !output.status.success() {
            // Only the captured output matters; the exit status is informational.
            log::debug!("askpass exited with {}", output.status);
        }

        Ok(SecretBuffer::new(trim_line_endings(&answer).to_vec()))
    }
}
