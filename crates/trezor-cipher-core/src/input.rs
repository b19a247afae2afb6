//! Input acquisition
//!
//! The value to encrypt or decrypt comes from, in priority order:
//!
//! 1. the [`VALUE_ENV_VAR`] environment variable, when set and non-empty;
//! 2. standard input, when the configured path is `-`;
//! 3. the named file.
//!
//! # Security
//!
//! Passing the value through the environment keeps it out of shell history
//! and off the filesystem, but the environment of a process is readable by
//! other processes of the same user (`/proc/<pid>/environ`). That exposure is
//! an accepted trade-off of this input path.

use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use zeroize::Zeroizing;

/// Environment variable carrying the input value directly.
pub const VALUE_ENV_VAR: &str = "TREZOR_CIPHER_VALUE";

/// Path sentinel meaning "read standard input".
pub const STDIN_SENTINEL: &str = "-";

/// Bytes flowing through the pipeline. Wiped on drop.
pub type PayloadBuffer = Zeroizing<Vec<u8>>;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read the input value from stdin: {0}")]
    Stdin(#[source] io::Error),
    #[error("failed to read the input value file {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Where the input value is taken from.
#[derive(Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Value handed over directly, e.g. through [`VALUE_ENV_VAR`].
    Direct(Zeroizing<Vec<u8>>),
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// Pick the source from an optional direct value and the configured path.
    ///
    /// An empty direct value counts as unset.
    pub fn select(direct: Option<Vec<u8>>, path: &Path) -> Self {
        match direct {
            Some(value) if !value.is_empty() => Self::Direct(Zeroizing::new(value)),
            _ if path.as_os_str() == STDIN_SENTINEL => Self::Stdin,
            _ => Self::File(path.to_path_buf()),
        }
    }

    /// Read [`VALUE_ENV_VAR`] from the process environment and select.
    pub fn from_env(path: &Path) -> Self {
        Self::select(read_env_value(), path)
    }

    /// Read the whole value. `stdin` is only touched for [`InputSource::Stdin`].
    pub fn read(&self, stdin: &mut dyn Read) -> Result<PayloadBuffer, InputError> {
        match self {
            Self::Direct(value) => {
                log::info!("Using the input value from ${}.", VALUE_ENV_VAR);
                Ok(value.clone())
            }
            Self::Stdin => {
                log::info!("Reading the data from stdin.");
                let mut data = Zeroizing::new(Vec::new());
                stdin.read_to_end(&mut data).map_err(InputError::Stdin)?;
                Ok(data)
            }
            Self::File(path) => {
                log::info!("Reading the data file {:?}.", path);
                std::fs::read(path)
                    .map(Zeroizing::new)
                    .map_err(|source| InputError::File {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(value) => write!(f, "Direct(<{} bytes>)", value.len()),
            Self::Stdin => f.write_str("Stdin"),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Resolve the input value in one step.
pub fn resolve_input(
    env_value: Option<Vec<u8>>,
    path: &Path,
    stdin: &mut dyn Read,
) -> Result<PayloadBuffer, InputError> {
    InputSource::select(env_value, path).read(stdin)
}

#[cfg(unix)]
fn read_env_value() -> Option<Vec<u8>> {
    use std::os::unix::ffi::OsStringExt;
    std::env::var_os(VALUE_ENV_VAR).map(|v| v.into_vec())
}

#[cfg(not(unix))]
fn read_env_value() -> Option<Vec<u8>> {
    std::env::var(VALUE_ENV_VAR).ok().map(String::into_bytes)
}
