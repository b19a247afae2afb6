//! CLI configuration — parsed from TOML file + environment variable overrides.
//!
//! Priority: command-line flags > environment variables > config file > defaults.
//! Flags are applied by `main`; this module handles the rest.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use trezor_cipher_core::device::DEFAULT_KEY_NAME;
use trezor_cipher_core::prompt::{PromptSettings, DEFAULT_PINENTRY_PROGRAM};

/// Names the config file when `--config` is not given.
pub const CONFIG_ENV_VAR: &str = "TREZOR_CIPHER_CONFIG";

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "info", "debug", "trace"];

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherConfig {
    #[serde(default)]
    pub cipher: CipherSection,

    #[serde(default)]
    pub prompt: PromptSection,

    #[serde(default)]
    pub log: LogSection,
}

/// What to encrypt with and how ciphertext is shaped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherSection {
    /// Name mixed into the device key derivation
    #[serde(default = "default_key_name")]
    pub key_name: String,

    /// Ciphertext is hex text (decrypt input, encrypt output)
    #[serde(default)]
    pub hex: bool,
}

impl Default for CipherSection {
    fn default() -> Self {
        Self {
            key_name: default_key_name(),
            hex: false,
        }
    }
}

/// PIN / passphrase entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    /// Askpass program; discovered on `$PATH` when unset
    #[serde(default)]
    pub askpass_path: Option<PathBuf>,

    /// Ask through pinentry instead of askpass
    #[serde(default)]
    pub use_pinentry: bool,

    #[serde(default = "default_pinentry_program")]
    pub pinentry_program: PathBuf,

    /// Run askpass behind a pseudo-terminal
    #[serde(default = "default_pty_relay")]
    pub pty_relay: bool,

    /// Askpass programs to look for, in order; built-in list when unset
    #[serde(default)]
    pub askpass_candidates: Option<Vec<PathBuf>>,
}

impl Default for PromptSection {
    fn default() -> Self {
        Self {
            askpass_path: None,
            use_pinentry: false,
            pinentry_program: default_pinentry_program(),
            pty_relay: default_pty_relay(),
            askpass_candidates: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSection {
    /// Log level (off, error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_key_name() -> String {
    DEFAULT_KEY_NAME.to_string()
}

fn default_pinentry_program() -> PathBuf {
    PathBuf::from(DEFAULT_PINENTRY_PROGRAM)
}

fn default_pty_relay() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl CipherConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CipherConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load `explicit`, else the file named by [`CONFIG_ENV_VAR`], else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `TREZOR_CIPHER_KEY_NAME`
    /// - `TREZOR_CIPHER_ASKPASS`
    /// - `TREZOR_CIPHER_PINENTRY`
    /// - `TREZOR_CIPHER_LOG_LEVEL`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TREZOR_CIPHER_KEY_NAME") {
            self.cipher.key_name = v;
        }
        if let Some(v) = lookup("TREZOR_CIPHER_ASKPASS") {
            if !v.is_empty() {
                self.prompt.askpass_path = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = lookup("TREZOR_CIPHER_PINENTRY") {
            self.prompt.pinentry_program = PathBuf::from(v);
        }
        if let Some(v) = lookup("TREZOR_CIPHER_LOG_LEVEL") {
            self.log.level = v;
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.cipher.key_name.is_empty(),
            "cipher.key_name must not be empty"
        );
        anyhow::ensure!(
            !self.prompt.pinentry_program.as_os_str().is_empty(),
            "prompt.pinentry_program must not be empty"
        );
        anyhow::ensure!(
            LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()),
            "log.level must be one of {}, got {:?}",
            LOG_LEVELS.join(", "),
            self.log.level
        );
        Ok(())
    }

    pub fn prompt_settings(&self) -> PromptSettings {
        let defaults = PromptSettings::default();
        PromptSettings {
            use_pinentry: self.prompt.use_pinentry,
            pinentry_program: self.prompt.pinentry_program.clone(),
            askpass_path: self.prompt.askpass_path.clone(),
            pty_relay: self.prompt.pty_relay,
            askpass_candidates: self
                .prompt
                .askpass_candidates
                .clone()
                .unwrap_or(defaults.askpass_candidates),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
