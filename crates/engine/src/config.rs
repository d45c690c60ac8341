//! Store configuration via `annal.toml`
//!
//! A store reads its settings from a small TOML file next to its data. On
//! first use a commented default can be written with
//! `write_default_if_missing`; to change settings, edit the file and
//! reopen the store.

use annal_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::Duration;

/// Config file name conventionally placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "annal.toml";

/// Store configuration loaded from `annal.toml`.
///
/// # Example
///
/// ```toml
/// # Give up waiting for an entity lock after 5 seconds
/// lock_timeout_ms = 5000
///
/// # Warn about keys dropped from change payloads
/// log_dropped_keys = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum wait for an entity lock, in milliseconds.
    /// Absent means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,
    /// Emit a `warn` event for every key dropped during normalization.
    #[serde(default = "default_log_dropped_keys")]
    pub log_dropped_keys: bool,
}

fn default_log_dropped_keys() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: None,
            log_dropped_keys: default_log_dropped_keys(),
        }
    }
}

impl StoreConfig {
    /// Lock wait bound as a `Duration`
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    /// Builder-style setter for the lock timeout
    ///
    /// Rounded up to whole milliseconds, with a floor of 1ms: a timeout
    /// never degrades into "fail on any contention".
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        let millis = ((timeout.as_micros() + 999) / 1_000).max(1);
        self.lock_timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    /// Check values that parse but make no sense.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero lock timeout.
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_ms == Some(0) {
            return Err(Error::Config(
                "lock_timeout_ms must be greater than 0; omit it to wait indefinitely".into(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Annal store configuration
#
# Maximum time to wait for an entity lock, in milliseconds.
# Leave unset to wait until the holder's transaction finishes.
# lock_timeout_ms = 5000

# Log a warning for every key dropped from a change payload
# (unknown fields, protected columns, blank or duplicate keys).
log_dropped_keys = true
"#
    }

    /// Parse and validate config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text cannot be parsed or is invalid.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from `path`
    ///
    /// # Errors
    ///
    /// - `Error::Io` if the file cannot be read
    /// - `Error::Config` naming the file if its contents are invalid
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write `default_toml()` to `path` unless a file is already there
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        std::fs::write(path, Self::default_toml()).map_err(|e| io_error(path, e))
    }

    /// Save this config as TOML, replacing the file at `path`
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot encode config: {e}")))?;
        std::fs::write(path, content).map_err(|e| io_error(path, e))
    }
}

/// Keep the error kind, prefix the message with the file
fn io_error(path: &Path, e: io::Error) -> Error {
    Error::Io(io::Error::new(e.kind(), format!("{}: {e}", path.display())))
}
