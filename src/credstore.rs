// =============================================================================
// Flat-file credential store — username -> password JSON blob
// =============================================================================
//
// A missing, empty, or corrupt file is not an error: it loads as "no known
// users", so login simply always fails until the file is repopulated.
//
// Passwords are compared in plaintext against the file contents. That is the
// preserved behavior of the store this replaces, kept deliberately.
// TODO: hash passwords (argon2) before this gate fronts anything but a
// single-user toy deployment.
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Compare two byte slices in constant time. Returns `true` if identical.
/// Always examines every byte even after a mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Credential store over a flat JSON object file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the username -> password map.
    ///
    /// Missing or unparseable files yield the empty map rather than an error.
    pub fn load(&self) -> HashMap<String, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "credential file unreadable — treating as empty");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(users) => users,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "credential file corrupt — treating as empty");
                HashMap::new()
            }
        }
    }

    /// Persist the map atomically (write to `.tmp`, then rename).
    pub fn save(&self, users: &HashMap<String, String>) -> Result<()> {
        let content =
            serde_json::to_string(users).context("failed to serialise credentials to JSON")?;

        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp credentials to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("failed to rename tmp credentials to {}", self.path.display())
        })?;

        Ok(())
    }

    /// Check a username/password pair against the file.
    ///
    /// Unknown user and wrong password are indistinguishable to the caller.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let users = self.load();
        match users.get(username) {
            Some(stored) => constant_time_eq(stored.as_bytes(), password.as_bytes()),
            None => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
