//! Detached release signature verification
//!
//! Core archives are published with an ASCII-armoured detached signature.
//! [`GpgVerifier`] checks it with a throwaway keyring so the user's own
//! keyring is never read or modified.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use rand::seq::IndexedRandom;
use thiserror::Error;

const KEYSERVERS: [&str; 3] = ["keys.openpgp.org", "keyserver.ubuntu.com", "pgp.mit.edu"];
const KEY_FETCH_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("failed to run gpg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("could not fetch key {fingerprint} after {attempts} attempts")]
    KeyUnavailable { fingerprint: String, attempts: usize },

    #[error("bad signature: {0}")]
    Rejected(String),

    #[error("temporary keyring: {0}")]
    Keyring(#[source] std::io::Error),
}

/// Checks `signature` over `data` against the key `fingerprint`.
pub trait SignatureVerifier {
    fn verify(&self, data: &[u8], signature: &[u8], fingerprint: &str)
    -> Result<(), SignatureError>;
}

/// Verifier backed by the `gpg` binary.
#[derive(Debug, Clone)]
pub struct GpgVerifier {
    program: String,
}

impl Default for GpgVerifier {
    fn default() -> Self {
        Self {
            program: "gpg".to_string(),
        }
    }
}

impl GpgVerifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn gpg(&self, home: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.env("GNUPGHOME", home).arg("--batch").arg("--no-tty");
        cmd
    }

    fn receive_key(&self, home: &Path, fingerprint: &str) -> Result<(), SignatureError> {
        let mut rng = rand::rng();
        for attempt in 1..=KEY_FETCH_ATTEMPTS {
            let keyserver = KEYSERVERS.choose(&mut rng).copied().unwrap_or(KEYSERVERS[0]);
            tracing::debug!("Fetching {fingerprint} from {keyserver} (attempt {attempt})");
            let output = self
                .gpg(home)
                .args(["--keyserver", keyserver, "--recv-keys", fingerprint])
                .output()
                .map_err(SignatureError::Spawn)?;
            if output.status.success() {
                return Ok(());
            }
            tracing::warn!(
                "Key fetch from {keyserver} failed: {}",
                stderr_of(&output)
            );
        }
        Err(SignatureError::KeyUnavailable {
            fingerprint: fingerprint.to_string(),
            attempts: KEY_FETCH_ATTEMPTS,
        })
    }
}

impl SignatureVerifier for GpgVerifier {
    fn verify(
        &self,
        data: &[u8],
        signature: &[u8],
        fingerprint: &str,
    ) -> Result<(), SignatureError> {
        let home = tempfile::tempdir().map_err(SignatureError::Keyring)?;
        self.receive_key(home.path(), fingerprint)?;

        let data_path = home.path().join("artifact");
        let sig_path = home.path().join("artifact.asc");
        fs::write(&data_path, data).map_err(SignatureError::Keyring)?;
        fs::write(&sig_path, signature).map_err(SignatureError::Keyring)?;

        let output = self
            .gpg(home.path())
            .arg("--verify")
            .arg(&sig_path)
            .arg(&data_path)
            .output()
            .map_err(SignatureError::Spawn)?;
        if !output.status.success() {
            return Err(SignatureError::Rejected(stderr_of(&output)));
        }
        tracing::debug!("Signature verified against {fingerprint}");
        Ok(())
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
