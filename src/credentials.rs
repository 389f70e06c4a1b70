use serde::Deserialize;
use std::fmt;

/// Per-device secrets provisioned by the vendor cloud.
///
/// Only the first six bytes of `local_key` ever reach the key schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub uuid: String,
    pub device_id: String,
    pub local_key: String,
}

impl Credentials {
    /// The key-derivation prefix: the first six ASCII bytes of the local
    /// key, zero-filled if the key is shorter.
    pub fn local_key_first_six(&self) -> [u8; 6] {
        let mut prefix = [0u8; 6];
        let bytes = self.local_key.as_bytes();
        let n = bytes.len().min(6);
        prefix[..n].copy_from_slice(&bytes[..n]);
        prefix
    }
}

#[derive(Debug)]
pub enum CredentialsError {
    FileNotFound(String),
    ParseError(String),
    InvalidLocalKey,
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsError::FileNotFound(path) => {
                write!(f, "Credentials file not found: {path}")
            }
            CredentialsError::ParseError(msg) => write!(f, "Failed to parse credentials: {msg}"),
            CredentialsError::InvalidLocalKey => {
                write!(f, "local_key must be exactly 16 characters")
            }
        }
    }
}

impl std::error::Error for CredentialsError {}

/// Load credentials from a TOML file with `uuid`, `device_id` and
/// `local_key` keys.
pub fn load_credentials(path: &str) -> Result<Credentials, CredentialsError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_| CredentialsError::FileNotFound(path.to_owned()))?;

    let credentials: Credentials =
        toml::from_str(&contents).map_err(|e| CredentialsError::ParseError(e.to_string()))?;

    if credentials.local_key.len() != 16 {
        return Err(CredentialsError::InvalidLocalKey);
    }

    Ok(credentials)
}
