use std::path::Path;

use ethers::types::U256;
use serde::Deserialize;

use crate::error::{Error, Result};

/// A private group identity, as exported by the external identity store.
///
/// The client never derives or persists key material; it borrows the opaque
/// export for the duration of a proof request and exposes only the public
/// commitment.
#[derive(Clone)]
pub struct Identity {
    private_key: String,
    commitment: U256,
}

/// On-disk shape of the identity store's export.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityFile {
    private_key: String,
    /// Decimal string, as the identity store renders commitments.
    commitment: String,
}

impl Identity {
    /// Builds an identity from its exported parts.
    pub fn new(private_key: impl Into<String>, commitment: U256) -> Self {
        Self {
            private_key: private_key.into(),
            commitment,
        }
    }

    /// Loads an identity export from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: IdentityFile = serde_json::from_str(&raw)?;
        let commitment = U256::from_dec_str(&file.commitment)
            .map_err(|_| Error::Generic("identity file holds a malformed commitment"))?;
        Ok(Self::new(file.private_key, commitment))
    }

    /// The public, stable identifier of this identity.
    pub fn commitment(&self) -> U256 {
        self.commitment
    }

    /// The opaque private key export, for the proving service.
    pub fn export(&self) -> &str {
        &self.private_key
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never leak the export in logs.
        f.debug_struct("Identity")
            .field("commitment", &self.commitment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_an_exported_identity() {
        let dir = std::env::temp_dir().join("feedback-client-identity-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("identity.json");
        std::fs::write(
            &path,
            r#"{"privateKey":"c3VwZXItc2VjcmV0","commitment":"12345678901234567890"}"#,
        )
        .unwrap();
        let identity = Identity::from_file(&path).unwrap();
        assert_eq!(identity.export(), "c3VwZXItc2VjcmV0");
        assert_eq!(
            identity.commitment(),
            U256::from_dec_str("12345678901234567890").unwrap()
        );
    }

    #[test]
    fn rejects_malformed_commitments() {
        let dir = std::env::temp_dir().join("feedback-client-identity-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(&path, r#"{"privateKey":"x","commitment":"not-a-number"}"#).unwrap();
        assert!(Identity::from_file(&path).is_err());
    }

    #[test]
    fn debug_does_not_leak_the_export() {
        let identity = Identity::new("hunter2", U256::from(7u64));
        let rendered = format!("{:?}", identity);
        assert!(!rendered.contains("hunter2"));
    }
}
