//! Parameter-set fingerprinting — deterministic identity for strategy configurations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::StrategyParams;

/// BLAKE3 digest of a parameter set's canonical JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First 12 hex characters, for logs and tables.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl StrategyParams {
    /// Exact identity of this parameter set.
    ///
    /// Struct fields serialize in declaration order, so equal parameter sets
    /// always produce equal JSON and therefore equal fingerprints.
    pub fn fingerprint(&self) -> Result<Fingerprint, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(Fingerprint::from_bytes(&json))
    }
}
