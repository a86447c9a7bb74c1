//! Edge enrollment keys
//!
//! An edge key tells a freshly deployed agent where to poll, where to open
//! its tunnel, which server fingerprint to trust, and which environment it
//! belongs to. Format before encoding: `api_url|tunnel_addr|fingerprint|id`,
//! base64 without padding.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use edgeward_proto::EnvironmentId;
use sha2::{Digest, Sha256};

use crate::credentials::CredentialError;

const SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeKey {
    pub api_url: String,
    pub tunnel_addr: String,
    pub fingerprint: String,
    pub environment_id: EnvironmentId,
}

impl EdgeKey {
    pub fn new(
        api_url: impl Into<String>,
        tunnel_addr: impl Into<String>,
        fingerprint: impl Into<String>,
        environment_id: EnvironmentId,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            tunnel_addr: tunnel_addr.into(),
            fingerprint: fingerprint.into(),
            environment_id,
        }
    }

    pub fn encode(&self) -> String {
        let raw = format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.api_url,
            self.tunnel_addr,
            self.fingerprint,
            self.environment_id,
            sep = SEPARATOR
        );
        STANDARD_NO_PAD.encode(raw)
    }

    pub fn decode(key: &str) -> Result<Self, CredentialError> {
        let bytes = STANDARD_NO_PAD
            .decode(key.trim_end_matches('='))
            .map_err(|e| CredentialError::InvalidEdgeKey(e.to_string()))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| CredentialError::InvalidEdgeKey(e.to_string()))?;

        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let [api_url, tunnel_addr, fingerprint, id] = parts.as_slice() else {
            return Err(CredentialError::InvalidEdgeKey(format!(
                "expected 4 fields, found {}",
                parts.len()
            )));
        };

        let id = id
            .parse::<i32>()
            .map_err(|e| CredentialError::InvalidEdgeKey(format!("environment id: {}", e)))?;

        Ok(Self::new(*api_url, *tunnel_addr, *fingerprint, EnvironmentId(id)))
    }
}

/// Hex SHA-256 of the tunnel server secret, shared with agents for pinning
pub fn server_fingerprint(secret: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    format!("{:x}", hasher.finalize())
}
