//! Credentials and enrollment keys for edge agents

pub mod credentials;
pub mod edge_key;

pub use credentials::{CredentialError, CredentialIssuer, TunnelClaims, TunnelCredentials};
pub use edge_key::{server_fingerprint, EdgeKey};
