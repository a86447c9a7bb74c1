//! Control plane errors

use edgeward_auth::CredentialError;
use edgeward_proto::EnvironmentId;
use edgeward_store::StoreError;
use thiserror::Error;

/// Environment registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Environment {0} not found")]
    NotFound(EnvironmentId),

    #[error("Environment {0} already exists")]
    AlreadyExists(EnvironmentId),

    /// Two environments claiming one edge ID; raised before the store is touched
    #[error("Edge ID '{edge_id}' is already bound to environment {existing}")]
    EdgeIdConflict {
        edge_id: String,
        existing: EnvironmentId,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl From<StoreError> for RegistryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => RegistryError::NotFound(id),
            StoreError::AlreadyExists(id) => RegistryError::AlreadyExists(id),
            other => RegistryError::StoreUnavailable(other),
        }
    }
}

/// Tunnel coordinator errors
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The environment was never registered (distinct from a no-op transition)
    #[error("Unknown environment {0}")]
    UnknownEnvironment(EnvironmentId),

    #[error("Port allocation failed: {0}")]
    PortAllocation(String),

    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Tunnel for environment {0} did not become active in time")]
    ActivationTimeout(EnvironmentId),
}

/// Errors surfaced by the edge service facade
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("No environment is enrolled with edge ID '{0}'")]
    UnknownEdgeId(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error("Settings store error: {0}")]
    Settings(#[from] StoreError),

    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_registry_errors() {
        assert!(matches!(
            RegistryError::from(StoreError::NotFound(EnvironmentId(3))),
            RegistryError::NotFound(EnvironmentId(3))
        ));
        assert!(matches!(
            RegistryError::from(StoreError::Corrupt("bad".into())),
            RegistryError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_conflict_message_names_both_sides() {
        let error = RegistryError::EdgeIdConflict {
            edge_id: "edge-abc".into(),
            existing: EnvironmentId(7),
        };
        assert_eq!(
            error.to_string(),
            "Edge ID 'edge-abc' is already bound to environment 7"
        );
    }
}
