//! Store errors

use edgeward_proto::EnvironmentId;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Environment {0} not found")]
    NotFound(EnvironmentId),

    #[error("Environment {0} already exists")]
    AlreadyExists(EnvironmentId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
