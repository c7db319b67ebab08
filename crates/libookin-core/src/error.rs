use crate::gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum PayoutError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("no eligible payees")]
    NoEligiblePayees,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Remote(#[from] GatewayError),

    #[error("data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PayoutError>;
