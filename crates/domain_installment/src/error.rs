//! Installment domain errors

use thiserror::Error;

use core_kernel::{IdentifierError, PortError};

/// Errors that can occur in the installment domain
///
/// Messages name the rule that was violated, e.g.
/// `amount 60000 exceeds remaining balance of 50000`.
#[derive(Debug, Error)]
pub enum InstallmentError {
    /// Input rejected before any state change
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Request clashes with current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage or collaborator failure
    #[error(transparent)]
    Port(#[from] PortError),
}

impl InstallmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        InstallmentError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        InstallmentError::Conflict(message.into())
    }

    pub fn deal_not_found(id: impl ToString) -> Self {
        InstallmentError::NotFound {
            entity: "Deal",
            id: id.to_string(),
        }
    }

    /// Returns true for errors the caller caused
    pub fn is_client_error(&self) -> bool {
        !matches!(self, InstallmentError::Port(_))
    }
}

impl From<IdentifierError> for InstallmentError {
    fn from(e: IdentifierError) -> Self {
        InstallmentError::Validation(e.to_string())
    }
}

/// Lifts port-level not-found and conflict into the domain variants
pub(crate) fn lift_port_error(e: PortError) -> InstallmentError {
    match e {
        PortError::NotFound { entity_type, id } if entity_type == "Deal" => {
            InstallmentError::deal_not_found(id)
        }
        PortError::Conflict { message } => InstallmentError::Conflict(message),
        PortError::Validation { message, .. } => InstallmentError::Validation(message),
        other => InstallmentError::Port(other),
    }
}
