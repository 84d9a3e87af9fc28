//! Error types for lexicon-core.

use thiserror::Error;

use crate::permissions::Action;
use crate::types::Role;

/// Result type alias using PermissionError.
pub type Result<T> = std::result::Result<T, PermissionError>;

/// Rejected collaborator or word mutation on a shared dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("{email} is not a collaborator on this dictionary")]
    NotCollaborator { email: String },

    #[error("{email} is {role} and may not {action}")]
    InsufficientRole {
        email: String,
        role: Role,
        action: Action,
    },

    #[error("the owner role cannot be granted")]
    OwnerNotAssignable,

    #[error("the dictionary owner cannot be removed or demoted")]
    OwnerImmutable,
}
