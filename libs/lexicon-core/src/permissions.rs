//! Role rules for shared dictionaries.
//!
//! Shared by the client (checked before any remote call) and the backend (checked again
//! before writing). Every check is a pure function of the dictionary's collaborator map.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PermissionError, Result};
use crate::types::{Role, SharedDictionary};

/// Mutations gated by collaborator role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AddCollaborator,
    UpdateCollaboratorRole,
    RemoveCollaborator,
    EditWords,
    DeleteDictionary,
    /// Likes and personal difficulty writes.
    React,
}

impl Action {
    /// Lowest role allowed to perform the action on somebody else's behalf.
    fn minimum_role(self) -> Role {
        match self {
            Self::AddCollaborator | Self::EditWords => Role::Editor,
            Self::UpdateCollaboratorRole | Self::RemoveCollaborator | Self::DeleteDictionary => {
                Role::Owner
            }
            Self::React => Role::Viewer,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AddCollaborator => "add collaborators",
            Self::UpdateCollaboratorRole => "change collaborator roles",
            Self::RemoveCollaborator => "remove collaborators",
            Self::EditWords => "edit words",
            Self::DeleteDictionary => "delete the dictionary",
            Self::React => "react to words",
        };
        f.write_str(text)
    }
}

/// Check that `actor` holds a role sufficient for `action`. Returns the actor's role.
pub fn authorize(dictionary: &SharedDictionary, actor: &str, action: Action) -> Result<Role> {
    let role = dictionary
        .role_of(actor)
        .ok_or_else(|| PermissionError::NotCollaborator {
            email: actor.to_string(),
        })?;

    if role < action.minimum_role() {
        return Err(PermissionError::InsufficientRole {
            email: actor.to_string(),
            role,
            action,
        });
    }
    Ok(role)
}

/// Owner or editor may invite; nobody may hand out the owner role.
pub fn check_add_collaborator(dictionary: &SharedDictionary, actor: &str, role: Role) -> Result<()> {
    authorize(dictionary, actor, Action::AddCollaborator)?;
    if role == Role::Owner {
        return Err(PermissionError::OwnerNotAssignable);
    }
    Ok(())
}

/// Changing someone else's role requires owner. A collaborator may lower their own role.
pub fn check_update_role(
    dictionary: &SharedDictionary,
    actor: &str,
    target: &str,
    role: Role,
) -> Result<()> {
    let target_role = dictionary
        .role_of(target)
        .ok_or_else(|| PermissionError::NotCollaborator {
            email: target.to_string(),
        })?;

    if role == Role::Owner {
        return Err(PermissionError::OwnerNotAssignable);
    }
    if target_role == Role::Owner {
        return Err(PermissionError::OwnerImmutable);
    }

    if actor == target {
        let own = authorize(dictionary, actor, Action::React)?;
        if role > own {
            return Err(PermissionError::InsufficientRole {
                email: actor.to_string(),
                role: own,
                action: Action::UpdateCollaboratorRole,
            });
        }
        return Ok(());
    }

    authorize(dictionary, actor, Action::UpdateCollaboratorRole)?;
    Ok(())
}

/// Anyone but the owner may leave. Removing somebody else requires owner.
pub fn check_remove_collaborator(dictionary: &SharedDictionary, actor: &str, target: &str) -> Result<()> {
    let target_role = dictionary
        .role_of(target)
        .ok_or_else(|| PermissionError::NotCollaborator {
            email: target.to_string(),
        })?;

    if target_role == Role::Owner {
        return Err(PermissionError::OwnerImmutable);
    }
    if actor == target {
        return Ok(());
    }

    authorize(dictionary, actor, Action::RemoveCollaborator)?;
    Ok(())
}
