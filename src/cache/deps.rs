//! Cross-resource dependencies of mutations.
//!
//! A successful mutation rewrites the cache entry of the resource it belongs
//! to, then evicts every resource listed here so the next read refetches.

use super::keys::ResourceKind;

/// Writes the client can perform against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    AddToRotation,
    RemoveFromRotation,
    RetireShoe,
    UpdateRetiredShoe,
    DeleteFromGraveyard,
    UpdateProfile,
}

impl Mutation {
    /// Resource that holds the mutated entity, if it is cached at all.
    pub fn owner(self) -> Option<ResourceKind> {
        match self {
            Mutation::AddToRotation | Mutation::RemoveFromRotation => Some(ResourceKind::Rotation),
            Mutation::RetireShoe | Mutation::UpdateRetiredShoe | Mutation::DeleteFromGraveyard => {
                Some(ResourceKind::Graveyard)
            }
            Mutation::UpdateProfile => None,
        }
    }

    /// Other resources whose cached data may be wrong after this mutation.
    pub fn invalidates(self) -> &'static [ResourceKind] {
        match self {
            // Retiring moves the shoe out of the rotation.
            Mutation::RetireShoe => &[
                ResourceKind::Rotation,
                ResourceKind::Recommendations,
                ResourceKind::UserStats,
            ],
            Mutation::AddToRotation
            | Mutation::RemoveFromRotation
            | Mutation::UpdateRetiredShoe
            | Mutation::DeleteFromGraveyard => {
                &[ResourceKind::Recommendations, ResourceKind::UserStats]
            }
            Mutation::UpdateProfile => &[ResourceKind::UserStats],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mutation::AddToRotation => "add_to_rotation",
            Mutation::RemoveFromRotation => "remove_from_rotation",
            Mutation::RetireShoe => "retire_shoe",
            Mutation::UpdateRetiredShoe => "update_retired_shoe",
            Mutation::DeleteFromGraveyard => "delete_from_graveyard",
            Mutation::UpdateProfile => "update_profile",
        }
    }
}
