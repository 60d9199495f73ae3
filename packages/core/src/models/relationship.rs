//! Pending Relationship Changes
//!
//! Mutating a hierarchy in memory only records intent. The parent reference
//! is owned by the child, but the ordered children collection of the parent
//! is reconciled when the unit of work is flushed.
//!
//! # Two-Phase Write
//!
//! 1. **Record**: `Organization::set_parent` and
//!    `Organization::set_organizations` push `RelationshipChange`s onto the
//!    entity.
//! 2. **Reconcile**: the lifecycle hooks (`before_insert`, `before_update`,
//!    `before_delete`) hand the changes to the store, which applies them in
//!    order inside the operation's transaction.
//!
//! Every change is keyed by identifier, so removal from a children collection
//! is removal-by-key rather than a scan over loaded objects.

use std::fmt;
use uuid::Uuid;

/// A single relationship mutation waiting to be flushed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipChange {
    /// Remove `child` from the children of `parent`.
    ///
    /// A no-op when `child` is no longer attached to `parent`.
    Detach { parent: Uuid, child: Uuid },

    /// Append `child` to the end of the children of `parent`.
    ///
    /// A no-op when `child` already is a child of `parent`; its position is
    /// kept.
    Attach { parent: Uuid, child: Uuid },

    /// Make `children` the exact, ordered children of `parent`.
    ///
    /// Former children that are not listed become roots.
    ReplaceChildren { parent: Uuid, children: Vec<Uuid> },
}

impl fmt::Display for RelationshipChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detach { parent, child } => write!(f, "detach {} from {}", child, parent),
            Self::Attach { parent, child } => write!(f, "attach {} to {}", child, parent),
            Self::ReplaceChildren { parent, children } => {
                write!(f, "replace children of {} ({} nodes)", parent, children.len())
            }
        }
    }
}
