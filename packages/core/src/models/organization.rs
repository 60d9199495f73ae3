//! Organization Entity
//!
//! This module defines `Organization`, a self-referencing tree node, and the
//! lifecycle hooks that keep its parent reference and the parent's ordered
//! children collection consistent.
//!
//! # Ownership of the Relationship
//!
//! - The **child** owns the parent reference (`parent`).
//! - The **parent** exposes an ordered snapshot of its children
//!   (`organizations`), loaded from the store.
//! - Both sides are reconciled at flush time from the pending
//!   [`RelationshipChange`]s, never by reaching into another loaded object.
//!
//! # Examples
//!
//! ```rust
//! use orgtree_core::models::{Organization, RelationshipChange};
//!
//! let mut parent = Organization::new("engineering", "Engineering");
//! let mut child = Organization::new("platform", "Platform");
//! let child_id = child.ensure_id();
//!
//! parent.set_organizations([&mut child]).unwrap();
//!
//! assert_eq!(parent.organizations(), &[child_id]);
//! assert_eq!(child.parent(), parent.id());
//! assert!(matches!(
//!     parent.pending_changes(),
//!     [RelationshipChange::ReplaceChildren { .. }]
//! ));
//! ```

use crate::models::RelationshipChange;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use uuid::Uuid;

/// Maximum length (in characters) of `name` and `display_name`
pub const MAX_NAME_LENGTH: usize = 255;

/// Validation errors for Organization operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' exceeds {max} characters (got {actual})")]
    FieldTooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    #[error("Organization {0} appears more than once in the children sequence")]
    DuplicateChild(Uuid),

    #[error("Organization {0} cannot be its own parent or child")]
    SelfReference(Uuid),

    #[error("Organization has not been persisted yet: {0}")]
    MissingId(String),
}

/// A node in the organization hierarchy.
///
/// # Fields
///
/// - `id`: assigned once, on first persistence or when another node first
///   needs to reference this one
/// - `name`: globally unique, at most [`MAX_NAME_LENGTH`] characters
/// - `display_name`: at most [`MAX_NAME_LENGTH`] characters
/// - `parent`: identifier of the parent node (loaded lazily through the manager)
/// - `organizations`: ordered identifiers of the children
///
/// Equality and hashing use `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    id: Option<Uuid>,

    name: String,

    display_name: String,

    parent: Option<Uuid>,

    #[serde(default)]
    organizations: Vec<Uuid>,

    /// Relationship intent recorded since the last successful flush
    #[serde(skip)]
    pending: Vec<RelationshipChange>,
}

impl Organization {
    /// Create a transient organization (no id, no parent, no children)
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            display_name: display_name.into(),
            parent: None,
            organizations: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Rebuild a persisted organization from stored columns
    pub(crate) fn from_stored(
        id: Uuid,
        name: String,
        display_name: String,
        parent: Option<Uuid>,
        organizations: Vec<Uuid>,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            display_name,
            parent,
            organizations,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Return the identifier, generating it first if the node has none.
    ///
    /// Once assigned the identifier never changes.
    pub fn ensure_id(&mut self) -> Uuid {
        *self.id.get_or_insert_with(Uuid::new_v4)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.display_name = display_name.into();
    }

    /// Identifier of the parent node, `None` for roots
    pub fn parent(&self) -> Option<Uuid> {
        self.parent
    }

    /// Ordered identifiers of the children, as of the last load or
    /// `set_organizations` call
    pub fn organizations(&self) -> &[Uuid] {
        &self.organizations
    }

    /// Relationship changes that the next flush will apply
    pub fn pending_changes(&self) -> &[RelationshipChange] {
        &self.pending
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Reassign the parent of this node.
    ///
    /// When the parent is cleared or changed, a detach from the current parent
    /// is recorded. The node is not appended to the new parent's children
    /// here; the before-insert/before-update hook does that when the node is
    /// flushed.
    ///
    /// # Errors
    ///
    /// - `MissingId` if `parent` has never been persisted
    /// - `SelfReference` if `parent` is this node
    pub fn set_parent(&mut self, parent: Option<&Organization>) -> Result<(), ValidationError> {
        let parent_id = match parent {
            Some(parent) => Some(parent.id.ok_or_else(|| {
                ValidationError::MissingId(format!("parent '{}'", parent.name))
            })?),
            None => None,
        };

        if let (Some(parent_id), Some(id)) = (parent_id, self.id) {
            if parent_id == id {
                return Err(ValidationError::SelfReference(id));
            }
        }

        self.assign_parent(parent_id);
        Ok(())
    }

    fn assign_parent(&mut self, parent_id: Option<Uuid>) {
        if parent_id.is_none() || parent_id != self.parent {
            if let (Some(old_parent), Some(id)) = (self.parent, self.id) {
                self.pending.push(RelationshipChange::Detach {
                    parent: old_parent,
                    child: id,
                });
            }
        }
        self.parent = parent_id;
    }

    /// Replace the children of this node with `children`, in order.
    ///
    /// Every child whose parent is not this node is re-parented (recording its
    /// own detach from the previous parent). The children must already carry
    /// identifiers; they are expected to be persisted by the time this node is
    /// flushed.
    ///
    /// # Errors
    ///
    /// Nothing is modified when an error is returned.
    ///
    /// - `MissingId` if a child has never been persisted
    /// - `DuplicateChild` if the same node is listed twice
    /// - `SelfReference` if this node is listed as its own child
    pub fn set_organizations<'a, I>(&mut self, children: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = &'a mut Organization>,
    {
        let mut children: Vec<&'a mut Organization> = children.into_iter().collect();

        let mut seen = HashSet::with_capacity(children.len());
        for child in &children {
            let child_id = child
                .id
                .ok_or_else(|| ValidationError::MissingId(format!("child '{}'", child.name)))?;
            if Some(child_id) == self.id {
                return Err(ValidationError::SelfReference(child_id));
            }
            if !seen.insert(child_id) {
                return Err(ValidationError::DuplicateChild(child_id));
            }
        }

        let id = self.ensure_id();
        let mut ids = Vec::with_capacity(children.len());
        for child in children.iter_mut() {
            if child.parent != Some(id) {
                child.assign_parent(Some(id));
            }
            // Presence was checked above
            if let Some(child_id) = child.id {
                ids.push(child_id);
            }
        }

        self.pending
            .retain(|change| !matches!(change, RelationshipChange::ReplaceChildren { .. }));
        self.pending.push(RelationshipChange::ReplaceChildren {
            parent: id,
            children: ids.clone(),
        });
        self.organizations = ids;
        Ok(())
    }

    /// Validate required fields and lengths
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name_field("name", &self.name)?;
        validate_name_field("display_name", &self.display_name)?;
        Ok(())
    }

    /// Lifecycle hook run before the node is inserted.
    ///
    /// Assigns the identifier if absent and returns the changes to flush,
    /// ending with the attach to the parent.
    pub fn before_insert(&mut self) -> Vec<RelationshipChange> {
        let id = self.ensure_id();
        self.changes_to_flush(id)
    }

    /// Lifecycle hook run before the node is updated.
    ///
    /// Deferring the attach to this hook is what makes `set_parent` durable.
    pub fn before_update(&self) -> Result<Vec<RelationshipChange>, ValidationError> {
        let id = self.persisted_id()?;
        Ok(self.changes_to_flush(id))
    }

    /// Lifecycle hook run before the node is deleted.
    pub fn before_delete(&self) -> Result<Vec<RelationshipChange>, ValidationError> {
        let id = self.persisted_id()?;
        Ok(self
            .parent
            .map(|parent| RelationshipChange::Detach { parent, child: id })
            .into_iter()
            .collect())
    }

    fn persisted_id(&self) -> Result<Uuid, ValidationError> {
        self.id
            .ok_or_else(|| ValidationError::MissingId(format!("organization '{}'", self.name)))
    }

    fn changes_to_flush(&self, id: Uuid) -> Vec<RelationshipChange> {
        let mut changes = self.pending.clone();
        if let Some(parent) = self.parent {
            changes.push(RelationshipChange::Attach { parent, child: id });
        }
        changes
    }
}

fn validate_name_field(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }

    let length = value.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(ValidationError::FieldTooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
            actual: length,
        });
    }

    Ok(())
}

impl PartialEq for Organization {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Organization {}

impl Hash for Organization {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Organization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(
                f,
                "Organization {{id={}, name={}, displayName={}}}",
                id, self.name, self.display_name
            ),
            None => write!(
                f,
                "Organization {{id=null, name={}, displayName={}}}",
                self.name, self.display_name
            ),
        }
    }
}
