//! OrganizationStore Trait - Persistence Abstraction
//!
//! The trait sits between `OrganizationManager` (CRUD façade) and the
//! database implementation.
//!
//! # Contract
//!
//! - Every write method runs as one atomic unit of work: the row write and
//!   every supplied [`RelationshipChange`] commit together or not at all.
//! - Changes are applied in the order given, after the row write for inserts
//!   and updates, and before the row removal for deletes.
//! - Children are returned in their persisted order.

use crate::db::DatabaseError;
use crate::models::{Organization, RelationshipChange};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence operations for organizations
///
/// Implementations must be `Send + Sync` so the store can be shared behind an
/// `Arc` across tasks.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Insert a new row for `org` and apply `changes`.
    ///
    /// # Errors
    ///
    /// - `ConstraintViolation` if the name is already taken
    /// - `UnknownReference` if a change references a missing node
    /// - `CircularReference` if a change would create an ancestor cycle
    async fn insert(
        &self,
        org: &Organization,
        changes: &[RelationshipChange],
    ) -> Result<(), DatabaseError>;

    /// Load one organization with its ordered children.
    ///
    /// Returns `Ok(None)` when no row matches.
    async fn get(&self, id: Uuid) -> Result<Option<Organization>, DatabaseError>;

    /// Write the scalar columns of `org` and apply `changes`.
    ///
    /// Fails with `NotFound` when no row matches.
    async fn update(
        &self,
        org: &Organization,
        changes: &[RelationshipChange],
    ) -> Result<(), DatabaseError>;

    /// Apply `changes`, then remove the row of `org`.
    ///
    /// Children of the removed node become roots. Fails with `NotFound` when
    /// no row matches.
    async fn delete(
        &self,
        org: &Organization,
        changes: &[RelationshipChange],
    ) -> Result<(), DatabaseError>;

    /// Load the children of `parent_id` in order.
    async fn get_children(&self, parent_id: Uuid) -> Result<Vec<Organization>, DatabaseError>;

    /// Flush pending writes to durable storage before shutdown.
    async fn close(&self) -> Result<(), DatabaseError>;
}
