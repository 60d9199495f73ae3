//! Organization Manager - CRUD Façade
//!
//! `OrganizationManager` is the entry point for reading and writing
//! organizations. Each write:
//!
//! 1. validates the node,
//! 2. runs the matching lifecycle hook to collect the relationship changes,
//! 3. hands row and changes to the store, which applies them in one
//!    transaction,
//! 4. reloads the persisted node so the caller sees a fresh children snapshot.
//!
//! After a successful `create` or `update` the caller's node is replaced by
//! the reloaded one, which also clears its pending changes. On failure the
//! caller's node keeps its pending changes and nothing is written.
//!
//! # Examples
//!
//! ```rust,no_run
//! use orgtree_core::config::StoreConfig;
//! use orgtree_core::models::Organization;
//! use orgtree_core::services::OrganizationManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::from_env().map_err(anyhow::Error::msg)?;
//!     let manager = OrganizationManager::open(&config).await?;
//!
//!     let mut parent = Organization::new("engineering", "Engineering");
//!     manager.create(&mut parent).await?;
//!
//!     let mut team = Organization::new("platform", "Platform Team");
//!     team.set_parent(Some(&parent))?;
//!     manager.create(&mut team).await?;
//!
//!     let parent = manager.read(parent.id().unwrap_or_default()).await?;
//!     assert_eq!(parent.organizations(), &[team.id().unwrap_or_default()]);
//!     Ok(())
//! }
//! ```

use crate::config::StoreConfig;
use crate::db::{DatabaseService, OrganizationStore, TursoStore};
use crate::models::{Organization, ValidationError};
use crate::services::error::OrganizationServiceError;
use std::sync::Arc;
use uuid::Uuid;

/// CRUD operations over organizations
#[derive(Clone)]
pub struct OrganizationManager {
    store: Arc<dyn OrganizationStore>,
}

impl OrganizationManager {
    pub fn new(store: Arc<dyn OrganizationStore>) -> Self {
        Self { store }
    }

    /// Open (creating if needed) the database described by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self, OrganizationServiceError> {
        let db = Arc::new(DatabaseService::with_config(config).await?);
        tracing::info!("Organization store ready at {}", db.db_path.display());
        Ok(Self::new(Arc::new(TursoStore::new(db))))
    }

    /// Get reference to the underlying store
    pub fn store(&self) -> &Arc<dyn OrganizationStore> {
        &self.store
    }

    /// Load an organization by id.
    ///
    /// # Errors
    ///
    /// `NotFound` ("No organization with id {id} exists") when no row matches.
    pub async fn read(&self, id: Uuid) -> Result<Organization, OrganizationServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| OrganizationServiceError::not_found(id))
    }

    /// Persist a new organization and return the stored version.
    ///
    /// Assigns the identifier when absent and attaches the node to its parent
    /// (appended after the existing children).
    pub async fn create(
        &self,
        org: &mut Organization,
    ) -> Result<Organization, OrganizationServiceError> {
        org.validate()?;

        let changes = org.before_insert();
        self.store.insert(org, &changes).await?;

        let persisted = self.reload(org).await?;
        tracing::info!("Created {}", persisted);
        *org = persisted.clone();
        Ok(persisted)
    }

    /// Write scalar changes and flush pending relationship changes.
    pub async fn update(
        &self,
        org: &mut Organization,
    ) -> Result<Organization, OrganizationServiceError> {
        org.validate()?;

        let changes = org.before_update()?;
        self.store.update(org, &changes).await?;

        let persisted = self.reload(org).await?;
        tracing::info!(
            "Updated {} ({} relationship changes)",
            persisted,
            changes.len()
        );
        *org = persisted.clone();
        Ok(persisted)
    }

    /// Remove an organization.
    ///
    /// The node is detached from its parent first; its children become roots.
    pub async fn delete(&self, org: &Organization) -> Result<(), OrganizationServiceError> {
        let changes = org.before_delete()?;
        self.store.delete(org, &changes).await?;

        tracing::info!("Deleted {}", org);
        Ok(())
    }

    /// Load the parent of `org`, if it has one
    pub async fn parent_of(
        &self,
        org: &Organization,
    ) -> Result<Option<Organization>, OrganizationServiceError> {
        match org.parent() {
            Some(parent_id) => self.read(parent_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Load the children of `org` in order; empty for a transient node
    pub async fn children_of(
        &self,
        org: &Organization,
    ) -> Result<Vec<Organization>, OrganizationServiceError> {
        match org.id() {
            Some(id) => Ok(self.store.get_children(id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Checkpoint the store so the database file is complete on its own
    pub async fn close(&self) -> Result<(), OrganizationServiceError> {
        self.store.close().await?;
        tracing::info!("Organization store closed");
        Ok(())
    }

    async fn reload(&self, org: &Organization) -> Result<Organization, OrganizationServiceError> {
        let id = org
            .id()
            .ok_or_else(|| ValidationError::MissingId(format!("organization '{}'", org.name())))?;
        self.read(id).await
    }
}
