//! TursoStore - OrganizationStore Implementation for libsql
//!
//! Each write opens one connection, starts a `BEGIN IMMEDIATE` transaction,
//! writes the row, reconciles the relationship changes and commits. Any
//! failure rolls the whole unit of work back.
//!
//! # Ordering
//!
//! The children of a node are the rows whose `parent_id` is that node,
//! ordered by `parent_order`. Positions are kept dense (`0..n`): appending
//! uses the next free position and every removal renumbers the remaining
//! siblings.
//!
//! # Examples
//!
//! ```rust,no_run
//! use orgtree_core::db::{DatabaseService, OrganizationStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/orgtree.db")).await?);
//!     let store: Arc<dyn OrganizationStore> = Arc::new(TursoStore::new(db));
//!
//!     let roots_children = store.get_children(uuid::Uuid::new_v4()).await?;
//!     assert!(roots_children.is_empty());
//!     Ok(())
//! }
//! ```

use crate::db::organization_store::OrganizationStore;
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{Organization, RelationshipChange};
use async_trait::async_trait;
use libsql::{Connection, Row};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const SELECT_ORGANIZATION: &str =
    "SELECT id, name, display_name, parent_id FROM customizable_organization WHERE id = ?";

const SELECT_CHILDREN: &str = "SELECT id, name, display_name, parent_id
     FROM customizable_organization WHERE parent_id = ? ORDER BY parent_order, id";

const SELECT_CHILD_IDS: &str =
    "SELECT id FROM customizable_organization WHERE parent_id = ? ORDER BY parent_order, id";

const SELECT_PARENT: &str = "SELECT parent_id FROM customizable_organization WHERE id = ?";

const SELECT_NEXT_POSITION: &str =
    "SELECT COALESCE(MAX(parent_order) + 1, 0) FROM customizable_organization WHERE parent_id = ?";

const INSERT_ORGANIZATION: &str =
    "INSERT INTO customizable_organization (id, name, display_name) VALUES (?, ?, ?)";

const UPDATE_ORGANIZATION: &str =
    "UPDATE customizable_organization SET name = ?, display_name = ? WHERE id = ?";

const UPDATE_PARENT: &str =
    "UPDATE customizable_organization SET parent_id = ?, parent_order = ? WHERE id = ?";

const UPDATE_POSITION: &str = "UPDATE customizable_organization SET parent_order = ? WHERE id = ?";

const ORPHAN_CHILDREN: &str = "UPDATE customizable_organization
     SET parent_id = NULL, parent_order = NULL WHERE parent_id = ?";

const DELETE_ORGANIZATION: &str = "DELETE FROM customizable_organization WHERE id = ?";

/// TursoStore implements OrganizationStore on top of DatabaseService
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

/// Scalar columns of one stored row
struct StoredRow {
    id: Uuid,
    name: String,
    display_name: String,
    parent: Option<Uuid>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// The underlying database service
    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

fn parse_id(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value)
        .map_err(|e| DatabaseError::InvalidRow(format!("invalid id '{}': {}", value, e)))
}

fn persisted_id(org: &Organization) -> Result<Uuid, DatabaseError> {
    org.id().ok_or_else(|| {
        DatabaseError::sql_execution(format!("{} has no identifier", org))
    })
}

/// Decode `id, name, display_name, parent_id`
fn decode_row(row: &Row) -> Result<StoredRow, DatabaseError> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let display_name: String = row.get(2)?;
    let parent: Option<String> = row.get(3)?;

    Ok(StoredRow {
        id: parse_id(&id)?,
        name,
        display_name,
        parent: parent.as_deref().map(parse_id).transpose()?,
    })
}

/// `None` when the row does not exist, `Some(parent)` otherwise
async fn stored_parent(conn: &Connection, id: Uuid) -> Result<Option<Option<Uuid>>, DatabaseError> {
    let mut rows = conn
        .query(SELECT_PARENT, [id.to_string()])
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to load parent of {}: {}", id, e)))?;

    match rows.next().await? {
        Some(row) => {
            let parent: Option<String> = row.get(0)?;
            Ok(Some(parent.as_deref().map(parse_id).transpose()?))
        }
        None => Ok(None),
    }
}

async fn require_exists(conn: &Connection, id: Uuid) -> Result<(), DatabaseError> {
    match stored_parent(conn, id).await? {
        Some(_) => Ok(()),
        None => Err(DatabaseError::UnknownReference { id }),
    }
}

async fn child_ids(conn: &Connection, parent: Uuid) -> Result<Vec<Uuid>, DatabaseError> {
    let mut rows = conn
        .query(SELECT_CHILD_IDS, [parent.to_string()])
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to load children of {}: {}", parent, e))
        })?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await? {
        let id: String = row.get(0)?;
        ids.push(parse_id(&id)?);
    }
    Ok(ids)
}

async fn load_organization(conn: &Connection, id: Uuid) -> Result<Option<Organization>, DatabaseError> {
    let stored = {
        let mut rows = conn
            .query(SELECT_ORGANIZATION, [id.to_string()])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to load organization {}: {}", id, e))
            })?;
        match rows.next().await? {
            Some(row) => decode_row(&row)?,
            None => return Ok(None),
        }
    };

    let organizations = child_ids(conn, stored.id).await?;
    Ok(Some(Organization::from_stored(
        stored.id,
        stored.name,
        stored.display_name,
        stored.parent,
        organizations,
    )))
}

async fn load_children(conn: &Connection, parent: Uuid) -> Result<Vec<Organization>, DatabaseError> {
    let stored = {
        let mut rows = conn
            .query(SELECT_CHILDREN, [parent.to_string()])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to load children of {}: {}", parent, e))
            })?;
        let mut stored = Vec::new();
        while let Some(row) = rows.next().await? {
            stored.push(decode_row(&row)?);
        }
        stored
    };

    let mut children = Vec::with_capacity(stored.len());
    for row in stored {
        let organizations = child_ids(conn, row.id).await?;
        children.push(Organization::from_stored(
            row.id,
            row.name,
            row.display_name,
            row.parent,
            organizations,
        ));
    }
    Ok(children)
}

async fn set_parent_column(
    conn: &Connection,
    child: Uuid,
    parent: Option<Uuid>,
    position: Option<i64>,
) -> Result<(), DatabaseError> {
    conn.execute(
        UPDATE_PARENT,
        (parent.map(|p| p.to_string()), position, child.to_string()),
    )
    .await
    .map_err(|e| DatabaseError::from_write(&format!("Failed to move {}", child), e))?;
    Ok(())
}

async fn next_position(conn: &Connection, parent: Uuid) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(SELECT_NEXT_POSITION, [parent.to_string()])
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to compute position: {}", e)))?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}

/// Rewrite the positions of the children of `parent` as `0..n`
async fn renumber_children(conn: &Connection, parent: Uuid) -> Result<(), DatabaseError> {
    let ids = child_ids(conn, parent).await?;
    for (position, id) in ids.iter().enumerate() {
        conn.execute(UPDATE_POSITION, (position as i64, id.to_string()))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to renumber children of {}: {}", parent, e))
            })?;
    }
    Ok(())
}

/// Fail if `child` is `parent` or one of its ancestors
async fn ensure_acyclic(conn: &Connection, parent: Uuid, child: Uuid) -> Result<(), DatabaseError> {
    let mut visited = HashSet::new();
    let mut current = Some(parent);

    while let Some(node) = current {
        if node == child {
            return Err(DatabaseError::circular_reference(format!(
                "moving {} under {} would make it its own ancestor",
                child, parent
            )));
        }
        // Stored data already contains a loop that does not involve `child`
        if !visited.insert(node) {
            break;
        }
        current = stored_parent(conn, node).await?.flatten();
    }

    Ok(())
}

async fn apply_change(conn: &Connection, change: &RelationshipChange) -> Result<(), DatabaseError> {
    tracing::debug!("Applying relationship change: {}", change);

    match change {
        RelationshipChange::Detach { parent, child } => {
            match stored_parent(conn, *child).await? {
                Some(Some(current)) if current == *parent => {
                    set_parent_column(conn, *child, None, None).await?;
                    renumber_children(conn, *parent).await?;
                }
                _ => tracing::debug!("{} is not a child of {}, nothing to detach", child, parent),
            }
        }

        RelationshipChange::Attach { parent, child } => {
            let current = stored_parent(conn, *child)
                .await?
                .ok_or(DatabaseError::UnknownReference { id: *child })?;
            if current == Some(*parent) {
                return Ok(());
            }

            require_exists(conn, *parent).await?;
            ensure_acyclic(conn, *parent, *child).await?;

            let position = next_position(conn, *parent).await?;
            set_parent_column(conn, *child, Some(*parent), Some(position)).await?;

            if let Some(previous) = current {
                renumber_children(conn, previous).await?;
            }
        }

        RelationshipChange::ReplaceChildren { parent, children } => {
            require_exists(conn, *parent).await?;
            for child in children {
                ensure_acyclic(conn, *parent, *child).await?;
            }

            for former in child_ids(conn, *parent).await? {
                if !children.contains(&former) {
                    set_parent_column(conn, former, None, None).await?;
                }
            }

            let mut previous_parents = Vec::new();
            for (position, child) in children.iter().enumerate() {
                let current = stored_parent(conn, *child)
                    .await?
                    .ok_or(DatabaseError::UnknownReference { id: *child })?;
                if let Some(previous) = current {
                    if previous != *parent && !previous_parents.contains(&previous) {
                        previous_parents.push(previous);
                    }
                }
                set_parent_column(conn, *child, Some(*parent), Some(position as i64)).await?;
            }

            for previous in previous_parents {
                renumber_children(conn, previous).await?;
            }
        }
    }

    Ok(())
}

async fn apply_changes(
    conn: &Connection,
    changes: &[RelationshipChange],
) -> Result<(), DatabaseError> {
    for change in changes {
        apply_change(conn, change).await?;
    }
    Ok(())
}

#[async_trait]
impl OrganizationStore for TursoStore {
    async fn insert(
        &self,
        org: &Organization,
        changes: &[RelationshipChange],
    ) -> Result<(), DatabaseError> {
        let id = persisted_id(org)?;
        let conn = self.db.connect_with_timeout().await?;

        self.db.begin_transaction(&conn).await?;
        let result: Result<(), DatabaseError> = async {
            conn.execute(
                INSERT_ORGANIZATION,
                (id.to_string(), org.name().to_string(), org.display_name().to_string()),
            )
            .await
            .map_err(|e| DatabaseError::from_write("Failed to insert organization", e))?;
            apply_changes(&conn, changes).await
        }
        .await;
        self.db.finish_transaction(&conn, result).await?;

        tracing::debug!("Inserted {} with {} relationship changes", org, changes.len());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Organization>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        self.db.begin_read_transaction(&conn).await?;
        let result = load_organization(&conn, id).await;
        self.db.finish_transaction(&conn, result).await
    }

    async fn update(
        &self,
        org: &Organization,
        changes: &[RelationshipChange],
    ) -> Result<(), DatabaseError> {
        let id = persisted_id(org)?;
        let conn = self.db.connect_with_timeout().await?;

        self.db.begin_transaction(&conn).await?;
        let result: Result<(), DatabaseError> = async {
            let affected = conn
                .execute(
                    UPDATE_ORGANIZATION,
                    (
                        org.name().to_string(),
                        org.display_name().to_string(),
                        id.to_string(),
                    ),
                )
                .await
                .map_err(|e| DatabaseError::from_write("Failed to update organization", e))?;
            if affected == 0 {
                return Err(DatabaseError::NotFound { id });
            }
            apply_changes(&conn, changes).await
        }
        .await;
        self.db.finish_transaction(&conn, result).await?;

        tracing::debug!("Updated {} with {} relationship changes", org, changes.len());
        Ok(())
    }

    async fn delete(
        &self,
        org: &Organization,
        changes: &[RelationshipChange],
    ) -> Result<(), DatabaseError> {
        let id = persisted_id(org)?;
        let conn = self.db.connect_with_timeout().await?;

        self.db.begin_transaction(&conn).await?;
        let result: Result<(), DatabaseError> = async {
            if stored_parent(&conn, id).await?.is_none() {
                return Err(DatabaseError::NotFound { id });
            }

            apply_changes(&conn, changes).await?;

            // The row may still hang below a parent the caller did not know about
            let parent = stored_parent(&conn, id).await?.flatten();

            conn.execute(ORPHAN_CHILDREN, [id.to_string()])
                .await
                .map_err(|e| DatabaseError::from_write("Failed to detach children", e))?;
            conn.execute(DELETE_ORGANIZATION, [id.to_string()])
                .await
                .map_err(|e| DatabaseError::from_write("Failed to delete organization", e))?;

            if let Some(parent) = parent {
                renumber_children(&conn, parent).await?;
            }
            Ok(())
        }
        .await;
        self.db.finish_transaction(&conn, result).await?;

        tracing::debug!("Deleted {}", org);
        Ok(())
    }

    async fn get_children(&self, parent_id: Uuid) -> Result<Vec<Organization>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;

        self.db.begin_read_transaction(&conn).await?;
        let result = load_children(&conn, parent_id).await;
        self.db.finish_transaction(&conn, result).await
    }

    async fn close(&self) -> Result<(), DatabaseError> {
        self.db.db_close().await?;
        tracing::debug!("Checkpointed {}", self.db.db_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (TursoStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (TursoStore::new(Arc::new(db)), temp_dir)
    }

    async fn insert_root(store: &TursoStore, name: &str) -> Organization {
        let mut org = Organization::new(name, name);
        let changes = org.before_insert();
        store.insert(&org, &changes).await.unwrap();
        org
    }

    async fn positions(store: &TursoStore, parent: Uuid) -> Vec<(Uuid, i64)> {
        let conn = store.database().connect().unwrap();
        let mut rows = conn
            .query(
                "SELECT id, parent_order FROM customizable_organization WHERE parent_id = ? ORDER BY parent_order",
                [parent.to_string()],
            )
            .await
            .unwrap();
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            let id: String = row.get(0).unwrap();
            result.push((Uuid::parse_str(&id).unwrap(), row.get::<i64>(1).unwrap()));
        }
        result
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (store, _temp) = create_test_store().await;
        let org = insert_root(&store, "Root").await;

        let loaded = store.get(org.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded, org);
        assert_eq!(loaded.name(), "Root");
        assert!(loaded.is_root());
        assert!(loaded.organizations().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (store, _temp) = create_test_store().await;
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_appends_with_dense_positions() {
        let (store, _temp) = create_test_store().await;
        let parent = insert_root(&store, "Parent").await;
        let parent_id = parent.id().unwrap();

        let mut ids = Vec::new();
        for name in ["A", "B", "C"] {
            let mut child = Organization::new(name, name);
            child.set_parent(Some(&parent)).unwrap();
            let changes = child.before_insert();
            store.insert(&child, &changes).await.unwrap();
            ids.push(child.id().unwrap());
        }

        assert_eq!(
            positions(&store, parent_id).await,
            vec![(ids[0], 0), (ids[1], 1), (ids[2], 2)]
        );
    }

    #[tokio::test]
    async fn test_detach_renumbers_siblings() {
        let (store, _temp) = create_test_store().await;
        let parent = insert_root(&store, "Parent").await;
        let parent_id = parent.id().unwrap();

        let mut children = Vec::new();
        for name in ["A", "B", "C"] {
            let mut child = Organization::new(name, name);
            child.set_parent(Some(&parent)).unwrap();
            let changes = child.before_insert();
            store.insert(&child, &changes).await.unwrap();
            children.push(child);
        }

        let mut middle = children.remove(1);
        middle.set_parent(None).unwrap();
        let changes = middle.before_update().unwrap();
        store.update(&middle, &changes).await.unwrap();

        assert_eq!(
            positions(&store, parent_id).await,
            vec![
                (children[0].id().unwrap(), 0),
                (children[1].id().unwrap(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_attach_rejects_cycle_and_rolls_back() {
        let (store, _temp) = create_test_store().await;
        let root = insert_root(&store, "Root").await;

        let mut child = Organization::new("Child", "Child");
        child.set_parent(Some(&root)).unwrap();
        let changes = child.before_insert();
        store.insert(&child, &changes).await.unwrap();

        let mut root = store.get(root.id().unwrap()).await.unwrap().unwrap();
        root.set_display_name("Renamed");
        root.set_parent(Some(&child)).unwrap();
        let changes = root.before_update().unwrap();
        let err = store.update(&root, &changes).await.unwrap_err();
        match err {
            DatabaseError::CircularReference { context } => {
                let root_id = root.id().unwrap().to_string();
                let child_id = child.id().unwrap().to_string();
                assert_eq!(context.matches(&root_id).count(), 1, "{}", context);
                assert_eq!(context.matches(&child_id).count(), 1, "{}", context);
                assert!(context.starts_with(&format!("moving {} under {}", root_id, child_id)));
            }
            other => panic!("expected circular reference, got {:?}", other),
        }

        let reloaded = store.get(root.id().unwrap()).await.unwrap().unwrap();
        assert_eq!(reloaded.display_name(), "Root");
        assert!(reloaded.is_root());
    }

    #[tokio::test]
    async fn test_replace_children_requires_existing_children() {
        let (store, _temp) = create_test_store().await;
        let mut parent = insert_root(&store, "Parent").await;

        let mut ghost = Organization::new("Ghost", "Ghost");
        ghost.ensure_id();
        parent.set_organizations([&mut ghost]).unwrap();

        let changes = parent.before_update().unwrap();
        let err = store.update(&parent, &changes).await.unwrap_err();
        assert!(matches!(err, DatabaseError::UnknownReference { id } if Some(id) == ghost.id()));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let (store, _temp) = create_test_store().await;
        let mut org = Organization::new("Nobody", "Nobody");
        let id = org.ensure_id();

        let err = store.update(&org, &[]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { id: missing } if missing == id));
    }

    #[tokio::test]
    async fn test_delete_orphans_children() {
        let (store, _temp) = create_test_store().await;
        let parent = insert_root(&store, "Parent").await;

        let mut child = Organization::new("Child", "Child");
        child.set_parent(Some(&parent)).unwrap();
        let changes = child.before_insert();
        store.insert(&child, &changes).await.unwrap();

        let changes = parent.before_delete().unwrap();
        store.delete(&parent, &changes).await.unwrap();

        let orphan = store.get(child.id().unwrap()).await.unwrap().unwrap();
        assert!(orphan.is_root());
        assert!(store.get(parent.id().unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_children_in_order() {
        let (store, _temp) = create_test_store().await;
        let mut parent = insert_root(&store, "Parent").await;
        let mut first = insert_root(&store, "First").await;
        let mut second = insert_root(&store, "Second").await;

        parent.set_organizations([&mut second, &mut first]).unwrap();
        let changes = parent.before_update().unwrap();
        store.update(&parent, &changes).await.unwrap();

        let children = store.get_children(parent.id().unwrap()).await.unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Second", "First"]);
        assert!(children.iter().all(|c| c.parent() == parent.id()));
    }
}
