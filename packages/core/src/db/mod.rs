//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management
//! - The `customizable_organization` table and its parent/child columns
//! - Atomic application of relationship changes
//!
//! # Architecture
//!
//! `DatabaseService` owns the database handle and transaction helpers.
//! `OrganizationStore` is the persistence abstraction used by the service
//! layer, and `TursoStore` is its libsql implementation.

mod database;
mod error;
mod organization_store;
mod turso_store;

pub use database::{DatabaseService, ORGANIZATION_TABLE};
pub use error::DatabaseError;
pub use organization_store::OrganizationStore;
pub use turso_store::TursoStore;
