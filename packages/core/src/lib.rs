//! Organization Tree Core
//!
//! This crate persists a hierarchy of organizations (each with an optional
//! parent and an ordered list of children) in an embedded libsql database,
//! behind a transactional create/read/update/delete façade.
//!
//! # Modules
//!
//! - [`models`] - The `Organization` entity and its relationship changes
//! - [`services`] - `OrganizationManager`, the CRUD façade
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Store configuration
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::StoreConfig;
pub use models::*;
pub use services::*;
