//! Business Services
//!
//! - `OrganizationManager` - CRUD façade over the organization store
//!
//! Services coordinate between the database layer and application logic:
//! they validate, run the entity lifecycle hooks and translate store errors.

pub mod error;
pub mod organization_manager;

pub use error::OrganizationServiceError;
pub use organization_manager::OrganizationManager;
