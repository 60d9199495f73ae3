//! Data Models
//!
//! - `Organization` - self-referencing hierarchy node with lifecycle hooks
//! - `RelationshipChange` - pending parent/children intent, flushed by the store

mod organization;
mod relationship;

pub use organization::{Organization, ValidationError, MAX_NAME_LENGTH};
pub use relationship::RelationshipChange;
