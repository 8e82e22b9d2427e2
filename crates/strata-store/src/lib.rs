//! Entity state for Strata.
//!
//! - [`EntitySet`] is the materialized state of one commit: every live entity,
//!   keyed by id, with change-set application and containment checks.
//! - [`EntityStore`] is the branch-scoped read cache the engine refreshes
//!   after every tip advance. It is derived state; a failing cache never
//!   fails a version-control operation.
//! - [`InMemoryEntityStore`] is the `HashMap`-backed implementation.

pub mod entity_set;
pub mod error;
pub mod memory;
pub mod traits;

pub use entity_set::EntitySet;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryEntityStore;
pub use traits::EntityStore;
