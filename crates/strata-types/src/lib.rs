//! Foundation types for Strata, a version-control engine for building models.
//!
//! Every other Strata crate depends on `strata-types`.
//!
//! # Key Types
//!
//! - [`EntityId`], [`BranchId`], [`RepositoryId`]: UUID v7 identifiers
//! - [`CommitId`]: content-derived commit identifier (BLAKE3)
//! - [`ActorId`]: the user or system performing an operation
//! - [`Entity`]: a building, floor, room, equipment item or control point
//! - [`FieldValue`]: typed value of a single entity field
//! - [`ChangeSet`]: sparse field-level difference between two states

pub mod change;
pub mod entity;
pub mod error;
pub mod field;
pub mod ids;

pub use change::{ChangeSet, EntityChange, EntityEdit, FieldDelta};
pub use entity::{
    Building, ControlPoint, Entity, EntityKind, EntityPayload, Equipment, FieldSpec, Floor, Room,
    METADATA_FIELD, PARENT_FIELD,
};
pub use error::{TypeError, TypeResult};
pub use field::{FieldCodec, FieldType, FieldValue, Metadata, Point3};
pub use ids::{ActorId, BranchId, CommitId, EntityId, RepositoryId};

/// Wall-clock timestamp used on commits, branches and workflow records.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
