//! Engine-side plumbing for Strata that is not about version control itself.
//!
//! # Modules
//!
//! - [`wal`]: the length-and-CRC framed write-ahead journal that makes a
//!   repository durable
//! - [`event`]: structured [`EngineEvent`]s emitted on workflow transitions
//! - [`sink`]: the [`NotificationSink`] contract and the broadcast [`EventBus`]
//! - [`telemetry`]: the [`Telemetry`] contract with tracing, in-memory and
//!   no-op implementations
//!
//! Both collaborator handles are passed in explicitly; there is no global
//! registry.

pub mod error;
pub mod event;
pub mod sink;
pub mod telemetry;
pub mod wal;

pub use error::{FabricError, Result};
pub use event::{EngineEvent, EventKind, Subject};
pub use sink::{EventBus, EventFilter, EventStream, NotificationSink, NullSink};
pub use telemetry::{MetricsRecorder, NoopTelemetry, OperationStats, Outcome, Telemetry, TracingTelemetry};
pub use wal::{SyncMode, WriteAheadLog};
