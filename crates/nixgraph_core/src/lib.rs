//! Scientific data object model: metadata trees, n-dimensional arrays,
//! dimension descriptors, provenance sources and region-of-interest tags.
//! `File` is the single owner of every entity and the only mutation path.

pub mod backend;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod model;
pub mod store;
pub mod validate;

pub use backend::{
    CommitEvent, CommitHook, CommitLogEntry, EntityRecord, MemoryJournal, Operation, SnapshotInfo,
    SqliteBackend,
};
pub use error::{BackendError, ModelError, ModelResult};
pub use file::{File, FileOptions};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig};
pub use model::block::Block;
pub use model::data_array::{ArrayBuffer, DataArray, DataType, Region};
pub use model::dimension::{Dimension, RangeDimension, SampledDimension, SetDimension};
pub use model::entity::{create_id, is_valid_id, Entity, EntityId, EntityKind, EntityMeta};
pub use model::property::{OdmlType, Property};
pub use model::section::Section;
pub use model::source::Source;
pub use model::tag::{DataTag, Feature, LinkType, SimpleTag, Tag};
pub use model::value::{Value, ValueData, ValueType};
pub use validate::{ValidationIssue, ValidationReport};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
