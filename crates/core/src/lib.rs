// crates/core/src/lib.rs
//! Core library for docgate.
//!
//! Holds everything the HTTP layer and the conversion worker share but that
//! is independent of the wire framework: the conversion engine traits and the
//! LibreOffice implementation, the date-partitioned storage layout, the
//! startup retention sweep, and the service configuration.

pub mod config;
pub mod engine;
pub mod retention;
pub mod storage;

pub use config::ServiceConfig;
pub use engine::{DocumentEngine, EngineError, EngineSession, SofficeEngine};
pub use retention::{sweep_partitions, SweepStats};
pub use storage::{PartitionKey, StorageLayout};
