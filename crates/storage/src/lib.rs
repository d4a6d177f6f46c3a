//! Storage gateways for geolayer services.
//!
//! Provides unified interfaces for:
//! - The remote object store (S3 compatible) holding uploaded layers
//! - PostgreSQL for the layer catalog

pub mod catalog;
pub mod object_store;

pub use self::object_store::{ObjectPage, ObjectStorage, ObjectStorageConfig};
pub use catalog::{AerialCompareRecord, Catalog, DataPoolRecord, ProjectLayerRecord, PurgeCounts};
