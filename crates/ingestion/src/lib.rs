//! Geospatial file layer ingestion library.
//!
//! Provides core logic for pulling uploaded layers (shapefile bundles, KML
//! documents, aerial imagery) out of the remote object store, staging them
//! locally, publishing them to the rendering service, and recording them
//! in the layer catalog.
//!
//! # Architecture
//!
//! This crate is used by the `layer-api` service. Each layer type has its
//! own handler behind a shared pipeline:
//!
//! - Shapefile bundles: folder listing, member validation, batch publish
//! - KML documents: single object, relocated into permanent local storage
//! - Aerial imagery: single object, published then catalogued
//! - Bulk purge of everything with a remote-origin name

pub mod error;
pub mod publish;
pub mod staging;
mod aerial;
mod kml;
mod pipeline;
mod shapefile;

// Re-exports
pub use error::{IngestError, Result};
pub use pipeline::{IngestReport, IngestionRequest, LayerPipeline, PurgeReport, StagedFile};
pub use publish::{PublishClient, PublishConfig};
pub use staging::StagingArea;
