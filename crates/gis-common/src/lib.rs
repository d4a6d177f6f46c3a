//! Common types and utilities shared across all geolayer services.

pub mod error;
pub mod file_type;
pub mod layer;
pub mod project;

pub use error::{GisError, GisResult};
pub use file_type::{FileLayerType, SHAPEFILE_MEMBER_EXTENSIONS};
pub use layer::{
    is_remote_origin, key_basename, key_extension, remote_origin_name, REMOTE_ORIGIN_PREFIX,
};
pub use project::ProjectRef;
