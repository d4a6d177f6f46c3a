//! Layer type definitions for file-based geodata ingestion.

use serde::{Deserialize, Serialize};

/// Kind of geospatial file layer a request refers to.
///
/// The wire tags ("SHP", "AIC", "KML") are the codes the upload portal and
/// the catalog use; the enum keeps dispatch exhaustive inside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileLayerType {
    /// Shapefile bundle: a bucket folder of sidecar member files
    #[serde(rename = "SHP")]
    Shapefile,

    /// Aerial imagery raster used in comparison views
    #[serde(rename = "AIC")]
    AerialImage,

    /// KML or KMZ document
    #[serde(rename = "KML")]
    Kml,
}

impl FileLayerType {
    /// Parse a wire tag. Unknown tags are rejected, not defaulted.
    pub fn parse_tag(s: &str) -> Option<Self> {
        match s {
            "SHP" => Some(FileLayerType::Shapefile),
            "AIC" => Some(FileLayerType::AerialImage),
            "KML" => Some(FileLayerType::Kml),
            _ => None,
        }
    }

    /// The wire tag recorded in the catalog (`data_type` / `image_type`).
    pub fn as_tag(&self) -> &'static str {
        match self {
            FileLayerType::Shapefile => "SHP",
            FileLayerType::AerialImage => "AIC",
            FileLayerType::Kml => "KML",
        }
    }

    /// Category directory for this type. Serves as both the object-store
    /// key prefix and the subdirectory under the local data root.
    pub fn category_dir(&self) -> &'static str {
        match self {
            FileLayerType::Shapefile => "Geoserver/Shapefile",
            FileLayerType::AerialImage => "Geoserver/AIC",
            FileLayerType::Kml => "KML",
        }
    }

    /// Label sent in the `fileType` field when publishing to the rendering
    /// service.
    pub fn publish_label(&self) -> &'static str {
        match self {
            FileLayerType::Shapefile => "Shapefile",
            FileLayerType::AerialImage => "AIC",
            FileLayerType::Kml => "KML",
        }
    }

    /// Whether this type names a folder of member files rather than a
    /// single object.
    pub fn is_bundle(&self) -> bool {
        matches!(self, FileLayerType::Shapefile)
    }

    /// Extensions accepted for an object of this type. Bundle members are
    /// checked individually against the shapefile sidecar set.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            FileLayerType::Shapefile => SHAPEFILE_MEMBER_EXTENSIONS,
            FileLayerType::AerialImage => &["ecw", "tiff"],
            FileLayerType::Kml => &["kml", "kmz"],
        }
    }
}

impl std::fmt::Display for FileLayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// Sidecar extensions that may appear inside a shapefile bundle.
pub const SHAPEFILE_MEMBER_EXTENSIONS: &[&str] = &[
    "shp", "shx", "dbf", "sbn", "sbx", "fbn", "fbx", "ain", "aih", "atx", "ixs", "mxs", "prj",
    "xml", "cpg",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_roundtrip() {
        for tag in ["SHP", "AIC", "KML"] {
            let ft = FileLayerType::parse_tag(tag).unwrap();
            assert_eq!(ft.as_tag(), tag);
        }
    }

    #[test]
    fn test_parse_tag_rejects_unknown() {
        assert!(FileLayerType::parse_tag("GPX").is_none());
        assert!(FileLayerType::parse_tag("shp").is_none());
        assert!(FileLayerType::parse_tag("").is_none());
    }

    #[test]
    fn test_publish_label_expands_shapefile() {
        assert_eq!(FileLayerType::Shapefile.publish_label(), "Shapefile");
        assert_eq!(FileLayerType::AerialImage.publish_label(), "AIC");
        assert_eq!(FileLayerType::Kml.publish_label(), "KML");
    }

    #[test]
    fn test_only_shapefile_is_bundle() {
        assert!(FileLayerType::Shapefile.is_bundle());
        assert!(!FileLayerType::AerialImage.is_bundle());
        assert!(!FileLayerType::Kml.is_bundle());
    }
}
