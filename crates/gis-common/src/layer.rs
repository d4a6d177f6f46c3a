//! Remote-origin layer naming.
//!
//! Layers ingested from the object store carry a fixed name prefix in the
//! catalog and on disk so they can be told apart from locally authored
//! layers and purged in bulk later.

/// Prefix stamped onto every catalog name and staged file that originated
/// in the remote object store.
pub const REMOTE_ORIGIN_PREFIX: &str = "S3-";

/// Prepend the remote-origin prefix to a bare object name.
pub fn remote_origin_name(base: &str) -> String {
    format!("{REMOTE_ORIGIN_PREFIX}{base}")
}

/// Whether a catalog name carries the remote-origin prefix.
pub fn is_remote_origin(name: &str) -> bool {
    name.starts_with(REMOTE_ORIGIN_PREFIX)
}

/// Final path segment of an object key.
pub fn key_basename(key: &str) -> &str {
    match key.rsplit_once('/') {
        Some((_, name)) => name,
        None => key,
    }
}

/// Lowercased extension of an object key, if it has a usable one.
pub fn key_extension(key: &str) -> Option<String> {
    let name = key_basename(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            Some(ext.to_ascii_lowercase())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_origin_name() {
        assert_eq!(remote_origin_name("roads"), "S3-roads");
        assert!(is_remote_origin("S3-roads"));
        assert!(!is_remote_origin("roads"));
        assert!(!is_remote_origin("s3-roads"));
    }

    #[test]
    fn test_key_basename() {
        assert_eq!(key_basename("Geoserver/Shapefile/roads/roads.shp"), "roads.shp");
        assert_eq!(key_basename("lake.kml"), "lake.kml");
        assert_eq!(key_basename("Geoserver/Shapefile/roads/"), "");
    }

    #[test]
    fn test_key_extension() {
        assert_eq!(key_extension("roads/ROADS.SHP").as_deref(), Some("shp"));
        assert_eq!(key_extension("survey.tiff").as_deref(), Some("tiff"));
        assert_eq!(key_extension("README").as_deref(), None);
        assert_eq!(key_extension("archive.").as_deref(), None);
        assert_eq!(key_extension(".hidden").as_deref(), None);
    }
}
