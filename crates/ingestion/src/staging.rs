//! Transient staging area for files pulled out of the object store.
//!
//! Everything downloaded from the bucket lands under
//! `{data_root}/S3_FILES/<category>/<project>/` before it is published or
//! relocated. The staging tree never survives a pipeline run.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::debug;

use gis_common::FileLayerType;

/// Subdirectory of the data root that holds in-flight downloads.
const STAGING_SUBDIR: &str = "S3_FILES";

/// Layout of the local data tree.
///
/// Permanent per-project storage sits directly under the data root
/// (`{data_root}/KML/42/...`), the staging tree under [`STAGING_SUBDIR`].
/// A wipe only ever touches the three known category roots inside the
/// staging subdirectory.
#[derive(Debug, Clone)]
pub struct StagingArea {
    data_root: PathBuf,
}

impl StagingArea {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Staging root for one layer category.
    pub fn category_root(&self, file_type: FileLayerType) -> PathBuf {
        self.data_root
            .join(STAGING_SUBDIR)
            .join(file_type.category_dir())
    }

    /// Per-project staging directory for single-object layers.
    pub fn project_dir(&self, file_type: FileLayerType, project_id: i64) -> PathBuf {
        self.category_root(file_type).join(project_id.to_string())
    }

    /// Per-project, per-bundle staging directory for shapefile members.
    pub fn bundle_dir(&self, project_id: i64, bundle_name: &str) -> PathBuf {
        self.project_dir(FileLayerType::Shapefile, project_id)
            .join(bundle_name)
    }

    /// Permanent per-project directory for one layer category.
    pub fn permanent_project_dir(&self, file_type: FileLayerType, project_id: i64) -> PathBuf {
        self.data_root
            .join(file_type.category_dir())
            .join(project_id.to_string())
    }

    /// Clear the three staging category roots, recreating each one empty.
    ///
    /// Roots that do not exist yet are created.
    pub async fn wipe(&self) -> std::io::Result<()> {
        for file_type in [
            FileLayerType::Shapefile,
            FileLayerType::AerialImage,
            FileLayerType::Kml,
        ] {
            let root = self.category_root(file_type);
            match fs::remove_dir_all(&root).await {
                Ok(()) => debug!(root = %root.display(), "Cleared staging root"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            fs::create_dir_all(&root).await?;
        }

        Ok(())
    }

    /// Move a staged file into the permanent per-project directory and
    /// return its final path.
    pub async fn relocate_to_permanent(
        &self,
        staged: &Path,
        file_type: FileLayerType,
        project_id: i64,
        file_name: &str,
    ) -> std::io::Result<PathBuf> {
        let dest_dir = self.permanent_project_dir(file_type, project_id);
        fs::create_dir_all(&dest_dir).await?;
        let dest = dest_dir.join(file_name);

        // Move to final location (use copy+delete for cross-filesystem support)
        if let Err(_) = fs::rename(staged, &dest).await {
            fs::copy(staged, &dest).await?;
            fs::remove_file(staged).await?;
        }

        debug!(from = %staged.display(), to = %dest.display(), "Relocated staged file");
        Ok(dest)
    }

    /// Resolve a catalog-recorded relative path against the data root.
    ///
    /// Absolute paths and any non-plain component (`..`, `.`, drive
    /// prefixes) are rejected so catalog rows can never name a file
    /// outside the data tree.
    pub fn resolve_catalog_path(&self, relative: &str) -> Option<PathBuf> {
        let rel = Path::new(relative);
        if rel.as_os_str().is_empty()
            || !rel.components().all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.data_root.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_layout() {
        let staging = StagingArea::new("/data");

        assert_eq!(
            staging.category_root(FileLayerType::Kml),
            PathBuf::from("/data/S3_FILES/KML")
        );
        assert_eq!(
            staging.project_dir(FileLayerType::AerialImage, 42),
            PathBuf::from("/data/S3_FILES/Geoserver/AIC/42")
        );
        assert_eq!(
            staging.bundle_dir(42, "S3-roads"),
            PathBuf::from("/data/S3_FILES/Geoserver/Shapefile/42/S3-roads")
        );
        assert_eq!(
            staging.permanent_project_dir(FileLayerType::Kml, 42),
            PathBuf::from("/data/KML/42")
        );
    }

    #[test]
    fn test_resolve_catalog_path() {
        let staging = StagingArea::new("/data");

        assert_eq!(
            staging.resolve_catalog_path("KML/42/S3-lake.kml"),
            Some(PathBuf::from("/data/KML/42/S3-lake.kml"))
        );
        assert_eq!(staging.resolve_catalog_path("/etc/passwd"), None);
        assert_eq!(staging.resolve_catalog_path("../outside.kml"), None);
        assert_eq!(staging.resolve_catalog_path("KML/../../x"), None);
        assert_eq!(staging.resolve_catalog_path(""), None);
    }

    #[tokio::test]
    async fn test_wipe_clears_and_recreates_roots() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let stray = staging
            .project_dir(FileLayerType::Kml, 7)
            .join("S3-old.kml");
        fs::create_dir_all(stray.parent().unwrap()).await.unwrap();
        fs::write(&stray, b"leftover").await.unwrap();

        staging.wipe().await.unwrap();

        assert!(!stray.exists());
        for file_type in [
            FileLayerType::Shapefile,
            FileLayerType::AerialImage,
            FileLayerType::Kml,
        ] {
            let root = staging.category_root(file_type);
            assert!(root.is_dir());
            assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn test_wipe_on_empty_data_root() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        staging.wipe().await.unwrap();

        assert!(staging.category_root(FileLayerType::Shapefile).is_dir());
    }

    #[tokio::test]
    async fn test_wipe_leaves_permanent_storage_alone() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let permanent = staging
            .permanent_project_dir(FileLayerType::Kml, 42)
            .join("S3-lake.kml");
        fs::create_dir_all(permanent.parent().unwrap()).await.unwrap();
        fs::write(&permanent, b"<kml/>").await.unwrap();

        staging.wipe().await.unwrap();

        assert!(permanent.exists());
    }

    #[tokio::test]
    async fn test_wipe_surfaces_unremovable_root() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        // A plain file occupying a category root cannot be removed as a
        // directory tree
        let root = staging.category_root(FileLayerType::Shapefile);
        fs::create_dir_all(root.parent().unwrap()).await.unwrap();
        fs::write(&root, b"in the way").await.unwrap();

        let err = staging.wipe().await.unwrap_err();
        assert_ne!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_relocate_to_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path());

        let staged = staging
            .project_dir(FileLayerType::Kml, 42)
            .join("S3-lake.kml");
        fs::create_dir_all(staged.parent().unwrap()).await.unwrap();
        fs::write(&staged, b"<kml/>").await.unwrap();

        let dest = staging
            .relocate_to_permanent(&staged, FileLayerType::Kml, 42, "S3-lake.kml")
            .await
            .unwrap();

        assert_eq!(
            dest,
            staging.permanent_project_dir(FileLayerType::Kml, 42).join("S3-lake.kml")
        );
        assert!(!staged.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"<kml/>");
    }
}
