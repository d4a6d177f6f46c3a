//! Layer catalog using PostgreSQL.
//!
//! Holds the three tables the mapping application reads layers from
//! (`data_pool`, `project_layers`, `aerial_image_compare`) plus the
//! project/user tables consulted before an ingestion is allowed to run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use gis_common::{FileLayerType, GisError, GisResult, ProjectRef, REMOTE_ORIGIN_PREFIX};

/// Database connection pool and catalog operations.
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    /// Create a new catalog connection from database URL.
    pub async fn connect(database_url: &str) -> GisResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| GisError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> GisResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| GisError::DatabaseError(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Whether a `data_pool` entry with this name already exists.
    pub async fn data_pool_name_exists(&self, data_name: &str) -> GisResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM data_pool WHERE data_name = $1",
        )
        .bind(data_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| GisError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(count > 0)
    }

    /// Whether an aerial image with this URL is already registered.
    pub async fn aerial_image_url_exists(&self, image_url: &str) -> GisResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM aerial_image_compare WHERE image_url = $1",
        )
        .bind(image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| GisError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(count > 0)
    }

    /// Insert a `data_pool` row and its `project_layers` row in one
    /// transaction. Returns the generated (data_id, layer_id) pair.
    ///
    /// A unique-index violation on the layer name surfaces as
    /// [`GisError::DuplicateRecord`] so racing ingests of the same layer
    /// cannot both commit.
    pub async fn insert_file_layer(
        &self,
        data_pool: &DataPoolRecord,
        layer: &ProjectLayerRecord,
    ) -> GisResult<(i64, i64)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GisError::DatabaseError(format!("Begin failed: {}", e)))?;

        let data_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO data_pool ( \
                 data_name, data_url, data_owner, share, data_type, added_date, \
                 z_offset, data_owner_pid, added_by, x_offset, y_offset \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING data_id",
        )
        .bind(&data_pool.data_name)
        .bind(&data_pool.data_url)
        .bind(&data_pool.data_owner)
        .bind(data_pool.share)
        .bind(data_pool.data_type.as_tag())
        .bind(data_pool.added_date)
        .bind(data_pool.z_offset)
        .bind(data_pool.data_owner_pid)
        .bind(&data_pool.added_by)
        .bind(data_pool.x_offset)
        .bind(data_pool.y_offset)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error("data_pool", &data_pool.data_name, e))?;

        let layer_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO project_layers ( \
                 data_id, layer_name, attached_date, zindex, default_view, \
                 project_id, attached_by \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING layer_id",
        )
        .bind(data_id)
        .bind(&layer.layer_name)
        .bind(layer.attached_date)
        .bind(layer.zindex)
        .bind(layer.default_view)
        .bind(layer.project_id)
        .bind(&layer.attached_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_insert_error("project_layers", &layer.layer_name, e))?;

        tx.commit()
            .await
            .map_err(|e| GisError::DatabaseError(format!("Commit failed: {}", e)))?;

        Ok((data_id, layer_id))
    }

    /// Insert an `aerial_image_compare` row. Returns the generated aic_id.
    pub async fn insert_aerial_compare(&self, record: &AerialCompareRecord) -> GisResult<i64> {
        let aic_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO aerial_image_compare ( \
                 project_id, package_id, image_type, image_captured_date, \
                 registered_by, registered_date, image_url, routine_id, \
                 routine_type, owner_id, share, owner_aic_id \
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING aic_id",
        )
        .bind(record.project_id)
        .bind(record.package_id)
        .bind(record.image_type.as_tag())
        .bind(record.image_captured_date)
        .bind(&record.registered_by)
        .bind(record.registered_date)
        .bind(&record.image_url)
        .bind(&record.routine_id)
        .bind(record.routine_type)
        .bind(record.owner_id)
        .bind(record.share)
        .bind(record.owner_aic_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error("aerial_image_compare", &record.image_url, e))?;

        Ok(aic_id)
    }

    /// Catalog paths of every remote-origin KML layer, relative to the
    /// data root.
    pub async fn list_remote_origin_kml_paths(&self) -> GisResult<Vec<String>> {
        let pattern = remote_origin_pattern();

        let paths = sqlx::query_scalar::<_, String>(
            "SELECT data_url FROM data_pool WHERE data_type = 'KML' AND data_name LIKE $1",
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GisError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(paths)
    }

    /// Delete every remote-origin layer row, children before parents.
    /// Returns per-table deletion counts.
    pub async fn delete_remote_origin_layers(&self) -> GisResult<PurgeCounts> {
        let pattern = remote_origin_pattern();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| GisError::DatabaseError(format!("Begin failed: {}", e)))?;

        let project_layers = sqlx::query("DELETE FROM project_layers WHERE layer_name LIKE $1")
            .bind(&pattern)
            .execute(&mut *tx)
            .await
            .map_err(|e| GisError::DatabaseError(format!("Delete failed: {}", e)))?
            .rows_affected();

        let aerial_images = sqlx::query("DELETE FROM aerial_image_compare WHERE image_url LIKE $1")
            .bind(&pattern)
            .execute(&mut *tx)
            .await
            .map_err(|e| GisError::DatabaseError(format!("Delete failed: {}", e)))?
            .rows_affected();

        let data_pool = sqlx::query(
            "DELETE FROM data_pool WHERE data_type IN ('SHP', 'KML') AND data_name LIKE $1",
        )
        .bind(&pattern)
        .execute(&mut *tx)
        .await
        .map_err(|e| GisError::DatabaseError(format!("Delete failed: {}", e)))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| GisError::DatabaseError(format!("Commit failed: {}", e)))?;

        Ok(PurgeCounts {
            project_layers,
            aerial_images,
            data_pool,
        })
    }

    /// Look up a project by its exact name.
    pub async fn find_project_by_name(&self, project_name: &str) -> GisResult<Option<ProjectRef>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT project_id_number, project_name, parent_project_id_number \
             FROM projects WHERE project_name = $1",
        )
        .bind(project_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GisError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(row.map(|r| r.into()))
    }

    /// Whether a user holds one of the given roles on a project.
    pub async fn user_has_project_role(
        &self,
        project_id: i64,
        email: &str,
        roles: &[&str],
    ) -> GisResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users \
             INNER JOIN pro_usr_rel ON users.user_id = pro_usr_rel.usr_id \
             WHERE pro_usr_rel.pro_id = $1 \
               AND users.user_email = $2 \
               AND pro_usr_rel.pro_role = ANY($3)",
        )
        .bind(project_id)
        .bind(email)
        .bind(roles)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| GisError::DatabaseError(format!("Query failed: {}", e)))?;

        Ok(count > 0)
    }
}

fn remote_origin_pattern() -> String {
    format!("{}%", REMOTE_ORIGIN_PREFIX)
}

fn map_insert_error(table: &str, name: &str, e: sqlx::Error) -> GisError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return GisError::DuplicateRecord(name.to_string());
        }
    }
    GisError::DatabaseError(format!("Insert into {} failed: {}", table, e))
}

/// Row values for a new `data_pool` entry.
#[derive(Debug, Clone)]
pub struct DataPoolRecord {
    pub data_name: String,
    pub data_url: String,
    pub data_owner: String,
    pub share: i32,
    pub data_type: FileLayerType,
    pub added_date: DateTime<Utc>,
    pub z_offset: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub data_owner_pid: Option<i64>,
    pub added_by: String,
}

/// Row values for a new `project_layers` entry.
#[derive(Debug, Clone)]
pub struct ProjectLayerRecord {
    pub layer_name: String,
    pub attached_date: DateTime<Utc>,
    pub zindex: i32,
    pub default_view: i32,
    pub project_id: i64,
    pub attached_by: String,
}

/// Row values for a new `aerial_image_compare` entry.
#[derive(Debug, Clone)]
pub struct AerialCompareRecord {
    pub project_id: i64,
    pub package_id: i64,
    pub image_type: FileLayerType,
    pub image_captured_date: DateTime<Utc>,
    pub registered_by: String,
    pub registered_date: DateTime<Utc>,
    pub image_url: String,
    pub routine_id: String,
    pub routine_type: i32,
    pub owner_id: i64,
    pub share: i32,
    pub owner_aic_id: i64,
}

/// Rows deleted from each table by a purge.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PurgeCounts {
    pub project_layers: u64,
    pub aerial_images: u64,
    pub data_pool: u64,
}

/// Internal row type for project queries.
#[derive(FromRow)]
struct ProjectRow {
    project_id_number: i64,
    project_name: String,
    parent_project_id_number: Option<i64>,
}

impl From<ProjectRow> for ProjectRef {
    fn from(row: ProjectRow) -> Self {
        ProjectRef {
            project_id_number: row.project_id_number,
            project_name: row.project_name,
            parent_project_id_number: row.parent_project_id_number,
        }
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    project_id_number BIGSERIAL PRIMARY KEY,
    project_id VARCHAR(50),
    project_name VARCHAR(200) NOT NULL UNIQUE,
    parent_project_id_number BIGINT
);

CREATE TABLE IF NOT EXISTS users (
    user_id BIGSERIAL PRIMARY KEY,
    user_email VARCHAR(200) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS pro_usr_rel (
    pro_id BIGINT NOT NULL REFERENCES projects(project_id_number),
    usr_id BIGINT NOT NULL REFERENCES users(user_id),
    pro_role VARCHAR(50) NOT NULL,

    PRIMARY KEY (pro_id, usr_id, pro_role)
);

CREATE TABLE IF NOT EXISTS data_pool (
    data_id BIGSERIAL PRIMARY KEY,
    data_name VARCHAR(200) NOT NULL,
    data_url TEXT NOT NULL,
    data_owner VARCHAR(200) NOT NULL,
    share INTEGER NOT NULL DEFAULT 0,
    data_type VARCHAR(10) NOT NULL,
    added_date TIMESTAMPTZ NOT NULL,
    z_offset DOUBLE PRECISION NOT NULL DEFAULT 0,
    data_owner_pid BIGINT,
    added_by VARCHAR(200) NOT NULL,
    style TEXT,
    modified_by VARCHAR(200),
    modified_date TIMESTAMPTZ,
    x_offset DOUBLE PRECISION NOT NULL DEFAULT 0,
    y_offset DOUBLE PRECISION NOT NULL DEFAULT 0,
    timeline_year INTEGER
);

CREATE TABLE IF NOT EXISTS project_layers (
    layer_id BIGSERIAL PRIMARY KEY,
    data_id BIGINT NOT NULL REFERENCES data_pool(data_id),
    layer_name VARCHAR(200) NOT NULL,
    attached_date TIMESTAMPTZ NOT NULL,
    zindex INTEGER NOT NULL DEFAULT 1,
    default_view INTEGER NOT NULL DEFAULT 0,
    project_id BIGINT NOT NULL,
    attached_by VARCHAR(200) NOT NULL,
    layer_group VARCHAR(200),
    meta_id BIGINT,
    modified_by VARCHAR(200),
    modified_date TIMESTAMPTZ,
    show_metadata INTEGER,
    sub_group_id BIGINT,
    sub_group_name VARCHAR(200),
    sub_layer_title VARCHAR(200),
    timeline_year INTEGER
);

CREATE TABLE IF NOT EXISTS aerial_image_compare (
    aic_id BIGSERIAL PRIMARY KEY,
    project_id BIGINT NOT NULL,
    package_id BIGINT NOT NULL,
    image_type VARCHAR(10) NOT NULL,
    image_captured_date TIMESTAMPTZ NOT NULL,
    registered_by VARCHAR(200) NOT NULL,
    registered_date TIMESTAMPTZ NOT NULL,
    image_url TEXT NOT NULL,
    routine_id VARCHAR(100) NOT NULL,
    routine_type INTEGER NOT NULL DEFAULT 0,
    use_name VARCHAR(200),
    image_group VARCHAR(200),
    image_sub_group VARCHAR(200),
    owner_id BIGINT NOT NULL,
    share INTEGER NOT NULL DEFAULT 0,
    owner_aic_id BIGINT NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_data_pool_type ON data_pool(data_type);
CREATE INDEX IF NOT EXISTS idx_project_layers_data ON project_layers(data_id);

CREATE UNIQUE INDEX IF NOT EXISTS idx_data_pool_remote_name
    ON data_pool(data_name) WHERE data_name LIKE 'S3-%';
CREATE UNIQUE INDEX IF NOT EXISTS idx_aic_remote_url
    ON aerial_image_compare(image_url) WHERE image_url LIKE 'S3-%';
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_origin_pattern() {
        assert_eq!(remote_origin_pattern(), "S3-%");
    }

    #[test]
    fn test_map_insert_error_passthrough() {
        let err = map_insert_error("data_pool", "S3-roads", sqlx::Error::RowNotFound);
        match err {
            GisError::DatabaseError(msg) => assert!(msg.contains("data_pool")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_schema_splits_into_executable_statements() {
        let statements: Vec<&str> = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        assert!(statements.len() >= 10);
        assert!(statements.iter().all(|s| s.starts_with("CREATE")));
    }
}
