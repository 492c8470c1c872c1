#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry record storage.
//!
//! [`GeometryStore`] is the boundary the persistence adapter writes
//! through. [`postgis::PostgisGeometryStore`] keeps records in `PostGIS`
//! via raw SQL on `switchy_database`; [`memory::MemoryGeometryStore`]
//! keeps them in process for tests and tooling. The `PostGIS` schema
//! lives in embedded SQL migrations applied by [`run_migrations`].

pub mod db;
pub mod memory;
pub mod postgis;

use async_trait::async_trait;
use include_dir::{Dir, include_dir};
use switchy_database::Database;
use switchy_schema::discovery::embedded::EmbeddedMigrationSource;
use switchy_schema::runner::MigrationRunner;
use zoning_map_database_models::{GeometryWrite, StoredGeometry};
use zoning_map_geometry_models::ParentRef;

pub use memory::MemoryGeometryStore;
pub use postgis::PostgisGeometryStore;

/// Embedded SQL migrations from the `migrations/` directory.
static MIGRATIONS_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/../../migrations");

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] switchy_schema::MigrationError),

    /// Stored JSON could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store could not be reached.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

impl DbError {
    /// Returns true if repeating the call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Unavailable { .. })
    }
}

/// Runs all pending database migrations.
///
/// # Errors
///
/// Returns [`DbError`] if any migration fails to apply.
pub async fn run_migrations(db: &dyn Database) -> Result<(), DbError> {
    let source = EmbeddedMigrationSource::new(&MIGRATIONS_DIR);
    let runner = MigrationRunner::new(Box::new(source));
    runner.run(db).await?;
    log::info!("Database migrations completed successfully");
    Ok(())
}

/// Storage for geometry records keyed by their parent.
///
/// Implementations must make [`Self::upsert`] atomic: two concurrent
/// upserts for the same parent leave exactly one record holding the
/// values of one of the two writes.
#[async_trait]
pub trait GeometryStore: Send + Sync {
    /// Inserts or replaces the record for `parent`.
    ///
    /// A [`ParentRef::Unattached`] write always inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the write fails.
    async fn upsert(
        &self,
        parent: &ParentRef,
        write: &GeometryWrite,
    ) -> Result<StoredGeometry, DbError>;

    /// Returns the record for `parent`, if one exists.
    ///
    /// Unattached records cannot be addressed and always yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read fails.
    async fn fetch(&self, parent: &ParentRef) -> Result<Option<StoredGeometry>, DbError>;
}

#[cfg(test)]
mod tests {
    use zoning_map_database_models::GEOMETRY_TABLE;
    use zoning_map_geometry_models::ParentKind;

    use super::*;

    fn migration_sql(file_name: &str) -> Vec<(String, String)> {
        let mut migrations: Vec<(String, String)> = MIGRATIONS_DIR
            .dirs()
            .filter_map(|dir| {
                let id = dir.path().file_name()?.to_str()?.to_string();
                let sql = dir
                    .files()
                    .find(|f| f.path().file_name().and_then(|n| n.to_str()) == Some(file_name))?
                    .contents_utf8()?
                    .to_string();
                Some((id, sql))
            })
            .collect();
        migrations.sort();
        migrations
    }

    #[test]
    fn every_migration_has_up_and_down() {
        let dirs = MIGRATIONS_DIR.dirs().count();
        assert!(dirs > 0);
        assert_eq!(migration_sql("up.sql").len(), dirs);
        assert_eq!(migration_sql("down.sql").len(), dirs);
    }

    #[test]
    fn postgis_is_enabled_before_the_table_is_created() {
        let up = migration_sql("up.sql");
        let extension = up
            .iter()
            .position(|(_, sql)| sql.contains("CREATE EXTENSION IF NOT EXISTS postgis"))
            .unwrap();
        let table = up
            .iter()
            .position(|(_, sql)| sql.contains(&format!("CREATE TABLE IF NOT EXISTS {GEOMETRY_TABLE}")))
            .unwrap();
        assert!(extension < table);
    }

    #[test]
    fn schema_constrains_parents_and_srid() {
        let up: String = migration_sql("up.sql")
            .into_iter()
            .map(|(_, sql)| sql)
            .collect();

        assert!(up.contains("num_nonnulls(building_control_id, risk_zone_id, zoning_plan_id) <= 1"));
        assert!(up.contains("geometry(Geometry, 4326)"));
        assert!(up.contains(&format!("ON {GEOMETRY_TABLE} USING GIST (geom)")));
        for kind in ParentKind::ALL {
            let column = kind.foreign_key_column();
            assert!(
                up.contains(&format!(
                    "ON {GEOMETRY_TABLE} ({column}) WHERE {column} IS NOT NULL"
                )),
                "missing unique index for {column}"
            );
        }
    }

    #[test]
    fn only_store_failures_are_transient() {
        assert!(
            DbError::Unavailable {
                message: "down".to_string()
            }
            .is_transient()
        );
        assert!(
            !DbError::Conversion {
                message: "bad row".to_string()
            }
            .is_transient()
        );
    }
}
