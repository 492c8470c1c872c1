//! `PostGIS` geometry store.
//!
//! Writes go through a single `INSERT ... ON CONFLICT ... DO UPDATE`
//! statement keyed by the parent's foreign key column, so concurrent
//! writers for the same parent never interleave a read and a write.
//! The marker geometry arrives as WKT and is converted with
//! `ST_GeomFromText(.., 4326)`; a null WKT stores a null `geom`.

use async_trait::async_trait;
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};
use zoning_map_database_models::{GEOMETRY_TABLE, GeometryWrite, StoredGeometry};
use zoning_map_geometry_models::{ParentKind, ParentRef};

use crate::{DbError, GeometryStore};

const COLUMNS: &str = "id, building_control_id, risk_zone_id, zoning_plan_id,
              data::text AS data, ST_AsText(geom) AS geom_wkt";

/// Builds the upsert statement for a parent kind.
///
/// Parameters are `$1..$3` for the three foreign keys, `$4` for the JSON
/// text and `$5` for the WKT. Without a kind the statement is a plain
/// insert.
#[must_use]
pub fn upsert_sql(kind: Option<ParentKind>) -> String {
    let insert = format!(
        "INSERT INTO {GEOMETRY_TABLE} (
                building_control_id, risk_zone_id, zoning_plan_id, data, geom
            ) VALUES (
                $1, $2, $3, $4::text::jsonb, ST_GeomFromText($5, 4326)
            )"
    );

    match kind {
        Some(kind) => {
            let column = kind.foreign_key_column();
            format!(
                "{insert}
             ON CONFLICT ({column}) WHERE {column} IS NOT NULL DO UPDATE SET
                 data = EXCLUDED.data,
                 geom = EXCLUDED.geom,
                 updated_at = NOW()
             RETURNING {COLUMNS}"
            )
        }
        None => format!("{insert}\n             RETURNING {COLUMNS}"),
    }
}

/// Builds the lookup statement for a parent kind.
#[must_use]
pub fn fetch_sql(kind: ParentKind) -> String {
    let column = kind.foreign_key_column();
    format!(
        "SELECT {COLUMNS}
         FROM {GEOMETRY_TABLE}
         WHERE {column} = $1
         ORDER BY id
         LIMIT 1"
    )
}

/// [`GeometryStore`] backed by a `PostGIS` database.
pub struct PostgisGeometryStore {
    db: Box<dyn Database>,
}

impl PostgisGeometryStore {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(db: Box<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GeometryStore for PostgisGeometryStore {
    async fn upsert(
        &self,
        parent: &ParentRef,
        write: &GeometryWrite,
    ) -> Result<StoredGeometry, DbError> {
        let [building_control_id, risk_zone_id, zoning_plan_id] = parent.foreign_keys();
        let data = serde_json::to_string(&write.data)?;

        let rows = self
            .db
            .query_raw_params(
                &upsert_sql(parent.kind()),
                &[
                    building_control_id.map_or(DatabaseValue::Null, DatabaseValue::Int64),
                    risk_zone_id.map_or(DatabaseValue::Null, DatabaseValue::Int64),
                    zoning_plan_id.map_or(DatabaseValue::Null, DatabaseValue::Int64),
                    DatabaseValue::String(data),
                    write
                        .geom_wkt
                        .as_ref()
                        .map_or(DatabaseValue::Null, |w| DatabaseValue::String(w.clone())),
                ],
            )
            .await?;

        let row = rows.first().ok_or_else(|| DbError::Conversion {
            message: format!("Upsert for {parent} returned no row"),
        })?;

        let stored = stored_from_row(row)?;
        log::debug!(
            "Upserted geometry record {} for {parent} (geom: {})",
            stored.id,
            if stored.is_degraded() { "null" } else { "set" }
        );
        Ok(stored)
    }

    async fn fetch(&self, parent: &ParentRef) -> Result<Option<StoredGeometry>, DbError> {
        let (Some(kind), Some(id)) = (parent.kind(), parent.id()) else {
            return Ok(None);
        };

        let rows = self
            .db
            .query_raw_params(&fetch_sql(kind), &[DatabaseValue::Int64(id)])
            .await?;

        rows.first().map(stored_from_row).transpose()
    }
}

fn stored_from_row(row: &Row) -> Result<StoredGeometry, DbError> {
    let id: i64 = row.to_value("id").map_err(|e| DbError::Conversion {
        message: format!("Failed to parse geometry record id: {e}"),
    })?;

    let building_control_id: Option<i64> = row
        .to_value("building_control_id")
        .map_err(|e| conversion(id, "building_control_id", &e))?;
    let risk_zone_id: Option<i64> = row
        .to_value("risk_zone_id")
        .map_err(|e| conversion(id, "risk_zone_id", &e))?;
    let zoning_plan_id: Option<i64> = row
        .to_value("zoning_plan_id")
        .map_err(|e| conversion(id, "zoning_plan_id", &e))?;
    let parent = ParentRef::from_foreign_keys(building_control_id, risk_zone_id, zoning_plan_id)
        .map_err(|e| DbError::Conversion {
            message: format!("Geometry record {id}: {e}"),
        })?;

    let data: String = row
        .to_value("data")
        .map_err(|e| conversion(id, "data", &e))?;
    let geom_wkt: Option<String> = row
        .to_value("geom_wkt")
        .map_err(|e| conversion(id, "geom_wkt", &e))?;

    Ok(StoredGeometry {
        id,
        parent,
        data: serde_json::from_str(&data)?,
        geom_wkt,
    })
}

fn conversion(id: i64, column: &str, e: &impl std::fmt::Display) -> DbError {
    DbError::Conversion {
        message: format!("Failed to read {column} for geometry record {id}: {e}"),
    }
}
