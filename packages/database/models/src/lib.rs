#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry record row types.
//!
//! A record pairs the `GeoJSON` source of truth (`data`) with the marker
//! geometry derived from it (`geom`). These types describe the record as
//! written and as read back; they carry no derivation logic.

use serde::{Deserialize, Serialize};
use zoning_map_geometry_models::ParentRef;

/// Name of the table holding geometry records.
pub const GEOMETRY_TABLE: &str = "geometry_records";

/// The values written by one upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryWrite {
    /// 2D `GeoJSON` document.
    pub data: serde_json::Value,
    /// Derived marker geometry as WKT (SRID 4326), or `None` when nothing
    /// could be derived from `data`.
    pub geom_wkt: Option<String>,
}

/// A geometry record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredGeometry {
    /// Row id.
    pub id: i64,
    /// Owning record.
    pub parent: ParentRef,
    /// 2D `GeoJSON` document.
    pub data: serde_json::Value,
    /// Derived marker geometry as WKT.
    pub geom_wkt: Option<String>,
}

impl StoredGeometry {
    /// Returns true if the record has no derived geometry.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.geom_wkt.is_none()
    }
}
