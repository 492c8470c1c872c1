#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry persistence.
//!
//! Every geometry-bearing record stores its `GeoJSON` (`data`) next to a
//! marker geometry (`geom`) derived from it. [`persist`] is the only
//! write path: it normalizes the document, derives the marker, and
//! writes both in one upsert so they never disagree. [`import_kml`]
//! runs the whole upload pipeline from KML text.

pub mod config;
pub mod marker;
pub mod retry;

pub use config::PersistConfig;
pub use marker::{DocumentKind, GeoJsonInput, Marker, MarkerError};

use zoning_map_database::{DbError, GeometryStore};
use zoning_map_database_models::{GeometryWrite, StoredGeometry};
use zoning_map_geometry_models::{BoundingBox, Diagnostic, ParentRef};
use zoning_map_kml::{KmlError, StrategyKind};

use crate::retry::with_retry;

/// Errors that can occur while persisting geometry.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The document was rejected before anything was written.
    #[error("Invalid GeoJSON: {message}")]
    InvalidInput {
        /// Why the document was rejected.
        message: String,
    },

    /// The KML upload could not be converted.
    #[error(transparent)]
    Kml(#[from] KmlError),

    /// The store reported an error.
    #[error("Store error: {0}")]
    Store(#[from] DbError),

    /// A store call did not finish in time.
    #[error("Store {operation} timed out after {timeout_ms} ms")]
    Timeout {
        /// Store operation that timed out.
        operation: &'static str,
        /// Limit that was exceeded.
        timeout_ms: u64,
    },

    /// There is no record to rebuild.
    #[error("No geometry record for {parent}")]
    NotFound {
        /// Parent that was looked up.
        parent: ParentRef,
    },
}

impl PersistError {
    /// Returns true if repeating the operation may succeed.
    ///
    /// Retryable errors have already been retried per
    /// [`PersistConfig::retries`] by the time they reach the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Timeout { .. } => true,
            Self::InvalidInput { .. } | Self::Kml(_) | Self::NotFound { .. } => false,
        }
    }
}

/// Result of a successful [`persist`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    /// The record as stored.
    pub record: StoredGeometry,
    /// The derived marker, or `None` when the record was written with a
    /// null `geom`.
    pub marker: Option<Marker>,
    /// Why no marker could be derived.
    pub degraded_reason: Option<MarkerError>,
    /// Positions dropped and geometries left degenerate by normalization.
    pub diagnostics: Vec<Diagnostic>,
}

impl PersistOutcome {
    /// Returns true if the record was written without a marker.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.marker.is_none()
    }
}

/// Result of a successful [`import_kml`].
#[derive(Debug, Clone, PartialEq)]
pub struct KmlImport {
    /// Strategy that extracted the features.
    pub strategy: Option<StrategyKind>,
    /// Extent of the imported features.
    pub bounds: Option<BoundingBox>,
    /// What the parser dropped or skipped.
    pub parse_diagnostics: Vec<Diagnostic>,
    /// The persisted record.
    pub persisted: PersistOutcome,
}

/// Stores `input` for `parent` and re-derives its marker geometry.
///
/// The document is decoded, reduced to 2D, and type-checked first; any
/// failure there returns [`PersistError::InvalidInput`] without touching
/// the store. If no marker can be derived the record is still written,
/// with a null `geom`, and the outcome reports it as degraded.
///
/// # Errors
///
/// * If the input is not a valid `GeoJSON` document
/// * If the store fails or times out after all retries
pub async fn persist(
    store: &dyn GeometryStore,
    parent: &ParentRef,
    input: GeoJsonInput,
    config: &PersistConfig,
) -> Result<PersistOutcome, PersistError> {
    let raw = marker::decode(input)?;
    let normalized = zoning_map_geojson::normalize(&raw);
    let document = marker::validate(&normalized.value)?;

    let (marker, degraded_reason) = match marker::derive_marker(&normalized.value) {
        Ok(marker) => (Some(marker), None),
        Err(e) => {
            log::warn!("Writing {document:?} for {parent} without marker geometry: {e}");
            (None, Some(e))
        }
    };

    let write = GeometryWrite {
        data: normalized.value,
        geom_wkt: marker.as_ref().map(|m| m.wkt.clone()),
    };

    let record = with_retry(config, "upsert", || store.upsert(parent, &write)).await?;

    log::info!(
        "Persisted geometry record {} for {parent} ({})",
        record.id,
        marker
            .as_ref()
            .map_or_else(|| "no marker".to_string(), |m| format!("{} marker", m.kind))
    );

    Ok(PersistOutcome {
        record,
        marker,
        degraded_reason,
        diagnostics: normalized.diagnostics,
    })
}

/// Returns the stored record for `parent`, if any.
///
/// # Errors
///
/// * If the store fails or times out after all retries
pub async fn fetch(
    store: &dyn GeometryStore,
    parent: &ParentRef,
    config: &PersistConfig,
) -> Result<Option<StoredGeometry>, PersistError> {
    with_retry(config, "fetch", || store.fetch(parent)).await
}

/// Re-derives the marker geometry of an existing record from its stored
/// `data`.
///
/// # Errors
///
/// * If no record exists for `parent`
/// * If the stored document is no longer valid `GeoJSON`
/// * If the store fails or times out after all retries
pub async fn rebuild(
    store: &dyn GeometryStore,
    parent: &ParentRef,
    config: &PersistConfig,
) -> Result<PersistOutcome, PersistError> {
    let Some(existing) = fetch(store, parent, config).await? else {
        return Err(PersistError::NotFound { parent: *parent });
    };

    log::debug!("Rebuilding marker geometry for record {}", existing.id);
    persist(store, parent, GeoJsonInput::Value(existing.data), config).await
}

/// Parses KML text and persists the resulting `FeatureCollection`.
///
/// Uploads without any line or polygon geometry are rejected before
/// anything is written.
///
/// # Errors
///
/// * If the KML yields no line or polygon geometry
/// * If [`persist`] fails
pub async fn import_kml(
    store: &dyn GeometryStore,
    parent: &ParentRef,
    kml_text: &str,
    config: &PersistConfig,
) -> Result<KmlImport, PersistError> {
    let parsed = zoning_map_kml::parse(kml_text)?.ensure_geometry()?;
    let collection = serde_json::to_value(&parsed.collection).map_err(KmlError::from)?;

    let persisted = persist(store, parent, GeoJsonInput::Value(collection), config).await?;

    Ok(KmlImport {
        strategy: parsed.strategy,
        bounds: parsed.bounds,
        parse_diagnostics: parsed.diagnostics,
        persisted,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use zoning_map_database::MemoryGeometryStore;
    use zoning_map_geometry_models::GeometryKind;

    use super::*;

    const FAST: PersistConfig = PersistConfig {
        timeout_ms: 100,
        retries: 1,
        backoff_ms: 1,
    };

    fn line_feature() -> serde_json::Value {
        json!({
            "type": "Feature",
            "properties": {"name": "Drain"},
            "geometry": {
                "type": "LineString",
                "coordinates": [[101.81006, 17.47362, 12.0], [101.81304, 17.476, 13.0]]
            }
        })
    }

    #[tokio::test]
    async fn persists_data_and_marker_together() {
        let store = MemoryGeometryStore::new();
        let parent = ParentRef::RiskZone(7);

        let outcome = persist(&store, &parent, line_feature().into(), &FAST)
            .await
            .unwrap();

        assert!(!outcome.is_degraded());
        assert_eq!(outcome.marker.as_ref().unwrap().kind, GeometryKind::Point);
        assert_eq!(
            outcome.record.data["geometry"]["coordinates"],
            json!([[101.81006, 17.47362], [101.81304, 17.476]])
        );

        let stored = fetch(&store, &parent, &FAST).await.unwrap().unwrap();
        assert_eq!(stored, outcome.record);
        assert!(stored.geom_wkt.unwrap().starts_with("POINT"));
    }

    #[tokio::test]
    async fn second_write_replaces_first() {
        let store = MemoryGeometryStore::new();
        let parent = ParentRef::ZoningPlan(1);

        let first = persist(&store, &parent, line_feature().into(), &FAST)
            .await
            .unwrap();
        let empty = json!({"type": "FeatureCollection", "features": []});
        let second = persist(&store, &parent, empty.into(), &FAST).await.unwrap();

        assert_eq!(first.record.id, second.record.id);
        assert_eq!(store.records().await.len(), 1);
        assert!(second.record.geom_wkt.is_none());
    }

    #[tokio::test]
    async fn empty_collection_is_written_degraded() {
        let store = MemoryGeometryStore::new();
        let empty = json!({"type": "FeatureCollection", "features": []});

        let outcome = persist(&store, &ParentRef::RiskZone(2), empty.into(), &FAST)
            .await
            .unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(outcome.degraded_reason, Some(MarkerError::NoGeometry));
        assert!(outcome.record.is_degraded());
        assert_eq!(store.records().await.len(), 1);
    }

    #[tokio::test]
    async fn accepts_double_encoded_text() {
        let store = MemoryGeometryStore::new();
        let text = serde_json::to_string(&line_feature().to_string()).unwrap();

        let outcome = persist(&store, &ParentRef::BuildingControl(3), text.into(), &FAST)
            .await
            .unwrap();

        assert_eq!(outcome.record.data["properties"]["name"], "Drain");
    }

    #[tokio::test]
    async fn invalid_input_writes_nothing() {
        let store = MemoryGeometryStore::new();
        let inputs = [
            json!({"type": "Feature", "geometry": null}),
            json!({"type": "FeatureCollection"}),
            json!({"type": "Topology", "objects": {}}),
            json!(42),
        ];

        for input in inputs {
            let err = persist(&store, &ParentRef::RiskZone(1), input.into(), &FAST)
                .await
                .unwrap_err();
            assert!(matches!(err, PersistError::InvalidInput { .. }), "{err}");
            assert!(!err.is_retryable());
        }

        assert_eq!(store.calls(), 0);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_positions_are_reported() {
        let store = MemoryGeometryStore::new();
        let doc = json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": [[300.0, 13.0], [100.0, 13.0], [100.1, 13.1]]
            }
        });

        let outcome = persist(&store, &ParentRef::RiskZone(1), doc.into(), &FAST)
            .await
            .unwrap();

        assert_eq!(outcome.diagnostics.len(), 1);
        let marker = outcome.marker.unwrap();
        assert_eq!(marker.geometry, geo::Geometry::Point(geo::Point::new(100.0, 13.0)));
    }

    #[tokio::test]
    async fn retries_one_transient_failure() {
        let store = MemoryGeometryStore::new();
        store.fail_next(1);

        let outcome = persist(&store, &ParentRef::RiskZone(5), line_feature().into(), &FAST).await;

        assert!(outcome.is_ok());
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_retries() {
        let store = MemoryGeometryStore::new();
        store.fail_next(2);

        let err = persist(&store, &ParentRef::RiskZone(5), line_feature().into(), &FAST)
            .await
            .unwrap_err();

        assert!(matches!(err, PersistError::Store(DbError::Unavailable { .. })));
        assert!(err.is_retryable());
        assert_eq!(store.calls(), 2);
        assert!(store.records().await.is_empty());
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = MemoryGeometryStore::new().with_latency(Duration::from_millis(500));
        let config = PersistConfig {
            timeout_ms: 20,
            retries: 0,
            backoff_ms: 1,
        };

        let err = persist(&store, &ParentRef::RiskZone(5), line_feature().into(), &config)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PersistError::Timeout {
                operation: "upsert",
                timeout_ms: 20
            }
        ));
    }

    #[tokio::test]
    async fn rebuild_rederives_marker_from_stored_data() {
        let store = MemoryGeometryStore::new();
        let parent = ParentRef::ZoningPlan(8);
        let stored = persist(&store, &parent, line_feature().into(), &FAST)
            .await
            .unwrap();

        let rebuilt = rebuild(&store, &parent, &FAST).await.unwrap();

        assert_eq!(rebuilt.record.id, stored.record.id);
        assert_eq!(rebuilt.record.data, stored.record.data);
        assert_eq!(rebuilt.marker, stored.marker);
    }

    #[tokio::test]
    async fn rebuild_of_missing_record_fails() {
        let store = MemoryGeometryStore::new();
        let err = rebuild(&store, &ParentRef::ZoningPlan(404), &FAST)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistError::NotFound {
                parent: ParentRef::ZoningPlan(404)
            }
        ));
    }

    #[tokio::test]
    async fn imports_kml_polygon_as_centroid() {
        let store = MemoryGeometryStore::new();
        let kml = "<kml><Placemark><name>Lot</name><Polygon><outerBoundaryIs><LinearRing>\
                   <coordinates>0,0,5 2,0,5 2,2,5 0,2,5</coordinates>\
                   </LinearRing></outerBoundaryIs></Polygon></Placemark></kml>";

        let import = import_kml(&store, &ParentRef::RiskZone(11), kml, &FAST)
            .await
            .unwrap();

        assert_eq!(import.strategy, Some(StrategyKind::PlacemarkWalk));
        assert_eq!(import.bounds, Some(BoundingBox::new(0.0, 0.0, 2.0, 2.0)));
        let marker = import.persisted.marker.unwrap();
        let geo::Geometry::Point(point) = marker.geometry else {
            panic!("expected centroid point");
        };
        assert!((point.x() - 1.0).abs() < 1e-9);
        assert!((point.y() - 1.0).abs() < 1e-9);

        let ring = &import.persisted.record.data["features"][0]["geometry"]["coordinates"][0];
        assert_eq!(ring.as_array().unwrap().len(), 5);
        assert_eq!(ring[0], json!([0.0, 0.0]));
    }

    #[tokio::test]
    async fn point_only_kml_is_rejected_before_writing() {
        let store = MemoryGeometryStore::new();
        let kml = "<kml><Placemark><Point><coordinates>100.5,13.7</coordinates></Point></Placemark></kml>";

        let err = import_kml(&store, &ParentRef::RiskZone(12), kml, &FAST)
            .await
            .unwrap_err();

        assert!(matches!(err, PersistError::Kml(KmlError::NoGeometry { .. })));
        assert_eq!(store.calls(), 0);
    }
}
