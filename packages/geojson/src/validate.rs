//! Structural checks and summaries for uploaded `GeoJSON`.
//!
//! [`validate_feature_collection`] gates acceptance of externally
//! supplied documents. The summary helpers only feed display text and
//! never drive control flow.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use zoning_map_geometry_models::{BoundingBox, GeometryKind};

use crate::GeoJsonError;

/// Checks that `value` is a `FeatureCollection` with at least one feature
/// and returns its features.
///
/// # Errors
///
/// Returns [`GeoJsonError`] describing the first structural problem.
pub fn validate_feature_collection(value: &Value) -> Result<&[Value], GeoJsonError> {
    let object = value.as_object().ok_or(GeoJsonError::NotAnObject)?;

    let found = object.get("type").and_then(Value::as_str);
    if found != Some("FeatureCollection") {
        return Err(GeoJsonError::WrongType {
            expected: "FeatureCollection",
            found: found.unwrap_or("none").to_string(),
        });
    }

    let features = object
        .get("features")
        .and_then(Value::as_array)
        .ok_or(GeoJsonError::MissingFeatures)?;

    if features.is_empty() {
        return Err(GeoJsonError::EmptyFeatures);
    }

    Ok(features.as_slice())
}

/// Returns true for a `FeatureCollection` with a non-empty `features`
/// array.
#[must_use]
pub fn is_feature_collection(value: &Value) -> bool {
    validate_feature_collection(value).is_ok()
}

/// Returns the distinct geometry types present in a document.
#[must_use]
pub fn geometry_types(value: &Value) -> BTreeSet<GeometryKind> {
    let mut kinds = BTreeSet::new();
    collect_kinds(value, &mut kinds);
    kinds
}

fn collect_kinds(value: &Value, kinds: &mut BTreeSet<GeometryKind>) {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            for feature in value
                .get("features")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                collect_kinds(feature, kinds);
            }
        }
        Some("Feature") => {
            if let Some(geometry) = value.get("geometry") {
                collect_kinds(geometry, kinds);
            }
        }
        Some(name) => {
            if let Some(kind) = GeometryKind::from_type_name(name) {
                kinds.insert(kind);
            }
        }
        None => {}
    }
}

/// Returns the number of features in a document.
///
/// A `FeatureCollection` counts its `features` entries, a `Feature`
/// counts as one, and anything else as zero.
#[must_use]
pub fn feature_count(value: &Value) -> usize {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => value
            .get("features")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        Some("Feature") => 1,
        _ => 0,
    }
}

/// Display summary of a `GeoJSON` document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoJsonSummary {
    /// Number of features.
    pub feature_count: usize,
    /// Distinct geometry types, sorted.
    pub geometry_types: Vec<GeometryKind>,
    /// Extent of all positions.
    pub bounds: Option<BoundingBox>,
}

/// Summarizes a document for display.
#[must_use]
pub fn summarize(value: &Value) -> GeoJsonSummary {
    GeoJsonSummary {
        feature_count: feature_count(value),
        geometry_types: geometry_types(value).into_iter().collect(),
        bounds: crate::bounding_box(value),
    }
}
