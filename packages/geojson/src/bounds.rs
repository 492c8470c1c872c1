//! Bounding box computation over `GeoJSON` documents.

use serde_json::Value;
use zoning_map_geometry_models::BoundingBox;

/// Computes the bounding box of every position in a `FeatureCollection`,
/// `Feature`, or geometry.
///
/// Positions are read as-is; run [`crate::to_2d`] first if the document
/// may contain out-of-range values. Returns `None` when there are no
/// positions.
#[must_use]
pub fn bounding_box(value: &Value) -> Option<BoundingBox> {
    let mut positions = Vec::new();
    collect_document(value, &mut positions);
    BoundingBox::from_positions(positions)
}

fn collect_document(value: &Value, out: &mut Vec<(f64, f64)>) {
    if let Some(features) = value.get("features").and_then(Value::as_array) {
        for feature in features {
            collect_document(feature, out);
        }
    }
    if let Some(geometry) = value.get("geometry") {
        collect_document(geometry, out);
    }
    if let Some(coordinates) = value.get("coordinates") {
        collect_positions(coordinates, out);
    }
    if let Some(members) = value.get("geometries").and_then(Value::as_array) {
        for member in members {
            collect_document(member, out);
        }
    }
}

fn collect_positions(value: &Value, out: &mut Vec<(f64, f64)>) {
    let Some(items) = value.as_array() else {
        return;
    };

    if items.first().is_some_and(Value::is_number) {
        if let (Some(lng), Some(lat)) = (
            items.first().and_then(Value::as_f64),
            items.get(1).and_then(Value::as_f64),
        ) {
            out.push((lng, lat));
        }
        return;
    }

    for item in items {
        collect_positions(item, out);
    }
}
