//! 2D reduction and coordinate cleanup.
//!
//! Positions are validated innermost-first. A valid position keeps its
//! longitude and latitude (as the original JSON numbers) and loses any
//! altitude; an invalid one is removed from its containing array. Removal
//! never aborts the geometry, so a geometry can end up below its minimum
//! size. Those cases are reported in [`Normalized::diagnostics`] rather
//! than repaired.

use serde_json::{Map, Value};
use zoning_map_geometry_models::{Coordinate, CoordinateCheck, Diagnostic, DropReason, GeometryKind};

/// The result of [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The 2D document.
    pub value: Value,
    /// Dropped positions and geometries left degenerate by filtering.
    pub diagnostics: Vec<Diagnostic>,
}

impl Normalized {
    /// Number of positions removed during normalization.
    #[must_use]
    pub fn dropped_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::CoordinateDropped { .. }))
            .count()
    }

    /// Returns true if any geometry fell below its minimum size.
    #[must_use]
    pub fn has_degenerate_geometry(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::DegenerateGeometry { .. }))
    }
}

/// Reduces a `GeoJSON` document to 2D.
///
/// Accepts a `FeatureCollection`, a `Feature`, or a bare geometry.
/// Anything else (including non-objects) is returned unchanged.
#[must_use]
pub fn to_2d(value: &Value) -> Value {
    normalize(value).value
}

/// Reduces a `GeoJSON` document to 2D and reports what was removed.
#[must_use]
pub fn normalize(value: &Value) -> Normalized {
    let mut normalizer = Normalizer::default();
    let value = normalizer.document(value);

    if !normalizer.diagnostics.is_empty() {
        log::debug!(
            "GeoJSON normalization produced {} diagnostics",
            normalizer.diagnostics.len()
        );
    }

    Normalized {
        value,
        diagnostics: normalizer.diagnostics,
    }
}

#[derive(Default)]
struct Normalizer {
    diagnostics: Vec<Diagnostic>,
}

impl Normalizer {
    fn document(&mut self, value: &Value) -> Value {
        let Some(object) = value.as_object() else {
            return value.clone();
        };

        match object.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => {
                let mut out = object.clone();
                if let Some(features) = object.get("features").and_then(Value::as_array) {
                    let features = features
                        .iter()
                        .enumerate()
                        .map(|(idx, feature)| self.feature(feature, idx))
                        .collect();
                    out.insert("features".to_string(), Value::Array(features));
                }
                Value::Object(out)
            }
            Some("Feature") => self.feature(value, 0),
            Some(_) if is_geometry(object) => self.geometry(object, "geometry"),
            _ => value.clone(),
        }
    }

    fn feature(&mut self, feature: &Value, idx: usize) -> Value {
        let Some(object) = feature.as_object() else {
            return feature.clone();
        };

        let label = feature_label(object, idx);
        let mut out = object.clone();
        if let Some(geometry) = object.get("geometry").and_then(Value::as_object) {
            out.insert("geometry".to_string(), self.geometry(geometry, &label));
        }
        Value::Object(out)
    }

    fn geometry(&mut self, geometry: &Map<String, Value>, label: &str) -> Value {
        let mut out = geometry.clone();

        if let Some(coordinates) = geometry.get("coordinates") {
            let cleaned = self.coordinates(coordinates, label).unwrap_or(Value::Null);
            let kind = geometry
                .get("type")
                .and_then(Value::as_str)
                .and_then(GeometryKind::from_type_name);
            if let Some(kind) = kind
                && let Some(positions) = degenerate_positions(kind, &cleaned)
            {
                self.diagnostics.push(Diagnostic::DegenerateGeometry {
                    feature: label.to_string(),
                    geometry: kind,
                    positions,
                });
            }
            out.insert("coordinates".to_string(), cleaned);
        }

        if let Some(members) = geometry.get("geometries").and_then(Value::as_array) {
            let members = members
                .iter()
                .map(|member| {
                    member
                        .as_object()
                        .map_or_else(|| member.clone(), |m| self.geometry(m, label))
                })
                .collect();
            out.insert("geometries".to_string(), Value::Array(members));
        }

        Value::Object(out)
    }

    /// Returns `None` when the value is an invalid position.
    fn coordinates(&mut self, value: &Value, label: &str) -> Option<Value> {
        let Value::Array(items) = value else {
            return Some(value.clone());
        };

        if items.first().is_some_and(Value::is_number) {
            return match check_position(items) {
                Ok(position) => Some(position),
                Err(reason) => {
                    self.diagnostics.push(Diagnostic::CoordinateDropped {
                        feature: label.to_string(),
                        reason,
                    });
                    None
                }
            };
        }

        let children = items
            .iter()
            .filter_map(|child| {
                if child.is_array() {
                    self.coordinates(child, label)
                } else {
                    self.diagnostics.push(Diagnostic::CoordinateDropped {
                        feature: label.to_string(),
                        reason: DropReason::NotNumeric,
                    });
                    None
                }
            })
            .collect();

        Some(Value::Array(children))
    }
}

fn is_geometry(object: &Map<String, Value>) -> bool {
    object.contains_key("coordinates") || object.contains_key("geometries")
}

fn feature_label(feature: &Map<String, Value>, idx: usize) -> String {
    feature
        .get("properties")
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map_or_else(|| format!("Feature {}", idx + 1), str::to_string)
}

/// Validates a leaf position and returns it as a 2D array.
fn check_position(items: &[Value]) -> Result<Value, DropReason> {
    if !(2..=3).contains(&items.len()) {
        return Err(DropReason::WrongArity { len: items.len() });
    }

    let mut components = Vec::with_capacity(items.len());
    for item in items {
        components.push(item.as_f64().ok_or(DropReason::NotNumeric)?);
    }

    match Coordinate::validate(components[0], components[1], None) {
        CoordinateCheck::Valid(_) => Ok(Value::Array(vec![items[0].clone(), items[1].clone()])),
        CoordinateCheck::Dropped(reason) => Err(reason),
    }
}

/// Returns the remaining position count when a geometry is below its
/// minimum size after filtering.
fn degenerate_positions(kind: GeometryKind, coordinates: &Value) -> Option<usize> {
    let as_array = |v: &Value| v.as_array().map_or(0, Vec::len);

    match kind {
        GeometryKind::Point => coordinates.is_null().then_some(0),
        GeometryKind::LineString => {
            let len = as_array(coordinates);
            (len < 2).then_some(len)
        }
        GeometryKind::Polygon => polygon_degenerate(coordinates),
        GeometryKind::MultiLineString => coordinates
            .as_array()?
            .iter()
            .map(as_array)
            .find(|len| *len < 2),
        GeometryKind::MultiPolygon => coordinates
            .as_array()?
            .iter()
            .find_map(polygon_degenerate),
        GeometryKind::MultiPoint | GeometryKind::GeometryCollection => None,
    }
}

fn polygon_degenerate(coordinates: &Value) -> Option<usize> {
    let Some(rings) = coordinates.as_array() else {
        return Some(0);
    };
    if rings.is_empty() {
        return Some(0);
    }
    rings.iter().find_map(|ring| {
        let positions = ring.as_array().map_or(&[][..], Vec::as_slice);
        let closed = positions.len() >= 4 && positions.first() == positions.last();
        (!closed).then_some(positions.len())
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn strips_altitude_from_feature_collection() {
        let fc = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"name": "Canal"},
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[101.81006, 17.47362, 0], [101.81304, 17.476, 12.5]]
                }
            }]
        });

        let out = to_2d(&fc);
        assert_eq!(
            out["features"][0]["geometry"]["coordinates"],
            json!([[101.81006, 17.47362], [101.81304, 17.476]])
        );
        assert_eq!(out["features"][0]["properties"]["name"], "Canal");
    }

    #[test]
    fn drops_out_of_range_position_and_reports_it() {
        let line = json!({
            "type": "LineString",
            "coordinates": [[300.0, 13.0], [100.0, 13.0], [100.1, 13.1]]
        });

        let normalized = normalize(&line);
        assert_eq!(
            normalized.value["coordinates"],
            json!([[100.0, 13.0], [100.1, 13.1]])
        );
        assert_eq!(normalized.dropped_count(), 1);
        assert!(!normalized.has_degenerate_geometry());
    }

    #[test]
    fn reports_line_left_degenerate() {
        let line = json!({
            "type": "LineString",
            "coordinates": [[300.0, 13.0], [100.0, 13.0]]
        });

        let normalized = normalize(&line);
        assert!(normalized.has_degenerate_geometry());
        assert!(normalized.diagnostics.contains(&Diagnostic::DegenerateGeometry {
            feature: "geometry".to_string(),
            geometry: GeometryKind::LineString,
            positions: 1,
        }));
    }

    #[test]
    fn reports_polygon_ring_losing_closure() {
        let polygon = json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[100.0, 13.0], [100.1, 13.0], [100.1, 13.1], [100.0, 95.0]]]
            }
        });

        let normalized = normalize(&polygon);
        assert!(normalized.diagnostics.contains(&Diagnostic::DegenerateGeometry {
            feature: "Feature 1".to_string(),
            geometry: GeometryKind::Polygon,
            positions: 3,
        }));
    }

    #[test]
    fn invalid_point_becomes_null() {
        let point = json!({"type": "Point", "coordinates": [181.0, 0.0]});
        let normalized = normalize(&point);
        assert!(normalized.value["coordinates"].is_null());
        assert!(normalized.has_degenerate_geometry());
    }

    #[test]
    fn rejects_wrong_arity_positions() {
        let line = json!({
            "type": "LineString",
            "coordinates": [[100.0], [100.0, 13.0, 1.0, 2.0], [100.0, 13.0], [100.2, 13.2]]
        });
        let normalized = normalize(&line);
        assert_eq!(
            normalized.value["coordinates"],
            json!([[100.0, 13.0], [100.2, 13.2]])
        );
        assert_eq!(normalized.dropped_count(), 2);
    }

    #[test]
    fn non_geometry_values_pass_through() {
        for value in [
            json!("text"),
            json!(42),
            json!(null),
            json!({"type": "Unknown", "foo": 1}),
        ] {
            assert_eq!(to_2d(&value), value);
        }
    }

    #[test]
    fn feature_without_geometry_is_unchanged() {
        let feature = json!({"type": "Feature", "properties": {"name": "x"}, "geometry": null});
        assert_eq!(to_2d(&feature), feature);
    }

    #[test]
    fn recurses_into_geometry_collections() {
        let gc = json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [100.0, 13.0, 5.0]},
                {"type": "LineString", "coordinates": [[100.0, 13.0, 1.0], [100.5, 13.5, 2.0]]}
            ]
        });
        let out = to_2d(&gc);
        assert_eq!(out["geometries"][0]["coordinates"], json!([100.0, 13.0]));
        assert_eq!(
            out["geometries"][1]["coordinates"],
            json!([[100.0, 13.0], [100.5, 13.5]])
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let fc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"name": "Zone A"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[100, 13, 0], [100.5, 13, 0], [100.5, 13.5, 0], [400, 13.5], [100, 13, 0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"name": "Road"},
                    "geometry": {"type": "LineString", "coordinates": [[100, 13], [100.2, 13.2]]}
                }
            ]
        });

        let once = to_2d(&fc);
        let twice = to_2d(&once);
        assert_eq!(once, twice);
    }
}
