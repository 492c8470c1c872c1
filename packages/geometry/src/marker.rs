//! Decoding, type validation, and marker derivation.
//!
//! The marker is the single geometry written to the `geom` column. It is
//! derived from the document in two steps: the document's geometry is
//! gathered (a `FeatureCollection` dissolves into one geometry), then
//! reduced (a line becomes its start point, a polygon its centroid).

use geo::{
    BooleanOps, Centroid, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon,
};
use serde_json::Value;
use thiserror::Error;
use wkt::ToWkt;
use zoning_map_geometry_models::GeometryKind;

use crate::PersistError;

/// `GeoJSON` handed to the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoJsonInput {
    /// An already-parsed document.
    Value(Value),
    /// JSON text, possibly a JSON string that itself holds the document.
    Text(String),
}

impl From<Value> for GeoJsonInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<String> for GeoJsonInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// What a validated document is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A `FeatureCollection`.
    FeatureCollection,
    /// A single `Feature`.
    Feature,
    /// A bare geometry.
    Geometry(GeometryKind),
}

/// Why no marker could be derived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    /// The document holds no geometry at all.
    #[error("Document contains no geometry")]
    NoGeometry,

    /// A geometry could not be read.
    #[error("Geometry could not be read: {message}")]
    Unreadable {
        /// Reader error text.
        message: String,
    },

    /// The geometry has no start point or centroid.
    #[error("{kind} geometry has no start point or centroid")]
    Degenerate {
        /// Kind of the empty geometry.
        kind: GeometryKind,
    },
}

/// A derived marker geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Kind of the marker.
    pub kind: GeometryKind,
    /// The marker itself.
    pub geometry: Geometry<f64>,
    /// The marker as WKT, to be read with SRID 4326.
    pub wkt: String,
}

impl Marker {
    fn new(geometry: Geometry<f64>) -> Self {
        Self {
            kind: kind_of(&geometry),
            wkt: geometry.wkt_string(),
            geometry,
        }
    }
}

/// Decodes adapter input into a JSON document.
///
/// Text is parsed once, and once more if it held a JSON string. A string
/// [`GeoJsonInput::Value`] is treated the same way.
///
/// # Errors
///
/// Returns [`PersistError::InvalidInput`] if the text is not JSON.
pub fn decode(input: GeoJsonInput) -> Result<Value, PersistError> {
    let value = match input {
        GeoJsonInput::Value(value) => value,
        GeoJsonInput::Text(text) => parse_json(&text)?,
    };

    match value {
        Value::String(inner) => parse_json(&inner),
        other => Ok(other),
    }
}

fn parse_json(text: &str) -> Result<Value, PersistError> {
    serde_json::from_str(text).map_err(|e| PersistError::InvalidInput {
        message: format!("GeoJSON is not valid JSON: {e}"),
    })
}

/// Checks the document's `type` and the members that type requires.
///
/// # Errors
///
/// Returns [`PersistError::InvalidInput`] if the document is not an
/// object, a `FeatureCollection` has no `features` array, a `Feature`
/// has a null geometry, or the type is not a `GeoJSON` type.
pub fn validate(value: &Value) -> Result<DocumentKind, PersistError> {
    let invalid = |message: String| PersistError::InvalidInput { message };

    let object = value
        .as_object()
        .ok_or_else(|| invalid("GeoJSON must be a JSON object".to_string()))?;
    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("GeoJSON has no type".to_string()))?;

    match type_name {
        "FeatureCollection" => {
            if object.get("features").is_some_and(Value::is_array) {
                Ok(DocumentKind::FeatureCollection)
            } else {
                Err(invalid("FeatureCollection has no features array".to_string()))
            }
        }
        "Feature" => {
            if object.get("geometry").is_some_and(Value::is_object) {
                Ok(DocumentKind::Feature)
            } else {
                Err(invalid("Feature has no geometry".to_string()))
            }
        }
        other => GeometryKind::from_type_name(other)
            .map(DocumentKind::Geometry)
            .ok_or_else(|| invalid(format!("Unknown GeoJSON type '{other}'"))),
    }
}

/// Derives the marker for a validated document.
///
/// # Errors
///
/// Returns [`MarkerError`] if the document yields no usable geometry.
pub fn derive_marker(value: &Value) -> Result<Marker, MarkerError> {
    let source = source_geometry(value)?;
    let kind = kind_of(&source);
    let reduced = reduce(source).ok_or(MarkerError::Degenerate { kind })?;
    Ok(Marker::new(reduced))
}

/// The geometry a document describes, before reduction.
///
/// # Errors
///
/// Returns [`MarkerError`] if nothing can be read.
pub fn source_geometry(value: &Value) -> Result<Geometry<f64>, MarkerError> {
    match value.get("type").and_then(Value::as_str) {
        Some("Feature") => match value.get("geometry") {
            Some(geometry) if !geometry.is_null() => to_geo(geometry),
            _ => Err(MarkerError::NoGeometry),
        },
        Some("FeatureCollection") => {
            let mut members = Members::default();
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for (idx, feature) in features.iter().enumerate() {
                let Some(geometry) = feature.get("geometry").filter(|g| !g.is_null()) else {
                    continue;
                };
                match to_geo(geometry) {
                    Ok(geometry) => members.add(geometry),
                    Err(e) => log::warn!("Skipping feature {} in union: {e}", idx + 1),
                }
            }

            members.dissolve().ok_or(MarkerError::NoGeometry)
        }
        _ => to_geo(value),
    }
}

/// Reduces a geometry to its marker.
///
/// A `LineString` becomes its start point and a `Polygon` its centroid.
/// Every other geometry is returned unchanged. `None` means the line or
/// polygon was empty.
#[must_use]
pub fn reduce(geometry: Geometry<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::LineString(line) => line.0.first().map(|c| Geometry::Point(Point::from(*c))),
        Geometry::Polygon(polygon) => polygon.centroid().map(Geometry::Point),
        other => Some(other),
    }
}

/// The `GeoJSON` kind of a `geo` geometry.
#[must_use]
pub const fn kind_of(geometry: &Geometry<f64>) -> GeometryKind {
    match geometry {
        Geometry::Point(_) => GeometryKind::Point,
        Geometry::Line(_) | Geometry::LineString(_) => GeometryKind::LineString,
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => GeometryKind::Polygon,
        Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
        Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
        Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        Geometry::GeometryCollection(_) => GeometryKind::GeometryCollection,
    }
}

fn to_geo(value: &Value) -> Result<Geometry<f64>, MarkerError> {
    let unreadable = |message: String| MarkerError::Unreadable { message };
    let geometry: geojson::Geometry =
        serde_json::from_value(value.clone()).map_err(|e| unreadable(e.to_string()))?;
    geometry.try_into().map_err(|e: geojson::Error| unreadable(e.to_string()))
}

/// Feature geometries grouped for dissolving.
#[derive(Default)]
struct Members {
    polygons: Vec<Polygon<f64>>,
    lines: Vec<LineString<f64>>,
    points: Vec<Point<f64>>,
}

impl Members {
    fn add(&mut self, geometry: Geometry<f64>) {
        match geometry {
            Geometry::Point(p) => self.points.push(p),
            Geometry::MultiPoint(mp) => self.points.extend(mp.0),
            Geometry::Line(l) => self.lines.push(l.into()),
            Geometry::LineString(ls) => self.lines.push(ls),
            Geometry::MultiLineString(mls) => self.lines.extend(mls.0),
            Geometry::Polygon(p) => self.polygons.push(p),
            Geometry::MultiPolygon(mp) => self.polygons.extend(mp.0),
            Geometry::Rect(r) => self.polygons.push(r.to_polygon()),
            Geometry::Triangle(t) => self.polygons.push(t.to_polygon()),
            Geometry::GeometryCollection(gc) => {
                for member in gc.0 {
                    self.add(member);
                }
            }
        }
    }

    /// Polygons are unioned, lines and points gathered into multi
    /// geometries, and mixed kinds wrapped in a collection. A group with
    /// one member stays a single geometry.
    fn dissolve(mut self) -> Option<Geometry<f64>> {
        let mut parts: Vec<Geometry<f64>> = Vec::new();

        if self.polygons.len() == 1 {
            parts.extend(self.polygons.pop().map(Geometry::Polygon));
        } else if !self.polygons.is_empty() {
            parts.push(union_all(self.polygons));
        }

        if self.lines.len() == 1 {
            parts.extend(self.lines.pop().map(Geometry::LineString));
        } else if !self.lines.is_empty() {
            parts.push(Geometry::MultiLineString(MultiLineString(self.lines)));
        }

        if self.points.len() == 1 {
            parts.extend(self.points.pop().map(Geometry::Point));
        } else if !self.points.is_empty() {
            parts.push(Geometry::MultiPoint(MultiPoint(self.points)));
        }

        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(Geometry::GeometryCollection(GeometryCollection(parts))),
        }
    }
}

fn union_all(polygons: Vec<Polygon<f64>>) -> Geometry<f64> {
    let merged = polygons
        .into_iter()
        .fold(MultiPolygon(Vec::new()), |acc, polygon| acc.union(&polygon));

    let mut merged = merged.0;
    if merged.len() == 1 {
        merged
            .pop()
            .map_or_else(|| Geometry::MultiPolygon(MultiPolygon(Vec::new())), Geometry::Polygon)
    } else {
        Geometry::MultiPolygon(MultiPolygon(merged))
    }
}

#[cfg(test)]
mod tests {
    use geo::{Area, coord};
    use serde_json::json;

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [[
                [x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]
            ]]
        })
    }

    fn feature(geometry: Value) -> Value {
        json!({"type": "Feature", "properties": {}, "geometry": geometry})
    }

    fn collection(geometries: Vec<Value>) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": geometries.into_iter().map(feature).collect::<Vec<_>>()
        })
    }

    fn point_of(marker: &Marker) -> Point<f64> {
        match marker.geometry {
            Geometry::Point(p) => p,
            ref other => panic!("expected point, got {other:?}"),
        }
    }

    #[test]
    fn decodes_double_encoded_text() {
        let doc = json!({"type": "Point", "coordinates": [1.0, 2.0]});
        let once = serde_json::to_string(&doc).unwrap();
        let twice = serde_json::to_string(&once).unwrap();

        assert_eq!(decode(GeoJsonInput::Text(twice)).unwrap(), doc);
        assert_eq!(decode(GeoJsonInput::Text(once.clone())).unwrap(), doc);
        assert_eq!(decode(GeoJsonInput::Value(Value::String(once))).unwrap(), doc);
    }

    #[test]
    fn rejects_malformed_text() {
        assert!(matches!(
            decode(GeoJsonInput::Text("{not json".to_string())),
            Err(PersistError::InvalidInput { .. })
        ));
    }

    #[test]
    fn validates_document_types() {
        assert_eq!(
            validate(&collection(vec![])).unwrap(),
            DocumentKind::FeatureCollection
        );
        assert_eq!(
            validate(&square(0.0, 0.0, 1.0)).unwrap(),
            DocumentKind::Geometry(GeometryKind::Polygon)
        );
        assert!(validate(&json!({"type": "FeatureCollection"})).is_err());
        assert!(validate(&json!({"type": "Feature", "geometry": null})).is_err());
        assert!(validate(&json!({"type": "Topology"})).is_err());
        assert!(validate(&json!([1, 2])).is_err());
    }

    #[test]
    fn line_reduces_to_start_point() {
        let line = feature(json!({
            "type": "LineString",
            "coordinates": [[101.81006, 17.47362], [101.81304, 17.476]]
        }));
        let marker = derive_marker(&line).unwrap();
        assert_eq!(marker.kind, GeometryKind::Point);
        assert_eq!(point_of(&marker), Point::new(101.81006, 17.47362));
        assert!(marker.wkt.starts_with("POINT"));
    }

    #[test]
    fn polygon_reduces_to_centroid() {
        let marker = derive_marker(&feature(square(0.0, 0.0, 2.0))).unwrap();
        let point = point_of(&marker);
        assert!((point.x() - 1.0).abs() < 1e-9);
        assert!((point.y() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_polygons_dissolve_before_centroid() {
        let doc = collection(vec![square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0)]);

        let source = source_geometry(&doc).unwrap();
        let Geometry::Polygon(merged) = &source else {
            panic!("expected one polygon, got {source:?}");
        };
        assert!((merged.unsigned_area() - 6.0).abs() < 1e-6);

        let point = point_of(&derive_marker(&doc).unwrap());
        assert!((point.x() - 1.5).abs() < 1e-6);
        assert!((point.y() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_polygons_stay_multi() {
        let doc = collection(vec![square(0.0, 0.0, 1.0), square(5.0, 5.0, 1.0)]);
        let marker = derive_marker(&doc).unwrap();
        assert_eq!(marker.kind, GeometryKind::MultiPolygon);
        assert!(marker.wkt.starts_with("MULTIPOLYGON"));
    }

    #[test]
    fn lines_gather_into_multi_line_string() {
        let doc = collection(vec![
            json!({"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}),
            json!({"type": "LineString", "coordinates": [[2.0, 2.0], [3.0, 3.0]]}),
        ]);
        assert_eq!(
            derive_marker(&doc).unwrap().kind,
            GeometryKind::MultiLineString
        );
    }

    #[test]
    fn single_member_collection_unwraps() {
        let doc = collection(vec![json!({
            "type": "LineString",
            "coordinates": [[3.0, 4.0], [5.0, 6.0]]
        })]);
        let marker = derive_marker(&doc).unwrap();
        assert_eq!(point_of(&marker), Point::from(coord! { x: 3.0, y: 4.0 }));
    }

    #[test]
    fn mixed_kinds_become_collection() {
        let doc = collection(vec![
            square(0.0, 0.0, 1.0),
            json!({"type": "LineString", "coordinates": [[2.0, 2.0], [3.0, 3.0]]}),
        ]);
        assert_eq!(
            derive_marker(&doc).unwrap().kind,
            GeometryKind::GeometryCollection
        );
    }

    #[test]
    fn empty_collection_has_no_marker() {
        assert_eq!(
            derive_marker(&collection(vec![])),
            Err(MarkerError::NoGeometry)
        );
    }

    #[test]
    fn empty_line_is_degenerate() {
        let doc = feature(json!({"type": "LineString", "coordinates": []}));
        assert_eq!(
            derive_marker(&doc),
            Err(MarkerError::Degenerate {
                kind: GeometryKind::LineString
            })
        );
    }

    #[test]
    fn other_geometries_are_unchanged() {
        let point = Geometry::Point(Point::new(1.0, 2.0));
        assert_eq!(reduce(point.clone()), Some(point));
    }
}
