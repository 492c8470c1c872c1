//! Structured `Placemark` walk.
//!
//! Geometry type comes from the KML tags here, never from ring closure.
//! Used both for plain documents and, with a prefix-tolerant
//! [`NameMatch`], for exports that write `kml:`-prefixed tags.

use zoning_map_geometry_models::{Diagnostic, GeometryKind};

use crate::coordinates::{
    CoordinateList, MIN_CLOSED_RING_POSITIONS, MIN_LINE_POSITIONS, MIN_RING_VERTICES, close_ring,
    parse_coordinate_text, to_positions,
};
use crate::markup::{Element, NameMatch};
use crate::strategies::Extraction;

/// Extracts one feature per usable placemark under `root`.
#[must_use]
pub fn walk(root: &Element, names: NameMatch) -> Extraction {
    let mut extraction = Extraction::default();

    for (idx, placemark) in root.find_all(names, "Placemark").into_iter().enumerate() {
        let name = child_text(placemark, names, "name")
            .unwrap_or_else(|| format!("Feature {}", idx + 1));
        let description = child_text(placemark, names, "description");

        if placemark.find(names, "Point").is_some() {
            log::debug!("Skipping point placemark '{name}'");
            extraction
                .diagnostics
                .push(Diagnostic::PointSkipped { feature: name });
            continue;
        }

        if let Some(value) = line_string(placemark, names, &name, &mut extraction.diagnostics)
            .or_else(|| polygon(placemark, names, &name, &mut extraction.diagnostics))
        {
            extraction
                .features
                .push(crate::build_feature(&name, description.as_deref(), value));
        }
    }

    extraction
}

fn child_text(element: &Element, names: NameMatch, local: &str) -> Option<String> {
    element
        .child(names, local)
        .map(|e| e.text().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn coordinates_under(
    element: &Element,
    names: NameMatch,
    feature: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<CoordinateList> {
    let list = parse_coordinate_text(&element.find(names, "coordinates")?.text());
    diagnostics.extend(
        list.dropped
            .iter()
            .cloned()
            .map(|reason| Diagnostic::CoordinateDropped {
                feature: feature.to_string(),
                reason,
            }),
    );
    Some(list)
}

fn line_string(
    placemark: &Element,
    names: NameMatch,
    feature: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<geojson::Value> {
    let line = placemark.find(names, "LineString")?;
    let list = coordinates_under(line, names, feature, diagnostics)?;

    if list.valid.len() < MIN_LINE_POSITIONS {
        diagnostics.push(Diagnostic::DegenerateGeometry {
            feature: feature.to_string(),
            geometry: GeometryKind::LineString,
            positions: list.valid.len(),
        });
        return None;
    }

    Some(geojson::Value::LineString(to_positions(&list.valid)))
}

fn polygon(
    placemark: &Element,
    names: NameMatch,
    feature: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<geojson::Value> {
    let polygon = placemark.find(names, "Polygon")?;
    let outer = polygon.find(names, "outerBoundaryIs")?;

    if polygon.find(names, "innerBoundaryIs").is_some() {
        diagnostics.push(Diagnostic::HolesIgnored {
            feature: feature.to_string(),
        });
    }

    let mut ring = coordinates_under(outer, names, feature, diagnostics)?.valid;
    if ring.len() >= MIN_RING_VERTICES {
        close_ring(&mut ring);
    }

    if ring.len() < MIN_CLOSED_RING_POSITIONS {
        diagnostics.push(Diagnostic::DegenerateGeometry {
            feature: feature.to_string(),
            geometry: GeometryKind::Polygon,
            positions: ring.len(),
        });
        return None;
    }

    Some(geojson::Value::Polygon(vec![to_positions(&ring)]))
}
