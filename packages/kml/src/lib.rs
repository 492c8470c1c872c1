#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! KML to `GeoJSON` conversion.
//!
//! Real-world KML exports are frequently broken: missing closing tags,
//! namespace prefixes on every element, coordinates hidden inside
//! `CDATA` descriptions. [`parse`] tries an ordered list of extraction
//! strategies (see [`strategies::STRATEGIES`]) and keeps the first one
//! that yields geometry. Only lines and polygons are produced; point
//! placemarks are skipped.

pub mod coordinates;
pub mod markup;
pub mod placemark;
pub mod strategies;

pub use strategies::{KmlSource, StrategyKind};

use geojson::{Feature, FeatureCollection, JsonObject};
use thiserror::Error;
use zoning_map_geometry_models::{BoundingBox, Diagnostic};

/// Errors returned by [`parse`] and [`kml_to_geojson`].
#[derive(Debug, Error)]
pub enum KmlError {
    /// The input was blank.
    #[error("KML input is empty")]
    EmptyInput,

    /// No strategy found usable geometry.
    #[error("No valid line or polygon geometry found in file: {reason}")]
    NoGeometry {
        /// Human-readable cause.
        reason: String,
        /// Everything the strategies reported on the way.
        diagnostics: Vec<Diagnostic>,
    },

    /// Serializing the result failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A parsed KML document.
#[derive(Debug, Clone)]
pub struct ParsedKml {
    /// Extracted line and polygon features.
    pub collection: FeatureCollection,
    /// Strategy that produced [`Self::collection`], if any did.
    pub strategy: Option<StrategyKind>,
    /// Extent of every extracted position.
    pub bounds: Option<BoundingBox>,
    /// Dropped coordinates, skipped points, and similar notes.
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedKml {
    /// Returns true if no feature was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.features.is_empty()
    }

    /// Number of extracted features.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.collection.features.len()
    }

    /// Turns a well-formed but geometry-free document into an error.
    ///
    /// # Errors
    ///
    /// * If the document holds no line or polygon feature
    pub fn ensure_geometry(self) -> Result<Self, KmlError> {
        if self.is_empty() {
            return Err(KmlError::NoGeometry {
                reason: "the document contains no line or polygon placemarks".to_string(),
                diagnostics: self.diagnostics,
            });
        }
        Ok(self)
    }
}

/// Parses KML text into a `FeatureCollection` of lines and polygons.
///
/// Well-formed KML without usable geometry (for example a document of
/// point placemarks) yields an empty collection, not an error.
///
/// # Errors
///
/// * If `text` is blank
/// * If the markup cannot be read and no fallback strategy finds
///   coordinates
pub fn parse(text: &str) -> Result<ParsedKml, KmlError> {
    if text.trim().is_empty() {
        return Err(KmlError::EmptyInput);
    }

    let source = KmlSource::new(text);
    let outcome = strategies::run(&source);
    let mut diagnostics = outcome.extraction.diagnostics;
    let features = outcome.extraction.features;

    if features.is_empty()
        && let Err(e) = source.markup()
    {
        log::warn!("KML could not be parsed and no fallback found coordinates: {e}");
        diagnostics.push(Diagnostic::MarkupUnreadable {
            message: e.to_string(),
        });
        return Err(KmlError::NoGeometry {
            reason: e.to_string(),
            diagnostics,
        });
    }

    match outcome.strategy {
        Some(strategy) => log::info!(
            "Parsed {} KML features using {strategy} ({} diagnostics)",
            features.len(),
            diagnostics.len()
        ),
        None => log::info!(
            "KML contained no line or polygon geometry ({} diagnostics)",
            diagnostics.len()
        ),
    }

    let bounds = features_bounds(&features);

    Ok(ParsedKml {
        collection: FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        strategy: outcome.strategy,
        bounds,
        diagnostics,
    })
}

/// Parses KML text and returns a 2D `FeatureCollection` document.
///
/// # Errors
///
/// * If [`parse`] fails
/// * If the collection cannot be serialized
pub fn kml_to_geojson(text: &str) -> Result<serde_json::Value, KmlError> {
    let parsed = parse(text)?;
    let value = serde_json::to_value(&parsed.collection)?;
    Ok(zoning_map_geojson::to_2d(&value))
}

pub(crate) fn build_feature(
    name: &str,
    description: Option<&str>,
    value: geojson::Value,
) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), name.into());
    properties.insert(
        "description".to_string(),
        description.unwrap_or_default().into(),
    );

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn features_bounds(features: &[Feature]) -> Option<BoundingBox> {
    let positions = features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .flat_map(|g| match &g.value {
            geojson::Value::LineString(line) => line.clone(),
            geojson::Value::Polygon(rings) => rings.concat(),
            _ => Vec::new(),
        })
        .filter_map(|p| Some((*p.first()?, *p.get(1)?)))
        .collect::<Vec<_>>();

    BoundingBox::from_positions(positions)
}
