#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `GeoJSON` validation and normalization.
//!
//! Works on loosely typed [`serde_json::Value`] documents because the
//! input comes from uploads and stored JSON columns that may not match
//! the `GeoJSON` schema. [`normalize::to_2d`] strips altitude and drops
//! out-of-range positions; [`validate`] checks structure before an
//! upload is accepted and produces summaries for display.

pub mod bounds;
pub mod normalize;
pub mod validate;

pub use bounds::bounding_box;
pub use normalize::{Normalized, normalize, to_2d};
pub use validate::{
    GeoJsonSummary, feature_count, geometry_types, is_feature_collection, summarize,
    validate_feature_collection,
};

use thiserror::Error;

/// Errors from structural `GeoJSON` validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeoJsonError {
    /// The document is not a JSON object.
    #[error("GeoJSON must be a JSON object")]
    NotAnObject,

    /// The `type` member is missing or not the expected value.
    #[error("Expected GeoJSON type {expected}, found {found}")]
    WrongType {
        /// Type that was required.
        expected: &'static str,
        /// Type that was present (`"none"` when missing).
        found: String,
    },

    /// The `features` member is missing or not an array.
    #[error("FeatureCollection has no features array")]
    MissingFeatures,

    /// The `features` array is empty.
    #[error("FeatureCollection contains no features")]
    EmptyFeatures,
}
