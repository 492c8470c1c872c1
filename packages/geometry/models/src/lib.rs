#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate, diagnostic, and parent reference types.
//!
//! These are the plain data shapes shared by the KML parser, the
//! `GeoJSON` normalizer, and the persistence adapter. Nothing in this
//! crate performs I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Minimum valid WGS84 longitude.
pub const MIN_LONGITUDE: f64 = -180.0;
/// Maximum valid WGS84 longitude.
pub const MAX_LONGITUDE: f64 = 180.0;
/// Minimum valid WGS84 latitude.
pub const MIN_LATITUDE: f64 = -90.0;
/// Maximum valid WGS84 latitude.
pub const MAX_LATITUDE: f64 = 90.0;

/// Spatial reference identifier for WGS84 geographic coordinates.
pub const WGS84_SRID: i32 = 4326;

/// A validated WGS84 position.
///
/// Only constructed through [`Coordinate::validate`], so every instance
/// is finite and in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Altitude, when the source carried one.
    pub alt: Option<f64>,
}

impl Coordinate {
    /// Checks a raw position against the WGS84 ranges.
    #[must_use]
    pub fn validate(lng: f64, lat: f64, alt: Option<f64>) -> CoordinateCheck {
        if !lng.is_finite() || !lat.is_finite() {
            return CoordinateCheck::Dropped(DropReason::NonFinite);
        }
        if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&lng) {
            return CoordinateCheck::Dropped(DropReason::LongitudeOutOfRange { lng });
        }
        if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
            return CoordinateCheck::Dropped(DropReason::LatitudeOutOfRange { lat });
        }
        CoordinateCheck::Valid(Self {
            lng,
            lat,
            alt: alt.filter(|a| a.is_finite()),
        })
    }

    /// Returns the `GeoJSON` position, altitude included when present.
    #[must_use]
    pub fn to_position(&self) -> Vec<f64> {
        self.alt
            .map_or_else(|| vec![self.lng, self.lat], |alt| vec![self.lng, self.lat, alt])
    }

    /// Returns true if both horizontal components are exactly equal.
    ///
    /// Altitude is ignored; ring closure is a 2D property.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_position(&self, other: &Self) -> bool {
        self.lng == other.lng && self.lat == other.lat
    }
}

/// Outcome of validating one raw position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CoordinateCheck {
    /// The position is usable.
    Valid(Coordinate),
    /// The position was discarded.
    Dropped(DropReason),
}

impl CoordinateCheck {
    /// Returns the coordinate if it passed validation.
    #[must_use]
    pub const fn valid(&self) -> Option<&Coordinate> {
        match self {
            Self::Valid(c) => Some(c),
            Self::Dropped(_) => None,
        }
    }
}

/// Why a position was discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// A text token could not be read as numbers.
    Unparseable {
        /// The offending token.
        token: String,
    },
    /// A position had fewer than two or more than three components.
    WrongArity {
        /// Number of components found.
        len: usize,
    },
    /// A component was not a JSON number.
    NotNumeric,
    /// A component was NaN or infinite.
    NonFinite,
    /// Longitude outside `[-180, 180]`.
    LongitudeOutOfRange {
        /// The rejected longitude.
        lng: f64,
    },
    /// Latitude outside `[-90, 90]`.
    LatitudeOutOfRange {
        /// The rejected latitude.
        lat: f64,
    },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparseable { token } => write!(f, "unparseable coordinate token '{token}'"),
            Self::WrongArity { len } => {
                write!(f, "position has {len} components, expected 2 or 3")
            }
            Self::NotNumeric => f.write_str("position component is not a number"),
            Self::NonFinite => f.write_str("position component is not finite"),
            Self::LongitudeOutOfRange { lng } => write!(f, "longitude {lng} out of range"),
            Self::LatitudeOutOfRange { lat } => write!(f, "latitude {lat} out of range"),
        }
    }
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Creates a degenerate box covering a single position.
    #[must_use]
    pub const fn from_point(lng: f64, lat: f64) -> Self {
        Self::new(lng, lat, lng, lat)
    }

    /// Grows the box to cover `(lng, lat)`.
    pub fn extend(&mut self, lng: f64, lat: f64) {
        self.west = self.west.min(lng);
        self.east = self.east.max(lng);
        self.south = self.south.min(lat);
        self.north = self.north.max(lat);
    }

    /// Computes the pointwise min/max over a set of `(lng, lat)` pairs.
    ///
    /// Returns `None` for an empty iterator.
    #[must_use]
    pub fn from_positions(positions: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let (lng, lat) = iter.next()?;
        let mut bbox = Self::from_point(lng, lat);
        for (lng, lat) in iter {
            bbox.extend(lng, lat);
        }
        Some(bbox)
    }
}

/// `GeoJSON` geometry type names.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum GeometryKind {
    /// A single position.
    Point,
    /// An open or closed path of positions.
    LineString,
    /// One outer ring, optionally with holes.
    Polygon,
    /// A set of points.
    MultiPoint,
    /// A set of line strings.
    MultiLineString,
    /// A set of polygons.
    MultiPolygon,
    /// A heterogeneous set of geometries.
    GeometryCollection,
}

impl GeometryKind {
    /// Parses a `GeoJSON` `type` member, returning `None` for anything
    /// that is not a geometry (including `Feature`).
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::from_str(name).ok()
    }
}

/// A non-fatal issue found while parsing or normalizing geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A position was discarded.
    CoordinateDropped {
        /// Name of the feature the position belonged to.
        feature: String,
        /// Why it was discarded.
        reason: DropReason,
    },
    /// A placemark held a `Point` and was skipped.
    PointSkipped {
        /// Name of the skipped placemark.
        feature: String,
    },
    /// A polygon carried inner rings, which are not kept.
    HolesIgnored {
        /// Name of the feature.
        feature: String,
    },
    /// A geometry had too few valid positions after filtering.
    DegenerateGeometry {
        /// Name of the feature.
        feature: String,
        /// Geometry type that was attempted.
        geometry: GeometryKind,
        /// Valid positions remaining.
        positions: usize,
    },
    /// The markup could not be read as XML.
    MarkupUnreadable {
        /// Parser message.
        message: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoordinateDropped { feature, reason } => {
                write!(f, "{feature}: dropped coordinate ({reason})")
            }
            Self::PointSkipped { feature } => write!(f, "{feature}: point placemark skipped"),
            Self::HolesIgnored { feature } => write!(f, "{feature}: polygon holes ignored"),
            Self::DegenerateGeometry {
                feature,
                geometry,
                positions,
            } => write!(
                f,
                "{feature}: {geometry} discarded, only {positions} valid positions"
            ),
            Self::MarkupUnreadable { message } => write!(f, "markup unreadable: {message}"),
        }
    }
}

/// The parent entity types a geometry record can belong to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParentKind {
    /// A building-control licensing record.
    BuildingControl,
    /// A risk zone.
    RiskZone,
    /// A zoning plan.
    ZoningPlan,
}

impl ParentKind {
    /// All parent kinds, in foreign key column order.
    pub const ALL: &[Self] = &[Self::BuildingControl, Self::RiskZone, Self::ZoningPlan];

    /// Foreign key column holding this parent's id.
    #[must_use]
    pub const fn foreign_key_column(self) -> &'static str {
        match self {
            Self::BuildingControl => "building_control_id",
            Self::RiskZone => "risk_zone_id",
            Self::ZoningPlan => "zoning_plan_id",
        }
    }
}

/// Owner of a geometry record.
///
/// The store keeps three nullable foreign keys; this enum is the only
/// way the application sets them, so at most one is ever populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "parent", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    /// Owned by a building-control record.
    BuildingControl(i64),
    /// Owned by a risk zone.
    RiskZone(i64),
    /// Owned by a zoning plan.
    ZoningPlan(i64),
    /// Not attached to any parent.
    Unattached,
}

impl ParentRef {
    /// Builds a reference from a kind and id.
    #[must_use]
    pub const fn new(kind: ParentKind, id: i64) -> Self {
        match kind {
            ParentKind::BuildingControl => Self::BuildingControl(id),
            ParentKind::RiskZone => Self::RiskZone(id),
            ParentKind::ZoningPlan => Self::ZoningPlan(id),
        }
    }

    /// Returns the parent kind, or `None` when unattached.
    #[must_use]
    pub const fn kind(&self) -> Option<ParentKind> {
        match self {
            Self::BuildingControl(_) => Some(ParentKind::BuildingControl),
            Self::RiskZone(_) => Some(ParentKind::RiskZone),
            Self::ZoningPlan(_) => Some(ParentKind::ZoningPlan),
            Self::Unattached => None,
        }
    }

    /// Returns the parent id, or `None` when unattached.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        match self {
            Self::BuildingControl(id) | Self::RiskZone(id) | Self::ZoningPlan(id) => Some(*id),
            Self::Unattached => None,
        }
    }

    /// Returns the values for the three foreign key columns, in
    /// [`ParentKind::ALL`] order.
    #[must_use]
    pub const fn foreign_keys(&self) -> [Option<i64>; 3] {
        match self {
            Self::BuildingControl(id) => [Some(*id), None, None],
            Self::RiskZone(id) => [None, Some(*id), None],
            Self::ZoningPlan(id) => [None, None, Some(*id)],
            Self::Unattached => [None, None, None],
        }
    }

    /// Rebuilds a reference from the three nullable foreign key columns.
    ///
    /// # Errors
    ///
    /// Returns [`ConflictingParentsError`] if more than one column is set.
    pub fn from_foreign_keys(
        building_control_id: Option<i64>,
        risk_zone_id: Option<i64>,
        zoning_plan_id: Option<i64>,
    ) -> Result<Self, ConflictingParentsError> {
        match (building_control_id, risk_zone_id, zoning_plan_id) {
            (None, None, None) => Ok(Self::Unattached),
            (Some(id), None, None) => Ok(Self::BuildingControl(id)),
            (None, Some(id), None) => Ok(Self::RiskZone(id)),
            (None, None, Some(id)) => Ok(Self::ZoningPlan(id)),
            _ => Err(ConflictingParentsError {
                building_control_id,
                risk_zone_id,
                zoning_plan_id,
            }),
        }
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.id()) {
            (Some(kind), Some(id)) => write!(f, "{kind}:{id}"),
            _ => f.write_str("unattached"),
        }
    }
}

impl FromStr for ParentRef {
    type Err = InvalidParentRefError;

    /// Parses `"<kind>:<id>"` (e.g. `"risk_zone:12"`) or `"unattached"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "unattached" {
            return Ok(Self::Unattached);
        }
        let invalid = || InvalidParentRefError {
            value: s.to_string(),
        };
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let kind = ParentKind::from_str(kind).map_err(|_| invalid())?;
        let id = id.trim().parse::<i64>().map_err(|_| invalid())?;
        Ok(Self::new(kind, id))
    }
}

/// Error returned when a stored row has more than one parent key set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictingParentsError {
    /// Stored building-control key.
    pub building_control_id: Option<i64>,
    /// Stored risk-zone key.
    pub risk_zone_id: Option<i64>,
    /// Stored zoning-plan key.
    pub zoning_plan_id: Option<i64>,
}

impl fmt::Display for ConflictingParentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "geometry record has multiple parents: building_control={:?}, risk_zone={:?}, zoning_plan={:?}",
            self.building_control_id, self.risk_zone_id, self.zoning_plan_id
        )
    }
}

impl std::error::Error for ConflictingParentsError {}

/// Error returned when a parent reference string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidParentRefError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for InvalidParentRefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid parent reference '{}': expected <kind>:<id> or unattached",
            self.value
        )
    }
}

impl std::error::Error for InvalidParentRefError {}
