//! Coordinate list parsing and line/polygon classification.

use std::sync::LazyLock;

use regex::Regex;
use zoning_map_geometry_models::{Coordinate, CoordinateCheck, DropReason, GeometryKind};

/// Minimum positions for a `LineString`.
pub const MIN_LINE_POSITIONS: usize = 2;

/// Minimum distinct positions for a polygon ring before closing.
pub const MIN_RING_VERTICES: usize = 3;

/// Minimum positions for a closed polygon ring.
pub const MIN_CLOSED_RING_POSITIONS: usize = 4;

/// `number,number` pairs, ignoring any third component.
static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?[0-9]+(?:\.[0-9]+)?),(-?[0-9]+(?:\.[0-9]+)?)").expect("valid regex")
});

/// `<Point>…</Point>` blocks under any namespace prefix.
static POINT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<(?:[A-Za-z_][A-Za-z0-9_.-]*:)?Point[\s>].*?</(?:[A-Za-z_][A-Za-z0-9_.-]*:)?Point\s*>",
    )
    .expect("valid regex")
});

/// Valid positions read from a coordinate source, plus what was dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateList {
    /// Positions that passed validation, in source order.
    pub valid: Vec<Coordinate>,
    /// Reasons for every discarded position.
    pub dropped: Vec<DropReason>,
}

impl CoordinateList {
    fn push(&mut self, check: CoordinateCheck) {
        match check {
            CoordinateCheck::Valid(c) => self.valid.push(c),
            CoordinateCheck::Dropped(reason) => self.dropped.push(reason),
        }
    }
}

/// Parses a KML `<coordinates>` body.
///
/// The body is whitespace-separated `lng,lat[,alt]` tuples. A tuple that
/// does not parse, or that falls outside WGS84 ranges, is dropped on its
/// own without affecting its neighbours. Every comma-separated field must
/// hold a number, so `100,,5` and a trailing `100,13,` are dropped.
#[must_use]
pub fn parse_coordinate_text(text: &str) -> CoordinateList {
    let mut list = CoordinateList::default();
    for token in text.split_whitespace() {
        list.push(check_token(token));
    }
    list
}

fn check_token(token: &str) -> CoordinateCheck {
    let unparseable = || {
        CoordinateCheck::Dropped(DropReason::Unparseable {
            token: token.to_string(),
        })
    };

    let parts: Vec<&str> = token.split(',').collect();
    if !(2..=3).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
        return unparseable();
    }

    let mut values = [0.0_f64; 3];
    for (slot, part) in values.iter_mut().zip(&parts) {
        match part.parse::<f64>() {
            Ok(v) => *slot = v,
            Err(_) => return unparseable(),
        }
    }

    let alt = (parts.len() == 3).then_some(values[2]);
    Coordinate::validate(values[0], values[1], alt)
}

/// Scans arbitrary text for `number,number` pairs, ignoring all
/// surrounding structure.
///
/// Any third component is left behind, so the result is 2D.
#[must_use]
pub fn extract_pairs(text: &str) -> CoordinateList {
    let mut list = CoordinateList::default();
    for caps in PAIR_RE.captures_iter(text) {
        let lng = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok());
        let lat = caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok());
        match (lng, lat) {
            (Some(lng), Some(lat)) => list.push(Coordinate::validate(lng, lat, None)),
            _ => list.push(CoordinateCheck::Dropped(DropReason::Unparseable {
                token: caps
                    .get(0)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
            })),
        }
    }
    list
}

/// Removes `<Point>…</Point>` blocks (any prefix) from raw text so text
/// scans never turn point placemarks into lines.
#[must_use]
pub fn strip_point_blocks(text: &str) -> String {
    POINT_BLOCK_RE.replace_all(text, "").into_owned()
}

/// Converts positions into `GeoJSON` positions.
#[must_use]
pub fn to_positions(coordinates: &[Coordinate]) -> Vec<Vec<f64>> {
    coordinates.iter().map(Coordinate::to_position).collect()
}

/// Returns true if the ring's first and last positions coincide.
#[must_use]
pub fn is_closed(coordinates: &[Coordinate]) -> bool {
    match (coordinates.first(), coordinates.last()) {
        (Some(first), Some(last)) => first.same_position(last),
        _ => false,
    }
}

/// Appends a copy of the first position if the ring is open.
pub fn close_ring(ring: &mut Vec<Coordinate>) {
    if let Some(first) = ring.first().copied()
        && !is_closed(ring)
    {
        ring.push(first);
    }
}

/// How a bare coordinate list was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Fewer than [`MIN_LINE_POSITIONS`] positions: a point in disguise, or
    /// nothing at all.
    Skipped,
    /// A usable `LineString` or `Polygon`.
    Geometry(geojson::Value),
    /// A closed list too short to form a polygon ring.
    Degenerate {
        /// Geometry the list was classified as.
        geometry: GeometryKind,
        /// Positions the list held.
        positions: usize,
    },
}

/// Classifies a bare coordinate list by closure.
///
/// A closed list of at least [`MIN_RING_VERTICES`] positions is a
/// `Polygon`, and must still reach [`MIN_CLOSED_RING_POSITIONS`] to be
/// usable. Any other list of at least [`MIN_LINE_POSITIONS`] positions is
/// a `LineString`.
#[must_use]
pub fn classify(coordinates: &[Coordinate]) -> Classification {
    let len = coordinates.len();
    if len < MIN_LINE_POSITIONS {
        return Classification::Skipped;
    }

    let positions = to_positions(coordinates);
    if len >= MIN_RING_VERTICES && is_closed(coordinates) {
        if len < MIN_CLOSED_RING_POSITIONS {
            return Classification::Degenerate {
                geometry: GeometryKind::Polygon,
                positions: len,
            };
        }
        Classification::Geometry(geojson::Value::Polygon(vec![positions]))
    } else {
        Classification::Geometry(geojson::Value::LineString(positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_triples_and_pairs() {
        let list = parse_coordinate_text(" 101.81006,17.47362,0\n\t101.81304,17.476 ");
        assert_eq!(list.valid.len(), 2);
        assert_eq!(list.valid[0].alt, Some(0.0));
        assert_eq!(list.valid[1].alt, None);
        assert!(list.dropped.is_empty());
    }

    #[test]
    fn drops_bad_tokens_individually() {
        let list = parse_coordinate_text("100,13 abc,13 300,13 100.5 100.2,13.2");
        assert_eq!(list.valid.len(), 2);
        assert_eq!(list.dropped.len(), 3);
        assert_eq!(
            list.dropped[1],
            DropReason::LongitudeOutOfRange { lng: 300.0 }
        );
    }

    #[test]
    fn drops_tokens_with_empty_fields() {
        let list = parse_coordinate_text("100,,5 ,100,13 100,13, 100.1,13.1 100.2,13.2,");
        assert_eq!(list.valid.len(), 1);
        assert_eq!(list.valid[0].lng, 100.1);
        assert_eq!(list.valid[0].lat, 13.1);
        assert_eq!(
            list.dropped,
            ["100,,5", ",100,13", "100,13,", "100.2,13.2,"]
                .iter()
                .map(|token| DropReason::Unparseable {
                    token: (*token).to_string()
                })
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn extracts_pairs_from_noise() {
        let list = extract_pairs("<junk>100.1,13.1 100.2,13.2,0 <x>100.3,13.3</y>");
        let lngs: Vec<f64> = list.valid.iter().map(|c| c.lng).collect();
        assert_eq!(lngs, vec![100.1, 100.2, 100.3]);
        assert!(list.valid.iter().all(|c| c.alt.is_none()));
    }

    #[test]
    fn strips_point_blocks_with_prefixes() {
        let text = "<a><Point><coordinates>1,2</coordinates></Point>\
                    <kml:Point>\n<kml:coordinates>3,4</kml:coordinates></kml:Point>\
                    <LineString>5,6 7,8</LineString></a>";
        let stripped = strip_point_blocks(text);
        assert!(!stripped.contains("1,2"));
        assert!(!stripped.contains("3,4"));
        assert!(stripped.contains("5,6 7,8"));
    }

    #[test]
    fn does_not_strip_point_prefixed_names() {
        let text = "<PointStyle>1,2</PointStyle>";
        assert_eq!(strip_point_blocks(text), text);
    }

    #[test]
    fn closes_open_ring() {
        let mut ring = parse_coordinate_text("100,13 101,13 101,14").valid;
        close_ring(&mut ring);
        assert_eq!(ring.len(), 4);
        assert!(ring[0].same_position(&ring[3]));

        close_ring(&mut ring);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn classifies_by_closure() {
        let closed = parse_coordinate_text("100,13 101,13 101,14 100,13").valid;
        assert!(matches!(
            classify(&closed),
            Classification::Geometry(geojson::Value::Polygon(_))
        ));

        let open = parse_coordinate_text("100,13 101,13 101,14").valid;
        assert!(matches!(
            classify(&open),
            Classification::Geometry(geojson::Value::LineString(_))
        ));

        let two = parse_coordinate_text("100,13 101,13").valid;
        assert!(matches!(
            classify(&two),
            Classification::Geometry(geojson::Value::LineString(_))
        ));

        let single = parse_coordinate_text("100,13").valid;
        assert_eq!(classify(&single), Classification::Skipped);
        assert_eq!(classify(&[]), Classification::Skipped);
    }

    #[test]
    fn closed_three_position_list_is_a_degenerate_polygon() {
        let out_and_back = parse_coordinate_text("100,13 101,13 100,13").valid;
        assert_eq!(
            classify(&out_and_back),
            Classification::Degenerate {
                geometry: GeometryKind::Polygon,
                positions: 3,
            }
        );
    }
}
