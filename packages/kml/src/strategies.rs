//! Ordered extraction strategies and the combinator that runs them.
//!
//! Each strategy is a pure function over a [`KmlSource`]. A strategy
//! returns `None` when it does not apply to the input (for example a
//! tree walk over text that is not well-formed XML) and an
//! [`Extraction`] otherwise. [`run`] returns the first extraction that
//! holds at least one feature.
//!
//! The raw-text regex scan runs whenever the two tree-based scans find
//! nothing, well-formed markup or not. It leaves `CDATA` sections to the
//! final strategy, which keeps one feature per section.

use std::cell::OnceCell;
use std::sync::LazyLock;

use geojson::Feature;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use zoning_map_geometry_models::Diagnostic;

use crate::coordinates::{
    Classification, CoordinateList, classify, extract_pairs, parse_coordinate_text,
    strip_point_blocks,
};
use crate::markup::{self, Element, MarkupError, NameMatch};
use crate::placemark;

/// Element name prefixes tried by the namespace-tolerant walk.
const KML_PREFIXES: &[&str] = &["", "kml"];

/// A `CDATA` section, capturing its body.
static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid regex"));

/// Raw KML text with its markup tree, parsed at most once.
pub struct KmlSource<'a> {
    text: &'a str,
    markup: OnceCell<Result<Element, MarkupError>>,
}

impl<'a> KmlSource<'a> {
    /// Wraps raw KML text.
    #[must_use]
    pub const fn new(text: &'a str) -> Self {
        Self {
            text,
            markup: OnceCell::new(),
        }
    }

    /// The raw input.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// The parsed markup tree, or why it could not be built.
    ///
    /// # Errors
    ///
    /// Returns the [`MarkupError`] from the first parse attempt.
    pub fn markup(&self) -> Result<&Element, &MarkupError> {
        self.markup.get_or_init(|| markup::parse(self.text)).as_ref()
    }
}

/// Features and diagnostics produced by one strategy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Extracted features.
    pub features: Vec<Feature>,
    /// Issues found along the way.
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    fn push_list(&mut self, name: String, list: CoordinateList) {
        self.diagnostics.extend(list.dropped.into_iter().map(|reason| {
            Diagnostic::CoordinateDropped {
                feature: name.clone(),
                reason,
            }
        }));
        match classify(&list.valid) {
            Classification::Geometry(value) => {
                self.features.push(crate::build_feature(&name, None, value));
            }
            Classification::Degenerate {
                geometry,
                positions,
            } => self.diagnostics.push(Diagnostic::DegenerateGeometry {
                feature: name,
                geometry,
                positions,
            }),
            Classification::Skipped => {}
        }
    }
}

/// Identifies an extraction strategy.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Walk `Placemark` elements, trusting geometry tags.
    PlacemarkWalk,
    /// Read every `coordinates` element, ignoring placemarks.
    CoordinatesScan,
    /// Regex scan of the raw text outside `CDATA` sections.
    RegexScan,
    /// `Placemark` walk tolerant of `kml:`-prefixed tags.
    NamespacedPlacemarkWalk,
    /// Regex scan inside `CDATA` sections.
    CdataScan,
}

/// A strategy function.
pub type Strategy = fn(&KmlSource<'_>) -> Option<Extraction>;

/// All strategies, in the order they are tried.
pub const STRATEGIES: &[(StrategyKind, Strategy)] = &[
    (StrategyKind::PlacemarkWalk, placemark_walk),
    (StrategyKind::CoordinatesScan, coordinates_scan),
    (StrategyKind::RegexScan, regex_scan),
    (StrategyKind::NamespacedPlacemarkWalk, namespaced_placemark_walk),
    (StrategyKind::CdataScan, cdata_scan),
];

/// Result of running the strategy chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutcome {
    /// Strategy whose extraction was accepted, if any.
    pub strategy: Option<StrategyKind>,
    /// Accepted extraction, or the merged diagnostics of every attempt
    /// when nothing was found.
    pub extraction: Extraction,
}

/// Runs `strategies` in order and returns the first extraction with at
/// least one feature.
///
/// When every strategy comes up empty, the diagnostics of all attempts
/// are merged (without duplicates) so callers can explain why.
#[must_use]
pub fn first_non_empty(
    source: &KmlSource<'_>,
    strategies: &[(StrategyKind, Strategy)],
) -> ChainOutcome {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    for (kind, strategy) in strategies {
        let Some(extraction) = strategy(source) else {
            log::debug!("KML strategy {kind} not applicable");
            continue;
        };

        if !extraction.features.is_empty() {
            log::debug!(
                "KML strategy {kind} extracted {} features",
                extraction.features.len()
            );
            return ChainOutcome {
                strategy: Some(*kind),
                extraction,
            };
        }

        log::debug!("KML strategy {kind} found no features");
        for diagnostic in extraction.diagnostics {
            if !diagnostics.contains(&diagnostic) {
                diagnostics.push(diagnostic);
            }
        }
    }

    ChainOutcome {
        strategy: None,
        extraction: Extraction {
            features: Vec::new(),
            diagnostics,
        },
    }
}

/// Runs the full ordered chain.
#[must_use]
pub fn run(source: &KmlSource<'_>) -> ChainOutcome {
    first_non_empty(source, STRATEGIES)
}

/// Structured walk over unprefixed `Placemark` elements.
#[must_use]
pub fn placemark_walk(source: &KmlSource<'_>) -> Option<Extraction> {
    let root = source.markup().ok()?;
    Some(placemark::walk(root, NameMatch::Exact))
}

/// Every `coordinates` element, classified by ring closure.
#[must_use]
pub fn coordinates_scan(source: &KmlSource<'_>) -> Option<Extraction> {
    let root = source.markup().ok()?;
    let mut extraction = Extraction::default();

    for (idx, element) in root
        .find_all(NameMatch::Exact, "coordinates")
        .into_iter()
        .enumerate()
    {
        let list = parse_coordinate_text(&element.text());
        extraction.push_list(format!("Feature {}", idx + 1), list);
    }

    Some(extraction)
}

/// `number,number` pairs anywhere in the raw text, ignoring structure.
///
/// Point blocks and `CDATA` sections are cut out first; the latter belong
/// to [`cdata_scan`].
#[must_use]
pub fn regex_scan(source: &KmlSource<'_>) -> Option<Extraction> {
    let text = strip_point_blocks(source.text());
    let text = CDATA_RE.replace_all(&text, "");

    let mut extraction = Extraction::default();
    let list = extract_pairs(&text);
    extraction.push_list("Feature 1".to_string(), list);
    Some(extraction)
}

/// Structured walk tolerant of `kml:`-prefixed tags.
#[must_use]
pub fn namespaced_placemark_walk(source: &KmlSource<'_>) -> Option<Extraction> {
    let root = source.markup().ok()?;
    Some(placemark::walk(root, NameMatch::Prefixed(KML_PREFIXES)))
}

/// One feature per `CDATA` section holding a usable coordinate list.
#[must_use]
pub fn cdata_scan(source: &KmlSource<'_>) -> Option<Extraction> {
    let text = strip_point_blocks(source.text());
    let mut extraction = Extraction::default();

    for (idx, caps) in CDATA_RE.captures_iter(&text).enumerate() {
        let Some(body) = caps.get(1) else {
            continue;
        };
        extraction.push_list(format!("Feature {}", idx + 1), extract_pairs(body.as_str()));
    }

    Some(extraction)
}
