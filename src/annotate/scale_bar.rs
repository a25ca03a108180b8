use geo::{BoundingRect, Coord};

use crate::feature::FeatureCollection;
use crate::frame::crs::{Crs, FrameError};
use crate::frame::transform::{FrameTransformer, LocalFrameFactory};

/// Axis-aligned visible extent of a map, in a given reference frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Crs,
}

impl MapExtent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: Crs) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            crs,
        }
    }

    /// Bounding extent of all geometries in a collection. `None` for an
    /// empty collection.
    pub fn from_collection(collection: &FeatureCollection) -> Option<Self> {
        let mut rects = collection
            .iter()
            .filter_map(|feature| feature.geometry.bounding_rect());
        let first = rects.next()?;
        let combined = rects.fold(first, |acc, rect| {
            geo::Rect::new(
                Coord {
                    x: acc.min().x.min(rect.min().x),
                    y: acc.min().y.min(rect.min().y),
                },
                Coord {
                    x: acc.max().x.max(rect.max().x),
                    y: acc.max().y.max(rect.max().y),
                },
            )
        });
        Some(Self::new(
            combined.min().x,
            combined.min().y,
            combined.max().x,
            combined.max().y,
            collection.crs,
        ))
    }

    /// Combined extent of two viewports in the same reference frame, e.g.
    /// the features and the region outlines drawn on one map.
    pub fn union(&self, other: &MapExtent) -> Result<MapExtent, FrameError> {
        self.crs.require_same(&other.crs)?;
        Ok(MapExtent::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
            self.crs,
        ))
    }

    pub fn center_x(&self) -> f64 {
        (self.min_x + self.max_x) / 2.0
    }

    /// Fractional interpolation within the extent. A degenerate extent
    /// collapses every fraction to its single point.
    pub fn interpolate(&self, fx: f64, fy: f64) -> Coord {
        Coord {
            x: self.min_x + (self.max_x - self.min_x) * fx,
            y: self.min_y + (self.max_y - self.min_y) * fy,
        }
    }

    fn corners(&self) -> [Coord; 4] {
        [
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.min_x,
                y: self.max_y,
            },
            Coord {
                x: self.max_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        ]
    }
}

/// A straight stroke of the annotation, in the local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: Coord,
    pub end: Coord,
    pub width: f64,
    pub color: String,
}

/// A text placement anchored at a point in the local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub anchor: Coord,
    pub text: String,
}

/// Render-agnostic scale-bar geometry, computed once per render and handed
/// to a drawing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleBar {
    pub segments: Vec<Segment>,
    pub labels: Vec<Label>,
}

/// Visual convention of the bar. The segment lengths are literal multiples
/// of `base_distance`, never derived from the data.
#[derive(Debug, Clone)]
pub struct ScaleBarStyle {
    /// Full bar length in local-frame units (meters by default).
    pub base_distance: f64,
    /// Unit name used in the labels.
    pub unit: String,
    /// Divisor from local-frame units to label units, e.g. 1000 for meters
    /// to kilometers.
    pub unit_divisor: f64,
}

impl Default for ScaleBarStyle {
    fn default() -> Self {
        Self {
            base_distance: 20_000.0,
            unit: "km".to_string(),
            unit_divisor: 1000.0,
        }
    }
}

// Stroke widths and label offsets of the bar, relative to the base
// distance where they scale with it.
const FULL_BAR_STROKE_WIDTH: f64 = 9.0;
const TIER_STROKE_WIDTH: f64 = 6.0;
const LABEL_X_OFFSET_FRACTIONS: [f64; 3] = [0.0, 0.625, 1.225];
const LABEL_Y_OFFSET_FRACTION: f64 = 0.225;
const LABEL_VALUE_FRACTIONS: [f64; 3] = [0.5, 0.25, 0.05];

/// Compute the geometry of a three-tier distance scale bar anchored at a
/// fractional position within `extent`.
///
/// The extent's center x and the anchor's y define the center of a local,
/// metric-accurate frame obtained from `factory`; the anchor point is then
/// interpolated between the extent's bounds re-expressed in that frame, so
/// the bar's physical distances hold regardless of the primary frame's
/// distortion. The emitted segments span base, base/2 and base/2 units,
/// with the two half-tiers drawn in alternating colors over the full bar.
pub fn build_scale_bar<F: LocalFrameFactory>(
    extent: &MapExtent,
    anchor_fraction: (f64, f64),
    style: &ScaleBarStyle,
    factory: &F,
) -> anyhow::Result<ScaleBar> {
    let (fx, fy) = anchor_fraction;
    let local_center = Coord {
        x: extent.center_x(),
        y: extent.interpolate(fx, fy).y,
    };
    let local = factory.local_frame_at(local_center)?;

    let mut x0 = f64::INFINITY;
    let mut x1 = f64::NEG_INFINITY;
    let mut y0 = f64::INFINITY;
    let mut y1 = f64::NEG_INFINITY;
    for corner in extent.corners() {
        let transformed = local.transform_coord(corner)?;
        x0 = x0.min(transformed.x);
        x1 = x1.max(transformed.x);
        y0 = y0.min(transformed.y);
        y1 = y1.max(transformed.y);
    }

    let sbx = x0 + (x1 - x0) * fx;
    let sby = y0 + (y1 - y0) * fy;
    let base = style.base_distance;

    let at = |x: f64| Coord { x, y: sby };
    let segments = vec![
        Segment {
            start: at(sbx),
            end: at(sbx - base),
            width: FULL_BAR_STROKE_WIDTH,
            color: "black".to_string(),
        },
        Segment {
            start: at(sbx),
            end: at(sbx - base / 2.0),
            width: TIER_STROKE_WIDTH,
            color: "black".to_string(),
        },
        Segment {
            start: at(sbx - base / 2.0),
            end: at(sbx - base),
            width: TIER_STROKE_WIDTH,
            color: "white".to_string(),
        },
    ];

    let label_y = sby - base * LABEL_Y_OFFSET_FRACTION;
    let labels = LABEL_X_OFFSET_FRACTIONS
        .iter()
        .zip(LABEL_VALUE_FRACTIONS)
        .map(|(x_fraction, value_fraction)| {
            let value = base * value_fraction / style.unit_divisor;
            Label {
                anchor: Coord {
                    x: sbx - base * x_fraction,
                    y: label_y,
                },
                text: format_distance(value, &style.unit),
            }
        })
        .collect();

    Ok(ScaleBar { segments, labels })
}

fn format_distance(value: f64, unit: &str) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{:.0} {}", value, unit)
    } else {
        format!("{} {}", value, unit)
    }
}
