use geo::{Area, EuclideanLength};
use serde::Deserialize;

use crate::feature::{AttrValue, FeatureCollection};
use crate::frame::crs::FrameError;

/// Which scalar measurement to derive from a feature's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MeasureKind {
    Length,
    Area,
}

/// Compute a per-feature measurement and attach it under `column`, producing
/// a new collection. The input collection is never mutated while iterating.
///
/// The collection's frame must use linear units; measuring in a geographic
/// frame would quietly produce numbers in degrees, so it is rejected up
/// front instead.
pub fn measure(
    collection: &FeatureCollection,
    kind: MeasureKind,
    column: &str,
) -> Result<FeatureCollection, FrameError> {
    collection.crs.require_projected()?;
    let features = collection
        .iter()
        .map(|feature| {
            let value = measure_geometry(&feature.geometry, kind);
            feature.with_attribute(column, AttrValue::Number(value))
        })
        .collect();
    Ok(FeatureCollection::new(features, collection.crs))
}

/// Geometries the measurement does not apply to (e.g. the length of a point)
/// measure zero rather than being dropped, so aggregation still counts them.
fn measure_geometry(geometry: &geo::Geometry, kind: MeasureKind) -> f64 {
    match kind {
        MeasureKind::Length => match geometry {
            geo::Geometry::Line(line) => line.euclidean_length(),
            geo::Geometry::LineString(line) => line.euclidean_length(),
            geo::Geometry::MultiLineString(lines) => lines.euclidean_length(),
            _ => 0.0,
        },
        MeasureKind::Area => geometry.unsigned_area(),
    }
}
