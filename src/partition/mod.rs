use anyhow::Context;
use geo::{BooleanOps, BoundingRect, CoordsIter, Intersects};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::feature::{AttrValue, Feature, FeatureCollection};

/// Clip every feature to each region boundary, tagging the clipped parts
/// with the region's `region_key` value. Because the region boundaries are
/// expected to be disjoint, the output is a partition: no part of any
/// feature is counted twice, so aggregating a re-measured column over it
/// matches the unclipped total.
///
/// Parts falling entirely outside a region are dropped; a feature straddling
/// two regions contributes one clipped part to each.
///
/// Boundary convention: a geometry lying exactly on a shared region
/// boundary intersects every touching mask, so a boundary point (or an edge
/// shared by two regions) is kept once per touching region. The degenerate
/// overlap measures zero, leaving aggregated lengths and areas unaffected,
/// but per-region feature counts include such features in each neighbor.
pub fn clip_to_regions(
    features: &FeatureCollection,
    regions: &FeatureCollection,
    region_key: &str,
) -> anyhow::Result<FeatureCollection> {
    features
        .crs
        .require_same(&regions.crs)
        .context("Clipping features to regions")?;

    let mut clipped = Vec::new();
    for region in regions.iter() {
        let Some(mask) = region_mask(&region.geometry) else {
            log::warn!("Skipping region without polygon geometry");
            continue;
        };
        let tag = region
            .attribute(region_key)
            .cloned()
            .unwrap_or(AttrValue::Null);
        for feature in features.iter() {
            if let Some(geometry) = clip_geometry(&feature.geometry, &mask) {
                let mut part = Feature {
                    geometry,
                    attributes: feature.attributes.clone(),
                };
                part.attributes.insert(region_key.to_string(), tag.clone());
                clipped.push(part);
            }
        }
    }
    Ok(FeatureCollection::new(clipped, features.crs))
}

/// One-to-many spatial join: every (feature, intersecting region) pair
/// becomes an output feature tagged with the region's `region_key` value.
///
/// A feature straddling two regions appears twice with its full geometry, so
/// summing a measurement over the join inflates totals. Use
/// `clip_to_regions` when aggregating; the join exists for membership
/// queries and for demonstrating that hazard.
pub fn spatial_join(
    features: &FeatureCollection,
    regions: &FeatureCollection,
    region_key: &str,
) -> anyhow::Result<FeatureCollection> {
    features
        .crs
        .require_same(&regions.crs)
        .context("Joining features to regions")?;

    // Region envelopes in an R-tree prune the candidate set before the
    // exact intersection tests.
    let envelopes: Vec<GeomWithData<Rectangle<[f64; 2]>, usize>> = regions
        .iter()
        .enumerate()
        .filter_map(|(index, region)| {
            let rect = region.geometry.bounding_rect()?;
            Some(GeomWithData::new(
                Rectangle::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                index,
            ))
        })
        .collect();
    let tree = RTree::bulk_load(envelopes);

    let mut joined = Vec::new();
    for feature in features.iter() {
        let Some(rect) = feature.geometry.bounding_rect() else {
            continue;
        };
        let envelope = AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        );
        let mut candidates: Vec<usize> = tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect();
        candidates.sort_unstable();
        for index in candidates {
            let region = &regions.features[index];
            if !feature.geometry.intersects(&region.geometry) {
                continue;
            }
            let tag = region
                .attribute(region_key)
                .cloned()
                .unwrap_or(AttrValue::Null);
            let mut matched = feature.clone();
            matched.attributes.insert(region_key.to_string(), tag);
            joined.push(matched);
        }
    }
    Ok(FeatureCollection::new(joined, features.crs))
}

fn region_mask(geometry: &geo::Geometry) -> Option<geo::MultiPolygon> {
    match geometry {
        geo::Geometry::Polygon(polygon) => Some(geo::MultiPolygon::new(vec![polygon.clone()])),
        geo::Geometry::MultiPolygon(polygons) => Some(polygons.clone()),
        _ => None,
    }
}

fn clip_geometry(geometry: &geo::Geometry, mask: &geo::MultiPolygon) -> Option<geo::Geometry> {
    match geometry {
        geo::Geometry::Point(point) => mask.intersects(point).then(|| geometry.clone()),
        geo::Geometry::MultiPoint(points) => {
            let inside: Vec<geo::Point> = points
                .iter()
                .filter(|point| mask.intersects(*point))
                .cloned()
                .collect();
            if inside.is_empty() {
                None
            } else {
                Some(geo::MultiPoint::new(inside).into())
            }
        }
        geo::Geometry::Line(line) => {
            let lines = geo::MultiLineString::new(vec![vec![line.start, line.end].into()]);
            clip_lines(&lines, mask)
        }
        geo::Geometry::LineString(line) => {
            clip_lines(&geo::MultiLineString::new(vec![line.clone()]), mask)
        }
        geo::Geometry::MultiLineString(lines) => clip_lines(lines, mask),
        geo::Geometry::Polygon(polygon) => {
            clip_polygons(&geo::MultiPolygon::new(vec![polygon.clone()]), mask)
        }
        geo::Geometry::MultiPolygon(polygons) => clip_polygons(polygons, mask),
        other => {
            log::warn!("Cannot clip geometry type {:?}, dropping feature.", other);
            None
        }
    }
}

fn clip_lines(lines: &geo::MultiLineString, mask: &geo::MultiPolygon) -> Option<geo::Geometry> {
    let mut clipped: Vec<geo::LineString> = mask
        .clip(lines, false)
        .into_iter()
        .filter(|line| line.coords_count() >= 2)
        .collect();
    match clipped.len() {
        0 => None,
        1 => Some(clipped.remove(0).into()),
        _ => Some(geo::MultiLineString::new(clipped).into()),
    }
}

fn clip_polygons(polygons: &geo::MultiPolygon, mask: &geo::MultiPolygon) -> Option<geo::Geometry> {
    let mut clipped: Vec<geo::Polygon> = mask
        .intersection(polygons)
        .into_iter()
        .filter(|polygon| polygon.exterior().coords_count() >= 4)
        .collect();
    match clipped.len() {
        0 => None,
        1 => Some(clipped.remove(0).into()),
        _ => Some(geo::MultiPolygon::new(clipped).into()),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::feature::{AttrValue, Feature, FeatureCollection};
    use crate::frame::crs::Crs;
    use crate::summary::aggregate::{aggregate, GroupKey};
    use crate::summary::measure::{measure, MeasureKind};

    use super::{clip_to_regions, spatial_join};

    const CRS: Crs = Crs {
        epsg: 2157,
        kind: crate::frame::crs::FrameKind::Projected,
    };

    fn road(x0: f64, x1: f64) -> Feature {
        let geometry: geo::Geometry =
            geo::LineString::from(vec![(x0, 0.0), (x1, 0.0)]).into();
        Feature::from(geometry)
    }

    fn region(name: &str, x0: f64, x1: f64) -> Feature {
        let geometry: geo::Geometry = geo::Polygon::new(
            geo::LineString::from(vec![(x0, -5.0), (x1, -5.0), (x1, 5.0), (x0, 5.0)]),
            vec![],
        )
        .into();
        Feature::from(geometry).with_attribute("CountyName", AttrValue::Text(name.to_string()))
    }

    /// Three lines with lengths 10, 20 and 30; one straddles both regions.
    fn roads() -> FeatureCollection {
        let collection =
            FeatureCollection::new(vec![road(0.0, 10.0), road(30.0, 50.0), road(10.0, 40.0)], CRS);
        measure(&collection, MeasureKind::Length, "Length").unwrap()
    }

    #[test]
    fn test_clipped_partition_preserves_totals() {
        let roads = roads();
        // Disjoint regions covering the full extent of the roads.
        let regions = FeatureCollection::new(
            vec![region("Left", 0.0, 25.0), region("Right", 25.0, 60.0)],
            CRS,
        );

        let clipped = clip_to_regions(&roads, &regions, "CountyName").unwrap();
        // Lengths of clipped parts must be recomputed.
        let clipped = measure(&clipped, MeasureKind::Length, "Length").unwrap();
        let by_county = aggregate(&clipped, &["CountyName"], "Length").unwrap();

        // The straddling line is split once per region: 4 parts in total.
        assert_eq!(4, clipped.len());
        assert_relative_eq!(60.0, by_county.total(), max_relative = 1e-6);

        let left = by_county
            .get(&GroupKey(vec![Some("Left".to_string())]))
            .unwrap();
        assert_relative_eq!(25.0, left.total, max_relative = 1e-6);
    }

    #[test]
    fn test_join_double_counts_straddling_features() {
        let roads = roads();
        // Overlapping regions: two lines intersect both.
        let regions = FeatureCollection::new(
            vec![region("Left", 0.0, 35.0), region("Right", 20.0, 60.0)],
            CRS,
        );

        let joined = spatial_join(&roads, &regions, "CountyName").unwrap();
        let by_county = aggregate(&joined, &["CountyName"], "Length").unwrap();

        assert_eq!(5, joined.len());
        // Full geometries are counted once per matching region, inflating
        // the total well past the true 60.
        assert!(by_county.total() > 60.0);
        assert_relative_eq!(110.0, by_county.total(), max_relative = 1e-6);
    }

    #[test]
    fn test_mismatched_frames_are_rejected() {
        let roads = roads();
        let regions =
            FeatureCollection::new(vec![region("Left", 0.0, 25.0)], Crs::wgs84());

        assert!(clip_to_regions(&roads, &regions, "CountyName").is_err());
        assert!(spatial_join(&roads, &regions, "CountyName").is_err());
    }

    #[test]
    fn test_point_features_are_kept_or_dropped_whole() {
        let town = Feature::from(geo::Geometry::Point(geo::Point::new(5.0, 0.0)));
        let towns = FeatureCollection::new(vec![town], CRS);
        let regions = FeatureCollection::new(
            vec![region("Left", 0.0, 25.0), region("Right", 25.0, 60.0)],
            CRS,
        );

        let clipped = clip_to_regions(&towns, &regions, "CountyName").unwrap();
        assert_eq!(1, clipped.len());
        assert_eq!(
            Some(&AttrValue::Text("Left".to_string())),
            clipped.features[0].attribute("CountyName")
        );
    }

    #[test]
    fn test_boundary_point_belongs_to_every_touching_region() {
        // A point exactly on the shared boundary of two adjacent regions
        // intersects both masks and is kept once per region.
        let town = Feature::from(geo::Geometry::Point(geo::Point::new(25.0, 0.0)));
        let towns = FeatureCollection::new(vec![town], CRS);
        let regions = FeatureCollection::new(
            vec![region("Left", 0.0, 25.0), region("Right", 25.0, 60.0)],
            CRS,
        );

        let clipped = clip_to_regions(&towns, &regions, "CountyName").unwrap();
        assert_eq!(2, clipped.len());
        let counties: Vec<_> = clipped
            .iter()
            .filter_map(|feature| feature.attribute("CountyName").cloned())
            .collect();
        assert!(counties.contains(&AttrValue::Text("Left".to_string())));
        assert!(counties.contains(&AttrValue::Text("Right".to_string())));
    }
}
