use anyhow::anyhow;
use geo::{Coord, LineString, Polygon};

use crate::feature::{Feature, FeatureCollection};

use super::crs::Crs;

/// Re-expresses coordinates from one reference frame in another. The actual
/// projection mathematics live behind this seam, so analysis and annotation
/// code can be exercised with synthetic transformers.
pub trait FrameTransformer {
    fn transform_coord(&self, coord: Coord) -> anyhow::Result<Coord>;

    fn transform_line_string(&self, line: &LineString) -> anyhow::Result<LineString> {
        let coords: anyhow::Result<Vec<Coord>> = line
            .coords()
            .map(|coord| self.transform_coord(*coord))
            .collect();
        Ok(LineString::from(coords?))
    }

    fn transform_polygon(&self, polygon: &Polygon) -> anyhow::Result<Polygon> {
        let exterior = self.transform_line_string(polygon.exterior())?;
        let interiors: anyhow::Result<Vec<LineString>> = polygon
            .interiors()
            .iter()
            .map(|ring| self.transform_line_string(ring))
            .collect();
        Ok(Polygon::new(exterior, interiors?))
    }

    fn transform_geometry(&self, geometry: &geo::Geometry) -> anyhow::Result<geo::Geometry> {
        match geometry {
            geo::Geometry::Point(point) => {
                Ok(geo::Point::from(self.transform_coord(point.0)?).into())
            }
            geo::Geometry::Line(line) => Ok(geo::Line::new(
                self.transform_coord(line.start)?,
                self.transform_coord(line.end)?,
            )
            .into()),
            geo::Geometry::LineString(line) => Ok(self.transform_line_string(line)?.into()),
            geo::Geometry::Polygon(polygon) => Ok(self.transform_polygon(polygon)?.into()),
            geo::Geometry::MultiPoint(points) => {
                let transformed: anyhow::Result<Vec<geo::Point>> = points
                    .iter()
                    .map(|point| Ok(self.transform_coord(point.0)?.into()))
                    .collect();
                Ok(geo::MultiPoint::new(transformed?).into())
            }
            geo::Geometry::MultiLineString(lines) => {
                let transformed: anyhow::Result<Vec<LineString>> = lines
                    .iter()
                    .map(|line| self.transform_line_string(line))
                    .collect();
                Ok(geo::MultiLineString::new(transformed?).into())
            }
            geo::Geometry::MultiPolygon(polygons) => {
                let transformed: anyhow::Result<Vec<Polygon>> = polygons
                    .iter()
                    .map(|polygon| self.transform_polygon(polygon))
                    .collect();
                Ok(geo::MultiPolygon::new(transformed?).into())
            }
            other => Err(anyhow!("Cannot transform geometry type {:?}", other)),
        }
    }
}

/// PROJ-backed transformer between two known reference frames.
pub struct ProjTransformer {
    projection: proj::Proj,
}

impl ProjTransformer {
    pub fn between(from: &Crs, to: &Crs) -> anyhow::Result<Self> {
        let projection = proj::Proj::new_known_crs(
            &from.authority_string(),
            &to.authority_string(),
            None,
        )?;
        Ok(Self { projection })
    }

    /// Transformer from a known frame into a frame given by a PROJ
    /// definition string, e.g. a transverse Mercator centered on a point.
    pub fn to_definition(from: &Crs, definition: &str) -> anyhow::Result<Self> {
        let projection = proj::Proj::new_known_crs(&from.authority_string(), definition, None)?;
        Ok(Self { projection })
    }
}

impl FrameTransformer for ProjTransformer {
    fn transform_coord(&self, coord: Coord) -> anyhow::Result<Coord> {
        let (x, y) = self
            .projection
            .convert((coord.x, coord.y))
            .map_err(|err| anyhow!("Could not project coordinate, {}", err))?;
        Ok(Coord { x, y })
    }
}

/// Leaves coordinates untouched. Used when the source frame is already
/// locally metric-accurate.
pub struct IdentityTransformer;

impl FrameTransformer for IdentityTransformer {
    fn transform_coord(&self, coord: Coord) -> anyhow::Result<Coord> {
        Ok(coord)
    }
}

/// Produces a reference frame that is metric-accurate around a given center
/// coordinate, as a transformer from the source frame into it.
pub trait LocalFrameFactory {
    type Transformer: FrameTransformer;

    fn local_frame_at(&self, center: Coord) -> anyhow::Result<Self::Transformer>;
}

/// Transverse Mercator frame centered on the given lon/lat coordinate. The
/// source frame must be geographic for the center parameters to make sense.
pub struct TransverseMercatorFactory {
    pub source: Crs,
}

impl LocalFrameFactory for TransverseMercatorFactory {
    type Transformer = ProjTransformer;

    fn local_frame_at(&self, center: Coord) -> anyhow::Result<ProjTransformer> {
        let definition = format!(
            "+proj=tmerc +lat_0={} +lon_0={} +k=0.9996 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs",
            center.y, center.x
        );
        ProjTransformer::to_definition(&self.source, &definition)
    }
}

/// Local frame factory for extents that are already in a projected frame.
pub struct IdentityFactory;

impl LocalFrameFactory for IdentityFactory {
    type Transformer = IdentityTransformer;

    fn local_frame_at(&self, _center: Coord) -> anyhow::Result<IdentityTransformer> {
        Ok(IdentityTransformer)
    }
}

/// Re-express a collection's geometries in the `target` frame, producing a
/// new collection. The input is left untouched.
pub fn reproject(
    collection: &FeatureCollection,
    target: Crs,
    transformer: &impl FrameTransformer,
) -> anyhow::Result<FeatureCollection> {
    let features: anyhow::Result<Vec<Feature>> = collection
        .iter()
        .map(|feature| {
            Ok(Feature {
                geometry: transformer.transform_geometry(&feature.geometry)?,
                attributes: feature.attributes.clone(),
            })
        })
        .collect();
    Ok(FeatureCollection::new(features?, target))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use geo::Coord;

    use crate::feature::{Feature, FeatureCollection};
    use crate::frame::crs::Crs;

    use super::{
        reproject, FrameTransformer, IdentityTransformer, LocalFrameFactory, ProjTransformer,
        TransverseMercatorFactory,
    };

    /// Scales coordinates by a constant factor.
    struct ScaleTransformer(f64);

    impl FrameTransformer for ScaleTransformer {
        fn transform_coord(&self, coord: Coord) -> anyhow::Result<Coord> {
            Ok(Coord {
                x: coord.x * self.0,
                y: coord.y * self.0,
            })
        }
    }

    #[test]
    fn test_reproject_produces_new_collection() {
        let line: geo::Geometry = geo::LineString::from(vec![(1.0, 2.0), (3.0, 4.0)]).into();
        let collection = FeatureCollection::new(vec![Feature::from(line)], Crs::wgs84());

        let target = Crs::projected(2157);
        let scaled = reproject(&collection, target, &ScaleTransformer(2.0)).unwrap();

        assert_eq!(target, scaled.crs);
        let expected: geo::Geometry = geo::LineString::from(vec![(2.0, 4.0), (6.0, 8.0)]).into();
        assert_eq!(expected, scaled.features[0].geometry);
        // The input keeps its original frame and coordinates.
        assert_eq!(Crs::wgs84(), collection.crs);
    }

    #[test]
    fn test_identity_transformer() {
        let coord = Coord { x: -6.677, y: 55.15 };
        assert_eq!(coord, IdentityTransformer.transform_coord(coord).unwrap());
    }

    #[test]
    fn test_proj_transformer_wgs84_to_utm() {
        // EPSG 4326 coordinate and its UTM zone 54N equivalent, verified
        // with https://coordinates-converter.com/
        let transformer =
            ProjTransformer::between(&Crs::wgs84(), &Crs::projected(32654)).unwrap();
        let projected = transformer
            .transform_coord(Coord {
                x: 139.7895073,
                y: 35.6862101,
            })
            .unwrap();

        // Millimeter tolerance.
        assert_abs_diff_eq!(projected.x, 390467.986, epsilon = 1e-3);
        assert_abs_diff_eq!(projected.y, 3949820.494, epsilon = 1e-3);
    }

    #[test]
    fn test_transverse_mercator_centered_on_point() {
        // A transverse Mercator frame centered on a coordinate maps that
        // coordinate to its own origin.
        let factory = TransverseMercatorFactory {
            source: Crs::wgs84(),
        };
        let center = Coord { x: -6.677, y: 55.15 };
        let local = factory.local_frame_at(center).unwrap();
        let origin = local.transform_coord(center).unwrap();

        assert_abs_diff_eq!(origin.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(origin.y, 0.0, epsilon = 1e-6);
    }
}
