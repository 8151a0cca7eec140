//! Domain data structures for profiles, regions, extents, and rasters.

use std::collections::BTreeMap;
use std::fmt;

use geo::BoundingRect;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Identifier for a profile known to munibot.
pub struct ProfileId(pub String);

impl fmt::Display for ProfileId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(id: &str) -> Self {
        ProfileId(id.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of an administrative region, only meaningful to the profile that issued it.
pub struct RegionId(pub String);

impl fmt::Display for RegionId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<&str> for RegionId {
    fn from(id: &str) -> Self {
        RegionId(id.to_owned())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Metadata describing a profile.
pub struct ProfileMeta {
    /// Unique identifier, used on the command line and in the configuration file.
    pub id: ProfileId,
    /// Longer human-friendly description.
    pub description: String,
    /// Pixel value the imagery service uses for areas it has no data for.
    pub nodata: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Geographic bounding box in longitude/latitude axis order.
pub struct Extent {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Extent {
    /// Create an extent from its corners.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidExtent`] when a bound is not finite or a minimum
    /// exceeds its maximum.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self, PortError> {
        let finite = [min_x, min_y, max_x, max_y]
            .iter()
            .all(|bound| bound.is_finite());
        if !finite || min_x > max_x || min_y > max_y {
            return Err(PortError::InvalidExtent(format!(
                "({min_x}, {min_y}, {max_x}, {max_y})"
            )));
        }
        Ok(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    /// Western bound.
    #[must_use]
    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    /// Southern bound.
    #[must_use]
    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    /// Eastern bound.
    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    /// Northern bound.
    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    /// Width in coordinate units.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height in coordinate units.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when the extent has no area.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Grow the extent on every side by `fraction` of its larger dimension.
    #[must_use]
    pub fn padded(&self, fraction: f64) -> Self {
        let distance = self.width().max(self.height()) * fraction.max(0.0);
        Self {
            min_x: self.min_x - distance,
            min_y: self.min_y - distance,
            max_x: self.max_x + distance,
            max_y: self.max_y + distance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Location attached to a post.
pub struct LonLat {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// North-up affine transform between pixel and geographic coordinates.
pub struct GeoTransform {
    /// Geographic x of the top-left corner.
    pub origin_x: f64,
    /// Geographic width of one pixel.
    pub pixel_width: f64,
    /// Geographic y of the top-left corner.
    pub origin_y: f64,
    /// Geographic height of one pixel, negative for north-up rasters.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform for an image of `width` x `height` pixels covering `extent`.
    #[must_use]
    pub fn from_extent(extent: &Extent, width: u32, height: u32) -> Self {
        Self {
            origin_x: extent.min_x(),
            pixel_width: extent.width() / f64::from(width.max(1)),
            origin_y: extent.max_y(),
            pixel_height: -extent.height() / f64::from(height.max(1)),
        }
    }

    /// Geographic coordinates of a (fractional) pixel position.
    #[must_use]
    pub fn to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width,
            self.origin_y + row * self.pixel_height,
        )
    }

    /// Fractional pixel position of geographic coordinates.
    #[must_use]
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }
}

#[derive(Debug, Clone)]
/// Aerial image returned by an imagery service together with its georeference.
pub struct BaseRaster {
    /// Three band pixel data.
    pub image: RgbImage,
    /// Mapping from pixels to geographic coordinates.
    pub transform: GeoTransform,
    /// Value the service used for pixels it has no data for.
    pub nodata: Option<u8>,
}

impl BaseRaster {
    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Exact outline of a region, as one or more polygons with optional holes.
pub struct Boundary(MultiPolygon<f64>);

impl Boundary {
    /// Wrap already built polygons.
    #[must_use]
    pub fn from_polygons(polygons: Vec<Polygon<f64>>) -> Self {
        Boundary(MultiPolygon::new(polygons))
    }

    /// Build a boundary from a GeoJSON `Polygon` or `MultiPolygon` geometry.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Service`] for other geometry types or positions with fewer
    /// than two ordinates.
    pub fn from_geojson(geometry: &geojson::Geometry) -> Result<Self, PortError> {
        match &geometry.value {
            geojson::Value::Polygon(rings) => Ok(Self::from_polygons(vec![polygon(rings)?])),
            geojson::Value::MultiPolygon(polygons) => polygons
                .iter()
                .map(|rings| polygon(rings))
                .collect::<Result<Vec<_>, _>>()
                .map(Self::from_polygons),
            other => Err(PortError::Service(format!(
                "expected a polygon boundary, got {}",
                other.type_name()
            ))),
        }
    }

    /// Polygons making up the boundary.
    #[must_use]
    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.0
    }

    /// True when the boundary has no polygon with at least one ring point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|poly| poly.exterior().0.is_empty())
    }

    /// Bounding extent computed from the geometry's own coordinates.
    #[must_use]
    pub fn extent(&self) -> Option<Extent> {
        let rect = self.0.bounding_rect()?;
        Extent::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y).ok()
    }
}

fn polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>, PortError> {
    let mut line_strings = rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|position| match position.as_slice() {
                    [x, y, ..] => Ok(Coord { x: *x, y: *y }),
                    _ => Err(PortError::Service(
                        "GeoJSON position with fewer than two ordinates".to_owned(),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(LineString::new)
        })
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();

    let exterior = line_strings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Ok(Polygon::new(exterior, line_strings.collect()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Single band grid marking which raster pixels fall outside a boundary.
pub struct Mask(GrayImage);

impl Mask {
    /// Value of pixels inside the boundary, left untouched by the compositor.
    pub const INSIDE: u8 = 0;
    /// Value of pixels outside the boundary, dimmed by the compositor.
    pub const OUTSIDE: u8 = 255;

    pub(crate) fn new(image: GrayImage) -> Self {
        Mask(image)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Mask value at a pixel, `None` when out of bounds.
    #[must_use]
    pub fn value(&self, col: u32, row: u32) -> Option<u8> {
        self.0.get_pixel_checked(col, row).map(|&Luma([value])| value)
    }

    /// Raw single band buffer, row major.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_raw()
    }

    /// The mask repeated over three bands.
    #[must_use]
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |col, row| {
            let Luma([value]) = *self.0.get_pixel(col, row);
            Rgb([value, value, value])
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identifier of a published status.
pub struct StatusId(pub String);

impl fmt::Display for StatusId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Posting progress of a profile.
pub struct PostedDump {
    /// Number of regions the profile can post about.
    pub total: u64,
    /// Region ids already posted, with the status id of their post.
    pub posts: BTreeMap<String, String>,
}

impl PostedDump {
    /// Number of regions already posted.
    #[must_use]
    pub fn posted(&self) -> usize {
        self.posts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_rejects_inverted_bounds() {
        assert!(Extent::new(1.0, 0.0, 0.0, 1.0).is_err(), "min_x > max_x");
        assert!(Extent::new(0.0, 1.0, 1.0, 0.0).is_err(), "min_y > max_y");
        assert!(Extent::new(0.0, f64::NAN, 1.0, 1.0).is_err(), "NaN bound");
    }

    #[test]
    fn padding_uses_the_larger_side() {
        let extent = Extent::new(0.0, 0.0, 10.0, 4.0).expect("valid extent");
        let padded = extent.padded(0.1);
        assert_eq!(padded, Extent::new(-1.0, -1.0, 11.0, 5.0).expect("valid extent"));
    }

    #[test]
    fn degenerate_extent() {
        let line = Extent::new(0.0, 0.0, 10.0, 0.0).expect("valid extent");
        assert!(line.is_degenerate(), "zero height");
        let point = Extent::new(3.0, 3.0, 3.0, 3.0).expect("valid extent");
        assert!(point.is_degenerate(), "zero area");
    }

    #[test]
    fn transform_round_trips_corners() {
        let extent = Extent::new(2.0, 40.0, 3.0, 40.5).expect("valid extent");
        let transform = GeoTransform::from_extent(&extent, 200, 100);
        assert_eq!(transform.to_geo(0.0, 0.0), (2.0, 40.5));
        assert_eq!(transform.to_geo(200.0, 100.0), (3.0, 40.0));
        assert_eq!(transform.to_pixel(2.0, 40.5), (0.0, 0.0));
    }

    #[test]
    fn boundary_extent_comes_from_geometry() {
        let geometry: geojson::Geometry = r#"{
            "type": "MultiPolygon",
            "coordinates": [
                [[[1.0, 41.0], [2.0, 41.0], [2.0, 42.0], [1.0, 42.0], [1.0, 41.0]]],
                [[[3.0, 40.5], [3.5, 40.5], [3.5, 41.0], [3.0, 40.5]]]
            ]
        }"#
        .parse()
        .expect("valid GeoJSON geometry");

        let boundary = Boundary::from_geojson(&geometry).expect("polygonal geometry");
        assert_eq!(boundary.polygons().0.len(), 2);
        assert_eq!(
            boundary.extent(),
            Some(Extent::new(1.0, 40.5, 3.5, 42.0).expect("valid extent"))
        );
    }

    #[test]
    fn boundary_rejects_points() {
        let geometry = geojson::Geometry::new(geojson::Value::Point(vec![1.0, 2.0]));
        assert!(Boundary::from_geojson(&geometry).is_err(), "points have no area");
    }

    #[test]
    fn empty_boundary_has_no_extent() {
        let boundary = Boundary::from_polygons(Vec::new());
        assert!(boundary.is_empty(), "no polygons");
        assert_eq!(boundary.extent(), None);
    }
}
