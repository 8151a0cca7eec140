//! WMS `GetMap` client used by every profile to fetch its base image.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::http::{content_type, send_checked, snippet};
use crate::model::{BaseRaster, Extent, GeoTransform};
use crate::ports::{ImageryPort, PortError};

/// Share of the larger extent side added around the region.
pub const PADDING_FRACTION: f64 = 0.1;

/// Default length of the longer image side, in pixels.
pub const DEFAULT_MAX_PIXEL_SIDE: u32 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Supported WMS protocol versions.
pub enum WmsVersion {
    /// WMS 1.1.1, bounding boxes always in x/y order.
    V1_1_1,
    /// WMS 1.3.0, bounding boxes in the axis order of the CRS.
    V1_3_0,
}

impl fmt::Display for WmsVersion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self {
            WmsVersion::V1_1_1 => "1.1.1",
            WmsVersion::V1_3_0 => "1.3.0",
        };
        write!(formatter, "{version}")
    }
}

#[derive(Debug, Clone)]
/// A WMS layer an imagery port requests its images from.
pub struct WmsSource {
    /// Service endpoint, without query string.
    pub url: String,
    /// Layer name.
    pub layer: String,
    /// Protocol version.
    pub version: WmsVersion,
    /// Coordinate reference system of the bounding box, e.g. `EPSG:4258`.
    pub crs: String,
    /// Style name.
    pub styles: String,
    /// Requested MIME type. Lossless formats keep masking edges clean.
    pub format: String,
    /// Extra HTTP headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl WmsSource {
    /// Source with the `default` style, TIFF output and no extra headers.
    #[must_use]
    pub fn new<U: Into<String>, L: Into<String>, C: Into<String>>(
        url: U,
        layer: L,
        version: WmsVersion,
        crs: C,
    ) -> Self {
        Self {
            url: url.into(),
            layer: layer.into(),
            version,
            crs: crs.into(),
            styles: String::from("default"),
            format: String::from("image/tiff"),
            headers: Vec::new(),
        }
    }

    /// Request another image format.
    #[must_use]
    pub fn with_format<F: Into<String>>(mut self, format: F) -> Self {
        self.format = format.into();
        self
    }

    /// Send an extra header with every request.
    #[must_use]
    pub fn with_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Same source with another CRS.
    #[must_use]
    pub fn with_crs<C: Into<String>>(mut self, crs: C) -> Self {
        self.crs = crs.into();
        self
    }

    /// WMS 1.3.0 uses latitude/longitude order for geographic EPSG codes.
    fn lat_lon_order(&self) -> bool {
        self.version == WmsVersion::V1_3_0
            && matches!(
                self.crs.to_ascii_uppercase().as_str(),
                "EPSG:4258" | "EPSG:4326"
            )
    }

    /// Value of the `BBOX` parameter for a longitude/latitude extent.
    #[must_use]
    pub fn bbox_param(&self, extent: &Extent) -> String {
        if self.lat_lon_order() {
            format!(
                "{},{},{},{}",
                extent.min_y(),
                extent.min_x(),
                extent.max_y(),
                extent.max_x()
            )
        } else {
            format!(
                "{},{},{},{}",
                extent.min_x(),
                extent.min_y(),
                extent.max_x(),
                extent.max_y()
            )
        }
    }

    /// Query parameters of a `GetMap` request.
    #[must_use]
    pub fn get_map_query(
        &self,
        extent: &Extent,
        width: u32,
        height: u32,
    ) -> Vec<(&'static str, String)> {
        let crs_key = match self.version {
            WmsVersion::V1_1_1 => "SRS",
            WmsVersion::V1_3_0 => "CRS",
        };
        vec![
            ("SERVICE", String::from("WMS")),
            ("VERSION", self.version.to_string()),
            ("REQUEST", String::from("GetMap")),
            ("LAYERS", self.layer.clone()),
            ("STYLES", self.styles.clone()),
            (crs_key, self.crs.clone()),
            ("BBOX", self.bbox_param(extent)),
            ("WIDTH", width.to_string()),
            ("HEIGHT", height.to_string()),
            ("FORMAT", self.format.clone()),
        ]
    }
}

/// Pixel size of an image of `extent` whose longer side is `max_pixel_side`.
#[must_use]
pub fn image_size(extent: &Extent, max_pixel_side: u32) -> (u32, u32) {
    let (dx, dy) = (extent.width(), extent.height());
    let long_side = f64::from(max_pixel_side.max(1));
    let scaled = |ratio: f64| (long_side * ratio).round().max(1.0) as u32;
    if dx > dy {
        (max_pixel_side.max(1), scaled(dy / dx))
    } else {
        (scaled(dx / dy), max_pixel_side.max(1))
    }
}

/// Fetch the base image of `extent` from a WMS source.
///
/// The extent is padded by [`PADDING_FRACTION`] first, and the raster's
/// georeference is derived from the padded extent and the decoded image size.
///
/// # Errors
///
/// Returns [`PortError::InvalidExtent`] for an extent without area before any
/// request is made, and [`PortError::Service`] when the response is not a
/// decodable image.
pub async fn fetch_wms_image(
    client: &Client,
    source: &WmsSource,
    extent: &Extent,
    max_pixel_side: u32,
    nodata: Option<u8>,
) -> Result<BaseRaster, PortError> {
    if extent.is_degenerate() {
        return Err(PortError::InvalidExtent(format!(
            "{}x{} extent cannot be rendered",
            extent.width(),
            extent.height()
        )));
    }

    let padded = extent.padded(PADDING_FRACTION);
    let (width, height) = image_size(&padded, max_pixel_side);
    debug!(url = %source.url, layer = %source.layer, width, height, "requesting WMS image");

    let mut req = client
        .get(&source.url)
        .query(&source.get_map_query(&padded, width, height));
    for (name, value) in &source.headers {
        req = req.header(name.as_str(), value.as_str());
    }

    let resp = send_checked(req).await?;
    let mime = content_type(&resp);
    let body = resp.bytes().await?;
    if !mime.starts_with("image/") {
        return Err(PortError::Service(format!(
            "WMS returned {mime:?} instead of an image: {}",
            snippet(&body)
        )));
    }

    let image = image::load_from_memory(&body)
        .map_err(|err| PortError::Service(format!("cannot decode WMS image: {err}")))?
        .to_rgb8();
    debug!(
        bytes = body.len(),
        width = image.width(),
        height = image.height(),
        "decoded WMS image"
    );

    let transform = GeoTransform::from_extent(&padded, image.width(), image.height());
    Ok(BaseRaster {
        image,
        transform,
        nodata,
    })
}

/// Imagery port backed by a single WMS source.
pub struct WmsImagery {
    client: Client,
    source: WmsSource,
    max_pixel_side: u32,
    nodata: Option<u8>,
}

impl WmsImagery {
    /// Create an imagery port bound to the given HTTP client.
    #[must_use]
    pub fn new(
        client: Client,
        source: WmsSource,
        max_pixel_side: u32,
        nodata: Option<u8>,
    ) -> Self {
        Self {
            client,
            source,
            max_pixel_side,
            nodata,
        }
    }
}

#[async_trait]
impl ImageryPort for WmsImagery {
    async fn fetch_base_image(&self, extent: &Extent) -> Result<BaseRaster, PortError> {
        fetch_wms_image(
            &self.client,
            &self.source,
            extent,
            self.max_pixel_side,
            self.nodata,
        )
        .await
    }
}
