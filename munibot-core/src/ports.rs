//! Traits describing profile capabilities and the shared error type.

use async_trait::async_trait;

use crate::model::{BaseRaster, Boundary, Extent, LonLat, PostedDump, RegionId, StatusId};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while rendering or publishing a region.
pub enum PortError {
    /// No region matches the requested id.
    #[error("Region not found: {0}")]
    NotFound(String),
    /// An upstream geometry or imagery service answered with an error or an unusable payload.
    #[error("Service error: {0}")]
    Service(String),
    /// The composite image could not be encoded.
    #[error("Encoding error: {0}")]
    Encoding(String),
    /// A request did not complete within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// An extent is inverted, not finite, or has no area.
    #[error("Invalid extent: {0}")]
    InvalidExtent(String),
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(reqwest::Error),
    /// The region catalog could not be queried.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// A service returned XML that could not be parsed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Reading or writing a local file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The profile has no registered plugin.
    #[error("Unsupported profile: {0}")]
    UnsupportedProfile(String),
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for PortError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let target = err
                .url()
                .map_or_else(|| "unknown url".to_owned(), ToString::to_string);
            PortError::Timeout(target)
        } else {
            PortError::Network(err)
        }
    }
}

#[async_trait]
/// Resolves the exact outline of a region.
pub trait BoundaryPort: Send + Sync {
    /// Look up the region and return its bounding extent and boundary geometry.
    ///
    /// The extent is computed from the geometry itself, never taken from the service.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] when no region matches and [`PortError::Service`]
    /// when the service fails or returns a malformed geometry.
    async fn resolve_boundaries(&self, region: &RegionId) -> Result<(Extent, Boundary), PortError>;
}

#[async_trait]
/// Fetches the aerial image a region is rendered on.
pub trait ImageryPort: Send + Sync {
    /// Fetch a raster covering a padded version of `extent`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::InvalidExtent`] for an extent without area, before any
    /// request is made, and [`PortError::Service`] when the service does not return an
    /// image.
    async fn fetch_base_image(&self, extent: &Extent) -> Result<BaseRaster, PortError>;
}

#[async_trait]
/// Region bookkeeping: which region to post next and what to say about it.
pub trait CatalogPort: Send + Sync {
    /// Text published alongside the image of a region.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] for an unknown region.
    async fn display_text(&self, region: &RegionId) -> Result<String, PortError>;

    /// Region that should be posted next, `None` once every region has been posted.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the catalog cannot be queried.
    async fn next_id(&self) -> Result<Option<RegionId>, PortError>;

    /// Location attached to the post of a region.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the catalog cannot be queried.
    async fn lon_lat(&self, _region: &RegionId) -> Result<Option<LonLat>, PortError> {
        Ok(None)
    }

    /// Called once a region has been published.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the bookkeeping cannot be stored.
    async fn after_publish(&self, _region: &RegionId, _status: &StatusId) -> Result<(), PortError> {
        Ok(())
    }

    /// Posting progress, `None` for catalogs that keep no record.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the catalog cannot be queried.
    async fn dump_posted(&self) -> Result<Option<PostedDump>, PortError> {
        Ok(None)
    }
}
