//! High-level service facade combining all profiles.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::compose::{EncodedImage, composite};
use crate::config::ImageConfig;
use crate::mask::build_mask;
use crate::model::{PostedDump, ProfileId, ProfileMeta, RegionId, StatusId};
use crate::plugin::ProfileRegistry;
use crate::ports::PortError;
use crate::publish::{Post, Publisher};

/// Public entry point for rendering and publishing regions.
pub struct MunibotService {
    registry: Arc<ProfileRegistry>,
    image: ImageConfig,
}

impl MunibotService {
    /// Create a new service bound to the provided registry.
    #[must_use]
    pub fn new(registry: Arc<ProfileRegistry>, image: ImageConfig) -> Self {
        Self { registry, image }
    }

    /// All available profiles.
    #[must_use]
    pub fn profiles(&self) -> Vec<ProfileMeta> {
        self.registry.profiles()
    }

    /// Render the aerial image of a region with everything outside its boundary
    /// whitened, and write it to `output` when given.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the profile is unsupported, a service call fails,
    /// the image cannot be encoded or the file cannot be written.
    pub async fn create_image(
        &self,
        profile: &ProfileId,
        region: &RegionId,
        output: Option<&Path>,
    ) -> Result<EncodedImage, PortError> {
        let plugin = self.registry.plugin(profile)?;
        let started = Instant::now();

        let (extent, boundary) = plugin.boundary_port.resolve_boundaries(region).await?;
        debug!(%region, ?extent, polygons = boundary.polygons().0.len(), "boundary resolved");

        let raster = plugin.imagery_port.fetch_base_image(&extent).await?;
        debug!(%region, width = raster.width(), height = raster.height(), "imagery fetched");

        let mask = build_mask(&raster, &boundary, raster.nodata);
        let image = composite(&raster, &mask, self.image.opacity, self.image.output_format())?;

        if let Some(path) = output {
            image.write_to(path)?;
            info!(%profile, %region, path = %path.display(), "image written");
        }
        info!(
            %profile,
            %region,
            format = %image.format,
            elapsed_ms = started.elapsed().as_millis(),
            "image created"
        );
        Ok(image)
    }

    /// Region the profile should post next, `None` when all are done.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the profile is unsupported or the catalog fails.
    pub async fn next_id(&self, profile: &ProfileId) -> Result<Option<RegionId>, PortError> {
        let plugin = self.registry.plugin(profile)?;
        plugin.catalog_port.next_id().await
    }

    /// Render a region, publish it and record the publication in the catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if any stage fails. Nothing is recorded unless the
    /// publication succeeded.
    pub async fn post(
        &self,
        profile: &ProfileId,
        region: &RegionId,
        publisher: &dyn Publisher,
        output: Option<&Path>,
    ) -> Result<StatusId, PortError> {
        let plugin = self.registry.plugin(profile)?;
        let text = plugin.catalog_port.display_text(region).await?;
        let image = self.create_image(profile, region, output).await?;
        let location = plugin.catalog_port.lon_lat(region).await?;

        let status = publisher
            .publish(&Post {
                region: region.clone(),
                text,
                image,
                location,
            })
            .await?;
        plugin.catalog_port.after_publish(region, &status).await?;
        info!(%profile, %region, %status, "region posted");
        Ok(status)
    }

    /// Posting progress of a profile.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] if the profile is unsupported or the catalog fails.
    pub async fn dump(&self, profile: &ProfileId) -> Result<Option<PostedDump>, PortError> {
        let plugin = self.registry.plugin(profile)?;
        plugin.catalog_port.dump_posted().await
    }
}
