//! Registry for all profile plugins and their ports.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{ProfileId, ProfileMeta};
use crate::ports::{BoundaryPort, CatalogPort, ImageryPort, PortError};

/// Collection of ports implementing a single profile.
pub struct ProfilePlugin {
    /// Static metadata describing the profile.
    pub meta: ProfileMeta,
    /// Implementation for resolving region boundaries.
    pub boundary_port: Arc<dyn BoundaryPort>,
    /// Implementation for fetching aerial imagery.
    pub imagery_port: Arc<dyn ImageryPort>,
    /// Implementation for post texts and bookkeeping.
    pub catalog_port: Arc<dyn CatalogPort>,
}

/// Registry that resolves plugins by profile identifier.
pub struct ProfileRegistry {
    plugins: HashMap<ProfileId, ProfilePlugin>,
}

impl ProfileRegistry {
    /// Build a registry from the provided plugin list.
    #[must_use]
    pub fn new(plugins: Vec<ProfilePlugin>) -> Self {
        let plugins_map = plugins
            .into_iter()
            .map(|plugin| (plugin.meta.id.clone(), plugin))
            .collect();
        Self {
            plugins: plugins_map,
        }
    }

    /// Metadata for all registered profiles, sorted by id.
    #[must_use]
    pub fn profiles(&self) -> Vec<ProfileMeta> {
        let mut metas: Vec<ProfileMeta> = self
            .plugins
            .values()
            .map(|plugin| plugin.meta.clone())
            .collect();
        metas.sort_by(|left, right| left.id.cmp(&right.id));
        metas
    }

    /// Look up the plugin for the given profile.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::UnsupportedProfile`] when no plugin is registered.
    pub fn plugin(&self, profile: &ProfileId) -> Result<&ProfilePlugin, PortError> {
        self.plugins
            .get(profile)
            .ok_or_else(|| PortError::UnsupportedProfile(profile.to_string()))
    }
}
