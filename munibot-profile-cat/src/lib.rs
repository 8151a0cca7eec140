//! Profile for Catalan municipalities, rendered on the ICGC orthophoto.
//!
//! Outlines and region data are shared with the Spanish profile. Posts name the
//! comarca instead of the province and are tracked in their own column.

use std::sync::Arc;

use reqwest::Client;

use munibot_core::{
    catalog::{CatalogSchema, SqliteCatalog, TextLayout},
    config::Config,
    model::{ProfileId, ProfileMeta},
    plugin::ProfilePlugin,
    ports::PortError,
    wms::{WmsImagery, WmsSource, WmsVersion},
};
use munibot_profile_es::IgnBoundaryPort;

const WMS_URL: &str = "https://geoserveis.icgc.cat/servei/catalunya/orto-territorial/wms";
const WMS_LAYER: &str = "ortofoto_color_vigent";
const NODATA: u8 = 0;

/// National codes of Catalan municipalities carry the autonomous community code `09`
/// after the country prefix.
const CATALONIA_ONLY: &str = "substr(natcode, 3, 2) = '09'";

/// Catalog schema: the Spanish table restricted to Catalonia, with its own status column.
#[must_use]
pub fn catalog_schema() -> CatalogSchema {
    CatalogSchema {
        row_filter: Some(CATALONIA_ONLY.to_owned()),
        text: TextLayout::NameWithContext {
            name: String::from("nameunit"),
            context: String::from("namecomar"),
            wiki_lang: String::from("ca"),
        },
        ..munibot_profile_es::catalog_schema("mastodon_cat", "ca")
    }
}

/// Build the plugin bundle for the Catalan profile.
///
/// # Errors
///
/// Returns [`PortError::Config`] when the profile has no database configured.
pub fn plugin(client: Client, config: &Config) -> Result<ProfilePlugin, PortError> {
    let defaults = profile_meta();
    let settings = config.profile(&defaults.id.0);
    let meta = ProfileMeta {
        nodata: settings.nodata_value.or(defaults.nodata),
        ..defaults
    };

    let source = WmsSource::new(WMS_URL, WMS_LAYER, WmsVersion::V1_3_0, "EPSG:4258");
    let catalog = SqliteCatalog::open(settings.require_db_path(&meta.id.0)?, catalog_schema());

    Ok(ProfilePlugin {
        boundary_port: Arc::new(IgnBoundaryPort::new(client.clone())),
        imagery_port: Arc::new(WmsImagery::new(
            client,
            source,
            config.image.max_pixel_side,
            meta.nodata,
        )),
        catalog_port: Arc::new(catalog),
        meta,
    })
}

fn profile_meta() -> ProfileMeta {
    ProfileMeta {
        id: ProfileId(String::from("cat")),
        description: String::from("Municipis Catalunya (Ortofoto ICGC)"),
        nodata: Some(NODATA),
    }
}
