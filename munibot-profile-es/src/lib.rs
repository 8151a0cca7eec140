//! Profile for Spanish municipalities, rendered on the PNOA orthophoto.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use munibot_core::{
    catalog::{CatalogSchema, SqliteCatalog, TextLayout},
    config::Config,
    http::check_status,
    model::{Boundary, Extent, ProfileId, ProfileMeta, RegionId},
    plugin::ProfilePlugin,
    ports::{BoundaryPort, PortError},
    wms::{WmsImagery, WmsSource, WmsVersion},
};

mod gml;

pub use gml::parse_boundary;

const WFS_URL: &str = "https://contenido.ign.es/wfs-inspire/unidades-administrativas";
const WMS_URL: &str = "http://www.ign.es/wms-inspire/pnoa-ma";
const WMS_LAYER: &str = "OI.OrthoimageCoverage";
const NODATA: u8 = 0;

/// Boundary resolver querying the IGN administrative units WFS.
///
/// Region ids are INSPIRE national codes, e.g. `34092828089`.
pub struct IgnBoundaryPort {
    client: Client,
    url: String,
}

impl IgnBoundaryPort {
    /// Create a resolver bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_url(client, WFS_URL)
    }

    /// Create a resolver querying another WFS endpoint.
    #[must_use]
    pub fn with_url<U: Into<String>>(client: Client, url: U) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BoundaryPort for IgnBoundaryPort {
    async fn resolve_boundaries(&self, region: &RegionId) -> Result<(Extent, Boundary), PortError> {
        let feature_id = format!("AU_ADMINISTRATIVEUNIT_{region}");
        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("service", "WFS"),
                ("version", "2.0.0"),
                ("request", "GetFeature"),
                (
                    "storedQuery_id",
                    "urn:ogc:def:query:OGC-WFS::GetFeatureById",
                ),
                ("ID", feature_id.as_str()),
            ])
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(PortError::NotFound(region.to_string()));
        }
        let body = check_status(resp).await?.text().await?;

        let boundary = parse_boundary(&body)?;
        let extent = boundary
            .extent()
            .ok_or_else(|| PortError::NotFound(region.to_string()))?;
        debug!(%region, polygons = boundary.polygons().0.len(), "municipality outline parsed");

        Ok((extent, boundary))
    }
}

/// Catalog schema of the Spanish municipalities table.
///
/// `posted_column` keeps one status column per bot sharing the table.
#[must_use]
pub fn catalog_schema(posted_column: &str, wiki_lang: &str) -> CatalogSchema {
    CatalogSchema {
        table: String::from("munis_esp"),
        id_column: String::from("natcode"),
        posted_column: posted_column.to_owned(),
        lon_lat_columns: Some((String::from("lon"), String::from("lat"))),
        row_filter: None,
        text: TextLayout::NameWithContext {
            name: String::from("nameunit"),
            context: String::from("nameprov"),
            wiki_lang: wiki_lang.to_owned(),
        },
    }
}

/// Build the plugin bundle for the Spanish profile.
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
    let catalog = SqliteCatalog::open(
        settings.require_db_path(&meta.id.0)?,
        catalog_schema("mastodon_es", "es"),
    );

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
        id: ProfileId(String::from("es")),
        description: String::from("Municipios España (Ortofoto PNOA)"),
        nodata: Some(NODATA),
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use std::collections::HashMap;

    use super::*;

    const SQUARE: &str = r#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0"
        xmlns:gml="http://www.opengis.net/gml/3.2"><wfs:member><gml:Polygon><gml:exterior><gml:LinearRing>
        <gml:posList>42.0 1.0 42.0 2.0 43.0 2.0 43.0 1.0 42.0 1.0</gml:posList>
        </gml:LinearRing></gml:exterior></gml:Polygon></wfs:member></wfs:FeatureCollection>"#;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local port");
        let addr = listener.local_addr().expect("local address");
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}/wfs")
    }

    fn wfs() -> Router {
        Router::new().route(
            "/wfs",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                match params.get("ID").map(String::as_str) {
                    Some("AU_ADMINISTRATIVEUNIT_34092525003") => (AxumStatus::OK, SQUARE),
                    Some("AU_ADMINISTRATIVEUNIT_00000000000") => (
                        AxumStatus::OK,
                        r#"<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0"/>"#,
                    ),
                    _ => (AxumStatus::NOT_FOUND, "<ows:ExceptionReport/>"),
                }
            }),
        )
    }

    #[tokio::test]
    async fn resolves_outline_and_extent() {
        let port = IgnBoundaryPort::with_url(Client::new(), serve(wfs()).await);
        let (extent, boundary) = port
            .resolve_boundaries(&RegionId::from("34092525003"))
            .await
            .expect("known municipality");
        assert_eq!(boundary.polygons().0.len(), 1);
        assert_eq!(
            (extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y()),
            (1.0, 42.0, 2.0, 43.0)
        );
    }

    #[tokio::test]
    async fn missing_feature_is_not_found() {
        let port = IgnBoundaryPort::with_url(Client::new(), serve(wfs()).await);
        for id in ["99999999999", "00000000000"] {
            let result = port.resolve_boundaries(&RegionId::from(id)).await;
            assert!(matches!(result, Err(PortError::NotFound(_))), "{id}");
        }
    }

    #[tokio::test]
    async fn plugin_requires_a_database() {
        let result = plugin(Client::new(), &Config::default());
        assert!(matches!(result, Err(PortError::Config(_))), "no db_path");
    }

    #[tokio::test]
    async fn plugin_builds_from_configuration() {
        let config = Config::from_toml("[profiles.es]\ndb_path = \"munis.sqlite\"\n")
            .expect("valid config");
        let plugin = plugin(Client::new(), &config).expect("plugin builds");
        assert_eq!(plugin.meta.id, ProfileId::from("es"));
        assert_eq!(plugin.meta.nodata, Some(0));
    }
}
