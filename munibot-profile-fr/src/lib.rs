//! Profile for French communes, rendered on the IGN orthophoto.

use std::sync::Arc;

use async_trait::async_trait;
use geojson::FeatureCollection;
use reqwest::Client;
use tracing::debug;

use munibot_core::{
    catalog::{CatalogSchema, SqliteCatalog, TextLayout},
    config::Config,
    http::fetch_json,
    model::{BaseRaster, Boundary, Extent, ProfileId, ProfileMeta, RegionId},
    plugin::ProfilePlugin,
    ports::{BoundaryPort, ImageryPort, PortError},
    wms::{PADDING_FRACTION, WmsSource, WmsVersion, fetch_wms_image},
};

const CADASTRE_URL: &str = "https://apicarto.ign.fr/api/cadastre/commune";
const WMS_URL: &str = "https://data.geopf.fr/wms-r/wms";
const WMS_LAYER: &str = "ORTHOIMAGERY.ORTHOPHOTOS";
const NODATA: u8 = 255;

/// ETRS89 only covers metropolitan France; overseas communes are requested in CRS:84.
const MAINLAND_CRS: &str = "EPSG:4258";
const OVERSEAS_CRS: &str = "CRS:84";

/// Boundary resolver querying the apicarto cadastre API by INSEE code.
pub struct CadastreBoundaryPort {
    client: Client,
    url: String,
}

impl CadastreBoundaryPort {
    /// Create a resolver bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_url(client, CADASTRE_URL)
    }

    /// Create a resolver querying another endpoint.
    #[must_use]
    pub fn with_url<U: Into<String>>(client: Client, url: U) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BoundaryPort for CadastreBoundaryPort {
    async fn resolve_boundaries(&self, region: &RegionId) -> Result<(Extent, Boundary), PortError> {
        let req = self
            .client
            .get(&self.url)
            .query(&[("code_insee", region.0.as_str())]);
        let collection: FeatureCollection = fetch_json(req, "commune geometry").await?;

        let mut polygons = Vec::new();
        for geometry in collection.features.iter().filter_map(|feature| feature.geometry.as_ref()) {
            polygons.extend(Boundary::from_geojson(geometry)?.polygons().0.iter().cloned());
        }
        let boundary = Boundary::from_polygons(polygons);
        let extent = boundary
            .extent()
            .ok_or_else(|| PortError::NotFound(format!("commune {region}")))?;
        debug!(%region, features = collection.features.len(), "commune outline parsed");

        Ok((extent, boundary))
    }
}

/// Whether a padded extent falls within metropolitan France.
#[must_use]
pub fn is_mainland(extent: &Extent) -> bool {
    extent.min_x() >= -7.30
        && extent.max_x() <= 11.0
        && extent.min_y() >= 39.0
        && extent.max_y() <= 52.0
}

/// Imagery port picking the request CRS from where the commune lies.
pub struct GeoplateformeImagery {
    client: Client,
    source: WmsSource,
    max_pixel_side: u32,
    nodata: Option<u8>,
}

impl GeoplateformeImagery {
    /// Create an imagery port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, max_pixel_side: u32, nodata: Option<u8>) -> Self {
        let source = WmsSource::new(WMS_URL, WMS_LAYER, WmsVersion::V1_3_0, MAINLAND_CRS)
            .with_format("image/geotiff")
            .with_header("User-Agent", "munibot-fr");
        Self {
            client,
            source,
            max_pixel_side,
            nodata,
        }
    }

    fn source_for(&self, extent: &Extent) -> WmsSource {
        let crs = if is_mainland(&extent.padded(PADDING_FRACTION)) {
            MAINLAND_CRS
        } else {
            OVERSEAS_CRS
        };
        self.source.clone().with_crs(crs)
    }
}

#[async_trait]
impl ImageryPort for GeoplateformeImagery {
    async fn fetch_base_image(&self, extent: &Extent) -> Result<BaseRaster, PortError> {
        let source = self.source_for(extent);
        debug!(crs = %source.crs, "picked request CRS");
        fetch_wms_image(&self.client, &source, extent, self.max_pixel_side, self.nodata).await
    }
}

/// Catalog schema of the French communes table.
#[must_use]
pub fn catalog_schema() -> CatalogSchema {
    CatalogSchema {
        table: String::from("fr"),
        id_column: String::from("insee"),
        posted_column: String::from("mastodon_fr"),
        lon_lat_columns: Some((String::from("lon"), String::from("lat"))),
        row_filter: None,
        text: TextLayout::NameWithContext {
            name: String::from("nom"),
            context: String::from("nom_departement"),
            wiki_lang: String::from("fr"),
        },
    }
}

/// Build the plugin bundle for the French profile.
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
    let catalog = SqliteCatalog::open(settings.require_db_path(&meta.id.0)?, catalog_schema());

    Ok(ProfilePlugin {
        boundary_port: Arc::new(CadastreBoundaryPort::new(client.clone())),
        imagery_port: Arc::new(GeoplateformeImagery::new(
            client,
            config.image.max_pixel_side,
            meta.nodata,
        )),
        catalog_port: Arc::new(catalog),
        meta,
    })
}

fn profile_meta() -> ProfileMeta {
    ProfileMeta {
        id: ProfileId(String::from("fr")),
        description: String::from("Communes de France (Orthophoto IGN)"),
        nodata: Some(NODATA),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    fn extent(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Extent {
        Extent::new(min_x, min_y, max_x, max_y).expect("valid extent")
    }

    #[test]
    fn mainland_communes_use_etrs89() {
        let imagery = GeoplateformeImagery::new(Client::new(), 1500, Some(NODATA));
        let paris = extent(2.22, 48.81, 2.47, 48.90);
        assert_eq!(imagery.source_for(&paris).crs, MAINLAND_CRS);
    }

    #[test]
    fn overseas_communes_use_crs84() {
        let imagery = GeoplateformeImagery::new(Client::new(), 1500, Some(NODATA));
        let saint_denis = extent(55.41, -20.93, 55.52, -20.87);
        assert_eq!(imagery.source_for(&saint_denis).crs, OVERSEAS_CRS);
    }

    #[test]
    fn padding_can_push_a_commune_off_the_mainland() {
        let near_border = extent(-7.29, 48.0, -6.89, 48.1);
        assert!(is_mainland(&near_border), "unpadded extent");
        assert!(!is_mainland(&near_border.padded(PADDING_FRACTION)), "padded extent");

        let imagery = GeoplateformeImagery::new(Client::new(), 1500, Some(NODATA));
        assert_eq!(imagery.source_for(&near_border).crs, OVERSEAS_CRS);
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local port");
        let addr = listener.local_addr().expect("local address");
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}/commune")
    }

    fn cadastre() -> Router {
        Router::new().route(
            "/commune",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let features = if params.get("code_insee").map(String::as_str) == Some("29155") {
                    serde_json::json!([{
                        "type": "Feature",
                        "properties": { "code_insee": "29155" },
                        "geometry": {
                            "type": "MultiPolygon",
                            "coordinates": [
                                [[[-5.14, 48.43], [-5.04, 48.43], [-5.04, 48.48], [-5.14, 48.43]]],
                                [[[-5.00, 48.40], [-4.99, 48.40], [-4.99, 48.41], [-5.00, 48.40]]]
                            ]
                        }
                    }])
                } else {
                    serde_json::json!([])
                };
                Json(serde_json::json!({ "type": "FeatureCollection", "features": features }))
            }),
        )
    }

    #[tokio::test]
    async fn commune_outline_is_read_from_geojson() {
        let port = CadastreBoundaryPort::with_url(Client::new(), serve(cadastre()).await);
        let (extent, boundary) = port
            .resolve_boundaries(&RegionId::from("29155"))
            .await
            .expect("known commune");
        assert_eq!(boundary.polygons().0.len(), 2);
        assert_eq!((extent.min_x(), extent.max_y()), (-5.14, 48.48));
    }

    #[tokio::test]
    async fn empty_collection_is_not_found() {
        let port = CadastreBoundaryPort::with_url(Client::new(), serve(cadastre()).await);
        let result = port.resolve_boundaries(&RegionId::from("00000")).await;
        assert!(matches!(result, Err(PortError::NotFound(_))), "no features");
    }
}
