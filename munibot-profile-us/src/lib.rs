//! Profile for US counties, rendered on The National Map orthoimagery.

use std::sync::Arc;

use async_trait::async_trait;
use geojson::FeatureCollection;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use munibot_core::{
    catalog::{CatalogSchema, SqliteCatalog, TextLayout},
    config::Config,
    http::fetch_json,
    model::{Boundary, Extent, ProfileId, ProfileMeta, RegionId},
    plugin::ProfilePlugin,
    ports::{BoundaryPort, PortError},
    wms::{WmsImagery, WmsSource, WmsVersion},
};

const COUNTIES_URL: &str =
    "https://cartowfs.nationalmap.gov/arcgis/rest/services/govunits/MapServer/35/query";
const WMS_URL: &str =
    "https://basemap.nationalmap.gov/arcgis/services/USGSImageryOnly/MapServer/WMSServer";
const WMS_LAYER: &str = "0";

/// Boundary resolver querying the county layer of The National Map by FIPS code.
pub struct NationalMapBoundaryPort {
    client: Client,
    url: String,
}

impl NationalMapBoundaryPort {
    /// Create a resolver bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_url(client, COUNTIES_URL)
    }

    /// Create a resolver querying another ArcGIS REST layer.
    #[must_use]
    pub fn with_url<U: Into<String>>(client: Client, url: U) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl BoundaryPort for NationalMapBoundaryPort {
    async fn resolve_boundaries(&self, region: &RegionId) -> Result<(Extent, Boundary), PortError> {
        // The id ends up inside a SQL-like where clause.
        if region.0.is_empty() || !region.0.chars().all(|digit| digit.is_ascii_digit()) {
            return Err(PortError::NotFound(format!("county {region}")));
        }

        let where_clause = format!("STCO_FIPSCODE='{region}'");
        let req = self.client.get(&self.url).query(&[
            ("where", where_clause.as_str()),
            ("f", "geojson"),
            ("geometryType", "esriGeometryPolygon"),
            ("outFields", "STCO_FIPSCODE"),
            ("returnGeometry", "true"),
            ("geometryPrecision", "6"),
        ]);
        let body: Value = fetch_json(req, "county geometry").await?;

        // ArcGIS reports failures with a 200 status and an `error` member.
        if let Some(error) = body.get("error") {
            return Err(PortError::Service(format!(
                "county query for {region} failed: {error}"
            )));
        }
        let collection: FeatureCollection = serde_json::from_value(body)
            .map_err(|err| PortError::Service(format!("unexpected county response: {err}")))?;

        let geometry = collection
            .features
            .iter()
            .find_map(|feature| feature.geometry.as_ref())
            .ok_or_else(|| PortError::NotFound(format!("county {region}")))?;
        let boundary = Boundary::from_geojson(geometry)?;
        let extent = boundary
            .extent()
            .ok_or_else(|| PortError::Service(format!("county {region} has an empty geometry")))?;
        debug!(%region, polygons = boundary.polygons().0.len(), "county outline parsed");

        Ok((extent, boundary))
    }
}

/// Catalog schema of the US counties table, which stores its own article links.
#[must_use]
pub fn catalog_schema() -> CatalogSchema {
    CatalogSchema {
        table: String::from("us"),
        id_column: String::from("geoid"),
        posted_column: String::from("mastodon_us"),
        lon_lat_columns: None,
        row_filter: None,
        text: TextLayout::NameWithLink {
            name: String::from("fullname"),
            link: String::from("wikilink"),
        },
    }
}

/// Build the plugin bundle for the US profile.
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

    let source = WmsSource::new(WMS_URL, WMS_LAYER, WmsVersion::V1_3_0, "CRS:84")
        .with_format("image/geotiff");
    let catalog = SqliteCatalog::open(settings.require_db_path(&meta.id.0)?, catalog_schema());

    Ok(ProfilePlugin {
        boundary_port: Arc::new(NationalMapBoundaryPort::new(client.clone())),
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
        id: ProfileId(String::from("us")),
        description: String::from("US Counties Bot (Orthoimagery The National Map)"),
        nodata: None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};

    use super::*;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local port");
        let addr = listener.local_addr().expect("local address");
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}/query")
    }

    fn counties() -> Router {
        Router::new().route(
            "/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let clause = params.get("where").map(String::as_str);
                Json(match clause {
                    Some("STCO_FIPSCODE='06075'") => serde_json::json!({
                        "type": "FeatureCollection",
                        "features": [{
                            "type": "Feature",
                            "properties": { "STCO_FIPSCODE": "06075" },
                            "geometry": {
                                "type": "Polygon",
                                "coordinates": [[
                                    [-122.51, 37.70], [-122.35, 37.70], [-122.35, 37.83],
                                    [-122.51, 37.83], [-122.51, 37.70]
                                ]]
                            }
                        }]
                    }),
                    Some("STCO_FIPSCODE='99999'") => serde_json::json!({
                        "error": { "code": 400, "message": "Unable to complete operation." }
                    }),
                    _ => serde_json::json!({ "type": "FeatureCollection", "features": [] }),
                })
            }),
        )
    }

    #[tokio::test]
    async fn county_outline_is_read_from_geojson() {
        let port = NationalMapBoundaryPort::with_url(Client::new(), serve(counties()).await);
        let (extent, _) = port
            .resolve_boundaries(&RegionId::from("06075"))
            .await
            .expect("known county");
        assert_eq!(
            (extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y()),
            (-122.51, 37.70, -122.35, 37.83)
        );
    }

    #[tokio::test]
    async fn error_member_is_a_service_error() {
        let port = NationalMapBoundaryPort::with_url(Client::new(), serve(counties()).await);
        let result = port.resolve_boundaries(&RegionId::from("99999")).await;
        assert!(matches!(result, Err(PortError::Service(_))), "ArcGIS error");
    }

    #[tokio::test]
    async fn unknown_or_malformed_ids_are_not_found() {
        let port = NationalMapBoundaryPort::with_url(Client::new(), serve(counties()).await);
        for id in ["01001", "06075' OR '1'='1", ""] {
            let result = port.resolve_boundaries(&RegionId::from(id)).await;
            assert!(matches!(result, Err(PortError::NotFound(_))), "{id:?}");
        }
    }

    #[test]
    fn counties_have_no_location() {
        let schema = catalog_schema();
        assert!(schema.lon_lat_columns.is_none(), "no lon/lat columns");
        assert!(matches!(schema.text, TextLayout::NameWithLink { .. }), "stored links");
    }
}
