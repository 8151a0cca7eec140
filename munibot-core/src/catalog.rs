//! SQLite region catalog: which region to post next, post texts and bookkeeping.

use std::path::Path;

use async_trait::async_trait;
use reqwest::Url;
use sqlx::Sqlite;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::model::{LonLat, PostedDump, RegionId, StatusId};
use crate::ports::{CatalogPort, PortError};

#[derive(Debug, Clone)]
/// How the post text of a region is put together from its row.
pub enum TextLayout {
    /// `"{name} ({context})"` followed by a link to the Wikipedia article named `name`.
    NameWithContext {
        /// Column holding the region name.
        name: String,
        /// Column holding the enclosing region, e.g. the province.
        context: String,
        /// Wikipedia language edition, e.g. `es`.
        wiki_lang: String,
    },
    /// `"{name}"` followed by a link stored in the table.
    NameWithLink {
        /// Column holding the region name.
        name: String,
        /// Column holding the link.
        link: String,
    },
}

#[derive(Debug, Clone)]
/// Table and columns a profile keeps its regions in.
pub struct CatalogSchema {
    /// Table name.
    pub table: String,
    /// Column holding the region id.
    pub id_column: String,
    /// Column holding the status id once the region is posted, NULL before.
    pub posted_column: String,
    /// Longitude and latitude columns, if the table has them.
    pub lon_lat_columns: Option<(String, String)>,
    /// SQL condition restricting the rows the profile posts, e.g. one region of a country.
    pub row_filter: Option<String>,
    /// Post text layout.
    pub text: TextLayout,
}

/// Region catalog stored in a SQLite database.
pub struct SqliteCatalog {
    pool: SqlitePool,
    schema: CatalogSchema,
}

impl SqliteCatalog {
    /// Catalog on the database at `path`. The connection is opened on first use.
    #[must_use]
    pub fn open(path: &Path, schema: CatalogSchema) -> Self {
        let options = SqliteConnectOptions::new().filename(path);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);
        Self::from_pool(pool, schema)
    }

    /// Catalog on an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool, schema: CatalogSchema) -> Self {
        Self { pool, schema }
    }

    fn not_found(&self, region: &RegionId) -> PortError {
        PortError::NotFound(format!("{region} in table {}", self.schema.table))
    }

    fn and_row_filter(&self) -> String {
        self.schema
            .row_filter
            .as_ref()
            .map(|filter| format!(" AND ({filter})"))
            .unwrap_or_default()
    }
}

#[async_trait]
impl CatalogPort for SqliteCatalog {
    async fn display_text(&self, region: &RegionId) -> Result<String, PortError> {
        let CatalogSchema {
            table, id_column, ..
        } = &self.schema;

        match &self.schema.text {
            TextLayout::NameWithContext {
                name,
                context,
                wiki_lang,
            } => {
                let sql = format!("SELECT {name}, {context} FROM {table} WHERE {id_column} = ?");
                let (name_value, context_value) =
                    sqlx::query_as::<Sqlite, (String, Option<String>)>(&sql)
                        .bind(region.0.as_str())
                        .fetch_optional(&self.pool)
                        .await?
                        .ok_or_else(|| self.not_found(region))?;

                let link = wiki_link(wiki_lang, &name_value)?;
                Ok(match context_value {
                    Some(context_value) => format!("{name_value} ({context_value})\n\n\n{link}"),
                    None => format!("{name_value}\n\n\n{link}"),
                })
            }
            TextLayout::NameWithLink { name, link } => {
                let sql = format!("SELECT {name}, {link} FROM {table} WHERE {id_column} = ?");
                let (name_value, link_value) = sqlx::query_as::<Sqlite, (String, String)>(&sql)
                    .bind(region.0.as_str())
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| self.not_found(region))?;
                Ok(format!("{name_value}\n\n\n{link_value}"))
            }
        }
    }

    async fn next_id(&self) -> Result<Option<RegionId>, PortError> {
        let CatalogSchema {
            table,
            id_column,
            posted_column,
            ..
        } = &self.schema;
        let sql = format!(
            "SELECT CAST({id_column} AS TEXT) FROM {table} \
             WHERE {posted_column} IS NULL{} ORDER BY RANDOM() LIMIT 1",
            self.and_row_filter()
        );
        let next = sqlx::query_scalar::<Sqlite, String>(&sql)
            .fetch_optional(&self.pool)
            .await?;
        debug!(table = %table, next = ?next, "picked next region");
        Ok(next.map(RegionId))
    }

    async fn lon_lat(&self, region: &RegionId) -> Result<Option<LonLat>, PortError> {
        let Some((lon, lat)) = &self.schema.lon_lat_columns else {
            return Ok(None);
        };
        let CatalogSchema {
            table, id_column, ..
        } = &self.schema;
        let sql = format!("SELECT {lon}, {lat} FROM {table} WHERE {id_column} = ?");
        let row = sqlx::query_as::<Sqlite, (Option<f64>, Option<f64>)>(&sql)
            .bind(region.0.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| self.not_found(region))?;

        Ok(match row {
            (Some(lon_value), Some(lat_value)) => Some(LonLat {
                lon: lon_value,
                lat: lat_value,
            }),
            _ => None,
        })
    }

    async fn after_publish(&self, region: &RegionId, status: &StatusId) -> Result<(), PortError> {
        let CatalogSchema {
            table,
            id_column,
            posted_column,
            ..
        } = &self.schema;
        let sql = format!("UPDATE {table} SET {posted_column} = ? WHERE {id_column} = ?");
        let result = sqlx::query(&sql)
            .bind(status.0.as_str())
            .bind(region.0.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found(region));
        }
        Ok(())
    }

    async fn dump_posted(&self) -> Result<Option<PostedDump>, PortError> {
        let CatalogSchema {
            table,
            id_column,
            posted_column,
            ..
        } = &self.schema;

        let row_filter = self.and_row_filter();
        let posts_sql = format!(
            "SELECT CAST({id_column} AS TEXT), CAST({posted_column} AS TEXT) \
             FROM {table} WHERE {posted_column} IS NOT NULL{row_filter}"
        );
        let posts = sqlx::query_as::<Sqlite, (String, String)>(&posts_sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        let count_sql = format!("SELECT COUNT(*) FROM {table} WHERE 1 = 1{row_filter}");
        let total = sqlx::query_scalar::<Sqlite, i64>(&count_sql)
            .fetch_one(&self.pool)
            .await?;

        Ok(Some(PostedDump {
            total: u64::try_from(total).unwrap_or_default(),
            posts,
        }))
    }
}

/// Link to the Wikipedia article titled `title`.
///
/// # Errors
///
/// Returns [`PortError::Internal`] for a language code that does not form a valid host.
pub fn wiki_link(lang: &str, title: &str) -> Result<String, PortError> {
    let mut url = Url::parse(&format!("https://{lang}.wikipedia.org/wiki/"))
        .map_err(|err| PortError::Internal(format!("bad wikipedia language {lang:?}: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| PortError::Internal("wikipedia url cannot have a path".to_owned()))?
        .pop_if_empty()
        .push(&title.replace(' ', "_"));
    Ok(url.to_string())
}
