//! Configuration file model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::compose::OutputFormat;
use crate::ports::PortError;
use crate::wms::DEFAULT_MAX_PIXEL_SIDE;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Whole configuration file.
pub struct Config {
    /// Rendering options shared by all profiles.
    pub image: ImageConfig,
    /// HTTP client options.
    pub http: HttpConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Per-profile settings, keyed by profile id.
    pub profiles: HashMap<String, ProfileSettings>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Image encodings selectable in the configuration file.
pub enum ImageFormatKind {
    /// JPEG, see [`ImageConfig::jpeg_quality`].
    #[default]
    Jpeg,
    /// PNG.
    Png,
    /// TIFF.
    Tiff,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Rendering options.
pub struct ImageConfig {
    /// Opacity of the overlay outside the boundary, 0-100.
    pub opacity: u8,
    /// Length of the longer image side in pixels.
    pub max_pixel_side: u32,
    /// Output encoding.
    pub format: ImageFormatKind,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            opacity: 70,
            max_pixel_side: DEFAULT_MAX_PIXEL_SIDE,
            format: ImageFormatKind::Jpeg,
            jpeg_quality: 90,
        }
    }
}

impl ImageConfig {
    /// Encoder settings for the composite image.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        match self.format {
            ImageFormatKind::Jpeg => OutputFormat::Jpeg {
                quality: self.jpeg_quality,
            },
            ImageFormatKind::Png => OutputFormat::Png,
            ImageFormatKind::Tiff => OutputFormat::Tiff,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// HTTP client options.
pub struct HttpConfig {
    /// Timeout of a whole request, in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header sent to every service.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: String::from("munibot/0.1"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Log output options.
pub struct LoggingConfig {
    /// Default filter, used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Settings of a single profile.
pub struct ProfileSettings {
    /// SQLite database holding the profile's regions.
    pub db_path: Option<PathBuf>,
    /// Overrides the profile's no-data value.
    pub nodata_value: Option<u8>,
    /// Mastodon instance, e.g. `https://mastodon.social`.
    pub mastodon_api_base_url: Option<String>,
    /// Access token of the bot account.
    pub mastodon_access_token: Option<String>,
    /// Account name, only used in dumps.
    pub mastodon_account_name: Option<String>,
}

impl ProfileSettings {
    /// Path of the profile database.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] when `db_path` is not set.
    pub fn require_db_path(&self, profile: &str) -> Result<&Path, PortError> {
        self.db_path
            .as_deref()
            .ok_or_else(|| PortError::Config(format!("profiles.{profile}.db_path is not set")))
    }
}

impl Config {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] for invalid TOML or out of range values.
    pub fn from_toml(content: &str) -> Result<Self, PortError> {
        let config: Config =
            toml::from_str(content).map_err(|err| PortError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Config`] when the file is missing or invalid.
    pub fn load(path: &Path) -> Result<Self, PortError> {
        if !path.exists() {
            return Err(PortError::Config(format!(
                "configuration file {} not found, create it or pass its location with --config",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), PortError> {
        if self.image.opacity > 100 {
            return Err(PortError::Config(format!(
                "image.opacity must be between 0 and 100, got {}",
                self.image.opacity
            )));
        }
        if self.image.max_pixel_side == 0 {
            return Err(PortError::Config(
                "image.max_pixel_side must be positive".to_owned(),
            ));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(PortError::Config(format!(
                "image.jpeg_quality must be between 1 and 100, got {}",
                self.image.jpeg_quality
            )));
        }
        Ok(())
    }

    /// Settings of a profile, defaults when the file has none.
    #[must_use]
    pub fn profile(&self, id: &str) -> ProfileSettings {
        self.profiles.get(id).cloned().unwrap_or_default()
    }

    /// HTTP client shared by every port, with the configured timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the client cannot be built.
    pub fn http_client(&self) -> Result<Client, PortError> {
        Ok(Client::builder()
            .user_agent(self.http.user_agent.as_str())
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .build()?)
    }
}
