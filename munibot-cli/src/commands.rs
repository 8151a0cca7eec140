//! Command implementations on top of the munibot service.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};

use munibot_core::{
    config::Config,
    model::{PostedDump, ProfileId, RegionId},
    plugin::{ProfilePlugin, ProfileRegistry},
    ports::PortError,
    publish::MastodonPublisher,
    service::MunibotService,
};

type PluginBuilder = fn(Client, &Config) -> Result<ProfilePlugin, PortError>;

const PROFILES: [(&str, PluginBuilder); 4] = [
    ("cat", munibot_profile_cat::plugin),
    ("es", munibot_profile_es::plugin),
    ("fr", munibot_profile_fr::plugin),
    ("us", munibot_profile_us::plugin),
];

/// Runs the commands with every configured profile registered.
pub(crate) struct Runner {
    config: Config,
    client: Client,
    service: MunibotService,
    unavailable: BTreeMap<&'static str, PortError>,
}

impl Runner {
    pub(crate) fn new(config: Config) -> Result<Self> {
        let client = config.http_client().context("building the HTTP client")?;

        let mut plugins = Vec::new();
        let mut unavailable = BTreeMap::new();
        for (id, build) in PROFILES {
            match build(client.clone(), &config) {
                Ok(plugin) => plugins.push(plugin),
                Err(err) => {
                    warn!(profile = id, error = %err, "profile not available");
                    unavailable.insert(id, err);
                }
            }
        }

        let registry = Arc::new(ProfileRegistry::new(plugins));
        let service = MunibotService::new(registry, config.image.clone());
        Ok(Self {
            config,
            client,
            service,
            unavailable,
        })
    }

    fn profile_id(&self, profile: &str) -> Result<ProfileId> {
        if let Some(err) = self.unavailable.get(profile) {
            return Err(anyhow!("profile {profile} is not available: {err}"));
        }
        Ok(ProfileId::from(profile))
    }

    /// Region given on the command line, or the next one the profile wants posted.
    async fn region(&self, profile: &ProfileId, id: Option<String>) -> Result<Option<RegionId>> {
        match id {
            Some(id) => Ok(Some(RegionId(id))),
            None => self
                .service
                .next_id(profile)
                .await
                .with_context(|| format!("picking the next region of {profile}")),
        }
    }

    pub(crate) async fn create(
        &self,
        profile: &str,
        id: Option<String>,
        output_dir: Option<&Path>,
    ) -> Result<()> {
        let profile = self.profile_id(profile)?;
        let Some(region) = self.region(&profile, id).await? else {
            return no_more_regions();
        };

        let output = output_path(output_dir.unwrap_or(Path::new(".")), &region, self.extension());
        info!(%profile, %region, "start: create image");
        self.service
            .create_image(&profile, &region, Some(&output))
            .await
            .with_context(|| format!("creating the image of {region}"))?;
        Ok(())
    }

    pub(crate) async fn post(
        &self,
        profile: &str,
        id: Option<String>,
        output_dir: Option<&Path>,
    ) -> Result<()> {
        let profile = self.profile_id(profile)?;
        let settings = self.config.profile(&profile.0);
        let publisher =
            MastodonPublisher::from_settings(self.client.clone(), &profile.0, &settings)?;
        let Some(region) = self.region(&profile, id).await? else {
            return no_more_regions();
        };

        let output = output_dir.map(|dir| output_path(dir, &region, self.extension()));
        info!(%profile, %region, "start: send status");
        self.service
            .post(&profile, &region, &publisher, output.as_deref())
            .await
            .with_context(|| format!("posting {region}"))?;
        Ok(())
    }

    pub(crate) fn profiles(&self) -> Result<()> {
        let profiles = self.service.profiles();
        let mut out = io::stdout().lock();

        if profiles.is_empty() && self.unavailable.is_empty() {
            writeln!(out, "No profiles found :(")?;
            return Ok(());
        }
        let count = profiles.len();
        writeln!(out, "{count} {} found:", if count == 1 { "profile" } else { "profiles" })?;
        for meta in profiles {
            writeln!(out, "{} - {}", meta.id, meta.description)?;
        }
        for (id, err) in &self.unavailable {
            writeln!(out, "{id} - not available: {err}")?;
        }
        Ok(())
    }

    pub(crate) async fn dump(&self, profile: &str) -> Result<()> {
        let profile = self.profile_id(profile)?;
        let dump = self
            .service
            .dump(&profile)
            .await
            .with_context(|| format!("reading the posts of {profile}"))?
            .ok_or_else(|| anyhow!("profile {profile} keeps no record of its posts"))?;

        let settings = self.config.profile(&profile.0);
        let script = dump_script(
            settings.mastodon_api_base_url.as_deref(),
            settings.mastodon_account_name.as_deref(),
            &dump,
        )?;
        writeln!(io::stdout().lock(), "{script}")?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        self.config.image.output_format().extension()
    }
}

fn no_more_regions() -> Result<()> {
    writeln!(io::stdout().lock(), "No more images to create!")?;
    Ok(())
}

fn output_path(dir: &Path, region: &RegionId, extension: &str) -> PathBuf {
    dir.join(format!("{region}.{extension}"))
}

/// JavaScript snippet the map app loads to show what has been posted.
fn dump_script(host: Option<&str>, account: Option<&str>, dump: &PostedDump) -> Result<String> {
    let payload = json!({
        "mastodon": {
            "host": host,
            "account": account,
            "posts": dump.posts,
            "total": dump.total,
            "posted": dump.posted(),
        }
    });
    Ok(format!(
        "window.MunibotPosts = {}",
        serde_json::to_string(&payload)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_named_after_the_region() {
        let path = output_path(Path::new("out"), &RegionId::from("29155"), "jpg");
        assert_eq!(path, PathBuf::from("out/29155.jpg"));
    }

    #[test]
    fn dump_is_a_javascript_assignment() {
        let dump = PostedDump {
            total: 3,
            posts: BTreeMap::from([(String::from("29155"), String::from("1099"))]),
        };
        let script = dump_script(Some("https://mastodon.social"), Some("communebot"), &dump)
            .expect("serializable");

        let json = script
            .strip_prefix("window.MunibotPosts = ")
            .expect("assignment prefix");
        let value: serde_json::Value = serde_json::from_str(json).expect("valid json");
        assert_eq!(value["mastodon"]["host"], "https://mastodon.social");
        assert_eq!(value["mastodon"]["account"], "communebot");
        assert_eq!(value["mastodon"]["posts"]["29155"], "1099");
        assert_eq!(value["mastodon"]["total"], 3);
        assert_eq!(value["mastodon"]["posted"], 1);
    }

    #[tokio::test]
    async fn unconfigured_profiles_are_reported() {
        let runner = Runner::new(Config::default()).expect("runner builds");
        assert_eq!(runner.unavailable.len(), PROFILES.len());
        assert!(runner.profile_id("es").is_err(), "es has no database");
        assert!(runner.service.profiles().is_empty(), "nothing registered");
    }
}
