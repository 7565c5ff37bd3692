use anyhow::Context;
use serde::Deserialize;

use crate::catalog::CatalogSettings;

/// Application configuration, loaded from environment variables / .env.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Path to the SQLite database holding the persisted catalogue blobs.
    #[serde(default = "default_db_url")]
    pub database_url: String,

    /// Root of the iPlayer website. Category, episode and programme pages
    /// are addressed relative to this.
    #[serde(default = "default_iplayer_base_url")]
    pub iplayer_base_url: String,

    /// Media selector URL template. `{version}` and `{vid}` are substituted
    /// per lookup.
    #[serde(default = "default_media_selector_url")]
    pub media_selector_url: String,

    /// Maximum number of page fetches in flight during a batch.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Per-request timeout for upstream fetches.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User agent sent upstream. The BBC serves a cookie wall to obvious bots.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Optional HTTP proxy for all upstream requests.
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_category_ttl_secs")]
    pub category_ttl_secs: u64,

    #[serde(default = "default_programme_ttl_secs")]
    pub programme_ttl_secs: u64,

    #[serde(default = "default_episode_ttl_secs")]
    pub episode_ttl_secs: u64,

    /// How often the category list is re-scraped.
    #[serde(default = "default_category_refresh_secs")]
    pub category_refresh_secs: u64,

    /// How often the programme catalogue is re-scraped.
    #[serde(default = "default_programme_refresh_secs")]
    pub programme_refresh_secs: u64,

    /// Resolved stream URLs expire upstream, so the whole cache is dropped
    /// on this interval.
    #[serde(default = "default_stream_cache_clear_secs")]
    pub stream_cache_clear_secs: u64,

    /// Image recipe substituted into poster URL templates.
    #[serde(default = "default_poster_recipe")]
    pub poster_recipe: String,

    /// Transfer format used when a route does not name one.
    #[serde(default = "default_stream_format")]
    pub default_stream_format: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_db_url() -> String {
    "/data/iplayer-catalog.db".to_string()
}
fn default_iplayer_base_url() -> String {
    "https://www.bbc.co.uk/iplayer".to_string()
}
fn default_media_selector_url() -> String {
    "https://open.live.bbc.co.uk/mediaselector/6/select/version/{version}\
     /mediaset/iptv-native-hd/vpid/{vid}/format/json/cors/1"
        .to_string()
}
fn default_fetch_concurrency() -> usize {
    15
}
fn default_request_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36"
        .to_string()
}
fn default_category_ttl_secs() -> u64 {
    3600
}
fn default_programme_ttl_secs() -> u64 {
    3600
}
fn default_episode_ttl_secs() -> u64 {
    900
}
fn default_category_refresh_secs() -> u64 {
    86_400
}
fn default_programme_refresh_secs() -> u64 {
    1800
}
fn default_stream_cache_clear_secs() -> u64 {
    300
}
fn default_poster_recipe() -> String {
    "464x261".to_string()
}
fn default_stream_format() -> String {
    "dash".to_string()
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // .env is optional
        let _ = dotenvy::dotenv();

        envy::from_env::<AppConfig>().context("Failed to load config from environment")
    }

    /// The subset of settings the catalogue engine needs.
    pub fn catalog_settings(&self) -> CatalogSettings {
        CatalogSettings {
            iplayer_base_url: self.iplayer_base_url.trim_end_matches('/').to_string(),
            media_selector_url: self.media_selector_url.clone(),
            fetch_concurrency: self.fetch_concurrency.max(1),
            category_ttl: chrono::TimeDelta::seconds(self.category_ttl_secs as i64),
            programme_ttl: chrono::TimeDelta::seconds(self.programme_ttl_secs as i64),
            episode_ttl: chrono::TimeDelta::seconds(self.episode_ttl_secs as i64),
        }
    }
}
