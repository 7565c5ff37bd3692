use serde::{Deserialize, Serialize};

// ── Catalogue records ─────────────────────────────────────────────────────────

/// A browsable iPlayer category (`news`, `drama-and-soaps`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    /// Number of a-z listing pages. `None` when the pagination control could
    /// not be read during discovery.
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Programme {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Image URL containing a `{recipe}` size placeholder.
    pub image_poster: String,
    pub category: String,
    pub live: bool,
    /// Filled lazily by the episode resolver, never during catalogue refresh.
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Programme {
    pub fn poster_url(&self, recipe: &str) -> Option<String> {
        if self.image_poster.is_empty() {
            return None;
        }
        Some(self.image_poster.replace("{recipe}", recipe))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Episode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub live: bool,
}

// ── Embedded Redux state (upstream shapes) ────────────────────────────────────
//
// Every field the site might drop is optional. Lists of entities are kept as
// raw JSON and decoded one at a time so a single odd entity cannot sink the
// whole page.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReduxState {
    pub navigation: Option<Navigation>,
    pub entities: Option<Entities>,
    pub header: Option<Header>,
    pub versions: Option<Vec<Version>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Navigation {
    pub items: Vec<NavItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavItem {
    pub id: String,
    pub sub_items: Vec<NavItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Entities {
    /// Programme tiles on a category listing page.
    pub elements: Vec<serde_json::Value>,
    /// Episode tiles on a programme's episode index page.
    pub results: Vec<serde_json::Value>,
    pub category: Option<EntityCategory>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityCategory {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Header {
    pub available_slices: Vec<SeriesSlice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeriesSlice {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Version {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub service_id: Option<String>,
}

impl Version {
    /// The identifier the media selector understands. Simulcasts resolve
    /// through their broadcast service, everything else through the version.
    pub fn stream_id(&self) -> Option<&str> {
        match self.kind.as_deref() {
            Some("simulcast") => self.service_id.as_deref(),
            _ => self.id.as_deref(),
        }
    }
}

/// A programme tile from a category listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProgrammeElement {
    pub id: Option<String>,
    pub title: Option<String>,
    pub synopses: Option<Synopses>,
    pub images: Option<Images>,
    pub live: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Synopses {
    pub small: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Images {
    pub standard: Option<String>,
}

/// An entry of `entities.results` on an episode index page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EpisodeResult {
    pub episode: Option<EpisodeEntity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EpisodeEntity {
    pub id: Option<String>,
    pub title: Option<TextLabel>,
    pub subtitle: Option<Subtitle>,
    pub synopsis: Option<Synopses>,
    pub live: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TextLabel {
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Subtitle {
    pub default: Option<String>,
    pub slice: Option<String>,
}

// ── Media selector manifest ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaSet {
    pub error: Option<serde_json::Value>,
    pub media: Option<Vec<Media>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Media {
    pub kind: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub connection: Vec<Connection>,
}

impl Media {
    pub fn is_video(&self) -> bool {
        self.kind.as_deref() == Some("video")
            || self
                .mime_type
                .as_deref()
                .is_some_and(|t| t.starts_with("video/"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connection {
    pub transfer_format: Option<String>,
    pub href: Option<String>,
}
