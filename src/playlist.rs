//! M3U playlist rendering for IPTV players.
//!
//! Entries point back at this service rather than at the CDN, so a player
//! always receives a freshly resolved stream URL when it starts playback.

/// One playable episode in a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub programme_id: String,
    pub episode_id: String,
    pub title: String,
}

pub const CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Render `entries` as an extended M3U document whose stream and logo URLs
/// live under `http://{host}/bbc`.
pub fn render_playlist(host: &str, format: &str, entries: &[PlaylistEntry]) -> String {
    let mut m3u = String::from("#EXTM3U\n");

    for entry in entries {
        let programme = format!("http://{host}/bbc/programmes/{}", entry.programme_id);
        let title = attribute(&entry.title);

        m3u.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{title}\" tvg-logo=\"{programme}/poster\", {}\n",
            entry.episode_id, entry.title
        ));
        m3u.push_str(&format!(
            "{programme}/stream/{}/{format}\n",
            entry.episode_id
        ));
    }

    m3u
}

// Quotes would end the attribute early in most players' parsers.
fn attribute(value: &str) -> String {
    value.replace('"', "'")
}
