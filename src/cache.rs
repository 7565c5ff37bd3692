/// Freshness bookkeeping and the resolved-stream cache.
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

pub const CATEGORY_REFRESH_KEY: &str = "category_last_refresh";
pub const PROGRAMME_REFRESH_KEY: &str = "programme_last_refresh";

pub fn episode_query_key(programme_id: &str) -> String {
    format!("{programme_id}-episode-last-query")
}

/// `true` when something last refreshed at `last` must be fetched again.
/// Never-refreshed data is always stale.
pub fn is_stale(last: Option<DateTime<Utc>>, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
    match last {
        Some(last) => now - last >= ttl,
        None => true,
    }
}

/// Last-successful-refresh timestamps, keyed by what was refreshed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RefreshState {
    stamps: BTreeMap<String, DateTime<Utc>>,
}

impl RefreshState {
    pub fn last(&self, key: &str) -> Option<DateTime<Utc>> {
        self.stamps.get(key).copied()
    }

    pub fn is_stale(&self, key: &str, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        is_stale(self.last(key), now, ttl)
    }

    /// Record a successful refresh. Timestamps never move backwards.
    pub fn mark(&mut self, key: &str, at: DateTime<Utc>) {
        self.stamps
            .entry(key.to_string())
            .and_modify(|t| *t = (*t).max(at))
            .or_insert(at);
    }
}

/// Resolved stream URLs keyed by `(identifier, transfer format)`.
///
/// An identifier is either a public episode id or the underlying stream id
/// it resolved through; both point at the same URL. Entries are dropped
/// together by `clear` since upstream URLs expire.
#[derive(Debug, Default)]
pub struct StreamCache {
    urls: HashMap<(String, String), String>,
}

impl StreamCache {
    pub fn get(&self, id: &str, format: &str) -> Option<&str> {
        self.urls
            .get(&(id.to_string(), format.to_string()))
            .map(String::as_str)
    }

    /// Store `url` under every identifier in `ids`. An existing entry is
    /// kept as is.
    pub fn insert(&mut self, ids: &[&str], format: &str, url: &str) {
        for id in ids {
            self.urls
                .entry((id.to_string(), format.to_string()))
                .or_insert_with(|| url.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }
}
