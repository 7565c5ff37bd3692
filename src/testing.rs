//! Test doubles for the network and persistence seams.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    db::BlobStore,
    fetch::{HttpClient, HttpResponse},
};

enum Scripted {
    Respond(u16, String),
    Fail,
}

/// Scripted `HttpClient`. Unscripted URLs answer 404.
#[derive(Default)]
pub struct FakeClient {
    routes: Mutex<HashMap<String, Scripted>>,
    log: Mutex<Vec<String>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<String>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond(status, body.into()));
    }

    pub fn respond_json(&self, url: &str, body: &serde_json::Value) {
        self.respond(url, 200, body.to_string());
    }

    pub fn fail(&self, url: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Fail);
    }

    pub fn request_count(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn hits(&self, url: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for FakeClient {
    async fn get(&self, url: &str) -> anyhow::Result<HttpResponse> {
        self.log.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let routes = self.routes.lock().unwrap();
        match routes.get(url) {
            Some(Scripted::Respond(status, body)) => Ok(HttpResponse {
                status: *status,
                body: body.clone(),
            }),
            Some(Scripted::Fail) => Err(anyhow::anyhow!("connection reset: {url}")),
            None => Ok(HttpResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

/// In-memory `BlobStore`.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, serde_json::Value>>,
    saves: AtomicUsize,
    save_delays: Mutex<VecDeque<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn put(&self, key: &str, value: serde_json::Value) {
        self.blobs.lock().unwrap().insert(key.to_string(), value);
    }

    /// Delay the next saves, in order, before they land.
    pub fn with_save_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.save_delays.lock().unwrap().extend(delays);
        self
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, blob: &serde_json::Value) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let delay = self.save_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.put(key, blob.clone());
        Ok(())
    }
}
