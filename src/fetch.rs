//! Upstream HTTP access.
//!
//! `HttpClient` is the seam between the catalogue and the network; the
//! catalogue only ever sees a status and a body. `fetch_all` runs a batch of
//! GETs behind a counting gate so a large catalogue refresh never has more
//! than `ceiling` requests in flight, and every request settles to a
//! `FetchOutcome` whether it succeeded or not.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET `url`. Non-2xx statuses are returned, not raised; only transport
    /// failures are errors.
    async fn get(&self, url: &str) -> anyhow::Result<HttpResponse>;
}

/// `HttpClient` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str, timeout: Duration, proxy: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent);

        if let Some(p) = proxy {
            if !p.is_empty() {
                builder = builder.proxy(reqwest::Proxy::all(p).context("invalid proxy URL")?);
            }
        }

        let client = builder.build().context("build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> anyhow::Result<HttpResponse> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;
        Ok(HttpResponse { status, body })
    }
}

// ── Batches ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    /// The full URL including query parameters. Outcomes are reported under
    /// this string so callers can correlate them.
    pub fn full_url(&self) -> anyhow::Result<String> {
        if self.query.is_empty() {
            return Ok(self.url.clone());
        }
        let url = reqwest::Url::parse_with_params(&self.url, &self.query)
            .with_context(|| format!("invalid URL {}", self.url))?;
        Ok(url.to_string())
    }
}

/// How a single request settled. `status` is 0 when no response arrived.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub url: String,
    pub ok: bool,
    pub status: u16,
    pub body: String,
}

/// Issue one GET, folding every failure into the outcome.
pub async fn fetch_one(client: &dyn HttpClient, request: &FetchRequest) -> FetchOutcome {
    let url = match request.full_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Skipping request: {e:#}");
            return FetchOutcome {
                url: request.url.clone(),
                ok: false,
                status: 0,
                body: String::new(),
            };
        }
    };

    tracing::debug!("Grabbing: {url}");
    match client.get(&url).await {
        Ok(resp) => FetchOutcome {
            ok: resp.is_success(),
            status: resp.status,
            body: resp.body,
            url,
        },
        Err(e) => {
            tracing::warn!("Request failed: {e:#}");
            FetchOutcome {
                url,
                ok: false,
                status: 0,
                body: String::new(),
            }
        }
    }
}

/// Run every request with at most `ceiling` in flight. Returns once all
/// requests have settled; one failure never affects its siblings.
pub async fn fetch_all(
    client: &dyn HttpClient,
    requests: Vec<FetchRequest>,
    ceiling: usize,
) -> Vec<FetchOutcome> {
    let gate = Semaphore::new(ceiling.max(1));
    let gate = &gate;

    let fetches = requests.into_iter().map(|request| async move {
        // Never closed; acquire cannot fail while the batch runs.
        let _permit = gate.acquire().await.ok();
        fetch_one(client, &request).await
    });

    let outcomes = futures_util::future::join_all(fetches).await;

    let failed = outcomes.iter().filter(|o| !o.ok).count();
    if failed > 0 {
        tracing::warn!("{failed} of {} fetches failed", outcomes.len());
    }
    outcomes
}
