use super::{
    ErrorBody, IndexFileRequest, IndexingStatus, ReindexRequest, SearchRequest, SimilarRequest,
    StatusBody, StatusResponse, API_PREFIX,
};
use crate::indexer::SearchHit;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);
const REINDEX_TIMEOUT: Duration = Duration::from_secs(1800);

/// Blocking HTTP client for the daemon API, used by the short-lived CLI.
pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
    reindex_agent: ureq::Agent,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: build_agent(DEFAULT_TIMEOUT),
            reindex_agent: build_agent(REINDEX_TIMEOUT),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("request to {url} failed - is the daemon running?"))?;
        parse_response(response)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        agent: &ureq::Agent,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = agent
            .post(&url)
            .send_json(body)
            .with_context(|| format!("request to {url} failed - is the daemon running?"))?;
        parse_response(response)
    }

    /// True when the daemon answers its health endpoint.
    pub fn health(&self) -> bool {
        self.get::<StatusBody>("/health")
            .map(|body| body.status == "ok")
            .unwrap_or(false)
    }

    pub fn status(&self) -> Result<StatusResponse> {
        self.get("/status")
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.post(&self.agent, "/search/query", request)
    }

    pub fn similar(&self, request: &SimilarRequest) -> Result<Vec<SearchHit>> {
        self.post(&self.agent, "/search/similar", request)
    }

    pub fn index_file(&self, file_path: &str, force: bool) -> Result<()> {
        let request = IndexFileRequest {
            file_path: file_path.to_string(),
            force,
        };
        let _: StatusBody = self.post(&self.agent, "/index/file", &request)?;
        Ok(())
    }

    pub fn reindex(&self, force: bool) -> Result<()> {
        let request = ReindexRequest { force };
        let body: StatusBody = self.post(&self.reindex_agent, "/index/all", &request)?;
        if body.status != "reindexing_started" {
            return Err(anyhow!("unexpected response: {}", body.status));
        }
        Ok(())
    }

    pub fn cancel_reindex(&self) -> Result<()> {
        let url = self.url("/index/all");
        let response = self
            .agent
            .delete(&url)
            .call()
            .with_context(|| format!("request to {url} failed - is the daemon running?"))?;
        let _: StatusBody = parse_response(response)?;
        Ok(())
    }

    pub fn indexing_status(&self) -> Result<IndexingStatus> {
        self.get("/index/status")
    }
}

/// Decode a success body, or surface the server's `{"error": ...}` message.
fn parse_response<T: DeserializeOwned>(mut response: ureq::http::Response<ureq::Body>) -> Result<T> {
    let status = response.status();
    let text = response
        .body_mut()
        .read_to_string()
        .context("failed to read response body")?;

    if !status.is_success() {
        if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
            return Err(anyhow!(body.error));
        }
        return Err(anyhow!("server returned {status}: {text}"));
    }

    serde_json::from_str(&text).with_context(|| format!("failed to parse response: {text}"))
}
