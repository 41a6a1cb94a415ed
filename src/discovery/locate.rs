//! Client for the M-Lab Locate v2 service

use super::{EndpointPair, QueryParams, ServerDiscovery};
use crate::defaults::LOCATE_TIMEOUT;
use crate::error::{AppError, Result};
use crate::types::{Direction, Scheme};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Deserialize)]
struct LocateResponse {
    results: Option<Vec<LocateResult>>,
}

#[derive(Debug, Clone, Deserialize)]
struct LocateResult {
    #[serde(default)]
    machine: Option<String>,
    #[serde(default)]
    urls: HashMap<String, String>,
}

/// Looks up nearby servers and hands them out one at a time. Unused results
/// are cached; the service is queried again once the cache is empty.
#[derive(Debug)]
pub struct LocateClient {
    client: Client,
    locate_url: Url,
    scheme: Scheme,
    params: QueryParams,
    cache: Mutex<VecDeque<LocateResult>>,
}

impl LocateClient {
    pub fn new(locate_url: &str, scheme: Scheme, params: QueryParams) -> Result<Self> {
        Self::with_timeout(locate_url, scheme, params, LOCATE_TIMEOUT)
    }

    pub fn with_timeout(locate_url: &str, scheme: Scheme, params: QueryParams, timeout: Duration) -> Result<Self> {
        let locate_url = Url::parse(locate_url)
            .map_err(|e| AppError::config(format!("Invalid locate URL '{}': {}", locate_url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::PKG_NAME, crate::VERSION))
            .build()
            .map_err(|e| AppError::discovery(format!("Failed to create Locate client: {}", e)))?;

        Ok(Self {
            client,
            locate_url,
            scheme,
            params,
            cache: Mutex::new(VecDeque::new()),
        })
    }

    /// Results still cached from the last query
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn query(&self) -> Result<Vec<LocateResult>> {
        let mut url = self.locate_url.clone();
        url.query_pairs_mut().extend_pairs(self.params.identity());

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AppError::discovery(format!("Locate request to '{}' failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::discovery(format!(
                "Locate request failed: HTTP {} for '{}'",
                response.status(),
                self.locate_url
            )));
        }

        let body: LocateResponse = response.json().await?;
        match body.results {
            Some(results) if !results.is_empty() => Ok(results),
            Some(_) => Err(AppError::discovery("Locate returned no servers")),
            None => Err(AppError::discovery(format!(
                "Could not understand response from {}",
                self.locate_url
            ))),
        }
    }

    fn endpoints_from(&self, result: &LocateResult) -> Result<EndpointPair> {
        let lookup = |direction: Direction| -> Result<Url> {
            let key = format!("{}://{}", self.scheme, direction.path());
            let raw = result.urls.get(&key).ok_or_else(|| {
                AppError::discovery(format!(
                    "Locate result for {} has no '{}' URL",
                    result.machine.as_deref().unwrap_or("unknown machine"),
                    key
                ))
            })?;
            let mut url = Url::parse(raw)
                .map_err(|e| AppError::discovery(format!("Locate returned invalid URL '{}': {}", raw, e)))?;
            self.params.apply(&mut url);
            Ok(url)
        };

        Ok(EndpointPair::new(lookup(Direction::Download)?, lookup(Direction::Upload)?))
    }
}

#[async_trait]
impl ServerDiscovery for LocateClient {
    async fn next_endpoints(&self) -> Result<EndpointPair> {
        let mut cache = self.cache.lock().await;
        if cache.is_empty() {
            cache.extend(self.query().await?);
        }
        match cache.pop_front() {
            Some(result) => self.endpoints_from(&result),
            None => Err(AppError::discovery("Locate returned no servers")),
        }
    }

    fn name(&self) -> &'static str {
        "locate"
    }
}
