//! Measurement server discovery
//!
//! A session needs one [`EndpointPair`] per run. It either comes from an
//! explicitly configured server ([`StaticServer`]) or from the M-Lab Locate
//! service ([`LocateClient`]).

pub mod locate;
pub mod params;

pub use locate::LocateClient;
pub use params::QueryParams;

use crate::error::{AppError, Result};
use crate::types::{Direction, Scheme};
use async_trait::async_trait;
use url::Url;

/// Download and upload URLs of one server, query parameters included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPair {
    pub download: Url,
    pub upload: Url,
}

impl EndpointPair {
    pub fn new(download: Url, upload: Url) -> Self {
        Self { download, upload }
    }

    /// Build the pair for a server given as `host[:port]`
    pub fn for_server(scheme: Scheme, server: &str, params: &QueryParams) -> Result<Self> {
        crate::models::config::validate_server(server)?;
        let build = |direction: Direction| -> Result<Url> {
            let mut url = Url::parse(&format!("{}://{}{}", scheme, server, direction.path()))
                .map_err(|e| AppError::validation(format!("Invalid server address '{}': {}", server, e)))?;
            params.apply(&mut url);
            Ok(url)
        };
        Ok(Self {
            download: build(Direction::Download)?,
            upload: build(Direction::Upload)?,
        })
    }

    pub fn url(&self, direction: Direction) -> &Url {
        match direction {
            Direction::Download => &self.download,
            Direction::Upload => &self.upload,
        }
    }
}

/// Source of measurement endpoints
#[async_trait]
pub trait ServerDiscovery: Send + Sync {
    /// Next endpoint pair to measure against
    async fn next_endpoints(&self) -> Result<EndpointPair>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Always hands out the same endpoints
#[derive(Debug, Clone)]
pub struct StaticServer {
    endpoints: EndpointPair,
}

impl StaticServer {
    pub fn new(endpoints: EndpointPair) -> Self {
        Self { endpoints }
    }

    pub fn for_server(scheme: Scheme, server: &str, params: &QueryParams) -> Result<Self> {
        EndpointPair::for_server(scheme, server, params).map(Self::new)
    }
}

#[async_trait]
impl ServerDiscovery for StaticServer {
    async fn next_endpoints(&self) -> Result<EndpointPair> {
        Ok(self.endpoints.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
