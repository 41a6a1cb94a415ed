//! Query-string metadata attached to every measurement URL

use crate::defaults::{LIBRARY_NAME, LIBRARY_VERSION};
use crate::models::TestConfig;
use std::collections::BTreeMap;
use url::Url;

/// Client identity, protocol options and free-form metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    pub client_name: String,
    pub client_version: String,
    pub library_name: String,
    pub library_version: String,
    pub streams: usize,
    pub cc: String,
    pub duration_ms: u64,
    pub byte_limit: Option<u64>,
    pub metadata: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new(client_name: &str, client_version: &str, test: &TestConfig) -> Self {
        Self {
            client_name: client_name.to_string(),
            client_version: client_version.to_string(),
            library_name: LIBRARY_NAME.to_string(),
            library_version: LIBRARY_VERSION.to_string(),
            streams: test.streams(),
            cc: test.cc().to_string(),
            duration_ms: test.duration_ms(),
            byte_limit: test.byte_limit(),
            metadata: test.metadata().clone(),
        }
    }

    /// Parameters identifying the client, sent to the Locate service
    pub fn identity(&self) -> Vec<(String, String)> {
        vec![
            ("client_name".to_string(), self.client_name.clone()),
            ("client_version".to_string(), self.client_version.clone()),
            ("client_library_name".to_string(), self.library_name.clone()),
            ("client_library_version".to_string(), self.library_version.clone()),
        ]
    }

    /// All parameters in the order they appear in the query string
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.identity();
        pairs.push(("streams".to_string(), self.streams.to_string()));
        pairs.push(("cc".to_string(), self.cc.clone()));
        pairs.push(("duration".to_string(), self.duration_ms.to_string()));
        if let Some(limit) = self.byte_limit {
            pairs.push(("bytes".to_string(), limit.to_string()));
        }
        for (key, value) in &self.metadata {
            // Custom metadata overrides standard keys of the same name
            pairs.retain(|(k, _)| k != key);
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }

    /// Set every parameter on `url`, replacing existing keys of the same name
    /// and keeping the others (such as an access token)
    pub fn apply(&self, url: &mut Url) {
        let ours = self.pairs();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !ours.iter().any(|(k, _)| k == key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in kept.iter().chain(ours.iter()) {
            query.append_pair(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CongestionControl;

    fn params(byte_limit: u64) -> QueryParams {
        let test = TestConfig::builder()
            .streams(3)
            .duration_ms(7000)
            .cc(CongestionControl::Cubic)
            .byte_limit(byte_limit)
            .metadata("site", "lab")
            .build()
            .unwrap();
        QueryParams::new("my-client", "1.2.3", &test)
    }

    #[test]
    fn test_standard_pairs_in_order() {
        let keys: Vec<String> = params(0).pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                "client_name",
                "client_version",
                "client_library_name",
                "client_library_version",
                "streams",
                "cc",
                "duration",
                "site"
            ]
        );
    }

    #[test]
    fn test_bytes_only_with_limit() {
        let pairs = params(1_000_000).pairs();
        assert!(pairs.contains(&("bytes".to_string(), "1000000".to_string())));
        assert!(!params(0).pairs().iter().any(|(k, _)| k == "bytes"));
    }

    #[test]
    fn test_apply_keeps_access_token_and_replaces_duplicates() {
        let mut url = Url::parse("wss://host/throughput/v1/download?access_token=abc&streams=9").unwrap();
        params(0).apply(&mut url);

        let query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["access_token"], "abc");
        assert_eq!(query["streams"], "3");
        assert_eq!(query["cc"], "cubic");
        assert_eq!(query["duration"], "7000");
        assert_eq!(query["client_library_name"], "msak-client");
        assert_eq!(url.query_pairs().filter(|(k, _)| k == "streams").count(), 1);
    }

    #[test]
    fn test_metadata_overrides_standard_key() {
        let mut p = params(0);
        p.metadata.insert("client_name".to_string(), "override".to_string());
        let pairs = p.pairs();
        assert_eq!(pairs.iter().filter(|(k, _)| k == "client_name").count(), 1);
        assert!(pairs.contains(&("client_name".to_string(), "override".to_string())));
    }
}
