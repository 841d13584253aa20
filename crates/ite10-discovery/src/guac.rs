//! GraphQL client for a GUAC server.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::DiscoveryError;
use crate::graph::{Artifact, Edge, GraphClient, Neighbor, Package, PackageFilter};

/// Default GraphQL endpoint of a local GUAC deployment.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/query";

const PACKAGES_QUERY: &str = r"
query Packages($filter: PkgSpec!) {
  packages(pkgSpec: $filter) {
    id
    type
    namespaces {
      id
      namespace
      names {
        id
        name
        versions { id version }
      }
    }
  }
}";

const NEIGHBORS_QUERY: &str = r"
query Neighbors($node: ID!, $usingOnly: [Edge!]!) {
  neighbors(node: $node, usingOnly: $usingOnly) {
    __typename
    ... on IsOccurrence {
      id
      artifact { id algorithm digest }
    }
    ... on HasSLSA {
      id
      subject { id algorithm digest }
      slsa {
        origin
        buildType
        builtBy { uri }
        slsaPredicate { key value }
      }
    }
  }
}";

const ARTIFACTS_QUERY: &str = r"
query Artifacts($filter: ArtifactSpec!) {
  artifacts(artifactSpec: $filter) { id algorithm digest }
}";

/// Connection settings for the graph service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Bearer token sent as `Authorization`, if any.
    pub bearer_token: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            timeout: Duration::from_secs(30),
            bearer_token: None,
        }
    }
}

/// [`GraphClient`] over HTTP GraphQL.
#[derive(Debug, Clone)]
pub struct GuacClient {
    http: reqwest::Client,
    config: DiscoveryConfig,
}

impl GuacClient {
    /// Build a client for `config.endpoint`.
    pub fn new(config: DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ite10-discovery/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// The endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        field: &str,
    ) -> Result<T, DiscoveryError> {
        let mut request = self
            .http
            .post(&self.config.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        tracing::trace!(endpoint = %self.config.endpoint, field, "sending graph query");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_owned());
            return Err(DiscoveryError::Transport {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: serde_json::Value = response.json().await?;
        parse_response(body, field)
    }
}

#[async_trait]
impl GraphClient for GuacClient {
    async fn packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, DiscoveryError> {
        self.query(PACKAGES_QUERY, json!({ "filter": filter }), "packages")
            .await
    }

    async fn neighbors(&self, id: &str, edges: &[Edge]) -> Result<Vec<Neighbor>, DiscoveryError> {
        self.query(
            NEIGHBORS_QUERY,
            json!({ "node": id, "usingOnly": edges }),
            "neighbors",
        )
        .await
    }

    async fn artifacts(
        &self,
        algorithm: &str,
        digest: &str,
    ) -> Result<Vec<Artifact>, DiscoveryError> {
        self.query(
            ARTIFACTS_QUERY,
            json!({ "filter": { "algorithm": algorithm, "digest": digest } }),
            "artifacts",
        )
        .await
    }
}

/// Extract `data.<field>` from a GraphQL response body.
///
/// A non-empty `errors` array fails the query even when partial data is
/// present.
pub fn parse_response<T: DeserializeOwned>(
    mut body: serde_json::Value,
    field: &str,
) -> Result<T, DiscoveryError> {
    if let Some(errors) = body
        .get("errors")
        .and_then(serde_json::Value::as_array)
        .filter(|errors| !errors.is_empty())
    {
        let messages: Vec<&str> = errors
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("unknown error")
            })
            .collect();
        return Err(DiscoveryError::Graph(messages.join("; ")));
    }

    let data = body
        .get_mut("data")
        .and_then(|d| d.get_mut(field))
        .map(serde_json::Value::take)
        .ok_or_else(|| DiscoveryError::Decode(format!("response has no data.{field}")))?;
    Ok(serde_json::from_value(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_field() {
        let body = json!({
            "data": { "artifacts": [{ "id": "1", "algorithm": "sha256", "digest": "ab" }] }
        });
        let artifacts: Vec<Artifact> = parse_response(body, "artifacts").unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].digest, "ab");
    }

    #[test]
    fn graphql_errors_win_over_data() {
        let body = json!({
            "data": { "artifacts": [] },
            "errors": [{ "message": "bad spec" }, { "message": "also bad" }]
        });
        match parse_response::<Vec<Artifact>>(body, "artifacts") {
            Err(DiscoveryError::Graph(msg)) => assert_eq!(msg, "bad spec; also bad"),
            other => panic!("expected Graph error, got {other:?}"),
        }
    }

    #[test]
    fn empty_errors_array_is_ignored() {
        let body = json!({ "data": { "neighbors": [] }, "errors": [] });
        let neighbors: Vec<Neighbor> = parse_response(body, "neighbors").unwrap();
        assert!(neighbors.is_empty());
    }

    #[test]
    fn missing_field_is_decode_error() {
        let body = json!({ "data": {} });
        assert!(matches!(
            parse_response::<Vec<Artifact>>(body, "artifacts"),
            Err(DiscoveryError::Decode(_))
        ));
    }

    #[test]
    fn default_config_targets_local_guac() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(30));
        let client = GuacClient::new(config).unwrap();
        assert_eq!(client.endpoint(), DEFAULT_ENDPOINT);
    }
}
