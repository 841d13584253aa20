//! Error types for provenance discovery.

/// Errors from discovering attestations in the provenance graph.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The package URL could not be parsed.
    #[error("invalid package URL {purl}: {reason}")]
    InvalidPurl {
        /// The offending input.
        purl: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The package lookup did not return exactly one package.
    #[error("failed to locate package {purl}: {count} package(s) matched")]
    PackageNotFound {
        /// The package URL queried.
        purl: String,
        /// Number of packages returned.
        count: usize,
    },

    /// An artifact lookup by digest did not return exactly one artifact.
    ///
    /// Non-fatal during discovery: the occurrence is logged and skipped.
    #[error("failed to locate artifact {algorithm}:{digest}: {count} artifact(s) matched")]
    AmbiguousArtifact {
        /// Hash algorithm.
        algorithm: String,
        /// Hash value.
        digest: String,
        /// Number of artifacts returned.
        count: usize,
    },

    /// The graph service could not be reached or answered with an HTTP error.
    #[error("graph transport error: {message}")]
    Transport {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Error detail.
        message: String,
    },

    /// The graph service reported GraphQL errors.
    #[error("graph query failed: {0}")]
    Graph(String),

    /// A graph response or discovered predicate could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DiscoveryError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport {
            status: value.status().map(|s| s.as_u16()),
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}
