//! Provenance discovery for package URLs.
//!
//! `ite10-discovery` resolves a package URL to its nodes in a GUAC
//! provenance graph and collects the SLSA provenance attached to it,
//! either directly or through the artifacts the package occurs as.

pub mod discover;
pub mod error;
pub mod graph;
pub mod guac;
pub mod purl;

pub use discover::{ProvenanceOrigin, discover, discover_attestations};
pub use error::DiscoveryError;
pub use graph::GraphClient;
pub use guac::{DiscoveryConfig, GuacClient};
pub use purl::PackageIdentifier;
