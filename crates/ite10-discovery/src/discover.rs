//! Provenance discovery for a package.
//!
//! Discovery is a bounded two-hop search from the package's name and
//! version nodes:
//! 1. **Direct**: `HasSLSA` neighbors of the node are the result.
//! 2. **Indirect**: only when there are no direct ones, each `IsOccurrence`
//!    neighbor's artifact is looked up by digest and its `HasSLSA`
//!    neighbors are collected.
//!
//! Precedence is decided per node. Name-node results come first.

use std::collections::BTreeMap;

use ite10_attestation::{ResourceDescriptor, Statement};
use ite10_verifier::Attestation;
use serde_json::{Map, Value};

use crate::error::DiscoveryError;
use crate::graph::{Edge, GraphClient, HasProvenance, Neighbor, Occurrence};
use crate::purl::PackageIdentifier;

/// Predicate type assigned to provenance rebuilt from the graph.
pub const SLSA_V02_PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v0.2";

/// Neighbors of one node, split by relation kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceNeighbors {
    /// Artifact occurrences.
    pub occurrences: Vec<Occurrence>,
    /// Direct provenance records.
    pub has_provenance: Vec<HasProvenance>,
}

impl ProvenanceNeighbors {
    /// Classify raw neighbors; unrelated kinds are dropped.
    pub fn classify(neighbors: Vec<Neighbor>) -> Self {
        let mut out = Self::default();
        for neighbor in neighbors {
            match neighbor {
                Neighbor::Occurrence(o) => out.occurrences.push(o),
                Neighbor::HasProvenance(h) => out.has_provenance.push(h),
                Neighbor::Other => {}
            }
        }
        out
    }

    /// Ids of all classified neighbors, provenance first.
    pub fn ids(&self) -> Vec<&str> {
        self.has_provenance
            .iter()
            .map(|h| h.id.as_str())
            .chain(self.occurrences.iter().map(|o| o.id.as_str()))
            .collect()
    }
}

/// A provenance record found for a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceOrigin {
    /// Graph id of the `HasSLSA` record.
    pub node_id: String,
    /// URI the provenance was ingested from.
    pub origin: String,
    /// The provenance rebuilt as an in-toto statement.
    pub statement: Statement,
}

/// Find provenance for `package`.
pub async fn discover<C: GraphClient + ?Sized>(
    client: &C,
    package: &PackageIdentifier,
) -> Result<Vec<ProvenanceOrigin>, DiscoveryError> {
    let purl = package.to_string();
    let packages = client.packages(&package.to_filter()).await?;
    let [found] = packages.as_slice() else {
        return Err(DiscoveryError::PackageNotFound {
            purl,
            count: packages.len(),
        });
    };

    let missing = || DiscoveryError::PackageNotFound {
        purl: purl.clone(),
        count: 0,
    };
    let name_id = found.name_node().ok_or_else(missing)?.id.as_str();
    let version_id = found.version_node().ok_or_else(missing)?.id.as_str();
    tracing::debug!(%purl, name_id, version_id, "resolved package nodes");

    let (by_name, by_version) = tokio::join!(
        discover_from_node(client, name_id),
        discover_from_node(client, version_id),
    );
    let mut origins = by_name?;
    origins.extend(by_version?);

    tracing::info!(%purl, count = origins.len(), "discovery complete");
    Ok(origins)
}

/// Discover provenance and key the rebuilt statements by origin URI.
///
/// Graph attestations carry no envelope and therefore no signers.
pub async fn discover_attestations<C: GraphClient + ?Sized>(
    client: &C,
    package: &PackageIdentifier,
) -> Result<BTreeMap<String, Attestation>, DiscoveryError> {
    let mut out = BTreeMap::new();
    for found in discover(client, package).await? {
        if out.contains_key(&found.origin) {
            tracing::debug!(origin = %found.origin, "duplicate origin, keeping first");
            continue;
        }
        out.insert(found.origin, Attestation::from_statement(found.statement));
    }
    Ok(out)
}

async fn discover_from_node<C: GraphClient + ?Sized>(
    client: &C,
    node_id: &str,
) -> Result<Vec<ProvenanceOrigin>, DiscoveryError> {
    let neighbors = ProvenanceNeighbors::classify(client.neighbors(node_id, &[]).await?);
    tracing::debug!(node_id, neighbors = ?neighbors.ids(), "classified neighbors");

    if !neighbors.has_provenance.is_empty() {
        return neighbors.has_provenance.iter().map(origin_of).collect();
    }

    let mut origins = Vec::new();
    for occurrence in &neighbors.occurrences {
        let wanted = &occurrence.artifact;
        let artifacts = client.artifacts(&wanted.algorithm, &wanted.digest).await?;
        let [artifact] = artifacts.as_slice() else {
            let skipped = DiscoveryError::AmbiguousArtifact {
                algorithm: wanted.algorithm.clone(),
                digest: wanted.digest.clone(),
                count: artifacts.len(),
            };
            tracing::warn!(occurrence = %occurrence.id, "{skipped}");
            continue;
        };

        for neighbor in client.neighbors(&artifact.id, &[Edge::ArtifactHasSlsa]).await? {
            if let Neighbor::HasProvenance(record) = neighbor {
                origins.push(origin_of(&record)?);
            }
        }
    }
    Ok(origins)
}

fn origin_of(record: &HasProvenance) -> Result<ProvenanceOrigin, DiscoveryError> {
    Ok(ProvenanceOrigin {
        node_id: record.id.clone(),
        origin: record.slsa.origin.clone(),
        statement: rebuild_statement(record)?,
    })
}

/// Rebuild an in-toto statement from a graph provenance record.
///
/// Dotted predicate keys become nested objects rooted at `slsa` (or at the
/// top level when there is no `slsa` prefix), `"true"` and `"false"` become
/// booleans, and a `materials` object becomes an array of its values.
pub fn rebuild_statement(record: &HasProvenance) -> Result<Statement, DiscoveryError> {
    let mut tree = Map::new();
    for entry in &record.slsa.slsa_predicate {
        insert_dotted(&mut tree, &entry.key, &entry.value);
    }

    let mut predicate = match tree.remove("slsa") {
        Some(Value::Object(slsa)) => slsa,
        Some(other) => {
            return Err(DiscoveryError::Decode(format!(
                "provenance {} has a scalar `slsa` predicate: {other}",
                record.id
            )));
        }
        None => tree,
    };

    if let Some(Value::Object(materials)) = predicate.remove("materials") {
        let mut indexed: Vec<(String, Value)> = materials.into_iter().collect();
        indexed.sort_by_cached_key(|(k, _)| (k.parse::<usize>().ok(), k.clone()));
        predicate.insert(
            "materials".to_owned(),
            Value::Array(indexed.into_iter().map(|(_, m)| m).collect()),
        );
    }

    // The record's own build type and builder fill gaps in the flattened pairs.
    if !record.slsa.build_type.is_empty() {
        predicate
            .entry("buildType")
            .or_insert_with(|| Value::String(record.slsa.build_type.clone()));
    }
    if let Some(builder) = &record.slsa.built_by {
        predicate
            .entry("builder")
            .or_insert_with(|| serde_json::json!({ "id": builder.uri }));
    }

    let subject = ResourceDescriptor::new(
        format!("{}:{}", record.subject.algorithm, record.subject.digest),
        &record.subject.algorithm,
        &record.subject.digest,
    );
    Ok(Statement::new(
        vec![subject],
        SLSA_V02_PREDICATE_TYPE,
        Value::Object(predicate),
    ))
}

fn insert_dotted(tree: &mut Map<String, Value>, key: &str, value: &str) {
    let mut node = tree;
    let mut parts = key.split('.').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            node.insert(part.to_owned(), scalar(value));
            return;
        }
        let child = node
            .entry(part.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !child.is_object() {
            tracing::debug!(key, "predicate key shadows a scalar, replacing it");
            *child = Value::Object(Map::new());
        }
        let Value::Object(next) = child else {
            return;
        };
        node = next;
    }
}

fn scalar(value: &str) -> Value {
    match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_owned()),
    }
}
