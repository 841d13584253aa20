//! Provenance graph model and the client interface used to query it.
//!
//! The types mirror the subset of the GUAC GraphQL schema that discovery
//! needs: package trees, artifacts, and the `IsOccurrence` / `HasSLSA`
//! neighbor records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Package filter (`PkgSpec`). `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageFilter {
    /// Package type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    /// Namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Subpath.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    /// Qualifiers that must be present.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub qualifiers: Vec<QualifierFilter>,
}

/// One qualifier constraint (`PackageQualifierSpec`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualifierFilter {
    /// Qualifier name.
    pub key: String,
    /// Required value; `None` only requires presence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A package trie rooted at the package type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Package {
    /// Node id of the type level.
    pub id: String,
    /// Package type.
    #[serde(rename = "type")]
    pub package_type: String,
    /// Namespaces under this type.
    #[serde(default)]
    pub namespaces: Vec<PackageNamespace>,
}

/// Namespace level of a package trie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageNamespace {
    /// Node id.
    pub id: String,
    /// Namespace.
    #[serde(default)]
    pub namespace: String,
    /// Names under this namespace.
    #[serde(default)]
    pub names: Vec<PackageName>,
}

/// Name level of a package trie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageName {
    /// Node id.
    pub id: String,
    /// Package name.
    pub name: String,
    /// Versions under this name.
    #[serde(default)]
    pub versions: Vec<PackageVersion>,
}

/// Version level of a package trie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageVersion {
    /// Node id.
    pub id: String,
    /// Version string.
    #[serde(default)]
    pub version: String,
}

impl Package {
    /// The first name node in the trie.
    pub fn name_node(&self) -> Option<&PackageName> {
        self.namespaces.first()?.names.first()
    }

    /// The first version node under the first name.
    pub fn version_node(&self) -> Option<&PackageVersion> {
        self.name_node()?.versions.first()
    }
}

/// An artifact node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Artifact {
    /// Node id.
    pub id: String,
    /// Hash algorithm.
    pub algorithm: String,
    /// Hash value.
    pub digest: String,
}

/// An `IsOccurrence` record: a package or source occurs as an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Occurrence {
    /// Node id.
    pub id: String,
    /// The artifact the subject occurs as.
    pub artifact: Artifact,
}

/// A `HasSLSA` record: provenance attached to an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HasProvenance {
    /// Node id.
    pub id: String,
    /// The artifact the provenance is about.
    pub subject: Artifact,
    /// The provenance itself.
    pub slsa: SlsaRecord,
}

/// Provenance details as stored in the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlsaRecord {
    /// Where the attestation was ingested from.
    pub origin: String,
    /// Build type URI.
    #[serde(default)]
    pub build_type: String,
    /// Builder identity.
    #[serde(default)]
    pub built_by: Option<Builder>,
    /// Flattened predicate: dotted keys with string values.
    #[serde(default)]
    pub slsa_predicate: Vec<PredicateEntry>,
}

/// Builder identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Builder {
    /// Builder URI.
    pub uri: String,
}

/// One flattened predicate field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PredicateEntry {
    /// Dotted path, e.g. `slsa.builder.id`.
    pub key: String,
    /// Field value rendered as a string.
    pub value: String,
}

/// A neighbor of a graph node, classified by `__typename`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "__typename")]
pub enum Neighbor {
    /// Artifact occurrence.
    #[serde(rename = "IsOccurrence")]
    Occurrence(Occurrence),
    /// Direct provenance.
    #[serde(rename = "HasSLSA")]
    HasProvenance(HasProvenance),
    /// Any relation discovery does not use.
    #[serde(other)]
    Other,
}

/// Edge types usable as neighbor filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Edge {
    /// Artifact to its `HasSLSA` records.
    #[serde(rename = "ARTIFACT_HAS_SLSA")]
    ArtifactHasSlsa,
}

/// Read access to a provenance graph.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Packages matching `filter`.
    async fn packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, DiscoveryError>;

    /// Neighbors of node `id`; all edge types when `edges` is empty.
    async fn neighbors(&self, id: &str, edges: &[Edge]) -> Result<Vec<Neighbor>, DiscoveryError>;

    /// Artifacts with exactly this algorithm and digest.
    async fn artifacts(&self, algorithm: &str, digest: &str)
    -> Result<Vec<Artifact>, DiscoveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbor_typenames_classify() {
        let raw = serde_json::json!([
            {
                "__typename": "IsOccurrence",
                "id": "occ1",
                "artifact": { "id": "a1", "algorithm": "sha256", "digest": "aa" }
            },
            {
                "__typename": "HasSLSA",
                "id": "slsa1",
                "subject": { "id": "a1", "algorithm": "sha256", "digest": "aa" },
                "slsa": {
                    "origin": "file:///prov.json",
                    "buildType": "make",
                    "builtBy": { "uri": "https://ci.example" },
                    "slsaPredicate": [{ "key": "slsa.buildType", "value": "make" }]
                }
            },
            { "__typename": "CertifyVuln", "id": "v1", "vulnerability": {} }
        ]);
        let neighbors: Vec<Neighbor> = serde_json::from_value(raw).unwrap();
        assert!(matches!(&neighbors[0], Neighbor::Occurrence(o) if o.artifact.digest == "aa"));
        match &neighbors[1] {
            Neighbor::HasProvenance(h) => {
                assert_eq!(h.slsa.origin, "file:///prov.json");
                assert_eq!(h.slsa.built_by.as_ref().unwrap().uri, "https://ci.example");
                assert_eq!(h.slsa.slsa_predicate.len(), 1);
            }
            other => panic!("expected HasProvenance, got {other:?}"),
        }
        assert_eq!(neighbors[2], Neighbor::Other);
    }

    #[test]
    fn package_trie_nodes() {
        let package: Package = serde_json::from_value(serde_json::json!({
            "id": "t",
            "type": "npm",
            "namespaces": [{
                "id": "ns",
                "namespace": "",
                "names": [{ "id": "n", "name": "left-pad", "versions": [{ "id": "v", "version": "1.3.0" }] }]
            }]
        }))
        .unwrap();
        assert_eq!(package.name_node().unwrap().id, "n");
        assert_eq!(package.version_node().unwrap().id, "v");
    }

    #[test]
    fn filter_serializes_graphql_names() {
        let filter = PackageFilter {
            package_type: Some("npm".to_owned()),
            version: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            serde_json::json!({ "type": "npm", "version": "" })
        );
        assert_eq!(
            serde_json::to_value([Edge::ArtifactHasSlsa]).unwrap(),
            serde_json::json!(["ARTIFACT_HAS_SLSA"])
        );
    }
}
