//! Loading attestations from disk.

use std::collections::BTreeMap;
use std::path::Path;

use color_eyre::eyre::{Result, eyre};
use ite10_verifier::Attestation;

/// Load every `*.json` file in `dir`, keyed by file name without the
/// extension. Other entries are ignored.
pub(crate) fn load_attestations_dir(dir: &Path) -> Result<BTreeMap<String, Attestation>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| eyre!("failed to read attestations directory {}: {e}", dir.display()))?;

    let mut out = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
            tracing::trace!(path = %path.display(), "skipping non-attestation entry");
            continue;
        }
        let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping file with non-UTF-8 name");
            continue;
        };

        let bytes = std::fs::read(&path)
            .map_err(|e| eyre!("failed to read attestation {}: {e}", path.display()))?;
        let attestation = Attestation::from_slice(&bytes)
            .map_err(|e| eyre!("failed to load attestation {}: {e}", path.display()))?;
        tracing::debug!(key, signed = attestation.envelope.is_some(), "loaded attestation");
        out.insert(key.to_owned(), attestation);
    }
    Ok(out)
}
