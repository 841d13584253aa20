//! The `ite10-verifier verify` subcommand.
//!
//! Verifies attestations from a directory, the provenance graph, or both
//! against a layout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use clap::Args;
use color_eyre::eyre::{Result, eyre};
use ite10_discovery::{GuacClient, PackageIdentifier, discover_attestations};
use ite10_verifier::inspection::CommandRunner;
use ite10_verifier::{Attestation, Layout, VerificationReport, Verifier, VerifyConfig, params};

use crate::config::CliConfig;
use crate::loader;

/// Arguments for `ite10-verifier verify`.
#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the layout (JSON or YAML).
    #[arg(short = 'l', long, value_name = "PATH")]
    pub layout: PathBuf,

    /// Directory of attestation files, keyed by file name without `.json`.
    #[arg(short = 'a', long, value_name = "DIR")]
    pub attestations_directory: Option<PathBuf>,

    /// JSON object of `{KEY}` substitutions applied to the layout.
    #[arg(long, value_name = "PATH")]
    pub substitute_parameters: Option<PathBuf>,

    /// Package URL whose provenance should be pulled from the graph.
    #[arg(short = 'p', long, value_name = "PURL")]
    pub attestation_for: Option<String>,

    /// GraphQL endpoint of the provenance graph.
    #[arg(short = 'g', long, value_name = "URL", requires = "attestation_for")]
    pub attestations_from: Option<String>,

    /// Working directory for inspection commands.
    #[arg(long, value_name = "DIR")]
    pub inspection_dir: Option<PathBuf>,

    /// Skip functionary signature and threshold checks.
    #[arg(long)]
    pub skip_signatures: bool,

    /// Output results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the verify command.
pub async fn execute(args: VerifyArgs, config: &CliConfig) -> Result<()> {
    let mut layout = Layout::from_file(&args.layout)?;
    if let Some(path) = &args.substitute_parameters {
        let substitutions = params::load(path)?;
        tracing::info!(count = substitutions.len(), "applying layout parameters");
        layout = params::substitute(&layout, &substitutions);
    }

    let mut attestations = match &args.attestations_directory {
        Some(dir) => loader::load_attestations_dir(dir)?,
        None => BTreeMap::new(),
    };

    if let Some(purl) = &args.attestation_for {
        let discovered = fetch_discovered(purl, args.attestations_from.as_deref(), config).await?;
        merge(&mut attestations, discovered);
    }

    let verify_config = VerifyConfig {
        inspection_runner: Box::new(
            args.inspection_dir
                .clone()
                .map_or_else(CommandRunner::default, CommandRunner::in_dir),
        ),
        require_signatures: !args.skip_signatures,
        ..VerifyConfig::default()
    };
    let verifier = Verifier::new(verify_config);
    let outcome = verifier.verify(&layout, &attestations);

    if args.json {
        let (checks, error) = match &outcome {
            Ok(report) => (report.checks.as_slice(), None),
            Err(e) => (&[][..], Some(e.to_string())),
        };
        let json_report = serde_json::json!({
            "passed": outcome.is_ok(),
            "checks": checks,
            "error": error,
        });
        println!("{}", serde_json::to_string_pretty(&json_report)?);
    } else {
        match &outcome {
            Ok(report) => print_report(report),
            Err(e) => println!("[FAIL] {e}"),
        }
        println!();
        if outcome.is_ok() {
            println!("Verification PASSED");
        } else {
            println!("Verification FAILED");
        }
    }

    if outcome.is_err() {
        process::exit(1);
    }

    Ok(())
}

async fn fetch_discovered(
    purl: &str,
    endpoint: Option<&str>,
    config: &CliConfig,
) -> Result<BTreeMap<String, Attestation>> {
    let package: PackageIdentifier = purl.parse()?;
    let client = GuacClient::new(config.discovery(endpoint))?;
    tracing::info!(%package, endpoint = client.endpoint(), "discovering provenance");
    let found = discover_attestations(&client, &package)
        .await
        .map_err(|e| eyre!("failed to discover attestations for {package}: {e}"))?;
    tracing::info!(count = found.len(), "discovered attestations");
    Ok(found)
}

/// Local attestations win over discovered ones with the same key.
fn merge(into: &mut BTreeMap<String, Attestation>, discovered: BTreeMap<String, Attestation>) {
    for (key, attestation) in discovered {
        if into.contains_key(&key) {
            tracing::warn!(key, "discovered attestation shadowed by a local file");
            continue;
        }
        into.insert(key, attestation);
    }
}

fn print_report(report: &VerificationReport) {
    for check in &report.checks {
        println!("[PASS] {} {}: {}", check.stage, check.target, check.detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attestation(name: &str) -> Attestation {
        Attestation::from_slice(
            serde_json::json!({
                "_type": "https://in-toto.io/Statement/v1",
                "subject": [{ "name": name, "digest": { "sha256": "aa" } }],
                "predicateType": "https://slsa.dev/provenance/v0.2",
                "predicate": null
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn local_attestations_shadow_discovered() {
        let mut local = BTreeMap::from([("build".to_owned(), attestation("local"))]);
        let discovered = BTreeMap::from([
            ("build".to_owned(), attestation("remote")),
            ("file:///prov.json".to_owned(), attestation("remote")),
        ]);
        merge(&mut local, discovered);

        assert_eq!(local.len(), 2);
        assert_eq!(local["build"].statement.subject[0].name, "local");
        assert_eq!(local["file:///prov.json"].statement.subject[0].name, "remote");
    }
}
