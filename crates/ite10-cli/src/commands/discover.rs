//! The `ite10-verifier discover` subcommand.
//!
//! Lists the provenance a GUAC graph holds for a package.

use clap::Args;
use color_eyre::eyre::Result;
use ite10_discovery::{GuacClient, PackageIdentifier, discover};

use crate::config::CliConfig;

/// Arguments for `ite10-verifier discover`.
#[derive(Args)]
pub struct DiscoverArgs {
    /// Package URL, e.g. `pkg:npm/left-pad@1.3.0`.
    pub purl: String,

    /// GraphQL endpoint of the provenance graph.
    #[arg(short = 'g', long, value_name = "URL")]
    pub attestations_from: Option<String>,

    /// Output the rebuilt statements as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the discover command.
pub async fn execute(args: DiscoverArgs, config: &CliConfig) -> Result<()> {
    let package: PackageIdentifier = args.purl.parse()?;
    let client = GuacClient::new(config.discovery(args.attestations_from.as_deref()))?;
    let found = discover(&client, &package).await?;

    if args.json {
        let entries: Vec<_> = found
            .iter()
            .map(|p| {
                serde_json::json!({
                    "nodeId": p.node_id,
                    "origin": p.origin,
                    "statement": p.statement,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No provenance found for {package}");
        return Ok(());
    }
    println!("Provenance for {package}:");
    for (i, p) in found.iter().enumerate() {
        println!("  {}. {} (node {})", i + 1, p.origin, p.node_id);
    }
    Ok(())
}
