//! add-version and promote

use super::{parse_payload, print_json, Target};
use clap::Args;
use serde_json::json;
use snapstore::{Options, Promotion, Result, Strategy};

#[derive(Debug, Args)]
pub struct AddVersionArgs {
    /// Entity id
    pub id: String,

    /// JSON payload
    pub data: String,

    /// Writer lineage; a fresh one is generated and printed when omitted
    #[arg(long)]
    pub affinity: Option<String>,
}

#[derive(Debug, Args)]
pub struct PromoteArgs {
    /// Entity id
    pub id: String,

    #[arg(long)]
    pub affinity: String,

    /// mine or abort
    #[arg(long, default_value = "mine")]
    pub strategy: Strategy,
}

pub fn add_version(target: &Target, args: AddVersionArgs) -> Result<()> {
    let data = parse_payload(&args.data)?;
    let affinity = args
        .affinity
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let version_id = target.with_store(|store| {
        store.add_version(&affinity, &args.id, &data, &Options::new())
    })?;

    print_json(&json!({
        "affinity_id": affinity,
        "id": args.id,
        "version_id": version_id,
    }))
}

pub fn promote(target: &Target, args: PromoteArgs) -> Result<()> {
    let outcome = target.with_store(|store| {
        store.add_snapshot(&args.affinity, &args.id, args.strategy, &Options::new())
    })?;

    match &outcome {
        Promotion::Promoted(promoted) => print_json(promoted)?,
        Promotion::Conflict(conflict) => print_json(&json!({ "conflict": conflict }))?,
    }
    // A conflict becomes the command's error so the exit code reports it
    outcome.into_result().map(|_| ())
}
