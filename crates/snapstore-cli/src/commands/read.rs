//! get, get-version, list, history and versions

use super::{print_json, Target};
use clap::Args;
use serde_json::Value;
use snapstore::{Options, Result};

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Entity id
    pub id: String,
}

#[derive(Debug, Args)]
pub struct GetVersionArgs {
    /// Entity id
    pub id: String,

    #[arg(long)]
    pub affinity: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Restrict to these entity ids (repeatable)
    #[arg(long = "id")]
    pub ids: Vec<String>,
}

pub fn get(target: &Target, args: GetArgs) -> Result<()> {
    let data: Value = target.with_store(|store| store.get(&args.id, &Options::new()))?;
    print_json(&data)
}

pub fn get_version(target: &Target, args: GetVersionArgs) -> Result<()> {
    let data: Value = target.with_store(|store| {
        store.get_version(&args.affinity, &args.id, &Options::new())
    })?;
    print_json(&data)
}

pub fn list(target: &Target, args: ListArgs) -> Result<()> {
    target.with_store(|store| {
        let opts = Options::new();
        let cursor = if args.ids.is_empty() {
            store.get_all::<Value>(&opts)?
        } else {
            store.get_by_id::<Value, _>(&args.ids, &opts)?
        };
        for item in cursor {
            print_json(&item?)?;
        }
        Ok(())
    })
}

pub fn history(target: &Target, args: GetArgs) -> Result<()> {
    let snapshots = target.with_store(|store| store.history::<Value>(&args.id, &Options::new()))?;
    print_json(&snapshots)
}

pub fn versions(target: &Target, args: GetArgs) -> Result<()> {
    let versions = target.with_store(|store| store.versions::<Value>(&args.id, &Options::new()))?;
    print_json(&versions)
}
