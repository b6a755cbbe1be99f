//! Subcommand implementations

pub mod read;
pub mod write;

use snapstore::{Client, ClientConfig, ErrorKind, Result, Store, StoreError};
use std::path::PathBuf;

/// Where a command operates: database, config and collection
#[derive(Debug)]
pub struct Target {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub collection: String,
}

impl Target {
    /// Resolve the client configuration: file, then environment, then flags
    pub fn config(&self) -> Result<ClientConfig> {
        let config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        let mut config = config.apply_env()?;
        if let Some(db) = &self.db {
            config.path = db.clone();
        }
        if !config.collections.contains(&self.collection) {
            config.collections.push(self.collection.clone());
        }
        tracing::debug!(
            path = %config.path.display(),
            collection = %self.collection,
            "Resolved client config"
        );
        Ok(config)
    }

    /// Open the client and hand the target collection's store to `f`
    pub fn with_store<R>(&self, f: impl FnOnce(&Store) -> Result<R>) -> Result<R> {
        let client = Client::open(&self.config()?)?;
        let store = client.store(&self.collection).ok_or_else(|| {
            StoreError::new(ErrorKind::InvalidInput)
                .with_collection(self.collection.as_str())
                .with_message("collection is not registered")
        })?;
        f(store)
    }
}

/// Parse a JSON payload given on the command line
pub fn parse_payload(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| {
        StoreError::new(ErrorKind::InvalidInput)
            .with_op("parse_payload")
            .with_message(format!("payload is not valid JSON: {}", e))
            .with_source(e)
    })
}

/// Print one JSON document on stdout
pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string(value)
        .map_err(|e| snapstore::errors::serialization("print_json", e))?;
    println!("{}", rendered);
    Ok(())
}
