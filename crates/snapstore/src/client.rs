//! Registry of named stores sharing one connection pool

use crate::config::ClientConfig;
use crate::context::{self, sqlite_error, Context};
use crate::db::{self, Pool};
use crate::errors::{ErrorKind, Result, StoreError};
use crate::logging_facility::schema::EVENT_END_ERROR;
use crate::migrations::apply_collection_migrations;
use crate::store::{Options, Store};
use crate::tables::CollectionTables;
use crate::{log_op_end, log_op_start};
use std::collections::BTreeMap;
use std::time::Instant;

/// Rows fetched per cursor page unless configured otherwise
pub const DEFAULT_BATCH_SIZE: u32 = 256;

/// Named [`Store`]s over one database
///
/// Cloning is cheap; clones share the pool and the stores.
#[derive(Clone)]
pub struct Client {
    pool: Pool,
    stores: BTreeMap<String, Store>,
}

impl Client {
    /// Register `names` as collections, provisioning their tables
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: a name is malformed, or listed twice ignoring ASCII case
    /// - `Migration` / `ChecksumMismatch`: provisioning failed
    pub fn new<I>(pool: Pool, names: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self::build(pool, names, DEFAULT_BATCH_SIZE)
    }

    /// Open the configured database and register its collections
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let pool = db::open_pool(config)?;
        Self::build(pool, &config.collections, config.cursor_batch_size)
    }

    fn build<I>(pool: Pool, names: I, batch_size: u32) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut tables = Vec::new();
        for name in names {
            let name = name.as_ref();
            let collection = CollectionTables::for_collection(name)?;
            if let Some(existing) = tables
                .iter()
                .find(|t: &&CollectionTables| t.shares_tables_with(&collection))
            {
                return Err(StoreError::new(ErrorKind::InvalidInput)
                    .with_op("register_collection")
                    .with_collection(name)
                    .with_message(format!(
                        "collection shares its tables with '{}'",
                        existing.collection()
                    )));
            }
            tables.push(collection);
        }

        let mut conn = db::checkout(&pool, None)?;
        for collection in &tables {
            apply_collection_migrations(&mut conn, collection)?;
        }
        drop(conn);

        let stores = tables
            .into_iter()
            .map(|t| {
                let name = t.collection().to_string();
                (name, Store::new(pool.clone(), t, batch_size))
            })
            .collect::<BTreeMap<_, _>>();

        tracing::info!(
            collections = ?stores.keys().collect::<Vec<_>>(),
            "Client ready"
        );

        Ok(Self { pool, stores })
    }

    /// The store for `name`, if registered
    pub fn store(&self, name: &str) -> Option<&Store> {
        self.stores.get(name)
    }

    /// Registered collection names, sorted
    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Run `f` inside one `IMMEDIATE` transaction
    ///
    /// Every store operation given the supplied [`Options`] joins the
    /// transaction. It commits when `f` returns `Ok` and the context is still
    /// live; otherwise it rolls back and nothing `f` wrote is visible.
    ///
    /// ```ignore
    /// client.transaction(&Context::background(), |opts| -> snapstore::Result<()> {
    ///     pubs.add_version("a1", "P1", &draft, opts)?;
    ///     pubs.add_snapshot("a1", "P1", Strategy::Mine, opts)?.into_result()?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn transaction<F, R, E>(&self, ctx: &Context, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&Options<'_>) -> std::result::Result<R, E>,
        E: From<StoreError>,
    {
        let started = Instant::now();
        log_op_start!("transaction");
        let result = self.run_transaction(ctx, f);
        let duration_ms = started.elapsed().as_millis() as u64;
        if result.is_ok() {
            log_op_end!("transaction", duration_ms = duration_ms);
        } else {
            tracing::warn!(
                component = module_path!(),
                op = "transaction",
                event = EVENT_END_ERROR,
                duration_ms = duration_ms,
                "Transaction rolled back"
            );
        }
        result
    }

    fn run_transaction<F, R, E>(&self, ctx: &Context, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&Options<'_>) -> std::result::Result<R, E>,
        E: From<StoreError>,
    {
        let conn = db::checkout(&self.pool, Some(ctx))?;
        let tx = db::begin_immediate(&conn, Some(ctx), "transaction_begin")?;

        // Returning early drops `tx`, which rolls back.
        let value = f(&Options::new().with_context(ctx).with_transaction(&tx))?;
        context::check(Some(ctx)).map_err(|e| e.with_op("transaction_commit"))?;
        tx.commit()
            .map_err(|e| sqlite_error(Some(ctx), "transaction_commit", e))?;
        Ok(value)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("pool_size", &self.pool.max_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Strategy;
    use tempfile::TempDir;

    fn client(dir: &TempDir, names: &[&str]) -> Result<Client> {
        let pool = db::open_pool(&ClientConfig::with_path(dir.path().join("client.db")))?;
        Client::new(pool, names)
    }

    #[test]
    fn test_registers_stores() {
        let dir = TempDir::new().unwrap();
        let client = client(&dir, &["publications", "datasets"]).unwrap();
        assert_eq!(
            client.store_names().collect::<Vec<_>>(),
            vec!["datasets", "publications"]
        );
        assert_eq!(
            client.store("publications").unwrap().collection(),
            "publications"
        );
        assert!(client.store("missing").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dir = TempDir::new().unwrap();
        let err = client(&dir, &["widgets", "widgets"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.collection(), Some("widgets"));
    }

    #[test]
    fn test_names_differing_only_in_case_rejected() {
        let dir = TempDir::new().unwrap();
        let err = client(&dir, &["Widgets", "widgets"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(err.collection(), Some("widgets"));

        // A single mixed-case collection still works against its lowercase tables
        let client = client(&dir, &["Widgets"]).unwrap();
        let widgets = client.store("Widgets").unwrap();
        widgets
            .add_version("a1", "W1", &1, &Options::new())
            .unwrap();
        assert_eq!(widgets.tables().versions(), "widgets_versions");
    }

    #[test]
    fn test_invalid_name_rejected() {
        let dir = TempDir::new().unwrap();
        let err = client(&dir, &["bad-name"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        client(&dir, &["widgets"]).unwrap();
        assert!(client(&dir, &["widgets"]).is_ok());
    }

    #[test]
    fn test_transaction_error_rolls_back() {
        let dir = TempDir::new().unwrap();
        let client = client(&dir, &["widgets"]).unwrap();
        let widgets = client.store("widgets").unwrap();

        let result = client.transaction(&Context::background(), |opts| -> Result<()> {
            widgets.add_version("a1", "W1", &1, opts)?;
            widgets
                .add_snapshot("a1", "W1", Strategy::Mine, opts)?
                .into_result()?;
            Err(StoreError::new(ErrorKind::InvalidInput).with_message("abort"))
        });
        assert!(result.is_err());

        let err = widgets.get::<i32>("W1", &Options::new()).unwrap_err();
        assert!(err.is_not_found());
        assert!(widgets
            .versions::<i32>("W1", &Options::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cancelled_transaction_does_not_commit() {
        let dir = TempDir::new().unwrap();
        let client = client(&dir, &["widgets"]).unwrap();
        let widgets = client.store("widgets").unwrap();
        let ctx = Context::background();

        let err = client
            .transaction(&ctx, |opts| -> Result<()> {
                widgets.add_version("a1", "W1", &1, opts)?;
                ctx.cancel();
                Ok(())
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(widgets
            .versions::<i32>("W1", &Options::new())
            .unwrap()
            .is_empty());
    }
}
