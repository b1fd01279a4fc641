// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The configuration database connector.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use swss_connector::config::names::CONFIG_DB;
use swss_connector::keyspace::{channel_key, key_channel, keyspace_pattern};
use swss_connector::{
    AccessMode, Attempt, DbConnector, KeyspaceChannel, Operation, Result, SdkError,
};
use swss_store::{StoreConnection, StoreError, SubscriptionCloser};
use tracing::{debug, info};

use crate::key::{deserialize_key, row_hash, split_table_key, table_pattern, RowKey};
use crate::value::{raw_to_typed, typed_to_raw, ConfigData, Row, Table};

/// Key whose presence means the initial configuration load has finished.
pub const INIT_INDICATOR: &str = "CONFIG_DB_INITIALIZED";

/// Callback for changes to rows of one table.
///
/// Receives the table name, the row key and the row as read after the
/// change, or `None` if the row no longer exists.
pub type ChangeHandler = Box<dyn FnMut(&str, &RowKey, Option<&Row>) + Send>;

type StoreResult<T> = std::result::Result<T, StoreError>;

// -- Operations -------------------------------------------------------------

/// `GET key` of a plain string key.
struct ReadFlag<'a> {
    key: &'a str,
}

#[async_trait]
impl<'a> Operation for ReadFlag<'a> {
    type Output = Option<String>;

    fn name(&self) -> &'static str {
        "get_flag"
    }

    fn describe(&self) -> String {
        format!("key={}", self.key)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<Option<String>>> {
        Ok(Attempt::Ready(conn.get(self.key).await?))
    }
}

/// `SET key value` of a plain string key.
struct WriteFlag<'a> {
    key: &'a str,
    value: &'a str,
}

#[async_trait]
impl<'a> Operation for WriteFlag<'a> {
    type Output = ();

    fn name(&self) -> &'static str {
        "set_flag"
    }

    fn describe(&self) -> String {
        format!("key={}", self.key)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<()>> {
        conn.set(self.key, self.value).await?;
        Ok(Attempt::Ready(()))
    }
}

/// `HGETALL key` without any value translation. An absent row is empty.
struct ReadRawRow<'a> {
    key: &'a str,
}

#[async_trait]
impl<'a> Operation for ReadRawRow<'a> {
    type Output = HashMap<String, String>;

    fn name(&self) -> &'static str {
        "get_entry"
    }

    fn describe(&self) -> String {
        format!("key={}", self.key)
    }

    async fn invoke(
        &self,
        conn: &mut dyn StoreConnection,
    ) -> StoreResult<Attempt<HashMap<String, String>>> {
        Ok(Attempt::Ready(conn.hgetall(self.key).await?))
    }
}

// -- ConfigDb ---------------------------------------------------------------

/// Typed access to `CONFIG_DB`.
///
/// Rows live under `TABLE|key` hashes. Columns are scalars, lists (stored
/// as `name@` with comma-joined items) or null (stored as `"None"`). An
/// empty row is kept alive by a `NULL: NULL` placeholder column.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use swss_configdb::{ColumnValue, ConfigDb, Row};
/// use swss_connector::{AccessSettings, ConnectorVariant, DatabaseMap, DbConnector};
/// use swss_store::InMemoryBackend;
///
/// # tokio_test::block_on(async {
/// let connector = DbConnector::new(
///     ConnectorVariant::SonicV2,
///     &DatabaseMap::bundled().unwrap(),
///     Arc::new(InMemoryBackend::new()),
///     AccessSettings::default(),
/// )
/// .unwrap();
/// let mut config_db = ConfigDb::new(connector).unwrap();
/// config_db.connect(false, false).await.unwrap();
///
/// let mut row = Row::new();
/// row.insert("admin_status".to_string(), "up".into());
/// config_db.set_entry("BGP_NEIGHBOR", &"10.0.0.1".into(), Some(&row)).await.unwrap();
///
/// let entry = config_db.get_entry("BGP_NEIGHBOR", &"10.0.0.1".into()).await.unwrap();
/// assert_eq!(entry["admin_status"], ColumnValue::from("up"));
/// # });
/// ```
pub struct ConfigDb {
    connector: DbConnector,
    db_index: u32,
    handlers: HashMap<String, ChangeHandler>,
}

impl ConfigDb {
    // -- Constructors -------------------------------------------------------

    /// Wrap `connector`, which must have `CONFIG_DB` in its database map.
    pub fn new(connector: DbConnector) -> Result<Self> {
        let db_index = connector.get_dbid(CONFIG_DB).ok_or_else(|| {
            SdkError::Configuration(format!(
                "Connector variant {:?} has no {CONFIG_DB}",
                connector.variant()
            ))
        })?;
        Ok(Self {
            connector,
            db_index,
            handlers: HashMap::new(),
        })
    }

    /// A configuration database client for a Redis server.
    #[cfg(feature = "redis-backend")]
    pub fn redis(config: &swss_connector::ConnectorConfig) -> Result<Self> {
        Self::new(DbConnector::redis(swss_connector::ConnectorVariant::SonicV2, config)?)
    }

    // -- Accessors ----------------------------------------------------------

    /// The underlying connector.
    pub fn connector(&self) -> &DbConnector {
        &self.connector
    }

    /// The underlying connector, mutably.
    pub fn connector_mut(&mut self) -> &mut DbConnector {
        &mut self.connector
    }

    /// Give back the underlying connector.
    pub fn into_inner(self) -> DbConnector {
        self.connector
    }

    async fn run<O: Operation>(&mut self, op: &O) -> Result<Option<O::Output>> {
        let policy = self.connector.retry_policy(AccessMode::NonBlocking);
        policy.run(&mut self.connector, CONFIG_DB, op).await
    }

    async fn read_raw_row(&mut self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.run(&ReadRawRow { key }).await?.unwrap_or_default())
    }

    async fn row_keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        Ok(self
            .connector
            .keys(CONFIG_DB, pattern, AccessMode::NonBlocking)
            .await?
            .unwrap_or_default())
    }

    // -- Connection ---------------------------------------------------------

    /// Connect to `CONFIG_DB`, optionally waiting until the initial load
    /// has finished.
    pub async fn connect(&mut self, wait_for_init: bool, retry: bool) -> Result<()> {
        self.connector.connect(CONFIG_DB, retry).await?;
        if wait_for_init {
            self.wait_for_init().await?;
        }
        Ok(())
    }

    async fn wait_for_init(&mut self) -> Result<()> {
        let pattern = key_channel(self.db_index, INIT_INDICATOR);
        let conn = self.connector.client(CONFIG_DB)?;
        let mut channel = KeyspaceChannel::open(conn, &pattern).await?;
        loop {
            if self.is_initialized().await? {
                break;
            }
            debug!("Waiting for {INIT_INDICATOR}");
            if channel.next_message().await?.is_none() {
                return Err(SdkError::Store(StoreError::Closed(format!(
                    "subscription to '{pattern}' closed before {INIT_INDICATOR} was set"
                ))));
            }
        }
        channel.close().await;
        info!("Configuration database initialized");
        Ok(())
    }

    /// Whether the initial load has finished.
    pub async fn is_initialized(&mut self) -> Result<bool> {
        let flag = self.run(&ReadFlag { key: INIT_INDICATOR }).await?.flatten();
        Ok(flag.is_some_and(|value| !value.is_empty()))
    }

    /// Record that the initial load has finished, releasing everyone
    /// waiting in [`connect`](Self::connect).
    pub async fn mark_initialized(&mut self) -> Result<()> {
        self.run(&WriteFlag {
            key: INIT_INDICATOR,
            value: "1",
        })
        .await?;
        Ok(())
    }

    // -- Entries ------------------------------------------------------------

    /// Write a row, replacing its previous columns.
    ///
    /// `None` deletes the row. An empty row is stored with only the
    /// placeholder column. Columns are written one at a time, so readers
    /// may briefly see the row half written.
    pub async fn set_entry(&mut self, table: &str, key: &RowKey, data: Option<&Row>) -> Result<()> {
        let hash = row_hash(table, key);
        let Some(row) = data else {
            self.connector.delete(CONFIG_DB, &hash).await?;
            return Ok(());
        };

        let previous = self.read_raw_row(&hash).await?;
        let raw = typed_to_raw(row);
        for (column, value) in &raw {
            self.connector.set(CONFIG_DB, &hash, column, value).await?;
        }
        let stale: Vec<String> = previous
            .into_keys()
            .filter(|column| !raw.contains_key(column))
            .collect();
        if !stale.is_empty() {
            self.connector.delete_fields(CONFIG_DB, &hash, &stale).await?;
        }
        Ok(())
    }

    /// Merge columns into a row, keeping columns not mentioned in `data`.
    ///
    /// `None` deletes the row.
    pub async fn mod_entry(&mut self, table: &str, key: &RowKey, data: Option<&Row>) -> Result<()> {
        let hash = row_hash(table, key);
        let Some(row) = data else {
            self.connector.delete(CONFIG_DB, &hash).await?;
            return Ok(());
        };
        for (column, value) in &typed_to_raw(row) {
            self.connector.set(CONFIG_DB, &hash, column, value).await?;
        }
        Ok(())
    }

    /// Read a row. A missing row reads as an empty one.
    pub async fn get_entry(&mut self, table: &str, key: &RowKey) -> Result<Row> {
        let hash = row_hash(table, key);
        Ok(raw_to_typed(self.read_raw_row(&hash).await?))
    }

    /// Keys of every row in `table`.
    pub async fn get_keys(&mut self, table: &str) -> Result<Vec<RowKey>> {
        let mut keys: Vec<RowKey> = self
            .row_keys(&table_pattern(table))
            .await?
            .iter()
            .filter_map(|raw| split_table_key(raw))
            .map(|(_, row)| deserialize_key(row))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Read every row of `table`.
    pub async fn get_table(&mut self, table: &str) -> Result<Table> {
        let mut data = Table::new();
        for raw_key in self.row_keys(&table_pattern(table)).await? {
            let Some((_, row)) = split_table_key(&raw_key) else {
                continue;
            };
            let row_key = deserialize_key(row);
            let raw = self.read_raw_row(&raw_key).await?;
            if !raw.is_empty() {
                data.insert(row_key, raw_to_typed(raw));
            }
        }
        Ok(data)
    }

    /// Delete every row of `table`, returning how many were removed.
    pub async fn delete_table(&mut self, table: &str) -> Result<usize> {
        self.connector
            .delete_all_by_pattern(CONFIG_DB, &table_pattern(table))
            .await
    }

    /// Read the whole configuration. Keys outside the `TABLE|key` layout
    /// are skipped.
    pub async fn get_config(&mut self) -> Result<ConfigData> {
        let mut data = ConfigData::new();
        for raw_key in self.row_keys("*").await? {
            let Some((table, row)) = split_table_key(&raw_key) else {
                continue;
            };
            let (table, row_key) = (table.to_string(), deserialize_key(row));
            let raw = self.read_raw_row(&raw_key).await?;
            if !raw.is_empty() {
                data.entry(table).or_default().insert(row_key, raw_to_typed(raw));
            }
        }
        Ok(data)
    }

    /// Write every row of `data` with [`set_entry`](Self::set_entry).
    /// Tables are written one after another with no atomicity.
    pub async fn set_config(&mut self, data: &ConfigData) -> Result<()> {
        for (table, rows) in data {
            for (key, row) in rows {
                self.set_entry(table, key, Some(row)).await?;
            }
        }
        Ok(())
    }

    /// Merge every row of `data` with [`mod_entry`](Self::mod_entry).
    pub async fn mod_config(&mut self, data: &ConfigData) -> Result<()> {
        for (table, rows) in data {
            for (key, row) in rows {
                self.mod_entry(table, key, Some(row)).await?;
            }
        }
        Ok(())
    }

    // -- Change dispatch ----------------------------------------------------

    /// Register `handler` for changes to `table`, replacing any previous
    /// handler of that table.
    pub fn subscribe<F>(&mut self, table: &str, handler: F)
    where
        F: FnMut(&str, &RowKey, Option<&Row>) + Send + 'static,
    {
        self.handlers.insert(table.to_uppercase(), Box::new(handler));
    }

    /// Remove the handler of `table`, if any.
    pub fn unsubscribe(&mut self, table: &str) {
        self.handlers.remove(&table.to_uppercase());
    }

    /// Whether `table` has a handler.
    pub fn has_handler(&self, table: &str) -> bool {
        self.handlers.contains_key(&table.to_uppercase())
    }

    /// Open a channel receiving every change to `CONFIG_DB`.
    ///
    /// Its [`closer`](KeyspaceChannel::closer) ends a running
    /// [`dispatch`](Self::dispatch).
    pub async fn change_listener(&mut self) -> Result<KeyspaceChannel> {
        let pattern = keyspace_pattern(self.db_index);
        let conn = self.connector.client(CONFIG_DB)?;
        Ok(KeyspaceChannel::open(conn, &pattern).await?)
    }

    /// Deliver changes arriving on `listener` to the registered handlers
    /// until the listener is closed.
    pub async fn dispatch(&mut self, listener: &mut KeyspaceChannel) -> Result<()> {
        while let Some(message) = listener.next_message().await? {
            self.handle_change(&message.channel).await?;
        }
        debug!(pattern = %listener.pattern(), "Change listener closed");
        Ok(())
    }

    /// Open a change listener, pass its closer to `on_open` and dispatch
    /// until that closer is used.
    ///
    /// `on_open` runs once the subscription is in place, so a change
    /// written after it returns is always delivered.
    pub async fn listen<F>(&mut self, on_open: F) -> Result<()>
    where
        F: FnOnce(SubscriptionCloser) + Send,
    {
        let mut listener = self.change_listener().await?;
        on_open(listener.closer());
        self.dispatch(&mut listener).await
    }

    /// Handle one change notification. Returns `true` if a handler ran.
    async fn handle_change(&mut self, channel: &str) -> Result<bool> {
        let Some(key) = channel_key(channel) else {
            return Ok(false);
        };
        let Some((table, row)) = split_table_key(key) else {
            return Ok(false);
        };
        if !self.handlers.contains_key(table) {
            return Ok(false);
        }

        let raw = self.read_raw_row(key).await?;
        let data = (!raw.is_empty()).then(|| raw_to_typed(raw));
        let row_key = deserialize_key(row);
        if let Some(handler) = self.handlers.get_mut(table) {
            handler(table, &row_key, data.as_ref());
        }
        Ok(true)
    }
}

impl fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tables: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        tables.sort_unstable();
        f.debug_struct("ConfigDb")
            .field("connector", &self.connector)
            .field("db_index", &self.db_index)
            .field("handlers", &tables)
            .finish()
    }
}
