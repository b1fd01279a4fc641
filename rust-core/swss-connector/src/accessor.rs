// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Data access primitives.
//!
//! Every read and write goes through a [`RetryPolicy`](crate::RetryPolicy),
//! so transport faults are recovered the same way everywhere and blocking
//! reads wait for their data through the database's keyspace channel.

use std::collections::HashMap;

use async_trait::async_trait;
use swss_store::{StoreConnection, StoreError};

use crate::connector::DbConnector;
use crate::error::Result;
use crate::retry::{AccessMode, Attempt, Operation, RetryContext};

/// Value the store keeps for a field that is deliberately empty.
pub const NONE_LITERAL: &str = "None";

/// Payload of the notification a missing hash field or row waits for.
const HSET_EVENT: &str = "hset";

type StoreResult<T> = std::result::Result<T, StoreError>;

fn from_stored(value: String) -> Option<String> {
    if value == NONE_LITERAL {
        None
    } else {
        Some(value)
    }
}

fn unavailable<T>(message: String) -> Attempt<T> {
    Attempt::Unavailable {
        message,
        expected_event: HSET_EVENT.to_string(),
    }
}

// -- Operations -------------------------------------------------------------

/// `KEYS pattern`; no match is unavailable data.
#[derive(Debug)]
pub(crate) struct Keys<'a> {
    pub pattern: &'a str,
}

#[async_trait]
impl<'a> Operation for Keys<'a> {
    type Output = Vec<String>;

    fn name(&self) -> &'static str {
        "keys"
    }

    fn describe(&self) -> String {
        format!("pattern={}", self.pattern)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<Vec<String>>> {
        let keys = conn.keys(self.pattern).await?;
        if keys.is_empty() {
            return Ok(unavailable(format!("Keys not available for pattern: {}", self.pattern)));
        }
        Ok(Attempt::Ready(keys))
    }
}

/// `HGET key field`; a missing field is unavailable data.
#[derive(Debug)]
pub(crate) struct GetField<'a> {
    pub key: &'a str,
    pub field: &'a str,
}

#[async_trait]
impl<'a> Operation for GetField<'a> {
    type Output = Option<String>;

    fn name(&self) -> &'static str {
        "get"
    }

    fn describe(&self) -> String {
        format!("key={} field={}", self.key, self.field)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<Option<String>>> {
        match conn.hget(self.key, self.field).await? {
            Some(value) => Ok(Attempt::Ready(from_stored(value))),
            None => Ok(unavailable(format!(
                "Key '{}' field '{}' unavailable",
                self.key, self.field
            ))),
        }
    }
}

/// `HGETALL key`; an empty row is unavailable data.
#[derive(Debug)]
pub(crate) struct GetRow<'a> {
    pub key: &'a str,
}

#[async_trait]
impl<'a> Operation for GetRow<'a> {
    type Output = HashMap<String, Option<String>>;

    fn name(&self) -> &'static str {
        "get_all"
    }

    fn describe(&self) -> String {
        format!("key={}", self.key)
    }

    async fn invoke(
        &self,
        conn: &mut dyn StoreConnection,
    ) -> StoreResult<Attempt<HashMap<String, Option<String>>>> {
        let row = conn.hgetall(self.key).await?;
        if row.is_empty() {
            return Ok(unavailable(format!("Key '{}' unavailable", self.key)));
        }
        Ok(Attempt::Ready(
            row.into_iter()
                .map(|(field, value)| (field, from_stored(value)))
                .collect(),
        ))
    }
}

/// `HSET key field value`.
#[derive(Debug)]
pub(crate) struct SetField<'a> {
    pub key: &'a str,
    pub field: &'a str,
    pub value: &'a str,
}

#[async_trait]
impl<'a> Operation for SetField<'a> {
    type Output = ();

    fn name(&self) -> &'static str {
        "set"
    }

    fn describe(&self) -> String {
        format!("key={} field={}", self.key, self.field)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<()>> {
        conn.hset(self.key, self.field, self.value).await?;
        Ok(Attempt::Ready(()))
    }
}

/// `DEL key`.
#[derive(Debug)]
pub(crate) struct DeleteKey<'a> {
    pub key: &'a str,
}

#[async_trait]
impl<'a> Operation for DeleteKey<'a> {
    type Output = bool;

    fn name(&self) -> &'static str {
        "delete"
    }

    fn describe(&self) -> String {
        format!("key={}", self.key)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<bool>> {
        Ok(Attempt::Ready(conn.del(self.key).await?))
    }
}

/// `HDEL key field...`.
#[derive(Debug)]
pub(crate) struct DeleteFields<'a> {
    pub key: &'a str,
    pub fields: &'a [String],
}

#[async_trait]
impl<'a> Operation for DeleteFields<'a> {
    type Output = usize;

    fn name(&self) -> &'static str {
        "delete_fields"
    }

    fn describe(&self) -> String {
        format!("key={} fields={}", self.key, self.fields.join(","))
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<usize>> {
        if self.fields.is_empty() {
            return Ok(Attempt::Ready(0));
        }
        Ok(Attempt::Ready(conn.hdel(self.key, self.fields).await?))
    }
}

/// `KEYS pattern` followed by `DEL` of every match.
#[derive(Debug)]
pub(crate) struct DeleteByPattern<'a> {
    pub pattern: &'a str,
}

#[async_trait]
impl<'a> Operation for DeleteByPattern<'a> {
    type Output = usize;

    fn name(&self) -> &'static str {
        "delete_all_by_pattern"
    }

    fn describe(&self) -> String {
        format!("pattern={}", self.pattern)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<usize>> {
        let mut deleted = 0;
        for key in conn.keys(self.pattern).await? {
            if conn.del(&key).await? {
                deleted += 1;
            }
        }
        Ok(Attempt::Ready(deleted))
    }
}

/// `EXISTS key`.
#[derive(Debug)]
pub(crate) struct Exists<'a> {
    pub key: &'a str,
}

#[async_trait]
impl<'a> Operation for Exists<'a> {
    type Output = bool;

    fn name(&self) -> &'static str {
        "exists"
    }

    fn describe(&self) -> String {
        format!("key={}", self.key)
    }

    async fn invoke(&self, conn: &mut dyn StoreConnection) -> StoreResult<Attempt<bool>> {
        Ok(Attempt::Ready(conn.exists(self.key).await?))
    }
}

// -- Connector API ----------------------------------------------------------

impl DbConnector {
    /// Keys of `db_name` matching the glob `pattern` (`*` for all).
    ///
    /// Non-blocking: `Ok(None)` when nothing matches. Blocking: waits for a
    /// matching key to be written.
    pub async fn keys(
        &mut self,
        db_name: &str,
        pattern: &str,
        mode: AccessMode,
    ) -> Result<Option<Vec<String>>> {
        let policy = self.retry_policy(mode);
        policy.run(self, db_name, &Keys { pattern }).await
    }

    /// One field of the row at `key`.
    ///
    /// A field stored as the literal `"None"` reads as `None`, which is
    /// indistinguishable from a non-blocking miss.
    pub async fn get(
        &mut self,
        db_name: &str,
        key: &str,
        field: &str,
        mode: AccessMode,
    ) -> Result<Option<String>> {
        let policy = self.retry_policy(mode);
        let value = policy.run(self, db_name, &GetField { key, field }).await?;
        Ok(value.flatten())
    }

    /// The whole row at `key`. Fields stored as `"None"` map to `None`.
    pub async fn get_all(
        &mut self,
        db_name: &str,
        key: &str,
        mode: AccessMode,
    ) -> Result<Option<HashMap<String, Option<String>>>> {
        let policy = self.retry_policy(mode);
        policy.run(self, db_name, &GetRow { key }).await
    }

    /// Write one field of the row at `key`.
    pub async fn set(&mut self, db_name: &str, key: &str, field: &str, value: &str) -> Result<()> {
        let policy = self.retry_policy(AccessMode::NonBlocking);
        let op = SetField { key, field, value };
        Ok(policy.run(self, db_name, &op).await?.unwrap_or_default())
    }

    /// Delete the key `key`. Returns `true` if it existed.
    pub async fn delete(&mut self, db_name: &str, key: &str) -> Result<bool> {
        let policy = self.retry_policy(AccessMode::NonBlocking);
        Ok(policy.run(self, db_name, &DeleteKey { key }).await?.unwrap_or_default())
    }

    /// Remove `fields` from the row at `key`, returning how many existed.
    pub async fn delete_fields(&mut self, db_name: &str, key: &str, fields: &[String]) -> Result<usize> {
        let policy = self.retry_policy(AccessMode::NonBlocking);
        let op = DeleteFields { key, fields };
        Ok(policy.run(self, db_name, &op).await?.unwrap_or_default())
    }

    /// Delete every key matching the glob `pattern`, returning the count.
    pub async fn delete_all_by_pattern(&mut self, db_name: &str, pattern: &str) -> Result<usize> {
        let policy = self.retry_policy(AccessMode::NonBlocking);
        Ok(policy
            .run(self, db_name, &DeleteByPattern { pattern })
            .await?
            .unwrap_or_default())
    }

    /// Whether `key` exists.
    pub async fn exists(&mut self, db_name: &str, key: &str) -> Result<bool> {
        let policy = self.retry_policy(AccessMode::NonBlocking);
        Ok(policy.run(self, db_name, &Exists { key }).await?.unwrap_or_default())
    }
}

#[async_trait]
impl RetryContext for DbConnector {
    async fn attempt<O: Operation>(&mut self, db: &str, op: &O) -> Result<Attempt<O::Output>> {
        let conn = self.clients.get_mut(db)?;
        Ok(op.invoke(conn.as_mut()).await?)
    }

    fn is_subscribed(&self, db: &str) -> bool {
        self.has_keyspace_subscription(db)
    }

    async fn subscribe(&mut self, db: &str) -> Result<()> {
        self.subscribe_keyspace(db).await
    }

    async fn unsubscribe(&mut self, db: &str) {
        self.unsubscribe_keyspace(db).await
    }

    async fn wait_for_event(&mut self, db: &str, expected: &str) -> Result<bool> {
        self.wait_for_keyspace_event(db, expected).await
    }

    async fn recover(&mut self, db: &str) -> Result<()> {
        self.recover_connection(db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swss_store::{InMemoryBackend, MetricsBackend};

    use crate::config::{names, AccessSettings, ConnectorVariant, DatabaseMap};
    use crate::error::SdkError;

    async fn connected(backend: Arc<dyn swss_store::StoreBackend>) -> DbConnector {
        let mut db = DbConnector::new(
            ConnectorVariant::SonicV2,
            &DatabaseMap::bundled().unwrap(),
            backend,
            AccessSettings::default(),
        )
        .unwrap();
        db.connect(names::APPL_DB, false).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let mut db = connected(Arc::new(InMemoryBackend::new())).await;
        db.set(names::APPL_DB, "PORT_TABLE:Ethernet0", "mtu", "9100").await.unwrap();

        let mtu = db
            .get(names::APPL_DB, "PORT_TABLE:Ethernet0", "mtu", AccessMode::Blocking)
            .await
            .unwrap();
        assert_eq!(mtu.as_deref(), Some("9100"));
        assert!(!db.has_keyspace_subscription(names::APPL_DB));
    }

    #[tokio::test]
    async fn test_none_literal_reads_as_absent() {
        let mut db = connected(Arc::new(InMemoryBackend::new())).await;
        db.set(names::APPL_DB, "k", "a", NONE_LITERAL).await.unwrap();
        db.set(names::APPL_DB, "k", "b", "").await.unwrap();

        assert_eq!(db.get(names::APPL_DB, "k", "a", AccessMode::Blocking).await.unwrap(), None);
        assert_eq!(
            db.get(names::APPL_DB, "k", "b", AccessMode::NonBlocking).await.unwrap().as_deref(),
            Some("")
        );

        let row = db.get_all(names::APPL_DB, "k", AccessMode::NonBlocking).await.unwrap().unwrap();
        assert_eq!(row.get("a"), Some(&None));
        assert_eq!(row.get("b"), Some(&Some(String::new())));
    }

    #[tokio::test]
    async fn test_non_blocking_misses() {
        let mut db = connected(Arc::new(InMemoryBackend::new())).await;
        assert_eq!(db.keys(names::APPL_DB, "*", AccessMode::NonBlocking).await.unwrap(), None);
        assert_eq!(db.get(names::APPL_DB, "k", "f", AccessMode::NonBlocking).await.unwrap(), None);
        assert_eq!(db.get_all(names::APPL_DB, "k", AccessMode::NonBlocking).await.unwrap(), None);
        assert!(!db.has_keyspace_subscription(names::APPL_DB));
    }

    #[tokio::test]
    async fn test_keys_and_deletes() {
        let mut db = connected(Arc::new(InMemoryBackend::new())).await;
        db.set(names::APPL_DB, "PORT_TABLE:Ethernet0", "mtu", "9100").await.unwrap();
        db.set(names::APPL_DB, "PORT_TABLE:Ethernet4", "mtu", "9100").await.unwrap();
        db.set(names::APPL_DB, "PORT_TABLE:Ethernet4", "speed", "40000").await.unwrap();
        db.set(names::APPL_DB, "LAG_TABLE:PortChannel1", "mtu", "9100").await.unwrap();

        let mut ports = db
            .keys(names::APPL_DB, "PORT_TABLE:*", AccessMode::NonBlocking)
            .await
            .unwrap()
            .unwrap();
        ports.sort();
        assert_eq!(ports, vec!["PORT_TABLE:Ethernet0", "PORT_TABLE:Ethernet4"]);

        let fields = vec!["speed".to_string(), "missing".to_string()];
        assert_eq!(
            db.delete_fields(names::APPL_DB, "PORT_TABLE:Ethernet4", &fields).await.unwrap(),
            1
        );
        assert!(db.exists(names::APPL_DB, "PORT_TABLE:Ethernet4").await.unwrap());
        assert!(db.delete(names::APPL_DB, "PORT_TABLE:Ethernet4").await.unwrap());
        assert!(!db.delete(names::APPL_DB, "PORT_TABLE:Ethernet4").await.unwrap());

        assert_eq!(db.delete_all_by_pattern(names::APPL_DB, "*_TABLE:*").await.unwrap(), 2);
        assert!(!db.exists(names::APPL_DB, "LAG_TABLE:PortChannel1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unconnected_db_is_missing_client() {
        let mut db = connected(Arc::new(InMemoryBackend::new())).await;
        let err = db.get(names::STATE_DB, "k", "f", AccessMode::Blocking).await.unwrap_err();
        assert!(matches!(err, SdkError::MissingClient(ref name) if name == names::STATE_DB));
    }

    #[tokio::test]
    async fn test_wrong_type_is_malformed() {
        let backend = InMemoryBackend::new();
        let mut db = connected(Arc::new(backend.clone())).await;
        db.client(names::APPL_DB).unwrap().set("plain", "text").await.unwrap();

        let err = db.get(names::APPL_DB, "plain", "f", AccessMode::Blocking).await.unwrap_err();
        match err {
            SdkError::MalformedRequest { db: name, operation, .. } => {
                assert_eq!(name, names::APPL_DB);
                assert_eq!(operation, "get");
            }
            other => panic!("expected MalformedRequest, got: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fault_reconnects() {
        let inner = InMemoryBackend::new();
        let metered = Arc::new(MetricsBackend::new(inner.clone()));
        let mut db = connected(metered.clone()).await;
        db.set(names::APPL_DB, "k", "f", "v").await.unwrap();

        inner.fail_next_commands(2);
        let value = db.get(names::APPL_DB, "k", "f", AccessMode::NonBlocking).await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));

        // The first fault hits the read; the second hits the reconnect's
        // CONFIG SET, which is retried by the persistent connect.
        let stats = metered.stats().await;
        assert_eq!(stats.open_count, 3);
        assert_eq!(inner.pending_faults(), 0);
    }
}
