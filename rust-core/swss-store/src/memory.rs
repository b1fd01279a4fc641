// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory store backend for the switch-state database.
//
// Keeps every logical database as a `BTreeMap` behind a tokio `RwLock` and
// publishes keyspace notifications on a broadcast channel, so the blocking
// read protocol and the change-dispatch loop can be exercised without a
// server. Fault injection hooks let tests simulate connection outages.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, RwLock};

use crate::backend::{closed, Message, StoreBackend, StoreConnection, Subscription, SubscriptionCloser};
use crate::error::StoreError;
use crate::pattern::glob_match;

/// Capacity of the notification channel shared by all subscribers.
const NOTIFICATION_CAPACITY: usize = 1024;

const WRONGTYPE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(BTreeMap<String, String>),
}

/// Which notification classes are enabled, from `notify-keyspace-events`.
#[derive(Debug, Clone, Default)]
struct NotifyFlags {
    keyspace: bool,
    generic: bool,
    string: bool,
    hash: bool,
}

impl NotifyFlags {
    fn parse(flags: &str) -> Result<Self, StoreError> {
        let mut parsed = NotifyFlags::default();
        for c in flags.chars() {
            match c {
                'K' => parsed.keyspace = true,
                // Keyevent channels are not modelled; accepted for compatibility.
                'E' => {}
                'g' => parsed.generic = true,
                '$' => parsed.string = true,
                'h' => parsed.hash = true,
                'A' => {
                    parsed.generic = true;
                    parsed.string = true;
                    parsed.hash = true;
                }
                'l' | 's' | 'z' | 'x' | 'e' | 't' | 'm' | 'n' => {}
                other => {
                    return Err(StoreError::Response(format!(
                        "ERR Invalid event class character '{other}'"
                    )))
                }
            }
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy)]
enum EventClass {
    Generic,
    String,
    Hash,
}

#[derive(Debug)]
struct State {
    databases: RwLock<HashMap<u32, BTreeMap<String, Value>>>,
    flags: RwLock<NotifyFlags>,
    notifications: broadcast::Sender<Message>,
    pending_faults: AtomicU32,
    reachable: AtomicBool,
}

/// An in-memory store shared by every connection opened from it.
///
/// Cloning the backend shares the data, so one clone can act as a writer
/// daemon while another one is read by the code under test.
///
/// # Example
///
/// ```rust
/// use swss_store::backend::StoreBackend;
/// use swss_store::memory::InMemoryBackend;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// let mut conn = store.open(0).await.unwrap();
/// conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();
/// let mtu = conn.hget("PORT|Ethernet0", "mtu").await.unwrap();
/// assert_eq!(mtu.as_deref(), Some("9100"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    state: Arc<State>,
}

impl InMemoryBackend {
    /// Create a new, empty, reachable store with notifications disabled.
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            state: Arc::new(State {
                databases: RwLock::new(HashMap::new()),
                flags: RwLock::new(NotifyFlags::default()),
                notifications,
                pending_faults: AtomicU32::new(0),
                reachable: AtomicBool::new(true),
            }),
        }
    }

    /// Make the next `count` commands, on any connection, fail with an I/O
    /// error.
    pub fn fail_next_commands(&self, count: u32) {
        self.state.pending_faults.store(count, Ordering::SeqCst);
    }

    /// Number of injected faults that have not fired yet.
    pub fn pending_faults(&self) -> u32 {
        self.state.pending_faults.load(Ordering::SeqCst)
    }

    /// Control whether `open` succeeds.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of keys currently stored in database `db_index`.
    pub async fn len(&self, db_index: u32) -> usize {
        self.state
            .databases
            .read()
            .await
            .get(&db_index)
            .map_or(0, BTreeMap::len)
    }

    /// Return true if database `db_index` holds no keys.
    pub async fn is_empty(&self, db_index: u32) -> bool {
        self.len(db_index).await == 0
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    async fn open(&self, db_index: u32) -> Result<Box<dyn StoreConnection>, StoreError> {
        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Io("Connection refused".to_string()));
        }
        Ok(Box::new(InMemoryConnection {
            state: self.state.clone(),
            db_index,
        }))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// A connection to one logical database of an [`InMemoryBackend`].
#[derive(Debug)]
pub struct InMemoryConnection {
    state: Arc<State>,
    db_index: u32,
}

impl InMemoryConnection {
    /// Consume one injected fault, if any are pending.
    fn check_fault(&self) -> Result<(), StoreError> {
        let fired = self
            .state
            .pending_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fired {
            Err(StoreError::Io("Connection reset by peer".to_string()))
        } else {
            Ok(())
        }
    }

    async fn notify(&self, class: EventClass, key: &str, event: &str) {
        let flags = self.state.flags.read().await;
        let enabled = flags.keyspace
            && match class {
                EventClass::Generic => flags.generic,
                EventClass::String => flags.string,
                EventClass::Hash => flags.hash,
            };
        if !enabled {
            return;
        }
        // No receivers is fine: nobody is listening.
        let _ = self.state.notifications.send(Message {
            pattern: None,
            channel: format!("__keyspace@{}__:{}", self.db_index, key),
            payload: event.to_string(),
        });
    }
}

#[async_trait]
impl StoreConnection for InMemoryConnection {
    async fn config_set(&mut self, parameter: &str, value: &str) -> Result<(), StoreError> {
        self.check_fault()?;
        match parameter {
            "notify-keyspace-events" => {
                let parsed = NotifyFlags::parse(value)?;
                *self.state.flags.write().await = parsed;
                Ok(())
            }
            other => Err(StoreError::Response(format!(
                "ERR Unknown option or number of arguments for CONFIG SET - '{other}'"
            ))),
        }
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_fault()?;
        let dbs = self.state.databases.read().await;
        Ok(dbs
            .get(&self.db_index)
            .map(|db| {
                db.keys()
                    .filter(|key| glob_match(pattern, key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_fault()?;
        let dbs = self.state.databases.read().await;
        match dbs.get(&self.db_index).and_then(|db| db.get(key)) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(Value::Hash(_)) => Err(StoreError::Response(WRONGTYPE.to_string())),
        }
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_fault()?;
        {
            let mut dbs = self.state.databases.write().await;
            dbs.entry(self.db_index)
                .or_default()
                .insert(key.to_string(), Value::Text(value.to_string()));
        }
        self.notify(EventClass::String, key, "set").await;
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.check_fault()?;
        let dbs = self.state.databases.read().await;
        match dbs.get(&self.db_index).and_then(|db| db.get(key)) {
            None => Ok(None),
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(Value::Text(_)) => Err(StoreError::Response(WRONGTYPE.to_string())),
        }
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check_fault()?;
        let dbs = self.state.databases.read().await;
        match dbs.get(&self.db_index).and_then(|db| db.get(key)) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(Value::Text(_)) => Err(StoreError::Response(WRONGTYPE.to_string())),
        }
    }

    async fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.check_fault()?;
        {
            let mut dbs = self.state.databases.write().await;
            let db = dbs.entry(self.db_index).or_default();
            let entry = db
                .entry(key.to_string())
                .or_insert_with(|| Value::Hash(BTreeMap::new()));
            match entry {
                Value::Hash(hash) => {
                    hash.insert(field.to_string(), value.to_string());
                }
                Value::Text(_) => return Err(StoreError::Response(WRONGTYPE.to_string())),
            }
        }
        self.notify(EventClass::Hash, key, "hset").await;
        Ok(())
    }

    async fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        self.check_fault()?;
        let (removed, emptied) = {
            let mut dbs = self.state.databases.write().await;
            let Some(db) = dbs.get_mut(&self.db_index) else {
                return Ok(0);
            };
            let (removed, emptied) = match db.get_mut(key) {
                None => return Ok(0),
                Some(Value::Text(_)) => return Err(StoreError::Response(WRONGTYPE.to_string())),
                Some(Value::Hash(hash)) => {
                    let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
                    (removed, hash.is_empty())
                }
            };
            if emptied {
                db.remove(key);
            }
            (removed, emptied)
        };
        if removed > 0 {
            self.notify(EventClass::Hash, key, "hdel").await;
        }
        if emptied {
            self.notify(EventClass::Generic, key, "del").await;
        }
        Ok(removed)
    }

    async fn del(&mut self, key: &str) -> Result<bool, StoreError> {
        self.check_fault()?;
        let existed = {
            let mut dbs = self.state.databases.write().await;
            dbs.get_mut(&self.db_index)
                .map_or(false, |db| db.remove(key).is_some())
        };
        if existed {
            self.notify(EventClass::Generic, key, "del").await;
        }
        Ok(existed)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        self.check_fault()?;
        let dbs = self.state.databases.read().await;
        Ok(dbs
            .get(&self.db_index)
            .map_or(false, |db| db.contains_key(key)))
    }

    async fn flushdb(&mut self) -> Result<(), StoreError> {
        self.check_fault()?;
        self.state.databases.write().await.remove(&self.db_index);
        Ok(())
    }

    async fn psubscribe(&mut self, pattern: &str) -> Result<Box<dyn Subscription>, StoreError> {
        self.check_fault()?;
        let (closer, closed_rx) = SubscriptionCloser::pair();
        Ok(Box::new(InMemorySubscription {
            pattern: pattern.to_string(),
            receiver: self.state.notifications.subscribe(),
            closer,
            closed_rx,
        }))
    }
}

/// A pattern subscription on an [`InMemoryBackend`].
///
/// Only messages published after the subscription was opened are seen.
#[derive(Debug)]
pub struct InMemorySubscription {
    pattern: String,
    receiver: broadcast::Receiver<Message>,
    closer: SubscriptionCloser,
    closed_rx: watch::Receiver<bool>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next_message(&mut self) -> Result<Option<Message>, StoreError> {
        loop {
            if self.closer.is_closed() {
                return Ok(None);
            }
            let received = tokio::select! {
                _ = closed(&mut self.closed_rx) => return Ok(None),
                received = self.receiver.recv() => received,
            };
            match received {
                Ok(message) if glob_match(&self.pattern, &message.channel) => {
                    return Ok(Some(Message {
                        pattern: Some(self.pattern.clone()),
                        ..message
                    }));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, pattern = %self.pattern, "Subscriber lagged, notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }

    fn closer(&self) -> SubscriptionCloser {
        self.closer.clone()
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closer.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn notifying_store() -> (InMemoryBackend, Box<dyn StoreConnection>) {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(4).await.unwrap();
        conn.config_set("notify-keyspace-events", "KEA").await.unwrap();
        (backend, conn)
    }

    #[tokio::test]
    async fn test_hash_crud() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(0).await.unwrap();

        assert!(backend.is_empty(0).await);
        assert_eq!(conn.hget("PORT|Ethernet0", "mtu").await.unwrap(), None);
        assert!(conn.hgetall("PORT|Ethernet0").await.unwrap().is_empty());

        conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();
        conn.hset("PORT|Ethernet0", "speed", "100000").await.unwrap();
        assert_eq!(backend.len(0).await, 1);

        let row = conn.hgetall("PORT|Ethernet0").await.unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row["speed"], "100000");

        let removed = conn.hdel("PORT|Ethernet0", &["mtu".to_string(), "nope".to_string()]).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(conn.hget("PORT|Ethernet0", "mtu").await.unwrap(), None);

        // Removing the last field removes the key.
        conn.hdel("PORT|Ethernet0", &["speed".to_string()]).await.unwrap();
        assert!(!conn.exists("PORT|Ethernet0").await.unwrap());
    }

    #[tokio::test]
    async fn test_databases_are_isolated() {
        let backend = InMemoryBackend::new();
        let mut appl = backend.open(0).await.unwrap();
        let mut config = backend.open(4).await.unwrap();

        appl.hset("PORT_TABLE:Ethernet0", "oper_status", "up").await.unwrap();
        assert!(config.keys("*").await.unwrap().is_empty());
        assert_eq!(appl.keys("*").await.unwrap(), vec!["PORT_TABLE:Ethernet0".to_string()]);
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(4).await.unwrap();
        conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();
        conn.hset("PORT|Ethernet4", "mtu", "9100").await.unwrap();
        conn.hset("VLAN|Vlan100", "vlanid", "100").await.unwrap();

        let ports = conn.keys("PORT|*").await.unwrap();
        assert_eq!(ports, vec!["PORT|Ethernet0".to_string(), "PORT|Ethernet4".to_string()]);
        assert_eq!(conn.keys("*").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wrong_type_is_response_error() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(4).await.unwrap();
        conn.set("CONFIG_DB_INITIALIZED", "1").await.unwrap();

        let err = conn.hget("CONFIG_DB_INITIALIZED", "x").await.unwrap_err();
        assert!(err.is_malformed());
        let err = conn.hset("CONFIG_DB_INITIALIZED", "x", "y").await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_unknown_config_parameter_rejected() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(0).await.unwrap();
        let err = conn.config_set("no-such-option", "1").await.unwrap_err();
        assert!(err.is_malformed());
        let err = conn.config_set("notify-keyspace-events", "KQ").await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_keyspace_notification_delivery() {
        let (_backend, mut conn) = notifying_store().await;
        let mut sub = conn.psubscribe("__keyspace@4__:*").await.unwrap();

        conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();
        conn.del("PORT|Ethernet0").await.unwrap();

        let first = sub.next_message().await.unwrap().unwrap();
        assert_eq!(first.channel, "__keyspace@4__:PORT|Ethernet0");
        assert_eq!(first.payload, "hset");
        assert_eq!(first.pattern.as_deref(), Some("__keyspace@4__:*"));

        let second = sub.next_message().await.unwrap().unwrap();
        assert_eq!(second.payload, "del");
    }

    #[tokio::test]
    async fn test_subscription_filters_other_databases() {
        let (backend, mut conn) = notifying_store().await;
        let mut other = backend.open(0).await.unwrap();
        let mut sub = conn.psubscribe("__keyspace@4__:*").await.unwrap();

        other.hset("PORT_TABLE:Ethernet0", "mtu", "9100").await.unwrap();
        conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();

        let msg = sub.next_message().await.unwrap().unwrap();
        assert_eq!(msg.channel, "__keyspace@4__:PORT|Ethernet0");
    }

    #[tokio::test]
    async fn test_notifications_require_config() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(4).await.unwrap();
        let mut sub = conn.psubscribe("*").await.unwrap();

        conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();
        let waited = tokio::time::timeout(std::time::Duration::from_millis(50), sub.next_message()).await;
        assert!(waited.is_err(), "no notification expected before CONFIG SET");
    }

    #[tokio::test]
    async fn test_hash_only_flags() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(4).await.unwrap();
        conn.config_set("notify-keyspace-events", "Kh").await.unwrap();
        let mut sub = conn.psubscribe("*").await.unwrap();

        conn.set("CONFIG_DB_INITIALIZED", "1").await.unwrap();
        conn.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();

        let msg = sub.next_message().await.unwrap().unwrap();
        assert_eq!(msg.payload, "hset");
    }

    #[tokio::test]
    async fn test_closer_ends_subscription() {
        let (_backend, mut conn) = notifying_store().await;
        let mut sub = conn.psubscribe("*").await.unwrap();
        let closer = sub.closer();

        let reader = tokio::spawn(async move { sub.next_message().await });
        closer.close();
        assert_eq!(reader.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(0).await.unwrap();

        backend.fail_next_commands(2);
        assert!(conn.keys("*").await.unwrap_err().is_transient());
        assert!(conn.hget("a", "b").await.unwrap_err().is_transient());
        assert_eq!(backend.pending_faults(), 0);
        assert!(conn.keys("*").await.unwrap().is_empty());

        backend.set_reachable(false);
        assert!(backend.open(0).await.err().unwrap().is_transient());
        backend.set_reachable(true);
        assert!(backend.open(0).await.is_ok());
    }

    #[tokio::test]
    async fn test_flushdb() {
        let backend = InMemoryBackend::new();
        let mut conn = backend.open(2).await.unwrap();
        conn.hset("COUNTERS:oid:0x1", "SAI_PORT_STAT_IF_IN_OCTETS", "0").await.unwrap();
        conn.flushdb().await.unwrap();
        assert!(backend.is_empty(2).await);
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();
        let mut writer = backend.open(0).await.unwrap();
        let mut reader = clone.open(0).await.unwrap();

        writer.set("shared", "data").await.unwrap();
        assert_eq!(reader.get("shared").await.unwrap().as_deref(), Some("data"));
    }
}
