// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core transport traits for the switch-state database.
//
// A `StoreBackend` knows how to reach one store instance and opens one
// `StoreConnection` per logical database index. Connections expose the hash
// oriented command set the access layer uses, plus pattern subscriptions that
// deliver keyspace notifications as `Message`s.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::StoreError;

/// A published message received through a pattern subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The pattern that matched, if the subscription was a pattern one.
    pub pattern: Option<String>,
    /// Channel the message was published on, e.g. `__keyspace@4__:PORT|Ethernet0`.
    pub channel: String,
    /// Message body. For keyspace notifications this is the operation name
    /// (`hset`, `del`, ...).
    pub payload: String,
}

/// Something that can open connections to a store instance.
///
/// Implementations must be safe to share across tasks; the connections they
/// return are not.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Open a connection bound to logical database `db_index`.
    async fn open(&self, db_index: u32) -> Result<Box<dyn StoreConnection>, StoreError>;

    /// A human-readable name for this backend, used in logging.
    fn name(&self) -> &str;
}

#[async_trait]
impl<B: StoreBackend + ?Sized> StoreBackend for Arc<B> {
    async fn open(&self, db_index: u32) -> Result<Box<dyn StoreConnection>, StoreError> {
        (**self).open(db_index).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A live connection to one logical database.
///
/// Commands on one connection are issued and observed in call order.
#[async_trait]
pub trait StoreConnection: Send {
    /// `CONFIG SET parameter value`.
    async fn config_set(&mut self, parameter: &str, value: &str) -> Result<(), StoreError>;

    /// Enumerate keys matching a glob `pattern`.
    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Read a plain string key.
    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a plain string key.
    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read one field of a hash.
    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Read a whole hash. A missing key yields an empty map.
    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Write one field of a hash.
    async fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Remove fields from a hash, returning how many existed.
    async fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, StoreError>;

    /// Delete a key of any type. Returns `true` if it existed.
    async fn del(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Check whether a key exists.
    async fn exists(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Remove every key of this logical database.
    async fn flushdb(&mut self) -> Result<(), StoreError>;

    /// Open a pattern subscription (`PSUBSCRIBE`).
    async fn psubscribe(&mut self, pattern: &str) -> Result<Box<dyn Subscription>, StoreError>;
}

/// An open pattern subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. Returns `Ok(None)` once the subscription
    /// has been closed, locally or by a [`SubscriptionCloser`].
    async fn next_message(&mut self) -> Result<Option<Message>, StoreError>;

    /// A handle that closes this subscription from elsewhere.
    fn closer(&self) -> SubscriptionCloser;

    /// Close the subscription. Further reads return `Ok(None)`.
    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Closes a [`Subscription`] from another task.
///
/// Closing wakes any pending `next_message` call, which then returns
/// `Ok(None)`.
#[derive(Debug, Clone)]
pub struct SubscriptionCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl SubscriptionCloser {
    /// Create a closer and the receiver a subscription watches.
    pub fn pair() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    /// Close the subscription.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolve once `rx` observes a close request (or its sender is gone).
pub async fn closed(rx: &mut watch::Receiver<bool>) {
    // An error means every closer was dropped together with the subscription
    // owner, which is as good as closed.
    let _ = rx.wait_for(|closed| *closed).await;
}
