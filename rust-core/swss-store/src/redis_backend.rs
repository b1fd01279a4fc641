// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Redis store backend.
//
// Each logical database gets its own multiplexed async connection selected
// on the database index. Pattern subscriptions use a dedicated pub/sub
// connection, since a connection in subscribe mode cannot issue commands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tokio::sync::watch;
use tracing::debug;

use crate::backend::{closed, Message, StoreBackend, StoreConnection, Subscription, SubscriptionCloser};
use crate::error::StoreError;

/// Where the Redis server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisAddress {
    /// TCP host and port.
    Tcp {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
    /// Local Unix domain socket.
    Unix(PathBuf),
}

/// A [`StoreBackend`] backed by a Redis server.
#[derive(Debug, Clone)]
pub struct RedisBackend {
    address: RedisAddress,
}

impl RedisBackend {
    /// Create a backend for the server at `address`. No connection is made
    /// until [`StoreBackend::open`] is called.
    pub fn new(address: RedisAddress) -> Self {
        Self { address }
    }

    /// The configured server address.
    pub fn address(&self) -> &RedisAddress {
        &self.address
    }

    fn connection_info(&self, db_index: u32) -> ConnectionInfo {
        let addr = match &self.address {
            RedisAddress::Tcp { host, port } => ConnectionAddr::Tcp(host.clone(), *port),
            RedisAddress::Unix(path) => ConnectionAddr::Unix(path.clone()),
        };
        ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: i64::from(db_index),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn open(&self, db_index: u32) -> Result<Box<dyn StoreConnection>, StoreError> {
        let client = redis::Client::open(self.connection_info(db_index))?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!(db_index, address = ?self.address, "Opened Redis connection");
        Ok(Box::new(RedisConnection { client, conn }))
    }

    fn name(&self) -> &str {
        "redis"
    }
}

/// A connection to one Redis logical database.
pub struct RedisConnection {
    client: redis::Client,
    conn: MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn config_set(&mut self, parameter: &str, value: &str) -> Result<(), StoreError> {
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg(parameter)
            .arg(value)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn keys(&mut self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(&mut self.conn).await?;
        Ok(keys)
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut self.conn).await?;
        Ok(value)
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let _: () = redis::cmd("SET").arg(key).arg(value).query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut self.conn)
            .await?;
        Ok(value)
    }

    async fn hgetall(&mut self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let row: HashMap<String, String> =
            redis::cmd("HGETALL").arg(key).query_async(&mut self.conn).await?;
        Ok(row)
    }

    async fn hset(&mut self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize, StoreError> {
        if fields.is_empty() {
            return Ok(0);
        }
        let removed: usize = redis::cmd("HDEL")
            .arg(key)
            .arg(fields)
            .query_async(&mut self.conn)
            .await?;
        Ok(removed)
    }

    async fn del(&mut self, key: &str) -> Result<bool, StoreError> {
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut self.conn).await?;
        Ok(removed > 0)
    }

    async fn exists(&mut self, key: &str) -> Result<bool, StoreError> {
        let found: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut self.conn).await?;
        Ok(found > 0)
    }

    async fn flushdb(&mut self) -> Result<(), StoreError> {
        let _: () = redis::cmd("FLUSHDB").query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn psubscribe(&mut self, pattern: &str) -> Result<Box<dyn Subscription>, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        debug!(pattern, "Opened Redis pattern subscription");

        let (closer, closed_rx) = SubscriptionCloser::pair();
        Ok(Box::new(RedisSubscription {
            messages: Box::pin(pubsub.into_on_message()),
            closer,
            closed_rx,
        }))
    }
}

/// A Redis pattern subscription. Dropping it closes the pub/sub connection.
pub struct RedisSubscription {
    messages: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
    closer: SubscriptionCloser,
    closed_rx: watch::Receiver<bool>,
}

#[async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Result<Option<Message>, StoreError> {
        if self.closer.is_closed() {
            return Ok(None);
        }
        let msg = tokio::select! {
            _ = closed(&mut self.closed_rx) => return Ok(None),
            msg = self.messages.next() => msg,
        };
        // The stream ends when the pub/sub connection drops.
        let Some(msg) = msg else {
            return Err(StoreError::Io("pub/sub connection lost".to_string()));
        };
        Ok(Some(Message {
            pattern: msg.get_pattern::<String>().ok(),
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload::<String>()?,
        }))
    }

    fn closer(&self) -> SubscriptionCloser {
        self.closer.clone()
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closer.close();
        Ok(())
    }
}
