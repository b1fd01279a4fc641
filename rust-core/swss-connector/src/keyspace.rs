// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Keyspace notification channels.
//!
//! Each connected database has at most one channel, subscribed to
//! `__keyspace@{index}__:*`. Blocking reads use it to wait for the write
//! they are missing.

use std::fmt;
use std::time::Duration;

use swss_store::{Message, StoreConnection, StoreError, Subscription, SubscriptionCloser};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::AccessSettings;
use crate::connector::DbConnector;
use crate::error::{Result, SdkError};

/// Shortest single read while waiting for a notification. A zero
/// `notification_timeout` is raised to this.
const MIN_READ_SLICE: Duration = Duration::from_millis(10);

/// Pattern covering every key of logical database `db_index`.
pub fn keyspace_pattern(db_index: u32) -> String {
    format!("__keyspace@{db_index}__:*")
}

/// Notification channel for a single key of logical database `db_index`.
pub fn key_channel(db_index: u32, key: &str) -> String {
    format!("__keyspace@{db_index}__:{key}")
}

/// Strip the `__keyspace@{index}__:` prefix from a notification channel,
/// leaving the key.
pub fn channel_key(channel: &str) -> Option<&str> {
    let rest = channel.strip_prefix("__keyspace@")?;
    let (index, key) = rest.split_once("__:")?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(key)
}

/// An open pattern subscription delivering keyspace notifications.
pub struct KeyspaceChannel {
    pattern: String,
    subscription: Box<dyn Subscription>,
}

impl KeyspaceChannel {
    /// Subscribe to `pattern` on `conn`.
    pub async fn open(
        conn: &mut dyn StoreConnection,
        pattern: &str,
    ) -> std::result::Result<Self, StoreError> {
        let subscription = conn.psubscribe(pattern).await?;
        debug!(pattern = %pattern, "Subscribed to keyspace notifications");
        Ok(Self {
            pattern: pattern.to_string(),
            subscription,
        })
    }

    /// The subscribed pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// A handle that closes this channel from another task.
    pub fn closer(&self) -> SubscriptionCloser {
        self.subscription.closer()
    }

    /// The next notification, or `None` once the channel is closed.
    pub async fn next_message(&mut self) -> std::result::Result<Option<Message>, StoreError> {
        self.subscription.next_message().await
    }

    /// Wait until a notification with payload `expected` arrives.
    ///
    /// Each read is bounded by `notification_timeout` and the whole wait by
    /// `maximum_data_wait`. After a match the call sleeps
    /// `data_retrieval_wait` so that the writer can finish the rest of its
    /// row. Returns `Ok(false)` when the budget runs out.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] if the subscription ends while waiting.
    pub async fn wait_for_match(
        &mut self,
        expected: &str,
        settings: &AccessSettings,
    ) -> std::result::Result<bool, StoreError> {
        let started = Instant::now();
        let deadline = started + settings.maximum_data_wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let slice = settings
                .notification_timeout
                .max(MIN_READ_SLICE)
                .min(deadline - now);
            let received = match tokio::time::timeout(slice, self.subscription.next_message()).await {
                Ok(received) => received?,
                Err(_) => continue,
            };
            match received {
                Some(message) if message.payload == expected => {
                    info!(
                        pattern = %self.pattern,
                        channel = %message.channel,
                        waited = ?started.elapsed(),
                        "Data notification received"
                    );
                    tokio::time::sleep(settings.data_retrieval_wait).await;
                    return Ok(true);
                }
                Some(_) => continue,
                None => {
                    return Err(StoreError::Closed(format!(
                        "subscription to '{}' closed while waiting",
                        self.pattern
                    )))
                }
            }
        }
    }

    /// Close the subscription.
    pub async fn close(mut self) {
        if let Err(err) = self.subscription.close().await {
            debug!(pattern = %self.pattern, error = %err, "Error closing subscription");
        }
        debug!(pattern = %self.pattern, "Unsubscribed from keyspace notifications");
    }
}

impl fmt::Debug for KeyspaceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyspaceChannel")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

impl DbConnector {
    /// Open the keyspace channel of `db_name` if it is not open yet.
    ///
    /// # Errors
    ///
    /// [`SdkError::MissingClient`] if `db_name` is not connected.
    pub async fn subscribe_keyspace(&mut self, db_name: &str) -> Result<()> {
        if self.channels.contains(db_name) {
            return Ok(());
        }
        let db_index = self.get_dbid(db_name).ok_or_else(|| {
            SdkError::Configuration(format!("No database ID configured for '{db_name}'"))
        })?;
        let conn = self.clients.get_mut(db_name)?;
        let channel = KeyspaceChannel::open(conn.as_mut(), &keyspace_pattern(db_index)).await?;
        self.channels.insert(db_name, channel);
        Ok(())
    }

    /// Close the keyspace channel of `db_name`, if any.
    pub async fn unsubscribe_keyspace(&mut self, db_name: &str) {
        if let Some(channel) = self.channels.remove(db_name) {
            channel.close().await;
        }
    }

    /// Whether `db_name` has an open keyspace channel.
    pub fn has_keyspace_subscription(&self, db_name: &str) -> bool {
        self.channels.contains(db_name)
    }

    /// Wait on the keyspace channel of `db_name` for a notification with
    /// payload `expected`. See [`KeyspaceChannel::wait_for_match`].
    ///
    /// # Errors
    ///
    /// [`SdkError::MissingClient`] if no channel is open.
    pub async fn wait_for_keyspace_event(&mut self, db_name: &str, expected: &str) -> Result<bool> {
        let channel = self.channels.get_mut(db_name)?;
        Ok(channel.wait_for_match(expected, &self.settings).await?)
    }
}
