// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Connection management: one-shot and persistent connects, teardown and
//! recovery after transport failures.

use tracing::{debug, info, warn};

use crate::connector::DbConnector;
use crate::error::{Result, SdkError};

/// Store setting that enables keyspace notifications.
const NOTIFY_KEYSPACE_EVENTS: &str = "notify-keyspace-events";

impl DbConnector {
    /// Connect to the named database.
    ///
    /// With `retry` set the connector keeps reconnecting until it succeeds;
    /// otherwise exactly one attempt is made.
    pub async fn connect(&mut self, db_name: &str, retry: bool) -> Result<()> {
        if retry {
            self.connect_persistent(db_name).await
        } else {
            self.connect_once(db_name).await
        }
    }

    /// Make a single connection attempt to `db_name`.
    ///
    /// Opens a transport for the database's index and enables keyspace
    /// notifications on the store.
    ///
    /// # Errors
    ///
    /// - [`SdkError::Configuration`] if `db_name` has no configured index.
    /// - [`SdkError::MalformedRequest`] if the store rejects the
    ///   notification setting, which points at a broken installation.
    /// - [`SdkError::Store`] for transport failures.
    pub async fn connect_once(&mut self, db_name: &str) -> Result<()> {
        let db_index = self.get_dbid(db_name).ok_or_else(|| {
            SdkError::Configuration(format!("No database ID configured for '{db_name}'"))
        })?;

        let mut client = self.backend.open(db_index).await?;
        client
            .config_set(NOTIFY_KEYSPACE_EVENTS, &self.settings.keyspace_events)
            .await
            .map_err(|source| {
                if source.is_malformed() {
                    SdkError::MalformedRequest {
                        db: db_name.to_string(),
                        operation: "config_set".to_string(),
                        source,
                    }
                } else {
                    SdkError::Store(source)
                }
            })?;

        // A reconnect replaces the old transport; its channel belonged to it.
        if self.clients.insert(db_name, client).is_some() {
            self.unsubscribe_keyspace(db_name).await;
        }
        info!(db = %db_name, db_index, backend = self.backend.name(), "Connected to DB");
        Ok(())
    }

    /// Keep reconnecting to `db_name` until a connection is established.
    ///
    /// Transient failures are retried forever, sleeping
    /// `connect_retry_wait` between attempts. Configuration and malformed
    /// request errors are returned immediately.
    pub async fn connect_persistent(&mut self, db_name: &str) -> Result<()> {
        loop {
            match self.connect_once(db_name).await {
                Ok(()) => return Ok(()),
                Err(SdkError::Store(err)) if err.is_transient() => {
                    let wait = self.settings.connect_retry_wait;
                    warn!(
                        db = %db_name,
                        error = %err,
                        "Connecting to DB failed, will retry in {:?}",
                        wait
                    );
                    self.close(db_name).await;
                    tokio::time::sleep(wait).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Close the connection and any keyspace channel of `db_name`.
    ///
    /// Safe to call when nothing is open.
    pub async fn close(&mut self, db_name: &str) {
        self.unsubscribe_keyspace(db_name).await;
        if self.clients.remove(db_name).is_some() {
            debug!(db = %db_name, "Closed DB connection");
        }
    }

    /// Close every open connection and channel.
    pub async fn close_all(&mut self) {
        let names: Vec<String> = self.clients.names().map(str::to_string).collect();
        for name in names {
            self.close(&name).await;
        }
        let names: Vec<String> = self.channels.names().map(str::to_string).collect();
        for name in names {
            self.unsubscribe_keyspace(&name).await;
        }
    }

    /// Recover from a transport failure on `db_name`: drop the connection,
    /// wait, then reconnect persistently.
    pub(crate) async fn recover_connection(&mut self, db_name: &str) -> Result<()> {
        warn!(db = %db_name, "Could not connect to the store, waiting before trying again");
        self.close(db_name).await;
        tokio::time::sleep(self.settings.connect_retry_wait).await;
        self.connect_persistent(db_name).await
    }
}
