// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The blocking access protocol.
//!
//! An [`Operation`] makes one attempt against a store connection and reports
//! either a value or which notification would signal that the missing data
//! has arrived. A [`RetryPolicy`] drives attempts through a
//! [`RetryContext`] until one of these holds:
//!
//! - the data is there,
//! - a non-blocking read finds nothing,
//! - a blocking read times out waiting for notifications,
//! - the store rejects the request outright.
//!
//! Transport faults in between are recovered by reconnecting, with failure
//! logging that escalates after a few attempts and then settles down again.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use swss_store::{StoreConnection, StoreError};
use tracing::{debug, error, warn};

use crate::config::AccessSettings;
use crate::error::{Result, SdkError};

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    /// The data was present.
    Ready(T),
    /// The data was absent.
    Unavailable {
        /// What was missing, for logging and the eventual error.
        message: String,
        /// Keyspace notification payload that signals the data may have
        /// appeared.
        expected_event: String,
    },
}

/// One access-layer command, retried by a [`RetryPolicy`].
#[async_trait]
pub trait Operation: Send + Sync {
    /// Value produced once the data is available.
    type Output: Send;

    /// Short operation name for logs and errors, e.g. `get_all`.
    fn name(&self) -> &'static str;

    /// The arguments of this call, for logs.
    fn describe(&self) -> String;

    /// Make one attempt on `conn`.
    async fn invoke(
        &self,
        conn: &mut dyn StoreConnection,
    ) -> std::result::Result<Attempt<Self::Output>, StoreError>;
}

/// How a store error should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The store rejected the request. Surfaced to the caller at once.
    Malformed,
    /// A transport fault. Recovered by reconnecting.
    Transient,
}

/// Decides whether a store error is the caller's fault or the transport's.
pub trait ErrorClassifier: Send + Sync + fmt::Debug {
    /// Classify `err`.
    fn classify(&self, err: &StoreError) -> ErrorClass;
}

/// Classifier that trusts the store error kinds: server replies are
/// malformed requests, everything else is transient.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreErrorClassifier;

impl ErrorClassifier for StoreErrorClassifier {
    fn classify(&self, err: &StoreError) -> ErrorClass {
        if err.is_malformed() {
            ErrorClass::Malformed
        } else {
            ErrorClass::Transient
        }
    }
}

/// Whether a read waits for missing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Return `None` as soon as the data is found missing.
    #[default]
    NonBlocking,
    /// Subscribe to keyspace notifications and wait for the data.
    Blocking,
}

/// What a [`RetryPolicy`] needs from the connector it drives.
#[async_trait]
pub trait RetryContext: Send {
    /// Make one attempt of `op` against `db`.
    async fn attempt<O: Operation>(&mut self, db: &str, op: &O) -> Result<Attempt<O::Output>>;

    /// Whether `db` has an open keyspace subscription.
    fn is_subscribed(&self, db: &str) -> bool;

    /// Open the keyspace subscription of `db`.
    async fn subscribe(&mut self, db: &str) -> Result<()>;

    /// Close the keyspace subscription of `db`, if any.
    async fn unsubscribe(&mut self, db: &str);

    /// Wait for a notification with payload `expected` on `db`.
    /// Returns `false` when the wait budget ran out.
    async fn wait_for_event(&mut self, db: &str, expected: &str) -> Result<bool>;

    /// Reconnect `db` after a transport fault.
    async fn recover(&mut self, db: &str) -> Result<()>;
}

enum Step<T> {
    Retry,
    Done(Option<T>),
}

/// Drives an [`Operation`] to completion.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    mode: AccessMode,
    failure_log_threshold: u32,
    failure_log_suppression: u32,
    classifier: Arc<dyn ErrorClassifier>,
}

impl RetryPolicy {
    /// A policy in `mode` with thresholds from `settings`.
    pub fn new(mode: AccessMode, settings: &AccessSettings) -> Self {
        Self {
            mode,
            failure_log_threshold: settings.failure_log_threshold,
            failure_log_suppression: settings.failure_log_suppression,
            classifier: Arc::new(StoreErrorClassifier),
        }
    }

    /// Use `classifier` to split store errors.
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// The access mode.
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Run `op` against `db` until it produces a result.
    ///
    /// Returns `Ok(None)` only in [`AccessMode::NonBlocking`] when the data
    /// is absent. On every return the keyspace subscription of `db` is
    /// closed.
    ///
    /// # Errors
    ///
    /// - [`SdkError::UnavailableData`] when a blocking wait times out.
    /// - [`SdkError::MalformedRequest`] when the store rejects the request.
    /// - [`SdkError::MissingClient`] when `db` was never connected.
    pub async fn run<C, O>(&self, ctx: &mut C, db: &str, op: &O) -> Result<Option<O::Output>>
    where
        C: RetryContext + ?Sized,
        O: Operation,
    {
        let mut failures: u32 = 0;
        loop {
            let step = match ctx.attempt(db, op).await {
                Ok(Attempt::Ready(value)) => Ok(Step::Done(Some(value))),
                Ok(Attempt::Unavailable {
                    message,
                    expected_event,
                }) => self.on_unavailable(ctx, db, op, message, expected_event).await,
                Err(err) => Err(err),
            };

            match step {
                Ok(Step::Retry) => continue,
                Ok(Step::Done(value)) => {
                    if ctx.is_subscribed(db) {
                        ctx.unsubscribe(db).await;
                    }
                    return Ok(value);
                }
                Err(err) => self.on_error(ctx, db, op, err, &mut failures).await?,
            }
        }
    }

    async fn on_unavailable<C, O>(
        &self,
        ctx: &mut C,
        db: &str,
        op: &O,
        message: String,
        expected_event: String,
    ) -> Result<Step<O::Output>>
    where
        C: RetryContext + ?Sized,
        O: Operation,
    {
        if self.mode == AccessMode::NonBlocking {
            debug!(db = %db, operation = op.name(), "{}", message);
            return Ok(Step::Done(None));
        }

        if !ctx.is_subscribed(db) {
            // Subscribe first, then look again: a write that lands between
            // the miss and the subscription would otherwise go unseen.
            ctx.subscribe(db).await?;
            return Ok(Step::Retry);
        }

        if ctx.wait_for_event(db, &expected_event).await? {
            return Ok(Step::Retry);
        }

        ctx.unsubscribe(db).await;
        warn!(
            db = %db,
            operation = op.name(),
            args = %op.describe(),
            "{}",
            message
        );
        Err(SdkError::UnavailableData {
            db: db.to_string(),
            message,
            expected_event,
        })
    }

    async fn on_error<C, O>(
        &self,
        ctx: &mut C,
        db: &str,
        op: &O,
        err: SdkError,
        failures: &mut u32,
    ) -> Result<()>
    where
        C: RetryContext + ?Sized,
        O: Operation,
    {
        let source = match err {
            SdkError::Store(source) => source,
            other => {
                ctx.unsubscribe(db).await;
                return Err(other);
            }
        };

        match self.classifier.classify(&source) {
            ErrorClass::Malformed => {
                ctx.unsubscribe(db).await;
                error!(
                    db = %db,
                    operation = op.name(),
                    args = %op.describe(),
                    error = %source,
                    "Bad DB request"
                );
                Err(SdkError::MalformedRequest {
                    db: db.to_string(),
                    operation: op.name().to_string(),
                    source,
                })
            }
            ErrorClass::Transient => {
                *failures = failures.saturating_add(1);
                let attempt = *failures;
                if self.failure_log_threshold < attempt && attempt < self.failure_log_suppression {
                    error!(
                        db = %db,
                        operation = op.name(),
                        attempt,
                        error = %source,
                        "DB access failed repeatedly"
                    );
                } else {
                    warn!(
                        db = %db,
                        operation = op.name(),
                        attempt,
                        error = %source,
                        "DB access failure"
                    );
                }
                ctx.recover(db).await
            }
        }
    }
}
