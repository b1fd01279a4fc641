// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Store error types for the switch-state database transport.
//
// The access layer above this crate only needs to tell two kinds of failure
// apart: faults of the transport itself (which are worth a reconnect) and
// rejections of the request by the store (which never get better on retry).

use thiserror::Error;

/// Errors that can occur when talking to a key-value store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The transport failed (connection refused, reset, timed out).
    #[error("I/O error: {0}")]
    Io(String),

    /// The store rejected the request itself (bad syntax, wrong value type,
    /// unknown configuration parameter).
    #[error("response error: {0}")]
    Response(String),

    /// The connection or subscription was closed locally.
    #[error("closed: {0}")]
    Closed(String),
}

impl StoreError {
    /// True for faults that a reconnect may cure.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Closed(_))
    }

    /// True when the store refused the shape of the request.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StoreError::Response(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::ResponseError | redis::ErrorKind::TypeError => {
                StoreError::Response(err.to_string())
            }
            _ => StoreError::Io(err.to_string()),
        }
    }
}
