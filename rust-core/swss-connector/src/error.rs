// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Error types for the database connector.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, SdkError>`. Variants follow the access layer's
//! failure taxonomy: configuration errors are fatal, unavailable data is
//! recoverable, malformed requests are caller bugs, store faults are
//! transient and missing clients mean a database was never connected.

use std::path::PathBuf;

use swss_store::StoreError;
use thiserror::Error;

/// Error type for connector operations.
#[derive(Error, Debug)]
pub enum SdkError {
    /// Unknown logical database name, duplicate index, or an invalid
    /// setting. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested keys, field or row did not appear within the wait
    /// budget of a blocking read.
    #[error("Unavailable data in '{db}': {message}")]
    UnavailableData {
        /// Logical database that was read.
        db: String,
        /// What was missing.
        message: String,
        /// Notification payload the read was waiting for.
        expected_event: String,
    },

    /// The store rejected the request itself. Retrying cannot help.
    #[error("Bad DB request [{db}:{operation}]: {source}")]
    MalformedRequest {
        /// Logical database the request targeted.
        db: String,
        /// Operation name, e.g. `get_all`.
        operation: String,
        /// The store's rejection.
        #[source]
        source: StoreError,
    },

    /// An operation named a database that was never connected.
    #[error("No client connected for db_name '{0}'")]
    MissingClient(String),

    /// A store fault outside the retry wrapper, e.g. during connect.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The database map file could not be read.
    #[error("Could not open database index '{}': {source}", path.display())]
    ConfigFile {
        /// Path of the file.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The database map is not valid JSON or does not match the schema.
    #[error("Incorrect database config schema: {0}")]
    Json(#[from] serde_json::Error),
}

impl SdkError {
    /// True for the unavailable-data condition.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SdkError::UnavailableData { .. })
    }
}

/// Crate-level result alias using [`SdkError`].
pub type Result<T> = std::result::Result<T, SdkError>;
