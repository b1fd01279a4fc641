// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! # swss-connector
//!
//! Client for the switch-state databases: a set of logical databases, named
//! `APPL_DB`, `CONFIG_DB`, `STATE_DB` and so on, hosted by one key-value
//! store.
//!
//! A [`DbConnector`] maps names to store indices from a [`DatabaseMap`],
//! connects once or persistently and reads in one of two [`AccessMode`]s.
//! Blocking reads subscribe to the database's keyspace notifications and
//! wait for the missing data to be written. Every access goes through a
//! [`RetryPolicy`] that recovers transport faults by reconnecting and
//! surfaces rejected requests at once.
//!
//! ## Modules
//!
//! - [`config`] -- Database map, connector variants, endpoint and timing
//!   settings.
//! - [`connector`] -- The [`DbConnector`] type itself.
//! - [`error`] -- [`SdkError`] and the crate [`Result`] alias.
//! - [`keyspace`] -- Keyspace notification channels.
//! - [`port_util`] -- Interface index and bridge port mapping helpers.
//! - [`registry`] -- Name-keyed registry of per-database resources.
//! - [`retry`] -- The retry and blocking-read protocol.

pub mod config;
pub mod connector;
pub mod error;
pub mod keyspace;
pub mod port_util;
pub mod registry;
pub mod retry;

mod accessor;
mod connection;

pub use accessor::NONE_LITERAL;
pub use config::{
    AccessSettings, ConnectorConfig, ConnectorVariant, DatabaseMap, DbMap, Endpoint,
};
pub use connector::DbConnector;
pub use error::{Result, SdkError};
pub use keyspace::KeyspaceChannel;
pub use registry::DbRegistry;
pub use retry::{
    AccessMode, Attempt, ErrorClass, ErrorClassifier, Operation, RetryContext, RetryPolicy,
    StoreErrorClassifier,
};
