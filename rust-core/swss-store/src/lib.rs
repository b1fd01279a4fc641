// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Switch-state store transport
//
// This crate is the seam between the database access layer and the
// key-value store that holds a device's configuration and live state. The
// `StoreBackend` trait opens one `StoreConnection` per logical database;
// connections carry the hash command set plus pattern subscriptions for
// keyspace notifications.
//
// # Modules
//
// - [`backend`] -- The `StoreBackend`, `StoreConnection` and `Subscription`
//   traits.
// - [`error`] -- The `StoreError` enum and its transient/malformed split.
// - [`memory`] -- An in-memory backend with keyspace notifications and fault
//   injection, for tests and embedded use.
// - [`metrics`] -- A transparent wrapper that counts opens and commands.
// - [`pattern`] -- Redis-style glob matching.
// - `redis_backend` -- The Redis client backend (feature `redis-backend`).

pub mod backend;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod pattern;

#[cfg(feature = "redis-backend")]
pub mod redis_backend;

pub use backend::{Message, StoreBackend, StoreConnection, Subscription, SubscriptionCloser};
pub use error::StoreError;
pub use memory::InMemoryBackend;
pub use metrics::{BackendStats, MetricsBackend};

#[cfg(feature = "redis-backend")]
pub use redis_backend::{RedisAddress, RedisBackend};
