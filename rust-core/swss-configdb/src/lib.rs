// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! # swss-configdb
//!
//! Typed access to the switch configuration database (`CONFIG_DB`).
//!
//! The configuration is a set of tables. Each row is a hash stored under
//! `TABLE|key`, where the key may itself have several `|`-joined parts.
//! [`ConfigDb`] reads and writes rows as typed [`Row`]s, waits for the
//! initial configuration load to finish and dispatches change
//! notifications to per-table handlers.
//!
//! ```rust,no_run
//! use swss_configdb::{ConfigDb, RowKey, Row};
//! use swss_connector::ConnectorConfig;
//!
//! #[tokio::main]
//! async fn main() -> swss_connector::Result<()> {
//!     let mut config_db = ConfigDb::redis(&ConnectorConfig::from_env()?)?;
//!     config_db.subscribe("BGP_NEIGHBOR", |table: &str, key: &RowKey, data: Option<&Row>| {
//!         println!("{table} {key} changed: {data:?}");
//!     });
//!     config_db.connect(true, true).await?;
//!     config_db
//!         .listen(|closer| {
//!             tokio::spawn(async move {
//!                 let _ = tokio::signal::ctrl_c().await;
//!                 closer.close();
//!             });
//!         })
//!         .await
//! }
//! ```

pub mod configdb;
pub mod key;
pub mod value;

pub use configdb::{ChangeHandler, ConfigDb, INIT_INDICATOR};
pub use key::{deserialize_key, serialize_key, RowKey, KEY_SEPARATOR, TABLE_NAME_SEPARATOR};
pub use value::{raw_to_typed, typed_to_raw, ColumnValue, ConfigData, Row, Table};
