// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! The multi-database connector.
//!
//! [`DbConnector`] owns one store connection and at most one keyspace
//! notification channel per logical database. Connection management, the
//! blocking accessors and the notification channel are `impl DbConnector`
//! blocks in their own modules.
//!
//! A connector is `Send` but not meant to be shared: give each task its own.

use std::fmt;
use std::sync::Arc;

use swss_store::{StoreBackend, StoreConnection};

use crate::config::{AccessSettings, ConnectorVariant, DatabaseMap, DbMap};
use crate::error::Result;
use crate::keyspace::KeyspaceChannel;
use crate::registry::DbRegistry;
use crate::retry::{AccessMode, ErrorClassifier, RetryPolicy, StoreErrorClassifier};

/// Client for the logical databases of one store instance.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use swss_connector::{AccessMode, AccessSettings, ConnectorVariant, DatabaseMap, DbConnector};
/// use swss_connector::config::names::APPL_DB;
/// use swss_store::InMemoryBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> swss_connector::Result<()> {
/// let map = DatabaseMap::bundled()?;
/// let backend = Arc::new(InMemoryBackend::new());
/// let mut db = DbConnector::new(ConnectorVariant::SonicV2, &map, backend, AccessSettings::default())?;
///
/// db.connect(APPL_DB, false).await?;
/// db.set(APPL_DB, "PORT_TABLE:Ethernet0", "oper_status", "up").await?;
/// let status = db.get(APPL_DB, "PORT_TABLE:Ethernet0", "oper_status", AccessMode::NonBlocking).await?;
/// assert_eq!(status.as_deref(), Some("up"));
/// # Ok(())
/// # }
/// ```
pub struct DbConnector {
    pub(crate) variant: ConnectorVariant,
    pub(crate) backend: Arc<dyn StoreBackend>,
    pub(crate) db_map: DbMap,
    pub(crate) settings: AccessSettings,
    pub(crate) classifier: Arc<dyn ErrorClassifier>,
    pub(crate) clients: DbRegistry<Box<dyn StoreConnection>>,
    pub(crate) channels: DbRegistry<KeyspaceChannel>,
}

impl DbConnector {
    // -- Constructors -------------------------------------------------------

    /// Create a connector for `variant`, taking its databases from `map`.
    ///
    /// No connection is made here.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::Configuration`](crate::SdkError::Configuration) if
    /// the variant has no section in `map` or two of its databases share an
    /// index.
    pub fn new(
        variant: ConnectorVariant,
        map: &DatabaseMap,
        backend: Arc<dyn StoreBackend>,
        settings: AccessSettings,
    ) -> Result<Self> {
        let db_map = map.databases(variant)?;
        Ok(Self::with_db_map(variant, db_map, backend, settings))
    }

    /// Create a connector from an already validated [`DbMap`].
    pub fn with_db_map(
        variant: ConnectorVariant,
        db_map: DbMap,
        backend: Arc<dyn StoreBackend>,
        settings: AccessSettings,
    ) -> Self {
        Self {
            variant,
            backend,
            db_map,
            settings,
            classifier: Arc::new(StoreErrorClassifier),
            clients: DbRegistry::new(),
            channels: DbRegistry::new(),
        }
    }

    /// Create a connector talking to a Redis server, using the database
    /// map named by `config`.
    #[cfg(feature = "redis-backend")]
    pub fn redis(variant: ConnectorVariant, config: &crate::config::ConnectorConfig) -> Result<Self> {
        let backend = swss_store::RedisBackend::new((&config.endpoint).into());
        Self::new(
            variant,
            &config.database_map()?,
            Arc::new(backend),
            config.settings.clone(),
        )
    }

    /// Replace the classifier that splits store errors into malformed and
    /// transient.
    pub fn set_error_classifier(&mut self, classifier: Arc<dyn ErrorClassifier>) {
        self.classifier = classifier;
    }

    // -- Accessors ----------------------------------------------------------

    /// The connector variant.
    pub fn variant(&self) -> ConnectorVariant {
        self.variant
    }

    /// Names of all configured databases.
    pub fn db_list(&self) -> Vec<&str> {
        self.db_map.names().collect()
    }

    /// Numeric index of `db_name`, or `None` if it is not configured.
    pub fn get_dbid(&self, db_name: &str) -> Option<u32> {
        self.db_map.index(db_name)
    }

    /// The retry and wait settings.
    pub fn settings(&self) -> &AccessSettings {
        &self.settings
    }

    /// Whether `db_name` currently has a live connection.
    pub fn is_connected(&self, db_name: &str) -> bool {
        self.clients.contains(db_name)
    }

    /// The raw store connection of `db_name`, bypassing the retry protocol.
    ///
    /// # Errors
    ///
    /// Returns [`SdkError::MissingClient`](crate::SdkError::MissingClient) if
    /// `db_name` was never connected.
    pub fn client(&mut self, db_name: &str) -> Result<&mut dyn StoreConnection> {
        Ok(self.clients.get_mut(db_name)?.as_mut())
    }

    /// The store backend connections are opened from.
    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    /// A retry policy in `mode` with this connector's settings and error
    /// classifier. Drives custom [`Operation`](crate::Operation)s through
    /// the same protocol as the built-in accessors.
    pub fn retry_policy(&self, mode: AccessMode) -> RetryPolicy {
        RetryPolicy::new(mode, &self.settings).with_classifier(self.classifier.clone())
    }
}

impl fmt::Debug for DbConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut connected: Vec<&str> = self.clients.names().collect();
        connected.sort_unstable();
        let mut subscribed: Vec<&str> = self.channels.names().collect();
        subscribed.sort_unstable();
        f.debug_struct("DbConnector")
            .field("variant", &self.variant)
            .field("backend", &self.backend.name())
            .field("db_map", &self.db_map)
            .field("connected", &connected)
            .field("subscribed", &subscribed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::names;
    use crate::error::SdkError;
    use swss_store::InMemoryBackend;

    fn connector(variant: ConnectorVariant) -> DbConnector {
        DbConnector::new(
            variant,
            &DatabaseMap::bundled().unwrap(),
            Arc::new(InMemoryBackend::new()),
            AccessSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_db_list_and_ids() {
        let v1 = connector(ConnectorVariant::SonicV1);
        assert_eq!(v1.db_list().len(), 4);
        assert_eq!(v1.get_dbid(names::CONFIG_DB), None);

        let v2 = connector(ConnectorVariant::SonicV2);
        assert!(v2.db_list().contains(&names::STATE_DB));
        assert_eq!(v2.get_dbid(names::APPL_DB), Some(0));
        assert_eq!(v2.variant(), ConnectorVariant::SonicV2);
    }

    #[test]
    fn test_client_before_connect() {
        let mut db = connector(ConnectorVariant::SonicV2);
        assert!(!db.is_connected(names::APPL_DB));
        assert!(matches!(db.client(names::APPL_DB), Err(SdkError::MissingClient(_))));
    }

    #[test]
    fn test_duplicate_index_fails_construction() {
        let map = DatabaseMap::from_json(
            r#"{"SonicV2Connector": {"db_map": {"APPL_DB": {"db": 0}, "STATE_DB": {"db": 0}}}}"#,
        )
        .unwrap();
        let result = DbConnector::new(
            ConnectorVariant::SonicV2,
            &map,
            Arc::new(InMemoryBackend::new()),
            AccessSettings::default(),
        );
        assert!(matches!(result, Err(SdkError::Configuration(_))));
    }

    #[test]
    fn test_debug_lists_backend() {
        let db = connector(ConnectorVariant::SonicV2);
        let rendered = format!("{:?}", db);
        assert!(rendered.contains("in-memory"));
        assert!(rendered.contains("SonicV2"));
    }
}
