// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Interface and bridge port mapping helpers.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::names::{ASIC_DB, COUNTERS_DB};
use crate::connector::DbConnector;
use crate::error::Result;
use crate::retry::AccessMode;

/// Row in `COUNTERS_DB` mapping interface names to SAI object ids.
pub const COUNTERS_PORT_NAME_MAP: &str = "COUNTERS_PORT_NAME_MAP";

/// Key prefix of bridge port objects in `ASIC_DB`.
pub const BRIDGE_PORT_PREFIX: &str = "ASIC_STATE:SAI_OBJECT_TYPE_BRIDGE_PORT:";

/// Bridge port attribute holding the underlying port's object id.
pub const BRIDGE_PORT_ATTR_PORT_ID: &str = "SAI_BRIDGE_PORT_ATTR_PORT_ID";

const OID_PREFIX: &str = "oid:0x";

fn interface_patterns() -> &'static [(Regex, u32)] {
    static PATTERNS: OnceLock<Vec<(Regex, u32)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [(r"^Ethernet(\d+)$", 1), (r"^PortChannel(\d+)$", 1000)]
            .into_iter()
            .filter_map(|(pattern, base)| Regex::new(pattern).ok().map(|re| (re, base)))
            .collect()
    })
}

/// One-based index of an interface: `EthernetN` is `N + 1`,
/// `PortChannelN` is `N + 1000`. Other names have no index.
///
/// # Examples
///
/// ```rust
/// use swss_connector::port_util::interface_index;
///
/// assert_eq!(interface_index("Ethernet0"), Some(1));
/// assert_eq!(interface_index("PortChannel2"), Some(1002));
/// assert_eq!(interface_index("eth0"), None);
/// ```
pub fn interface_index(if_name: &str) -> Option<u32> {
    interface_patterns().iter().find_map(|(re, base)| {
        let number: u32 = re.captures(if_name)?.get(1)?.as_str().parse().ok()?;
        number.checked_add(*base)
    })
}

fn strip_oid(value: &str) -> &str {
    value.strip_prefix(OID_PREFIX).unwrap_or(value)
}

/// Interface name to object id map from `COUNTERS_DB`, and its inverse.
///
/// The forward map is returned as stored. The inverse only covers
/// interfaces that have an [`interface_index`]. Blocks until the name map
/// has been written.
pub async fn interface_oid_map(
    db: &mut DbConnector,
) -> Result<(HashMap<String, String>, HashMap<String, String>)> {
    db.connect(COUNTERS_DB, true).await?;
    let row = db
        .get_all(COUNTERS_DB, COUNTERS_PORT_NAME_MAP, AccessMode::Blocking)
        .await?
        .unwrap_or_default();

    let name_map: HashMap<String, String> = row
        .into_iter()
        .filter_map(|(name, oid)| oid.map(|oid| (name, oid)))
        .collect();
    let oid_map = name_map
        .iter()
        .filter(|(name, _)| interface_index(name).is_some())
        .map(|(name, oid)| (oid.clone(), name.clone()))
        .collect();
    Ok((name_map, oid_map))
}

/// Bridge port object id to port object id, both without the `oid:0x`
/// prefix, from `ASIC_DB`.
///
/// Returns `None` when no bridge ports exist.
pub async fn bridge_port_map(db: &mut DbConnector) -> Result<Option<HashMap<String, String>>> {
    db.connect(ASIC_DB, true).await?;
    let pattern = format!("{BRIDGE_PORT_PREFIX}*");
    let Some(keys) = db.keys(ASIC_DB, &pattern, AccessMode::NonBlocking).await? else {
        return Ok(None);
    };

    let mut map = HashMap::new();
    for key in keys {
        let Some(bridge_port) = key.strip_prefix(BRIDGE_PORT_PREFIX) else {
            continue;
        };
        let bridge_port = strip_oid(bridge_port).to_string();
        let entry = db.get_all(ASIC_DB, &key, AccessMode::Blocking).await?;
        if let Some(Some(port_id)) = entry.as_ref().and_then(|row| row.get(BRIDGE_PORT_ATTR_PORT_ID)) {
            map.insert(bridge_port, strip_oid(port_id).to_string());
        }
    }
    Ok(Some(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swss_store::{InMemoryBackend, StoreBackend};

    use crate::config::{AccessSettings, ConnectorVariant, DatabaseMap};

    fn connector(backend: &InMemoryBackend) -> DbConnector {
        DbConnector::new(
            ConnectorVariant::SonicV2,
            &DatabaseMap::bundled().unwrap(),
            Arc::new(backend.clone()),
            AccessSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_interface_index() {
        assert_eq!(interface_index("Ethernet0"), Some(1));
        assert_eq!(interface_index("Ethernet124"), Some(125));
        assert_eq!(interface_index("PortChannel0"), Some(1000));
        assert_eq!(interface_index("PortChannel0001"), Some(1001));
        assert_eq!(interface_index("Ethernet"), None);
        assert_eq!(interface_index("Ethernet0.10"), None);
        assert_eq!(interface_index("Vlan1000"), None);
        assert_eq!(interface_index("Ethernet99999999999"), None);
    }

    proptest::proptest! {
        #[test]
        fn test_interface_index_offsets(n in 0u32..1_000_000) {
            proptest::prop_assert_eq!(interface_index(&format!("Ethernet{n}")), Some(n + 1));
            proptest::prop_assert_eq!(interface_index(&format!("PortChannel{n}")), Some(n + 1000));
            proptest::prop_assert_eq!(interface_index(&format!("Vlan{n}")), None);
        }
    }

    #[tokio::test]
    async fn test_interface_oid_map() {
        let backend = InMemoryBackend::new();
        let mut writer = backend.open(2).await.unwrap();
        writer.hset(COUNTERS_PORT_NAME_MAP, "Ethernet0", "oid:0x1000000000002").await.unwrap();
        writer.hset(COUNTERS_PORT_NAME_MAP, "Ethernet4", "oid:0x1000000000003").await.unwrap();
        writer.hset(COUNTERS_PORT_NAME_MAP, "cpu", "oid:0x1000000000001").await.unwrap();

        let mut db = connector(&backend);
        let (names, oids) = interface_oid_map(&mut db).await.unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(oids.len(), 2);
        assert_eq!(oids["oid:0x1000000000003"], "Ethernet4");
        assert!(!oids.contains_key("oid:0x1000000000001"));
    }

    #[tokio::test]
    async fn test_bridge_port_map() {
        let backend = InMemoryBackend::new();
        let mut writer = backend.open(1).await.unwrap();
        writer
            .hset(
                "ASIC_STATE:SAI_OBJECT_TYPE_BRIDGE_PORT:oid:0x3a000000000616",
                BRIDGE_PORT_ATTR_PORT_ID,
                "oid:0x1000000000002",
            )
            .await
            .unwrap();
        writer
            .hset(
                "ASIC_STATE:SAI_OBJECT_TYPE_BRIDGE_PORT:oid:0x3a000000000617",
                "SAI_BRIDGE_PORT_ATTR_TYPE",
                "SAI_BRIDGE_PORT_TYPE_1Q_ROUTER",
            )
            .await
            .unwrap();

        let mut db = connector(&backend);
        let map = bridge_port_map(&mut db).await.unwrap().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["3a000000000616"], "1000000000002");
    }

    #[tokio::test]
    async fn test_bridge_port_map_empty() {
        let backend = InMemoryBackend::new();
        let mut db = connector(&backend);
        assert_eq!(bridge_port_map(&mut db).await.unwrap(), None);
    }
}
