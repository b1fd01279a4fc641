// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for the typed configuration store.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use swss_configdb::{ColumnValue, ConfigData, ConfigDb, Row, RowKey};
use swss_connector::{AccessSettings, ConnectorVariant, DatabaseMap, DbConnector};
use swss_store::{InMemoryBackend, StoreBackend, SubscriptionCloser};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

fn config_db(backend: &InMemoryBackend) -> ConfigDb {
    let connector = DbConnector::new(
        ConnectorVariant::SonicV2,
        &DatabaseMap::bundled().unwrap(),
        Arc::new(backend.clone()),
        AccessSettings::default(),
    )
    .unwrap();
    ConfigDb::new(connector).unwrap()
}

/// Column names that are neither the placeholder nor list-marked.
fn arb_column() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,11}"
}

/// Values that survive the store encoding: no literal "None", no commas
/// inside list items and no empty lists.
fn arb_value() -> impl Strategy<Value = ColumnValue> {
    prop_oneof![
        Just(ColumnValue::Null),
        "[A-Za-z0-9 ./:-]{0,16}"
            .prop_filter("reserved literal", |s| s != "None")
            .prop_map(ColumnValue::Scalar),
        prop::collection::vec("[A-Za-z0-9./:-]{1,12}", 1..5).prop_map(ColumnValue::List),
    ]
}

fn arb_row() -> impl Strategy<Value = Row> {
    prop::collection::btree_map(arb_column(), arb_value(), 0..6)
}

fn arb_key() -> impl Strategy<Value = RowKey> {
    prop_oneof![
        "[A-Za-z0-9_.-]{1,12}".prop_map(RowKey::Single),
        prop::collection::vec("[A-Za-z0-9_.-]{1,8}", 2..4).prop_map(RowKey::Composite),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_entry_round_trip(key in arb_key(), first in arb_row(), second in arb_row()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let backend = InMemoryBackend::new();
            let mut db = config_db(&backend);
            db.connect(false, false).await.unwrap();

            db.set_entry("TEST_TABLE", &key, Some(&first)).await.unwrap();
            prop_assert_eq!(&db.get_entry("TEST_TABLE", &key).await.unwrap(), &first);

            // Overwriting drops the columns the new row does not have.
            db.set_entry("TEST_TABLE", &key, Some(&second)).await.unwrap();
            prop_assert_eq!(&db.get_entry("TEST_TABLE", &key).await.unwrap(), &second);

            let table = db.get_table("TEST_TABLE").await.unwrap();
            prop_assert_eq!(table.get(&key), Some(&second));

            db.set_entry("TEST_TABLE", &key, None).await.unwrap();
            prop_assert!(db.get_entry("TEST_TABLE", &key).await.unwrap().is_empty());
            prop_assert!(db.get_keys("TEST_TABLE").await.unwrap().is_empty());
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_config_round_trip_from_json() {
    init_tracing();
    let data: ConfigData = serde_json::from_str(
        r#"{
            "PORT": {
                "Ethernet0": {"alias": "fortyGigE0/0", "lanes": "29,30,31,32", "mtu": "9100"},
                "Ethernet4": {"alias": "fortyGigE0/4", "description": null}
            },
            "VLAN": {"Vlan100": {"vlanid": "100", "members": ["Ethernet0", "Ethernet4"]}},
            "VLAN_MEMBER": {"Vlan100|Ethernet0": {"tagging_mode": "untagged"}},
            "LOOPBACK_INTERFACE": {"Loopback0": {}}
        }"#,
    )
    .unwrap();

    let backend = InMemoryBackend::new();
    let mut db = config_db(&backend);
    db.connect(false, false).await.unwrap();
    db.set_config(&data).await.unwrap();

    let read_back = db.get_config().await.unwrap();
    assert_eq!(read_back, data);
    assert_eq!(
        read_back["VLAN"][&RowKey::from("Vlan100")]["members"],
        ColumnValue::from(vec!["Ethernet0", "Ethernet4"])
    );
    assert!(read_back["VLAN_MEMBER"].contains_key(&RowKey::from(("Vlan100", "Ethernet0"))));

    // The raw hash carries the list marker and the "None" literal.
    let mut raw = backend.open(4).await.unwrap();
    assert_eq!(raw.hget("VLAN|Vlan100", "members@").await.unwrap().as_deref(), Some("Ethernet0,Ethernet4"));
    assert_eq!(raw.hget("PORT|Ethernet4", "description").await.unwrap().as_deref(), Some("None"));
    assert_eq!(raw.hget("LOOPBACK_INTERFACE|Loopback0", "NULL").await.unwrap().as_deref(), Some("NULL"));
}

#[tokio::test]
async fn test_mod_config_keeps_other_columns() {
    init_tracing();
    let backend = InMemoryBackend::new();
    let mut db = config_db(&backend);
    db.connect(false, false).await.unwrap();

    let base: ConfigData =
        serde_json::from_str(r#"{"PORT": {"Ethernet0": {"mtu": "9100", "speed": "40000"}}}"#).unwrap();
    let patch: ConfigData =
        serde_json::from_str(r#"{"PORT": {"Ethernet0": {"admin_status": "up"}}}"#).unwrap();
    db.set_config(&base).await.unwrap();
    db.mod_config(&patch).await.unwrap();

    let entry = db.get_entry("PORT", &"Ethernet0".into()).await.unwrap();
    assert_eq!(entry.len(), 3);
    assert_eq!(entry["admin_status"], ColumnValue::from("up"));
}

type Seen = Arc<Mutex<Vec<(String, RowKey, Option<Row>)>>>;

fn recorder(seen: &Seen) -> impl FnMut(&str, &RowKey, Option<&Row>) + Send + 'static {
    let seen = seen.clone();
    move |table: &str, key: &RowKey, data: Option<&Row>| {
        seen.lock().unwrap().push((table.to_string(), key.clone(), data.cloned()));
    }
}

#[tokio::test]
async fn test_dispatch_invokes_handlers_once_per_change() {
    init_tracing();
    let backend = InMemoryBackend::new();
    let mut db = config_db(&backend);
    db.connect(false, false).await.unwrap();

    let ports: Seen = Arc::default();
    let vlans: Seen = Arc::default();
    db.subscribe("PORT", recorder(&ports));
    db.subscribe("VLAN", recorder(&vlans));

    let mut listener = db.change_listener().await.unwrap();
    // A change to the STOP table ends the dispatch loop once everything
    // before it has been handled.
    let closer = listener.closer();
    db.subscribe("STOP", move |_: &str, _: &RowKey, _: Option<&Row>| closer.close());

    let mut writer = backend.open(4).await.unwrap();
    writer.hset("PORT|Ethernet0", "mtu", "9100").await.unwrap();
    writer.hset("PORT|Ethernet0", "speed", "40000").await.unwrap();
    writer.hset("VLAN|Vlan100", "vlanid", "100").await.unwrap();
    writer.hset("ACL_TABLE|DATAACL", "type", "L3").await.unwrap();
    writer.set("CONFIG_DB_INITIALIZED", "1").await.unwrap();
    writer.hset("not-a-table-key", "f", "v").await.unwrap();
    writer.del("VLAN|Vlan100").await.unwrap();
    writer.hset("STOP|now", "f", "v").await.unwrap();

    db.dispatch(&mut listener).await.unwrap();

    let ports = ports.lock().unwrap();
    assert_eq!(ports.len(), 2);
    assert!(ports.iter().all(|(table, key, _)| table == "PORT" && *key == RowKey::from("Ethernet0")));
    // Rows are read at dispatch time, after every write has happened.
    assert_eq!(ports[0].2.as_ref().unwrap().len(), 2);

    let vlans = vlans.lock().unwrap();
    assert_eq!(vlans.len(), 2);
    assert!(vlans.iter().all(|(_, _, data)| data.is_none()));
}

#[tokio::test]
async fn test_dispatch_ends_when_listener_closed() {
    init_tracing();
    let backend = InMemoryBackend::new();
    let mut db = config_db(&backend);
    db.connect(false, false).await.unwrap();

    let mut listener = db.change_listener().await.unwrap();
    let closer = listener.closer();
    let stopper = tokio::spawn(async move {
        tokio::task::yield_now().await;
        closer.close();
    });

    db.dispatch(&mut listener).await.unwrap();
    stopper.await.unwrap();
}

#[tokio::test]
async fn test_listen_ends_through_handed_out_closer() {
    init_tracing();
    let backend = InMemoryBackend::new();
    let mut db = config_db(&backend);
    db.connect(false, false).await.unwrap();

    let ports: Seen = Arc::default();
    db.subscribe("PORT", recorder(&ports));
    let slot: Arc<Mutex<Option<SubscriptionCloser>>> = Arc::default();
    let stop_slot = slot.clone();
    db.subscribe("STOP", move |_: &str, _: &RowKey, _: Option<&Row>| {
        if let Some(closer) = stop_slot.lock().unwrap().as_ref() {
            closer.close();
        }
    });

    let writer_backend = backend.clone();
    db.listen(move |closer| {
        *slot.lock().unwrap() = Some(closer);
        tokio::spawn(async move {
            let mut writer = writer_backend.open(4).await.unwrap();
            writer.hset("PORT|Ethernet8", "admin_status", "up").await.unwrap();
            writer.hset("STOP|now", "f", "v").await.unwrap();
        });
    })
    .await
    .unwrap();

    let ports = ports.lock().unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].1, RowKey::from("Ethernet8"));
}
