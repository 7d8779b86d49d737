#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

use vaultscope_core::store::memory::{Fault, Operation};
use vaultscope_core::store::{AttrKey, MatchLimit, Query, WireQuery};
use vaultscope_core::{
    AccessControl, AccessPolicy, Configuration, MigrationError, QueryViolation, Record,
    TransformError,
};

const PLAIN: Configuration = Configuration::Plain(AccessPolicy::AfterFirstUnlock);
const LEGACY: &str = "com.example.legacy";

fn keys(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|key| (*key).to_string()).collect()
}

#[test]
fn test_move_between_scopes_with_removal() {
    let harness = common::harness();
    let source = harness.factory.standard("old", PLAIN).expect("source");
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    source.set_string("a", "1").expect("set");
    source.set_string("b", "2").expect("set");

    let summary = destination
        .migrate_objects_from(&source, true)
        .expect("migrate");
    assert!(summary.removed_from_source);

    assert_eq!(destination.all_keys().expect("keys"), keys(&["a", "b"]));
    assert_eq!(destination.string("a").expect("get"), "1");
    assert_eq!(destination.string("b").expect("get"), "2");
    assert!(source.all_keys().expect("keys").is_empty());
}

#[test]
fn test_conflicting_key_leaves_both_sides_unchanged() {
    let harness = common::harness();
    let source = harness.factory.standard("old", PLAIN).expect("source");
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    destination.set_string("a", "9").expect("set");
    source.set_string("a", "1").expect("set");

    assert_eq!(
        destination.migrate_objects_from(&source, true),
        Err(MigrationError::KeyAlreadyExistsInDestination {
            key: "a".to_string()
        })
    );
    assert_eq!(destination.string("a").expect("get"), "9");
    assert_eq!(source.string("a").expect("get"), "1");
}

#[test]
fn test_invalid_query_touches_nothing() {
    let harness = common::harness();
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    common::plant_legacy(&harness.store, LEGACY, "a", b"1");

    let query = Query {
        match_limit: Some(MatchLimit::One),
        ..common::legacy_query(LEGACY)
    };
    assert_eq!(
        destination.migrate_objects(&query, true),
        Err(MigrationError::InvalidQuery(QueryViolation::NotMatchAll))
    );
    assert_eq!(harness.store.total_calls(), 0);
}

#[test]
fn test_secure_element_source_is_rejected() {
    let harness = common::harness();
    let source = harness
        .factory
        .standard(
            "vault",
            Configuration::SecureElement(AccessControl::BiometricCurrentSet),
        )
        .expect("source");
    let destination = harness.factory.standard("new", PLAIN).expect("destination");

    assert_eq!(
        destination.migrate_objects_from(&source, false),
        Err(MigrationError::InvalidQuery(
            QueryViolation::AccessControlConstraint
        ))
    );
}

#[test]
fn test_source_overlapping_destination_is_rejected() {
    let harness = common::harness();
    let destination = harness.factory.standard("new", PLAIN).expect("destination");

    let own = common::legacy_query(destination.fingerprint());
    assert_eq!(
        destination.migrate_objects(&own, true),
        Err(MigrationError::InvalidQuery(
            QueryViolation::OverlapsDestination
        ))
    );

    let unscoped = Query {
        service: None,
        ..common::legacy_query(LEGACY)
    };
    destination.set_string("kept", "x").expect("set");
    assert_eq!(
        destination.migrate_objects(&unscoped, true),
        Err(MigrationError::InvalidQuery(
            QueryViolation::OverlapsDestination
        ))
    );
    assert_eq!(destination.string("kept").expect("get"), "x");
}

#[test]
fn test_source_selected_by_access_group_alone() {
    let harness = common::harness();
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    let mut attributes = WireQuery::new();
    attributes.insert(AttrKey::Class, "genp".into());
    attributes.insert(AttrKey::AccessGroup, "TEAM.legacy".into());
    attributes.insert(AttrKey::Account, "a".into());
    harness.store.insert_raw(attributes, Some(b"1".to_vec()));

    let query = Query {
        access_group: Some("TEAM.legacy".to_string()),
        ..Query::generic_password()
    }
    .for_migration();
    let summary = destination
        .migrate_objects(&query, true)
        .expect("migrate");

    assert_eq!(summary.migrated, vec!["a".to_string()]);
    assert_eq!(destination.string("a").expect("get"), "1");
    assert_eq!(harness.store.len(), 1);
}

#[test]
fn test_migration_holds_the_destination_lock_throughout() {
    let harness = common::harness();
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    for account in ["a", "b", "c"] {
        common::plant_legacy(&harness.store, LEGACY, account, b"v");
    }

    // Parks the first add until released; never fails a call.
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let first = AtomicBool::new(true);
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    harness.store.inject(Fault::on(Operation::Add).when(move |_| {
        if first.swap(false, Ordering::SeqCst) {
            entered_tx.lock().unwrap().send(()).unwrap();
            release_rx.lock().unwrap().recv().unwrap();
        }
        false
    }));

    let store = &harness.store;
    let destination = &destination;
    thread::scope(|scope| {
        let migration = scope.spawn(move || {
            destination.migrate_objects(&common::legacy_query(LEGACY), true)
        });
        entered_rx.recv().expect("migration reached its first write");

        let (done_tx, done_rx) = mpsc::channel();
        let writer = scope.spawn(move || {
            destination.set_string("late", "w").expect("set");
            done_tx
                .send(store.snapshot(LEGACY).is_empty())
                .expect("report");
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        release_tx.send(()).expect("release");

        let summary = migration.join().expect("migration thread").expect("migrate");
        assert_eq!(summary.migrated.len(), 3);
        assert!(done_rx.recv().expect("writer finished"));
        writer.join().expect("writer thread");
    });

    assert_eq!(destination.all_keys().expect("keys"), keys(&["a", "b", "c", "late"]));
}

#[test]
fn test_write_failure_after_any_prefix_leaks_nothing() {
    const RECORDS: usize = 4;

    for written in 0..RECORDS {
        let harness = common::harness();
        let destination = harness.factory.standard("new", PLAIN).expect("destination");
        destination.set_string("kept", "x").expect("set");
        for i in 0..RECORDS {
            common::plant_legacy(&harness.store, LEGACY, &format!("k{i}"), b"v");
        }
        harness
            .store
            .inject(Fault::on(Operation::Add).after(written));

        let error = destination
            .migrate_objects(&common::legacy_query(LEGACY), true)
            .expect_err("write fails");
        assert!(
            matches!(error, MigrationError::CouldNotWriteToKeychain { ref key, .. } if *key == format!("k{written}"))
        );
        assert_eq!(destination.all_keys().expect("keys"), keys(&["kept"]));
        assert_eq!(harness.store.snapshot(LEGACY).len(), RECORDS);
    }
}

#[test]
fn test_transform_failure_at_any_position_writes_nothing() {
    const RECORDS: usize = 5;

    for failing in 0..RECORDS {
        let harness = common::harness();
        let destination = harness.factory.standard("new", PLAIN).expect("destination");
        for i in 0..RECORDS {
            common::plant_legacy(&harness.store, LEGACY, &format!("k{i}"), b"v");
        }

        let mut position = 0;
        let result = destination.migrate_objects_with(
            &common::legacy_query(LEGACY),
            true,
            |record| {
                let current = position;
                position += 1;
                if current == failing {
                    Err(TransformError::new("cannot decode"))
                } else {
                    Ok(Some(record))
                }
            },
        );

        assert_eq!(
            result,
            Err(MigrationError::Transform {
                key: format!("k{failing}"),
                message: "cannot decode".to_string(),
            })
        );
        assert_eq!(harness.store.calls(Operation::Add), 0);
        assert_eq!(harness.store.calls(Operation::Delete), 0);
        assert!(destination.all_keys().expect("keys").is_empty());
    }
}

#[test]
fn test_legacy_records_are_renamed_on_the_way_in() {
    let harness = common::harness();
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    common::plant_legacy(&harness.store, LEGACY, "token", b"abc");
    common::plant_legacy(&harness.store, LEGACY, "obsolete", b"zzz");

    let summary = destination
        .migrate_objects_with(&common::legacy_query(LEGACY), true, |record| {
            Ok((record.key() != "obsolete")
                .then(|| Record::new(format!("auth.{}", record.key()), record.value())))
        })
        .expect("migrate");

    assert_eq!(summary.migrated, vec!["auth.token".to_string()]);
    assert_eq!(destination.all_keys().expect("keys"), keys(&["auth.token"]));
    assert!(harness.store.snapshot(LEGACY).is_empty());
}

#[test]
fn test_source_sentinel_is_not_migrated() {
    let harness = common::harness();
    let source = harness.factory.standard("old", PLAIN).expect("source");
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    assert!(source.can_access_store());
    source.set_string("a", "1").expect("set");

    let summary = destination
        .migrate_objects_from(&source, false)
        .expect("migrate");
    assert_eq!(summary.migrated, vec!["a".to_string()]);
    assert!(source.can_access_store());
}

#[test]
fn test_sentinel_only_source_has_nothing_to_migrate() {
    let harness = common::harness();
    let source = harness.factory.standard("old", PLAIN).expect("source");
    let destination = harness.factory.standard("new", PLAIN).expect("destination");
    assert!(source.can_access_store());

    let summary = destination.migrate_objects_from(&source, false);
    assert_eq!(summary.map(|summary| summary.migrated), Ok(Vec::new()));
}
