use strata_slab::testing::MemoryLedger;
use strata_storage::{AccountStorage, StorageConfig};
use strata_types::testing::address;
use strata_types::{Domain, NoMeter, StoredValue};

fn v2_config() -> StorageConfig {
    StorageConfig {
        parallelism: 2,
        ..Default::default()
    }
}

fn v1_config() -> StorageConfig {
    StorageConfig {
        v2_enabled: false,
        parallelism: 2,
        ..Default::default()
    }
}

/// Seed a legacy-layout account with one value per given domain.
fn seed_legacy(ledger: &mut MemoryLedger, account: u64, domains: &[Domain]) {
    let mut storage = AccountStorage::new(&mut *ledger, v1_config());
    for domain in domains {
        storage
            .write(
                &mut NoMeter,
                address(account),
                *domain,
                "k".into(),
                StoredValue::integer(account as i64),
            )
            .unwrap();
    }
    storage.commit(&mut NoMeter, true).unwrap();
}

#[test]
fn scheduled_accounts_migrate_in_ascending_address_order() {
    let mut ledger = MemoryLedger::default();
    seed_legacy(&mut ledger, 5, &[Domain::Storage]);
    seed_legacy(&mut ledger, 4, &[Domain::Storage]);
    ledger.clear_log();

    {
        let mut storage = AccountStorage::new(&mut ledger, v2_config());
        // Scheduled out of order on purpose.
        storage.schedule_v2_migration(address(5));
        storage.schedule_v2_migration(address(4));
        storage.commit(&mut NoMeter, true).unwrap();
    }

    for account in [4u64, 5] {
        assert!(ledger.register(address(account), b"stored").is_some());
        assert!(ledger.register(address(account), b"storage").is_none());
    }

    // The register installs reveal the visitation order.
    let log = ledger.write_log();
    let position = |account: u64| {
        log.iter()
            .position(|(a, key, value)| {
                *a == address(account) && key.as_slice() == b"stored" && value.is_some()
            })
            .unwrap()
    };
    assert!(position(4) < position(5));

    let mut storage = AccountStorage::new(&mut ledger, v2_config());
    for account in [4u64, 5] {
        assert_eq!(
            storage
                .read(&mut NoMeter, address(account), Domain::Storage, &"k".into())
                .unwrap(),
            Some(StoredValue::integer(account as i64))
        );
    }
    storage.check_health().unwrap();
}

#[test]
fn migration_carries_every_populated_domain() {
    let mut ledger = MemoryLedger::default();
    seed_legacy(&mut ledger, 6, &[Domain::Storage, Domain::Public, Domain::Contract]);

    {
        let mut storage = AccountStorage::new(&mut ledger, v2_config());
        storage.schedule_v2_migration(address(6));
        storage.commit(&mut NoMeter, true).unwrap();
    }
    for domain in Domain::ALL {
        assert!(ledger.register(address(6), domain.register_key()).is_none());
    }

    let mut storage = AccountStorage::new(&mut ledger, v2_config());
    for domain in [Domain::Storage, Domain::Public, Domain::Contract] {
        assert_eq!(
            storage
                .read(&mut NoMeter, address(6), domain, &"k".into())
                .unwrap(),
            Some(StoredValue::integer(6i64)),
            "domain {domain}"
        );
    }
    // Untouched domains stay absent from the account map.
    assert_eq!(
        storage
            .domain_map(&mut NoMeter, address(6), Domain::Inbox, false)
            .unwrap(),
        None
    );
}

#[test]
fn modified_legacy_accounts_can_be_scheduled_wholesale() {
    let mut ledger = MemoryLedger::default();
    seed_legacy(&mut ledger, 7, &[Domain::Storage]);
    seed_legacy(&mut ledger, 8, &[Domain::Storage]);

    {
        let mut storage = AccountStorage::new(&mut ledger, v2_config());
        // Touch only account 7; account 8 is read but not modified.
        storage
            .write(
                &mut NoMeter,
                address(7),
                Domain::Storage,
                "k".into(),
                StoredValue::integer(70i64),
            )
            .unwrap();
        assert!(storage
            .read(&mut NoMeter, address(8), Domain::Storage, &"k".into())
            .unwrap()
            .is_some());

        storage.schedule_v2_migration_for_modified_accounts();
        storage.commit(&mut NoMeter, true).unwrap();
    }

    assert!(ledger.register(address(7), b"stored").is_some());
    assert!(ledger.register(address(7), b"storage").is_none());
    // The merely-read account keeps its legacy layout.
    assert!(ledger.register(address(8), b"stored").is_none());
    assert!(ledger.register(address(8), b"storage").is_some());

    // The uncommitted mutation went through the migration, not past it.
    let mut storage = AccountStorage::new(&mut ledger, v2_config());
    assert_eq!(
        storage
            .read(&mut NoMeter, address(7), Domain::Storage, &"k".into())
            .unwrap(),
        Some(StoredValue::integer(70i64))
    );
}

#[test]
fn scheduling_twice_installs_one_register() {
    let mut ledger = MemoryLedger::default();
    seed_legacy(&mut ledger, 9, &[Domain::Storage]);
    ledger.clear_log();

    {
        let mut storage = AccountStorage::new(&mut ledger, v2_config());
        storage.schedule_v2_migration(address(9));
        storage.schedule_v2_migration(address(9));
        storage.commit(&mut NoMeter, true).unwrap();
    }

    let installs = ledger
        .write_log()
        .iter()
        .filter(|(a, key, value)| {
            *a == address(9) && key.as_slice() == b"stored" && value.is_some()
        })
        .count();
    assert_eq!(installs, 1);
}

#[test]
fn migration_fails_at_commit_when_the_layout_is_disabled() {
    let mut ledger = MemoryLedger::default();
    seed_legacy(&mut ledger, 10, &[Domain::Storage]);

    let mut storage = AccountStorage::new(&mut ledger, v1_config());
    storage.schedule_v2_migration(address(10));
    let e = storage.commit(&mut NoMeter, true).unwrap_err();
    assert!(e.to_string().contains("disabled"));
}
