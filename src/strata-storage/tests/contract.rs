use strata_slab::testing::MemoryLedger;
use strata_storage::{AccountStorage, ContractLocation, StorageConfig};
use strata_types::testing::address;
use strata_types::{Domain, NoMeter, StoredValue};

fn config() -> StorageConfig {
    StorageConfig {
        parallelism: 2,
        ..Default::default()
    }
}

#[test]
fn recorded_updates_are_invisible_until_commit() {
    let mut ledger = MemoryLedger::default();
    let location = ContractLocation::new(address(3), "C");
    let before = StoredValue::from("code v1");
    let after = StoredValue::from("code v2");

    {
        let mut storage = AccountStorage::new(&mut ledger, config());
        storage
            .write(
                &mut NoMeter,
                address(3),
                Domain::Contract,
                "C".into(),
                before.clone(),
            )
            .unwrap();
        storage.commit(&mut NoMeter, true).unwrap();
    }

    {
        let mut storage = AccountStorage::new(&mut ledger, config());
        storage.record_contract_update(location.clone(), Some(after.clone()));
        assert!(storage.contract_update_recorded(&location));

        // The pending update must not leak into reads of the contract
        // domain within the same transaction.
        assert_eq!(
            storage
                .read(&mut NoMeter, address(3), Domain::Contract, &"C".into())
                .unwrap(),
            Some(before)
        );
        storage.commit(&mut NoMeter, true).unwrap();
    }

    let mut storage = AccountStorage::new(&mut ledger, config());
    assert_eq!(
        storage
            .read(&mut NoMeter, address(3), Domain::Contract, &"C".into())
            .unwrap(),
        Some(after)
    );
}

#[test]
fn updates_are_dropped_when_commit_does_not_apply_them() {
    let mut ledger = MemoryLedger::default();
    let location = ContractLocation::new(address(4), "C");

    {
        let mut storage = AccountStorage::new(&mut ledger, config());
        storage.record_contract_update(location, Some(StoredValue::from("code")));
        storage.commit(&mut NoMeter, false).unwrap();
    }

    let mut storage = AccountStorage::new(&mut ledger, config());
    assert_eq!(
        storage
            .read(&mut NoMeter, address(4), Domain::Contract, &"C".into())
            .unwrap(),
        None
    );
}

#[test]
fn deletion_keeps_insertion_order_and_wins_over_the_earlier_value() {
    let mut ledger = MemoryLedger::default();
    let c1 = ContractLocation::new(address(5), "C1");
    let c2 = ContractLocation::new(address(5), "C2");

    {
        let mut storage = AccountStorage::new(&mut ledger, config());
        storage.record_contract_update(c1.clone(), Some(StoredValue::from("one")));
        storage.record_contract_update(c2.clone(), Some(StoredValue::from("two")));
        // Deleting C1 overwrites its value in place; it must not lose its
        // original position nor resurrect later.
        storage.record_contract_update(c1.clone(), None);
        assert!(storage.contract_update_recorded(&c1));
        assert!(storage.contract_update_recorded(&c2));
        storage.commit(&mut NoMeter, true).unwrap();
    }

    let mut storage = AccountStorage::new(&mut ledger, config());
    assert_eq!(
        storage
            .read(&mut NoMeter, address(5), Domain::Contract, &"C1".into())
            .unwrap(),
        None
    );
    assert_eq!(
        storage
            .read(&mut NoMeter, address(5), Domain::Contract, &"C2".into())
            .unwrap(),
        Some(StoredValue::from("two"))
    );

    let map = storage
        .domain_map(&mut NoMeter, address(5), Domain::Contract, false)
        .unwrap()
        .unwrap();
    assert_eq!(map.len(), 1);
}

#[test]
fn unrecorded_locations_are_not_reported() {
    let ledger = MemoryLedger::default();
    let storage = AccountStorage::new(ledger, config());
    assert!(!storage.contract_update_recorded(&ContractLocation::new(address(6), "X")));
}
