use strata_error::define_strata_errors;

define_strata_errors!(
    group 2 {
        1 => invalid_root_register(address, register):
            "Account {address} holds a malformed root register '{register}'.",
        2 => invalid_account_map_entry(address, domain):
            "The account map of {address} holds a non-map entry under domain '{domain}'.",
        3 => unexpected_format_state(address, domain):
            "Reached an impossible storage-format state for {address}/'{domain}'.",
        4 => account_migration_disabled(addresses):
            "Migration is scheduled for {addresses} but the single-register layout is disabled.",
        5 => dangling_root_reference(id):
            "Account root slab {id} is not reachable in the slab store.",
        6 => unreferenced_root_slabs(ids):
            "Reachable root slabs not owned by any account: {ids}.",
    }
);
