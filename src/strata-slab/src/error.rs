use strata_error::define_strata_errors;

define_strata_errors!(
    group 1 {
        1 => slab_not_found(id): "No slab found under id {id}.",
        2 => slab_decode_failed(id, details): "Slab {id} failed to decode: {details}.",
        3 => unexpected_slab_kind(id): "Slab {id} is not of the expected kind.",
        4 => corrupt_slab_reference(parent, child):
            "Slab {parent} references slab {child}, which does not exist.",
        5 => corrupt_slab_cycle(id): "Slab {id} is part of a reference cycle.",
        6 => index_allocator_exhausted(address): "No fresh slab index left for address {address}.",
        7 => map_count_mismatch(root, expected, actual):
            "Map rooted at {root} declares {expected} entries but holds {actual}.",
    }
);
