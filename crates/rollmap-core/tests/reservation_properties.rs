//! Property tests for the disjointness, monotonicity, and capacity-bound
//! invariants that must hold for any sequence of reservations.

use proptest::prelude::*;
use rollmap_core::{SingleProcessFile, NULL_OFFSET};
use tempfile::tempdir;

proptest! {
    #[test]
    fn reservations_are_disjoint_and_capacity_bounded(
        capacity in 16u64..256,
        lengths in prop::collection::vec(1u64..32, 1..20),
    ) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let file = SingleProcessFile::create(&path, capacity, false).unwrap();

        let mut ranges: Vec<(u64, u64)> = Vec::new();
        let mut last_offset = 0i64;
        for length in lengths {
            let offset = file.reserve(length).unwrap();
            if offset == NULL_OFFSET {
                continue;
            }
            prop_assert!(offset as i64 >= last_offset);
            last_offset = offset;
            let start = offset as u64;
            let end = start + length;
            for &(other_start, other_end) in &ranges {
                prop_assert!(end <= other_start || start >= other_end, "overlap detected");
            }
            prop_assert!(start < capacity, "reservation at or past capacity was not rejected");
            ranges.push((start, end));
            file.commit(length);
        }

        prop_assert!(!file.is_pending());
    }
}
