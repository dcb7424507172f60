use proptest::prelude::*;
use symmem::{Error, Memory, MemoryAccess, MemoryConfig, MemoryOps, Permissions};
use symmem::{ExprBuilder, Z3Solver};

fn perms() -> impl Strategy<Value = Permissions> {
    (0u8..8).prop_map(Permissions::from_bits_truncate)
}

/// Regions given as `(base, length, perms)`, in mapping order.
fn region_list() -> impl Strategy<Value = Vec<(u64, u64, Permissions)>> {
    prop::collection::vec((0u64..0x100, 1u64..0x40, perms()), 1..8)
}

/// First region containing `addr`, with regions sorted stably by base.
fn expected(regions: &[(u64, u64, Permissions)], addr: u64) -> Option<Permissions> {
    let mut sorted = regions.to_vec();
    sorted.sort_by_key(|r| r.0);
    sorted
        .iter()
        .find(|(base, length, _)| *base <= addr && addr < base + length)
        .map(|r| r.2)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn concrete_round_trip(addr in 0x1000u64..0x1f00, size in 1usize..=8, data: u64) {
        let b = ExprBuilder::new();
        let mut solver = Z3Solver::new();
        let mut memory = Memory::new(MemoryConfig::default()).unwrap();
        memory.map_region(0x1000, 0x1000, Permissions::READ | Permissions::WRITE).unwrap();
        let mut m = MemoryAccess::new(&mut memory, &mut solver, &b);

        let value = b.new_bitv(size * 8, data);
        m.store(addr, value.clone()).unwrap();
        let read = m.load(addr, size).unwrap();
        prop_assert_eq!(read.as_u64(), value.as_u64());
    }

    #[test]
    fn overlapping_regions(regions in region_list(), addr in 0u64..0x140) {
        let b = ExprBuilder::new();
        let mut solver = Z3Solver::new();
        let mut memory = Memory::new(MemoryConfig::default()).unwrap();
        for &(base, length, perms) in &regions {
            memory.map_region(base, length, perms).unwrap();
        }
        let want = expected(&regions, addr);
        prop_assert_eq!(memory.permissions(addr), want);

        let mut m = MemoryAccess::new(&mut memory, &mut solver, &b);
        let readable = want.map_or(false, |p| p.contains(Permissions::READ));
        match m.load(addr, 1) {
            Ok(_) => prop_assert!(readable),
            Err(Error::InvalidAccess { addr: at, .. }) => {
                prop_assert!(!readable);
                prop_assert_eq!(at, addr);
            }
            Err(e) => prop_assert!(false, "unexpected error {}", e),
        }
    }
}
