#![allow(dead_code)]

use symmem::{
    ExprBuilder, MemoryConfig, MemoryOps, Permissions, PureRef, Solver, Sort, State, Z3Solver,
};

/// x86-64 state with `0x1000..0x2000` mapped read-write.
pub fn state() -> State<Z3Solver> {
    let mut state = State::x86_64(Z3Solver::new(), MemoryConfig::default()).unwrap();
    state
        .memory()
        .map_region(0x1000u64, 0x1000, Permissions::READ | Permissions::WRITE)
        .unwrap();
    state
}

/// Fresh 64-bit symbol constrained to `lo..=hi`.
pub fn bounded(state: &mut State<Z3Solver>, name: &str, lo: u64, hi: u64) -> PureRef {
    let b = state.builder().clone();
    let x = b.new_unconstrained(Sort::Bitv(64), name).unwrap();
    let lower = b.new_ule(b.new_bitv(64, lo), x.clone()).unwrap();
    let upper = b.new_ule(x.clone(), b.new_bitv(64, hi)).unwrap();
    state.solver_mut().assert(lower).unwrap();
    state.solver_mut().assert(upper).unwrap();
    x
}

/// The only value `v` can take once `cond` holds, if there is one.
pub fn value_under(state: &State<Z3Solver>, cond: PureRef, v: &PureRef) -> Option<u64> {
    let mut solver = state.solver().clone();
    solver.assert(cond).unwrap();
    solver.get_unique(v).unwrap()
}

pub fn eq(b: &ExprBuilder, x: &PureRef, val: u64) -> PureRef {
    b.new_eq(x.clone(), b.new_bitv(x.get_size(), val)).unwrap()
}
