use std::cell::Cell;
use std::fmt::Debug;

/// Observer of memory operations. Every hook defaults to doing nothing.
pub trait Metrics: Debug {
    fn on_load(&self, _size: usize) {}
    fn on_store(&self, _size: usize) {}
    /// An if-then-else node was emitted while reading a byte.
    fn on_ite(&self) {}
    /// A merge finished, having rewritten `_rewritten` entries.
    fn on_merge(&self, _rewritten: usize) {}
    fn on_page_initialized(&self, _page_index: u64) {}
    fn on_fault(&self, _addr: u64) {}
}

/// Plain counters for every hook.
#[derive(Debug, Default)]
pub struct Counters {
    pub loads: Cell<u64>,
    pub stores: Cell<u64>,
    pub ites: Cell<u64>,
    pub merges: Cell<u64>,
    pub rewritten: Cell<u64>,
    pub pages_initialized: Cell<u64>,
    pub faults: Cell<u64>,
}

fn bump(counter: &Cell<u64>, n: u64) {
    counter.set(counter.get() + n);
}

impl Metrics for Counters {
    fn on_load(&self, _size: usize) {
        bump(&self.loads, 1);
    }
    fn on_store(&self, _size: usize) {
        bump(&self.stores, 1);
    }
    fn on_ite(&self) {
        bump(&self.ites, 1);
    }
    fn on_merge(&self, rewritten: usize) {
        bump(&self.merges, 1);
        bump(&self.rewritten, rewritten as u64);
    }
    fn on_page_initialized(&self, _page_index: u64) {
        bump(&self.pages_initialized, 1);
    }
    fn on_fault(&self, _addr: u64) {
        bump(&self.faults, 1);
    }
}
