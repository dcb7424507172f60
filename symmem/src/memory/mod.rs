//! Byte-granular symbolic memory.
//!
//! Concrete-address writes live in a paged store and symbolic-address writes
//! in an interval store. A load gathers every write that may alias the
//! accessed bytes and folds them, oldest first, into an if-then-else chain.
// ref: http://season-lab.github.io/papers/memsight-ase17.pdf

mod config;
mod init;
mod item;
mod merge;
mod metrics;
mod ops;
mod region;
mod registers;

pub use config::{Endian, MemoryConfig, MemoryKind, MemoryOptions};
pub use init::{BackingImage, InitChunk, Initializer, Segment};
pub use item::{Address, ItemValue, MemoryItem, Slot};
pub use metrics::{Counters, Metrics};
pub use ops::{Location, MemoryAccess, MemoryOps, SizeArg};
pub use region::{AccessKind, MappedRegion, Permissions, RegionTable};
pub use registers::{RegSpec, RegisterFile};

use crate::error::{Error, Result};
use crate::expr::{ExprBuilder, Sort};
use crate::map::{IntervalMap, PagedMap};
use log::{debug, trace};
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct Memory {
    kind: MemoryKind,
    config: MemoryConfig,
    concrete: PagedMap<Slot>,
    symbolic: Rc<IntervalMap<MemoryItem>>,
    regions: RegionTable,
    initializer: Initializer,
    register_file: Option<Rc<RegisterFile>>,
    timestamp: i64,
    timestamp_implicit: i64,
    metrics: Option<Rc<dyn Metrics>>,
}

impl Memory {
    fn with_kind(kind: MemoryKind, config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Memory {
            kind,
            concrete: PagedMap::new(config.page_size),
            symbolic: Rc::new(IntervalMap::new()),
            regions: RegionTable::new(),
            initializer: Initializer::default(),
            register_file: None,
            timestamp: 0,
            timestamp_implicit: 0,
            metrics: None,
            config,
        })
    }

    /// Empty process memory with nothing mapped.
    pub fn new(config: MemoryConfig) -> Result<Self> {
        Self::with_kind(MemoryKind::Memory, config)
    }

    /// Process memory backed by `image`. Image bytes are copied into the
    /// concrete store page by page, when first read.
    pub fn with_image(config: MemoryConfig, image: &BackingImage) -> Result<Self> {
        let mut memory = Self::new(config)?;
        for (base, length, perms) in &image.regions {
            memory.map_region(*base, *length, *perms)?;
        }
        memory.initializer = Initializer::new(&image.segments, memory.config.page_size);
        debug!(
            "memory image: {} segments, {} pending pages",
            image.segments.len(),
            memory.initializer.pending_pages().count()
        );
        Ok(memory)
    }

    /// Register space addressed by the byte offsets of `file`.
    pub fn registers(config: MemoryConfig, file: RegisterFile) -> Result<Self> {
        let mut memory = Self::with_kind(MemoryKind::Registers, config)?;
        memory.register_file = Some(Rc::new(file));
        Ok(memory)
    }

    pub fn with_metrics(mut self, metrics: Rc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Independent model sharing every page and the interval store with
    /// `self` until either side writes to them.
    pub fn copy(&self) -> Self {
        trace!("copy memory: {} pages", self.concrete.len());
        self.clone()
    }

    pub fn kind(&self) -> MemoryKind {
        self.kind
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn timestamp_implicit(&self) -> i64 {
        self.timestamp_implicit
    }

    pub fn regions(&self) -> impl Iterator<Item = &MappedRegion> {
        self.regions.iter()
    }

    pub fn pending_init_pages(&self) -> Vec<u64> {
        self.initializer.pending_pages().collect()
    }

    /// Whether the concrete store holds a slot for `addr`.
    pub fn contains(&self, addr: u64) -> bool {
        self.concrete.contains(addr)
    }

    pub fn slot(&self, addr: u64) -> Option<&Slot> {
        self.concrete.get(addr)
    }

    /// Number of writes to symbolic addresses, implicit ones included.
    pub fn symbolic_len(&self) -> usize {
        self.symbolic.len()
    }

    pub fn register_file(&self) -> Result<&RegisterFile> {
        self.register_file
            .as_deref()
            .ok_or_else(|| Error::InvalidArguments("no register file".to_owned()))
    }

    pub fn permissions(&self, addr: u64) -> Option<Permissions> {
        self.regions.permissions(addr)
    }

    pub fn map_region(&mut self, base: u64, length: u64, perms: Permissions) -> Result<()> {
        self.regions.map(base, length, perms)
    }

    /// Zero the region's bytes with a fresh write, then forget the region.
    /// The region must have been mapped with exactly `base` and `length`.
    pub fn unmap_region(&mut self, base: u64, length: u64, builder: &ExprBuilder) -> Result<()> {
        if self.regions.position(base, length).is_none() {
            return Err(Error::RegionNotFound { addr: base, length });
        }
        let zero = builder.new_const(Sort::Bitv(8), 0);
        let t = self.next_timestamp();
        for k in 0..length {
            let addr = base.wrapping_add(k);
            let item = MemoryItem::new(Address::Concrete(addr), ItemValue::Expr(zero.clone()), t, None);
            self.concrete.insert(addr, Slot::Single(item));
        }
        self.regions.unmap(base, length)?;
        debug!("unmapped {:#x}+{:#x}", base, length);
        Ok(())
    }

    pub(crate) fn next_timestamp(&mut self) -> i64 {
        self.timestamp += 1;
        self.timestamp
    }

    pub(crate) fn next_implicit(&mut self) -> i64 {
        self.timestamp_implicit -= 1;
        self.timestamp_implicit
    }

    fn metrics(&self) -> Option<&dyn Metrics> {
        self.metrics.as_deref()
    }

    /// Copy the pending image bytes of every page overlapping `lo..=hi` into
    /// the concrete store. Bytes already written are left alone.
    pub(crate) fn load_init_data(&mut self, lo: u64, hi: u64) {
        let page_size = self.config.page_size;
        let pages = self.initializer.take(lo / page_size, hi / page_size);
        for (index, chunks) in pages {
            self.init_page(index, chunks);
        }
    }

    fn init_page(&mut self, index: u64, chunks: Vec<InitChunk>) {
        let base = self.concrete.page_base(index);
        for chunk in chunks {
            for j in 0..chunk.len {
                let addr = base + chunk.page_offset + j as u64;
                if self.concrete.contains(addr) {
                    continue;
                }
                let value = ItemValue::Image {
                    data: chunk.data.clone(),
                    offset: chunk.data_offset + j,
                };
                self.concrete.insert(addr, Slot::Single(MemoryItem::new(Address::Concrete(addr), value, 0, None)));
            }
        }
        trace!("initialized page {:#x}", index);
        if let Some(metrics) = self.metrics() {
            metrics.on_page_initialized(index);
        }
    }

    /// Materialize every pending page.
    pub(crate) fn load_all_init_data(&mut self) {
        self.load_init_data(0, u64::MAX);
    }
}

#[cfg(test)]
mod test {
    use super::{BackingImage, Counters, Memory, MemoryConfig, Permissions};
    use crate::error::Error;
    use crate::expr::ExprBuilder;
    use std::rc::Rc;

    fn image() -> BackingImage {
        BackingImage::new()
            .with_region(0x1000, 0x2000, Permissions::READ | Permissions::WRITE)
            .with_segment(0x1ffe, &[1, 2, 3, 4])
    }

    #[test]
    fn lazy_init() {
        let counters = Rc::new(Counters::default());
        let mut memory = Memory::with_image(MemoryConfig::default(), &image())
            .unwrap()
            .with_metrics(counters.clone());
        assert_eq!(memory.pending_init_pages(), vec![1, 2]);
        assert!(!memory.contains(0x1ffe));

        memory.load_init_data(0x1fff, 0x1fff);
        assert_eq!(memory.pending_init_pages(), vec![2]);
        assert!(memory.contains(0x1ffe));
        assert!(!memory.contains(0x2000));
        memory.load_init_data(0x1000, 0x1fff);
        assert_eq!(counters.pages_initialized.get(), 1);

        memory.load_all_init_data();
        assert!(memory.contains(0x2001));
        assert_eq!(counters.pages_initialized.get(), 2);
        assert_eq!(memory.slot(0x2001).unwrap().items()[0].value.as_const_byte(), Some(4));
    }

    #[test]
    fn unmap_zeroes() {
        let b = ExprBuilder::new();
        let mut memory = Memory::with_image(MemoryConfig::default(), &image()).unwrap();
        assert!(matches!(
            memory.unmap_region(0x1000, 0x1000, &b),
            Err(Error::RegionNotFound { .. })
        ));
        assert_eq!(memory.timestamp(), 0);
        memory.unmap_region(0x1000, 0x2000, &b).unwrap();
        assert_eq!(memory.timestamp(), 1);
        assert_eq!(memory.regions().count(), 0);
        let item = &memory.slot(0x2fff).unwrap().items()[0];
        assert_eq!(item.value.as_const_byte(), Some(0));
        assert_eq!(item.timestamp, 1);
    }

    #[test]
    fn copies_are_independent() {
        let memory = Memory::with_image(MemoryConfig::default(), &image()).unwrap();
        let mut copy = memory.copy();
        copy.map_region(0x8000, 0x1000, Permissions::READ).unwrap();
        copy.load_all_init_data();
        assert_eq!(memory.regions().count(), 1);
        assert_eq!(memory.pending_init_pages().len(), 2);
        assert!(copy.pending_init_pages().is_empty());
    }
}
