use super::region::Permissions;
use std::collections::BTreeMap;
use std::rc::Rc;

/// A contiguous run of initial bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub addr: u64,
    pub data: Rc<[u8]>,
}

impl Segment {
    pub fn new(addr: u64, data: &[u8]) -> Self {
        Segment {
            addr,
            data: data.into(),
        }
    }
}

/// Initial contents of a process image: byte segments and the regions to map.
#[derive(Clone, Debug, Default)]
pub struct BackingImage {
    pub segments: Vec<Segment>,
    pub regions: Vec<(u64, u64, Permissions)>,
}

impl BackingImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, addr: u64, data: &[u8]) -> Self {
        self.segments.push(Segment::new(addr, data));
        self
    }

    pub fn with_region(mut self, base: u64, length: u64, perms: Permissions) -> Self {
        self.regions.push((base, length, perms));
        self
    }
}

/// Part of a segment falling into one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitChunk {
    pub data: Rc<[u8]>,
    pub data_offset: usize,
    pub page_offset: u64,
    pub len: usize,
}

/// Image bytes not yet copied into the concrete store, grouped by page.
/// Each page is handed out once.
#[derive(Clone, Debug, Default)]
pub struct Initializer {
    pending: BTreeMap<u64, Vec<InitChunk>>,
}

impl Initializer {
    pub fn new(segments: &[Segment], page_size: u64) -> Self {
        let mut pending: BTreeMap<u64, Vec<InitChunk>> = BTreeMap::new();
        for segment in segments {
            let mut done = 0usize;
            while done < segment.data.len() {
                let addr = segment.addr.wrapping_add(done as u64);
                let page_offset = addr & (page_size - 1);
                let room = (page_size - page_offset) as usize;
                let len = room.min(segment.data.len() - done);
                pending.entry(addr / page_size).or_default().push(InitChunk {
                    data: segment.data.clone(),
                    data_offset: done,
                    page_offset,
                    len,
                });
                done += len;
            }
        }
        Initializer { pending }
    }

    /// Remove and return the pending pages in `first..=last`.
    pub fn take(&mut self, first: u64, last: u64) -> Vec<(u64, Vec<InitChunk>)> {
        let indexes: Vec<u64> = self.pending.range(first..=last).map(|(k, _)| *k).collect();
        indexes
            .into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|chunks| (k, chunks)))
            .collect()
    }

    pub fn pending_pages(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().copied()
    }
}
