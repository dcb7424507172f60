use std::collections::BTreeMap;
use std::rc::Rc;

pub type Page<V> = BTreeMap<u64, V>; // keyed by offset within the page

#[derive(Clone, Debug)]
pub struct PagedMap<V> {
    /*
     * The concrete memory is a sparse map from byte addresses to slots, split
     * into fixed-size pages. The map is cloned whenever the symbolic state
     * forks, so pages are shared between the clones and a page is copied only
     * when one of its owners writes to it (copy-on-write). Two maps holding the
     * very same page are known to agree on every byte of it.
     */
    pages: BTreeMap<u64, Rc<Page<V>>>, // key is the page index
    page_size: u64,
}

impl<V: Clone> PagedMap<V> {
    /// `page_size` must be a power of 2.
    pub fn new(page_size: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size {:#x}", page_size);
        PagedMap {
            pages: BTreeMap::new(),
            page_size,
        }
    }

    /// Split an address into (page index, offset).
    pub fn split(&self, addr: u64) -> (u64, u64) {
        (addr / self.page_size, addr & (self.page_size - 1))
    }

    pub fn page_base(&self, index: u64) -> u64 {
        index * self.page_size
    }

    pub fn get(&self, addr: u64) -> Option<&V> {
        let (index, offset) = self.split(addr);
        self.pages.get(&index).and_then(|page| page.get(&offset))
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.get(addr).is_some()
    }

    /// Mutable access to a slot, copying the page if it is shared.
    pub fn get_mut(&mut self, addr: u64) -> Option<&mut V> {
        let (index, offset) = self.split(addr);
        let page = self.pages.get_mut(&index)?;
        if !page.contains_key(&offset) {
            return None;
        }
        Rc::make_mut(page).get_mut(&offset)
    }

    pub fn insert(&mut self, addr: u64, value: V) -> Option<V> {
        let (index, offset) = self.split(addr);
        let page = self.pages.entry(index).or_default();
        Rc::make_mut(page).insert(offset, value)
    }

    /// Slots with addresses in `lo..=hi`, ordered by address.
    pub fn find(&self, lo: u64, hi: u64) -> impl Iterator<Item = (u64, &V)> {
        let (lo_index, lo_offset) = self.split(lo);
        let (hi_index, hi_offset) = self.split(hi.max(lo));
        let page_size = self.page_size;
        self.pages
            .range(lo_index..=hi_index)
            .flat_map(move |(index, page)| {
                let from = if *index == lo_index { lo_offset } else { 0 };
                let to = if *index == hi_index { hi_offset } else { page_size - 1 };
                page.range(from..=to)
                    .map(move |(offset, v)| (index * page_size + offset, v))
            })
    }

    pub fn page(&self, index: u64) -> Option<&Rc<Page<V>>> {
        self.pages.get(&index)
    }

    /// Get a page iterator, ordered by page index.
    pub fn iter_pages(&self) -> impl Iterator<Item = (u64, &Rc<Page<V>>)> {
        self.pages.iter().map(|(k, v)| (*k, v))
    }

    /// Whether both maps hold the same page object at `index`.
    pub fn shares_page(&self, other: &Self, index: u64) -> bool {
        match (self.pages.get(&index), other.pages.get(&index)) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Return the number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Return true if the map contains no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
