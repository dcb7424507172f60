use super::interval::Interval;
use std::collections::BTreeMap;
use std::ops::Range;

/// Handle of an entry, ordered by the entry's start address then by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    start: u64,
    seq: u64,
}

/// Map from address intervals to values. Intervals may overlap and an
/// interval may carry several values.
#[derive(Debug, Clone)]
pub struct IntervalMap<V> {
    entries: BTreeMap<EntryId, (Interval<u64>, V)>,
    next_seq: u64,
    max_span: u64, // longest interval ever inserted
}

impl<V> Default for IntervalMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntervalMap<V> {
    pub fn new() -> Self {
        IntervalMap {
            entries: BTreeMap::new(),
            next_seq: 0,
            max_span: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `value` over `range`. Panics on an empty range.
    pub fn insert(&mut self, range: Range<u64>, value: V) -> EntryId {
        let interval = Interval::new(range);
        assert!(!interval.is_empty(), "empty interval {:?}", *interval);
        let id = EntryId {
            start: interval.start,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.max_span = self.max_span.max(interval.end - interval.start);
        self.entries.insert(id, (interval, value));
        id
    }

    /// Replace the value of an entry, returning the old one.
    pub fn update(&mut self, id: &EntryId, value: V) -> Option<V> {
        self.entries
            .get_mut(id)
            .map(|(_, v)| std::mem::replace(v, value))
    }

    /// Get an entry iterator, ordered by start address then insertion.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Range<u64>, &V)> {
        self.entries.iter().map(|(id, (k, v))| (*id, &**k, v))
    }

    /// Entries whose interval overlaps `range`.
    pub fn overlapping(&self, range: Range<u64>) -> impl Iterator<Item = (EntryId, &Range<u64>, &V)> {
        let query = Interval::new(range);
        // nothing starting before this can reach the query
        let lower = EntryId {
            start: query.start.saturating_sub(self.max_span),
            seq: 0,
        };
        let upper = EntryId {
            start: query.end.max(lower.start),
            seq: 0,
        };
        self.entries
            .range(lower..upper)
            .filter(move |(_, (k, _))| k.overlaps(&query))
            .map(|(id, (k, v))| (*id, &**k, v))
    }
}

#[cfg(test)]
mod test {
    use super::IntervalMap;

    #[test]
    fn insertion() {
        let mut map = IntervalMap::new();
        let a = map.insert(0x10..0x20, "a");
        let b = map.insert(0x10..0x20, "b");
        map.insert(0x30..0x31, "c");
        assert_eq!(map.len(), 3);
        assert_ne!(a, b);
        assert_eq!(map.update(&b, "B"), Some("b"));
        let values: Vec<_> = map.iter().map(|(_, _, v)| *v).collect();
        assert_eq!(values, vec!["a", "B", "c"]);
    }

    #[test]
    fn overlapping() {
        let mut map = IntervalMap::new();
        map.insert(0x0..0x1000, 0);
        map.insert(0x1800..0x1801, 1);
        map.insert(0x2000..0x2004, 2);
        let hits = |lo, hi| -> Vec<i32> { map.overlapping(lo..hi).map(|(_, _, v)| *v).collect() };
        assert_eq!(hits(0xfff, 0x1000), vec![0]);
        assert_eq!(hits(0x1000, 0x1800), Vec::<i32>::new());
        assert_eq!(hits(0x800, 0x2001), vec![0, 1, 2]);
        assert_eq!(hits(0x2003, 0x2004), vec![2]);
        assert_eq!(hits(0x2004, u64::MAX), Vec::<i32>::new());
    }

    #[test]
    #[should_panic]
    fn empty_interval() {
        let mut map = IntervalMap::new();
        map.insert(5..5, ());
    }
}
