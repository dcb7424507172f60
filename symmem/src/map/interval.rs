use std::ops::{Deref, Range};

/// Half-open address interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval<T> {
    range: Range<T>,
}

impl<T> Interval<T> {
    pub fn new(range: Range<T>) -> Self {
        Interval { range }
    }

    pub fn into_range(self) -> Range<T> {
        self.range
    }
}

impl<T: Ord> Interval<T> {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Share at least one point. Adjacent intervals do not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl<T> Deref for Interval<T> {
    type Target = Range<T>;

    fn deref(&self) -> &Self::Target {
        &self.range
    }
}

#[cfg(test)]
mod test {
    use super::Interval;

    #[test]
    fn relations() {
        let a = Interval::new(0u64..10);
        let b = Interval::new(5u64..15);
        let c = Interval::new(10u64..20);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&c));
        assert!(!a.overlaps(&c));
        assert!(a.covers(&Interval::new(2..10)));
        assert!(!a.covers(&b));
        assert!(Interval::new(3u64..3).is_empty());
        assert_eq!(b.into_range(), 5..15);
    }
}
