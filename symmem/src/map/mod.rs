pub mod interval;
pub mod interval_map;
pub mod paged_map;

pub use interval::Interval;
pub use interval_map::{EntryId, IntervalMap};
pub use paged_map::{Page, PagedMap};
