use super::{Memory, MemoryItem, Slot};
use crate::error::{Error, Result};
use crate::expr::{ExprBuilder, PureRef};
use log::debug;
use std::collections::BTreeSet;
use std::rc::Rc;

impl Memory {
    /// Join `others` into `self`. `conditions[0]` is the branch condition of
    /// `self` and `conditions[i + 1]` the one of `others[i]`; all of them
    /// forked from `ancestor`. Returns the number of rewritten entries.
    pub fn merge(
        &mut self,
        others: &[&Memory],
        conditions: &[PureRef],
        ancestor: &Memory,
        builder: &ExprBuilder,
    ) -> Result<usize> {
        if conditions.len() != others.len() + 1 {
            return Err(Error::InvalidArguments(format!(
                "{} conditions for merging {} models",
                conditions.len(),
                others.len() + 1
            )));
        }
        for condition in conditions {
            condition.expect_bool()?;
        }
        let mut merged_condition = conditions[0].clone();
        let mut count = 0;
        for (other, condition) in others.iter().zip(&conditions[1..]) {
            count += self.merge_one(other, &merged_condition, condition, ancestor, builder)?;
            merged_condition = builder.new_boolor(merged_condition, condition.clone())?;
        }
        if let Some(metrics) = self.metrics() {
            metrics.on_merge(count);
        }
        debug!("merged {} models, {} entries rewritten", others.len() + 1, count);
        Ok(count)
    }

    fn merge_one(
        &mut self,
        other: &Memory,
        cond_self: &PureRef,
        cond_other: &PureRef,
        ancestor: &Memory,
        builder: &ExprBuilder,
    ) -> Result<usize> {
        let mut other = other.clone();
        // a page pending on one side only must be materialized on the other
        // side before pages can be compared
        let pending_self: BTreeSet<u64> = self.initializer.pending_pages().collect();
        let pending_other: BTreeSet<u64> = other.initializer.pending_pages().collect();
        for index in pending_self.symmetric_difference(&pending_other) {
            self.load_init_data(index * self.config.page_size, index * self.config.page_size);
            other.load_init_data(index * other.config.page_size, index * other.config.page_size);
        }

        let count = self.merge_concrete(&other, cond_self, cond_other, builder)?
            + self.merge_symbolic(&other, cond_self, cond_other, ancestor, builder)?;

        self.timestamp = self.timestamp.max(other.timestamp) + 1;
        self.timestamp_implicit = self.timestamp_implicit.min(other.timestamp_implicit);
        Ok(count)
    }

    fn merge_concrete(
        &mut self,
        other: &Memory,
        cond_self: &PureRef,
        cond_other: &PureRef,
        builder: &ExprBuilder,
    ) -> Result<usize> {
        let indexes: BTreeSet<u64> = self
            .concrete
            .iter_pages()
            .chain(other.concrete.iter_pages())
            .map(|(index, _)| index)
            .collect();

        let mut count = 0;
        for index in indexes {
            if self.concrete.shares_page(&other.concrete, index) {
                continue;
            }
            let page_self = self.concrete.page(index).cloned().unwrap_or_default();
            let page_other = other.concrete.page(index).cloned().unwrap_or_default();
            let offsets: BTreeSet<u64> = page_self.keys().chain(page_other.keys()).copied().collect();
            let base = self.concrete.page_base(index);

            for offset in offsets {
                let addr = base + offset;
                let (slot_self, slot_other) = (page_self.get(&offset), page_other.get(&offset));
                let same = match (slot_self, slot_other) {
                    (Some(a), Some(b)) => a.same_as(b),
                    // image bytes are taken to be the same on both sides
                    (Some(Slot::Single(item)), None) => item.is_initial(),
                    (None, Some(slot @ Slot::Single(item))) if item.is_initial() => {
                        self.concrete.insert(addr, slot.clone());
                        true
                    }
                    _ => false,
                };
                if same {
                    continue;
                }
                let mut items = Vec::new();
                for (slot, cond) in [(slot_self, cond_self), (slot_other, cond_other)] {
                    for item in slot.map(|s| s.items()).unwrap_or_default() {
                        items.push(item.guarded(cond, builder)?);
                    }
                }
                self.concrete.insert(addr, Slot::from_items(items));
                count += 1;
            }
        }
        Ok(count)
    }

    fn merge_symbolic(
        &mut self,
        other: &Memory,
        cond_self: &PureRef,
        cond_other: &PureRef,
        ancestor: &Memory,
        builder: &ExprBuilder,
    ) -> Result<usize> {
        let diverged = |item: &MemoryItem| {
            (item.timestamp > 0 && item.timestamp > ancestor.timestamp)
                || (item.timestamp < 0 && item.timestamp < ancestor.timestamp_implicit)
        };

        let mut updates = Vec::new();
        for (id, _, item) in self.symbolic.iter() {
            if diverged(item) {
                updates.push((id, item.guarded(cond_self, builder)?));
            }
        }
        let mut inserts = Vec::new();
        for (_, range, item) in other.symbolic.iter() {
            if diverged(item) {
                inserts.push((range.clone(), item.guarded(cond_other, builder)?));
            }
        }

        let count = updates.len() + inserts.len();
        if count > 0 {
            let symbolic = Rc::make_mut(&mut self.symbolic);
            for (id, item) in updates {
                symbolic.update(&id, item);
            }
            for (range, item) in inserts {
                symbolic.insert(range, item);
            }
        }
        Ok(count)
    }
}
