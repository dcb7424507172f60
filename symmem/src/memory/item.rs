use crate::error::Result;
use crate::expr::{ExprBuilder, PureRef, Sort, MAX_CONCRETE_BITS};
use std::rc::Rc;

#[derive(Clone, Debug)]
pub enum Address {
    Concrete(u64),
    Symbolic(PureRef),
}

impl Address {
    pub fn as_concrete(&self) -> Option<u64> {
        match self {
            Address::Concrete(addr) => Some(*addr),
            Address::Symbolic(_) => None,
        }
    }

    pub fn to_expr(&self, builder: &ExprBuilder, bits: usize) -> PureRef {
        match self {
            Address::Concrete(addr) => builder.new_const(Sort::Bitv(bits), *addr as u128),
            Address::Symbolic(expr) => expr.clone(),
        }
    }

    /// Address of the `k`-th byte from here.
    pub fn offset(&self, builder: &ExprBuilder, k: u64) -> Result<Address> {
        Ok(match self {
            Address::Concrete(addr) => Address::Concrete(addr.wrapping_add(k)),
            Address::Symbolic(expr) if k == 0 => Address::Symbolic(expr.clone()),
            Address::Symbolic(expr) => {
                let delta = builder.new_const(expr.get_sort(), k as u128);
                Address::Symbolic(builder.new_bvadd(expr.clone(), delta)?)
            }
        })
    }

    pub(crate) fn is_identical(&self, other: &Address) -> bool {
        match (self, other) {
            (Address::Concrete(a), Address::Concrete(b)) => a == b,
            (Address::Symbolic(a), Address::Symbolic(b)) => a.is_identical(b),
            _ => false,
        }
    }
}

/// Content of one byte. Slices and image bytes are turned into expressions
/// only when read.
#[derive(Clone, Debug)]
pub enum ItemValue {
    Expr(PureRef),
    /// `byte`-th byte of `data`, counting from the most significant end.
    Slice { data: PureRef, byte: u32 },
    Image { data: Rc<[u8]>, offset: usize },
}

impl ItemValue {
    pub fn resolve(&self, builder: &ExprBuilder) -> Result<PureRef> {
        match self {
            ItemValue::Expr(expr) => Ok(expr.clone()),
            ItemValue::Slice { data, byte } => {
                let high = data.get_size() as u32 - 8 * byte - 1;
                Ok(builder.new_extract(data.clone(), high, high - 7)?)
            }
            ItemValue::Image { data, offset } => {
                Ok(builder.new_const(Sort::Bitv(8), data[*offset] as u128))
            }
        }
    }

    pub fn as_const_byte(&self) -> Option<u8> {
        match self {
            ItemValue::Expr(expr) => expr.as_u64().map(|v| v as u8),
            ItemValue::Slice { data, byte } => {
                let shift = data.get_size() - 8 * (*byte as usize) - 8;
                if data.is_concretized() && data.get_size() <= MAX_CONCRETE_BITS {
                    Some((data.evaluate() >> shift) as u8)
                } else {
                    None
                }
            }
            ItemValue::Image { data, offset } => Some(data[*offset]),
        }
    }

    /// Same content: equal constants, or the very same symbolic source.
    pub fn same_as(&self, other: &ItemValue) -> bool {
        if let (Some(a), Some(b)) = (self.as_const_byte(), other.as_const_byte()) {
            return a == b;
        }
        match (self, other) {
            (ItemValue::Expr(a), ItemValue::Expr(b)) => a.is_identical(b),
            (ItemValue::Slice { data: a, byte: i }, ItemValue::Slice { data: b, byte: j }) => {
                i == j && a.is_identical(b)
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MemoryItem {
    pub addr: Address,
    pub value: ItemValue,
    /// Positive for stores, negative for implicit stores, zero for image bytes.
    pub timestamp: i64,
    pub guard: Option<PureRef>,
}

impl MemoryItem {
    pub fn new(addr: Address, value: ItemValue, timestamp: i64, guard: Option<PureRef>) -> Self {
        MemoryItem {
            addr,
            value,
            timestamp,
            guard,
        }
    }

    /// Unguarded byte of the initial image.
    pub fn is_initial(&self) -> bool {
        self.timestamp == 0 && self.guard.is_none()
    }

    pub fn is_unguarded_concrete(&self) -> bool {
        self.guard.is_none() && self.addr.as_concrete().is_some()
    }

    /// Copy of this item that only holds under `cond` as well.
    pub fn guarded(&self, cond: &PureRef, builder: &ExprBuilder) -> Result<MemoryItem> {
        let guard = builder.and_maybe(self.guard.clone(), cond.clone())?;
        Ok(MemoryItem {
            guard: if guard.is_const_true() { None } else { Some(guard) },
            ..self.clone()
        })
    }
}

impl PartialEq for MemoryItem {
    fn eq(&self, other: &MemoryItem) -> bool {
        let same_guard = match (&self.guard, &other.guard) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_identical(b),
            _ => false,
        };
        self.timestamp == other.timestamp
            && same_guard
            && self.addr.is_identical(&other.addr)
            && self.value.same_as(&other.value)
    }
}

/// Candidates stored at one concrete address, newest first.
#[derive(Clone, Debug)]
pub enum Slot {
    Single(MemoryItem),
    Conflicting(Vec<MemoryItem>),
}

impl Slot {
    pub fn from_items(mut items: Vec<MemoryItem>) -> Slot {
        if items.len() == 1 {
            Slot::Single(items.remove(0))
        } else {
            Slot::Conflicting(items)
        }
    }

    pub fn items(&self) -> &[MemoryItem] {
        match self {
            Slot::Single(item) => std::slice::from_ref(item),
            Slot::Conflicting(items) => items,
        }
    }

    /// Put a newer candidate in front of the existing ones.
    pub fn push_front(&mut self, item: MemoryItem) {
        let mut items = vec![item];
        items.extend_from_slice(self.items());
        *self = Slot::Conflicting(items);
    }

    pub fn same_as(&self, other: &Slot) -> bool {
        let (a, b) = (self.items(), other.items());
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
    }
}

#[cfg(test)]
mod test {
    use super::{Address, ItemValue, MemoryItem, Slot};
    use crate::expr::{ExprBuilder, Sort};
    use std::rc::Rc;

    #[test]
    fn slices() {
        let b = ExprBuilder::new();
        let data = b.new_bitv(32, 0xaabbccdd);
        let first = ItemValue::Slice { data: data.clone(), byte: 0 };
        let last = ItemValue::Slice { data, byte: 3 };
        assert_eq!(first.resolve(&b).unwrap().as_u64(), Some(0xaa));
        assert_eq!(last.as_const_byte(), Some(0xdd));

        let sym = b.new_unconstrained(Sort::Bitv(16), "x").unwrap();
        let high = ItemValue::Slice { data: sym.clone(), byte: 0 };
        assert_eq!(high.as_const_byte(), None);
        let resolved = high.resolve(&b).unwrap();
        assert_eq!(resolved.get_size(), 8);
        assert!(high.same_as(&ItemValue::Slice { data: sym.clone(), byte: 0 }));
        assert!(!high.same_as(&ItemValue::Slice { data: sym, byte: 1 }));
    }

    #[test]
    fn equality() {
        let b = ExprBuilder::new();
        let image: Rc<[u8]> = vec![0x41u8, 0x42].into();
        let a = MemoryItem::new(
            Address::Concrete(0x10),
            ItemValue::Image { data: image, offset: 1 },
            0,
            None,
        );
        let same = MemoryItem::new(
            Address::Concrete(0x10),
            ItemValue::Expr(b.new_bitv(8, 0x42)),
            0,
            None,
        );
        assert_eq!(a, same);
        assert!(a.is_initial());

        let cond = b.new_unconstrained(Sort::Bool, "c").unwrap();
        let guarded = a.guarded(&cond, &b).unwrap();
        assert_ne!(a, guarded);
        assert!(!guarded.is_initial());
        assert!(a.guarded(&b.new_bool(true), &b).unwrap().guard.is_none());

        let mut slot = Slot::Single(a.clone());
        assert!(slot.same_as(&Slot::Single(same)));
        slot.push_front(guarded.clone());
        assert_eq!(slot.items().len(), 2);
        assert_eq!(slot.items()[0], guarded);
        assert!(!slot.same_as(&Slot::Single(a)));
    }
}
