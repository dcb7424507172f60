use super::{
    ast::{bitmask, MAX_CONCRETE_BITS},
    error::{ExprError, ExprResult},
    Pure, PureCode, PureRef, Sort, VarId,
};
use quick_cache::sync::Cache;
use std::{cell::Cell, rc::Rc};

const PURE_CACHE_SIZE: usize = 1 << 16;

/// Hash-consing factory for expressions.
///
/// Clones share both the node cache and the symbol counter, so symbols created
/// through any copy never collide.
#[derive(Debug, Clone)]
pub struct ExprBuilder {
    pure_cache: Rc<Cache<u64, PureRef>>,
    uniq_var_id: Rc<Cell<u64>>,
}

impl Default for ExprBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn foldable(op: &Pure) -> bool {
    op.is_concretized() && op.get_size() <= MAX_CONCRETE_BITS
}

impl ExprBuilder {
    pub fn new() -> Self {
        ExprBuilder {
            pure_cache: Rc::new(Cache::new(PURE_CACHE_SIZE)),
            uniq_var_id: Rc::new(Cell::new(0)),
        }
    }

    fn new_pure(
        &self,
        code: PureCode,
        args: Vec<PureRef>,
        symbolized: bool,
        sort: Sort,
        eval: u128,
    ) -> PureRef {
        let op: PureRef = Pure::new(code, args, symbolized, sort, eval).into();
        match self.pure_cache.get(&op.get_hash()) {
            Some(cached) if cached == op => cached,
            _ => {
                self.pure_cache.insert(op.get_hash(), op.clone());
                op
            }
        }
    }

    fn get_uniq_var_id(&self) -> u64 {
        let id = self.uniq_var_id.get();
        self.uniq_var_id.set(id + 1);
        id
    }

    pub fn new_const(&self, sort: Sort, val: u128) -> PureRef {
        match sort {
            Sort::Bitv(width) => {
                self.new_pure(PureCode::Bitv, vec![], false, sort, val & bitmask(width))
            }
            Sort::Bool => self.new_pure(PureCode::Bool, vec![], false, sort, (val != 0) as u128),
        }
    }

    pub fn new_bool(&self, val: bool) -> PureRef {
        self.new_const(Sort::Bool, val as u128)
    }

    pub fn new_bitv(&self, width: usize, val: u64) -> PureRef {
        self.new_const(Sort::Bitv(width), val as u128)
    }

    /// A fresh symbol. Every call yields a distinct one, even for the same name.
    pub fn new_unconstrained(&self, sort: Sort, name: &str) -> ExprResult<PureRef> {
        if sort.get_size() == 0 {
            return Err(ExprError::ZeroWidth);
        }
        let id = VarId::new(name, self.get_uniq_var_id());
        Ok(self.new_pure(PureCode::Var(id), vec![], true, sort, 0))
    }

    pub fn new_ite(&self, condition: PureRef, then: PureRef, otherwise: PureRef) -> ExprResult<PureRef> {
        condition.expect_bool()?;
        then.expect_same_sort_with(&otherwise)?;

        if condition.is_concretized() {
            if condition.evaluate_bool() {
                Ok(then)
            } else {
                Ok(otherwise)
            }
        } else if then.is_identical(&otherwise) {
            Ok(then)
        } else {
            let sort = then.get_sort();
            Ok(self.new_pure(PureCode::Ite, vec![condition, then, otherwise], true, sort, 0))
        }
    }

    pub fn new_boolinv(&self, x: PureRef) -> ExprResult<PureRef> {
        x.expect_bool()?;

        if x.is_concretized() {
            return Ok(self.new_bool(!x.evaluate_bool()));
        }
        if let PureCode::BoolInv = x.get_code() {
            return Ok(x.get_arg(0));
        }
        Ok(self.new_pure(PureCode::BoolInv, vec![x], true, Sort::Bool, 0))
    }

    pub fn new_booland(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_bool()?;
        y.expect_bool()?;

        if x.is_const_false() || y.is_const_true() {
            return Ok(x);
        }
        if y.is_const_false() || x.is_const_true() || x.is_identical(&y) {
            return Ok(y);
        }
        Ok(self.new_pure(PureCode::BoolAnd, vec![x, y], true, Sort::Bool, 0))
    }

    pub fn new_boolor(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_bool()?;
        y.expect_bool()?;

        if x.is_const_true() || y.is_const_false() {
            return Ok(x);
        }
        if y.is_const_true() || x.is_const_false() || x.is_identical(&y) {
            return Ok(y);
        }
        Ok(self.new_pure(PureCode::BoolOr, vec![x, y], true, Sort::Bool, 0))
    }

    /// Conjunction of an optional guard with `y`.
    pub fn and_maybe(&self, x: Option<PureRef>, y: PureRef) -> ExprResult<PureRef> {
        match x {
            Some(x) => self.new_booland(x, y),
            None => Ok(y),
        }
    }

    pub fn new_eq(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_same_sort_with(&y)?;

        if x.is_concretized() && y.is_concretized() {
            return Ok(self.new_bool(x.evaluate() == y.evaluate()));
        }
        if x.is_identical(&y) {
            return Ok(self.new_bool(true));
        }
        Ok(self.new_pure(PureCode::Equal, vec![x, y], true, Sort::Bool, 0))
    }

    pub fn new_ule(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        if x.is_concretized() && y.is_concretized() {
            return Ok(self.new_bool(x.evaluate() <= y.evaluate()));
        }
        if x.is_identical(&y) || (x.is_concretized() && x.evaluate() == 0) {
            return Ok(self.new_bool(true));
        }
        Ok(self.new_pure(PureCode::Ule, vec![x, y], true, Sort::Bool, 0))
    }

    pub fn new_ult(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        if x.is_concretized() && y.is_concretized() {
            return Ok(self.new_bool(x.evaluate() < y.evaluate()));
        }
        if x.is_identical(&y) || (y.is_concretized() && y.evaluate() == 0) {
            return Ok(self.new_bool(false));
        }
        Ok(self.new_pure(PureCode::Ult, vec![x, y], true, Sort::Bool, 0))
    }

    pub fn new_bvadd(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        if foldable(&x) && foldable(&y) {
            let eval = x.evaluate().wrapping_add(y.evaluate());
            return Ok(self.new_const(x.get_sort(), eval));
        }
        if y.is_concretized() && y.evaluate() == 0 {
            return Ok(x);
        }
        if x.is_concretized() && x.evaluate() == 0 {
            return Ok(y);
        }
        let sort = x.get_sort();
        Ok(self.new_pure(PureCode::Add, vec![x, y], true, sort, 0))
    }

    pub fn new_bvsub(&self, x: PureRef, y: PureRef) -> ExprResult<PureRef> {
        x.expect_bitv()?;
        x.expect_same_sort_with(&y)?;

        if foldable(&x) && foldable(&y) {
            let eval = x.evaluate().wrapping_sub(y.evaluate());
            return Ok(self.new_const(x.get_sort(), eval));
        }
        if y.is_concretized() && y.evaluate() == 0 {
            return Ok(x);
        }
        let sort = x.get_sort();
        Ok(self.new_pure(PureCode::Sub, vec![x, y], true, sort, 0))
    }

    /// Concatenation with `high` in the most significant bits.
    pub fn new_append(&self, high: PureRef, low: PureRef) -> ExprResult<PureRef> {
        high.expect_bitv()?;
        low.expect_bitv()?;

        let size = high.get_size() + low.get_size();
        let sort = Sort::Bitv(size);
        if high.is_concretized() && low.is_concretized() && size <= MAX_CONCRETE_BITS {
            let eval = (high.evaluate() << low.get_size()) | low.evaluate();
            return Ok(self.new_const(sort, eval));
        }
        Ok(self.new_pure(PureCode::Append, vec![high, low], true, sort, 0))
    }

    /// Bits `high..=low` of `v`.
    pub fn new_extract(&self, v: PureRef, high: u32, low: u32) -> ExprResult<PureRef> {
        v.expect_bitv()?;
        let size = v.get_size();
        if low > high || high as usize >= size {
            return Err(ExprError::InvalidExtract { high, low, size });
        }
        if low == 0 && high as usize == size - 1 {
            return Ok(v);
        }

        let width = (high - low + 1) as usize;
        if foldable(&v) {
            return Ok(self.new_const(Sort::Bitv(width), v.evaluate() >> low));
        }
        if let PureCode::Append = v.get_code() {
            // look through concatenations when the slice lies in one half
            let (upper, lower) = (v.get_arg(0), v.get_arg(1));
            let split = lower.get_size() as u32;
            if high < split {
                return self.new_extract(lower, high, low);
            }
            if low >= split {
                return self.new_extract(upper, high - split, low - split);
            }
        }
        Ok(self.new_pure(PureCode::Extract(high, low), vec![v], true, Sort::Bitv(width), 0))
    }

    /// Resize `v` to `width` bits, truncating or extending.
    pub fn new_cast(&self, v: PureRef, width: usize, signed: bool) -> ExprResult<PureRef> {
        v.expect_bitv()?;
        if width == 0 {
            return Err(ExprError::ZeroWidth);
        }
        let size = v.get_size();
        if width == size {
            return Ok(v);
        }
        if width < size {
            return self.new_extract(v, width as u32 - 1, 0);
        }
        if foldable(&v) && width <= MAX_CONCRETE_BITS {
            let eval = v.evaluate();
            let negative = signed && (eval >> (size - 1)) & 1 == 1;
            let eval = if negative {
                eval | (bitmask(width) & !bitmask(size))
            } else {
                eval
            };
            return Ok(self.new_const(Sort::Bitv(width), eval));
        }
        Ok(self.new_pure(PureCode::Cast(signed), vec![v], true, Sort::Bitv(width), 0))
    }

    /// Reverse the byte order of `v`.
    pub fn new_reverse_bytes(&self, v: PureRef) -> ExprResult<PureRef> {
        v.expect_bitv()?;
        let size = v.get_size();
        if size % 8 != 0 {
            return Err(ExprError::NotByteSized(size));
        }
        let n_bytes = (size / 8) as u32;
        let mut reversed = self.new_extract(v.clone(), 7, 0)?;
        for i in 1..n_bytes {
            let byte = self.new_extract(v.clone(), 8 * i + 7, 8 * i)?;
            reversed = self.new_append(reversed, byte)?;
        }
        Ok(reversed)
    }
}

#[cfg(test)]
mod test {
    use super::ExprBuilder;
    use crate::expr::{ExprError, PureCode, Sort};

    #[test]
    fn constant_folding() {
        let b = ExprBuilder::new();
        let x = b.new_bitv(8, 0xf0);
        let y = b.new_bitv(8, 0x20);
        assert_eq!(b.new_bvadd(x.clone(), y.clone()).unwrap().evaluate(), 0x10);
        assert_eq!(b.new_bvsub(y.clone(), x.clone()).unwrap().evaluate(), 0x30);
        assert!(b.new_ule(y.clone(), x.clone()).unwrap().is_const_true());
        assert!(b.new_ult(x.clone(), y.clone()).unwrap().is_const_false());
        assert!(b.new_eq(x.clone(), x.clone()).unwrap().is_const_true());

        let word = b.new_append(x, y).unwrap();
        assert_eq!(word.as_u64(), Some(0xf020));
        assert_eq!(b.new_extract(word.clone(), 15, 8).unwrap().as_u64(), Some(0xf0));
        assert_eq!(b.new_reverse_bytes(word).unwrap().as_u64(), Some(0x20f0));
    }

    #[test]
    fn casts() {
        let b = ExprBuilder::new();
        let x = b.new_bitv(8, 0x80);
        assert_eq!(b.new_cast(x.clone(), 16, false).unwrap().as_u64(), Some(0x0080));
        assert_eq!(b.new_cast(x.clone(), 16, true).unwrap().as_u64(), Some(0xff80));
        assert_eq!(b.new_cast(x, 4, false).unwrap().as_u64(), Some(0));
    }

    #[test]
    fn ite_folding() {
        let b = ExprBuilder::new();
        let c = b.new_unconstrained(Sort::Bool, "c").unwrap();
        let x = b.new_bitv(8, 1);
        let y = b.new_bitv(8, 2);
        assert!(b.new_ite(b.new_bool(true), x.clone(), y.clone()).unwrap().is_identical(&x));
        assert!(b.new_ite(b.new_bool(false), x.clone(), y.clone()).unwrap().is_identical(&y));
        assert!(b.new_ite(c.clone(), x.clone(), x.clone()).unwrap().is_identical(&x));
        let ite = b.new_ite(c.clone(), x, y).unwrap();
        assert_eq!(ite.get_code(), &PureCode::Ite);
        assert!(ite.is_symbolized());

        let not_not = b.new_boolinv(b.new_boolinv(c.clone()).unwrap()).unwrap();
        assert!(not_not.is_identical(&c));
    }

    #[test]
    fn hash_consing() {
        let b = ExprBuilder::new();
        let v = b.new_unconstrained(Sort::Bitv(64), "addr").unwrap();
        let one = b.new_bitv(64, 1);
        let p = b.new_bvadd(v.clone(), one.clone()).unwrap();
        let q = b.new_bvadd(v.clone(), one).unwrap();
        assert!(p.is_identical(&q));
    }

    #[test]
    fn fresh_symbols_are_distinct() {
        let b = ExprBuilder::new();
        let copy = b.clone();
        let x = b.new_unconstrained(Sort::Bitv(8), "mem").unwrap();
        let y = copy.new_unconstrained(Sort::Bitv(8), "mem").unwrap();
        assert!(!x.is_identical(&y));
    }

    #[test]
    fn extract_through_append() {
        let b = ExprBuilder::new();
        let hi = b.new_unconstrained(Sort::Bitv(8), "hi").unwrap();
        let lo = b.new_unconstrained(Sort::Bitv(8), "lo").unwrap();
        let word = b.new_append(hi.clone(), lo.clone()).unwrap();
        assert!(b.new_extract(word.clone(), 15, 8).unwrap().is_identical(&hi));
        assert!(b.new_extract(word.clone(), 7, 0).unwrap().is_identical(&lo));
        let swapped = b.new_reverse_bytes(word).unwrap();
        assert!(b.new_extract(swapped, 15, 8).unwrap().is_identical(&lo));
    }

    #[test]
    fn sort_errors() {
        let b = ExprBuilder::new();
        let x = b.new_bitv(8, 1);
        let y = b.new_bitv(16, 1);
        assert!(matches!(
            b.new_bvadd(x.clone(), y),
            Err(ExprError::SortIntegrity(_, _))
        ));
        assert!(matches!(
            b.new_extract(x.clone(), 8, 0),
            Err(ExprError::InvalidExtract { .. })
        ));
        assert!(matches!(
            b.new_booland(x, b.new_bool(true)),
            Err(ExprError::UnexpectedSort(Sort::Bool, _))
        ));
    }

    #[test]
    fn wide_values_stay_symbolic() {
        let b = ExprBuilder::new();
        let x = b.new_const(Sort::Bitv(128), u128::MAX);
        let wide = b.new_append(x.clone(), b.new_bitv(8, 0)).unwrap();
        assert_eq!(wide.get_size(), 136);
        assert!(wide.is_symbolized());
        assert_eq!(b.new_extract(wide, 7, 0).unwrap().as_u64(), Some(0));
    }
}
