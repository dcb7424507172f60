use super::error::{ExprError, ExprResult};
use std::collections::hash_map::DefaultHasher;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

/// Widest bit-vector whose value is tracked concretely.
pub const MAX_CONCRETE_BITS: usize = 128;

#[derive(Eq, PartialEq, Clone, Copy, Debug, Hash)]
pub enum Sort {
    Bitv(usize),
    Bool,
}

impl Sort {
    pub fn is_bitv(&self) -> bool {
        matches!(self, Sort::Bitv(_))
    }
    pub fn is_bool(&self) -> bool {
        matches!(self, Sort::Bool)
    }
    pub fn get_size(&self) -> usize {
        match self {
            Sort::Bitv(len) => *len,
            Sort::Bool => 1,
        }
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Name of an unconstrained symbol. `id` keeps symbols created from the
/// same name apart.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarId {
    name: String,
    id: u64,
}

impl VarId {
    pub fn new(name: &str, id: u64) -> Self {
        VarId {
            name: name.to_string(),
            id,
        }
    }
    pub fn get_uniq_name(&self) -> String {
        format!("{}_{}", self.name, self.id)
    }
}

impl Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get_uniq_name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PureCode {
    Var(VarId),
    Ite,
    Bool,
    BoolInv,
    BoolAnd,
    BoolOr,
    Bitv,
    Add,
    Sub,
    Equal,
    Ule,
    Ult,
    Cast(bool), // signed
    Append,
    Extract(u32, u32), // (high, low)
}

impl Display for PureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PureCode::Var(id) => write!(f, "Var({})", id),
            PureCode::Extract(high, low) => write!(f, "Extract[{}:{}]", high, low),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// Shared handle to an immutable expression node.
///
/// The hash is computed once from the node's code, sort, value and the hashes
/// of its arguments, so two handles with the same hash denote the same
/// expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PureRef {
    pure: Rc<Pure>,
    hash: u64, // unique per semantics
}

impl Deref for PureRef {
    type Target = Pure;

    fn deref(&self) -> &Self::Target {
        &self.pure
    }
}

impl From<Pure> for PureRef {
    fn from(pure: Pure) -> Self {
        let mut to = Self {
            pure: Rc::new(pure),
            hash: 0,
        };
        let mut hasher = DefaultHasher::new();
        to.hash(&mut hasher);
        to.hash = hasher.finish();
        to
    }
}

impl PureRef {
    pub fn get_hash(&self) -> u64 {
        self.hash
    }
    pub fn is_identical(&self, other: &PureRef) -> bool {
        self.hash == other.hash
    }
}

impl Hash for PureRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pure.code.hash(state);
        for arg in &self.pure.args {
            arg.hash.hash(state);
        }
        self.pure.symbolized.hash(state);
        self.pure.sort.hash(state);
        self.pure.eval.hash(state);
    }
}

impl Display for PureRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get_code() {
            PureCode::Bitv if self.is_concretized() => {
                write!(f, "{:#x}:{}", self.eval, self.get_size())
            }
            PureCode::Bool => write!(f, "{}", self.eval != 0),
            code => {
                write!(f, "({}", code)?;
                for arg in &self.args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Pure {
    code: PureCode,
    args: Vec<PureRef>,
    symbolized: bool,
    sort: Sort,
    eval: u128, // if symbolized, it has 0.
}

impl Pure {
    pub fn new(code: PureCode, args: Vec<PureRef>, symbolized: bool, sort: Sort, eval: u128) -> Self {
        Pure {
            code,
            args,
            symbolized,
            sort,
            eval,
        }
    }
    pub fn evaluate(&self) -> u128 {
        self.eval
    }
    pub fn evaluate_bool(&self) -> bool {
        self.eval != 0
    }
    /// Concrete value of a bit-vector that fits in 64 bits.
    pub fn as_u64(&self) -> Option<u64> {
        if self.is_concretized() && self.is_bitv() && self.get_size() <= 64 {
            Some(self.eval as u64)
        } else {
            None
        }
    }
    pub fn get_code(&self) -> &PureCode {
        &self.code
    }
    pub fn get_sort(&self) -> Sort {
        self.sort
    }
    pub fn get_size(&self) -> usize {
        self.sort.get_size()
    }
    pub fn get_arg(&self, i: usize) -> PureRef {
        self.args[i].clone()
    }
    pub fn is_bitv(&self) -> bool {
        self.sort.is_bitv()
    }
    pub fn is_bool(&self) -> bool {
        self.sort.is_bool()
    }
    pub fn is_symbolized(&self) -> bool {
        self.symbolized
    }
    pub fn is_concretized(&self) -> bool {
        !self.symbolized
    }
    pub fn is_const_true(&self) -> bool {
        self.is_bool() && self.is_concretized() && self.eval != 0
    }
    pub fn is_const_false(&self) -> bool {
        self.is_bool() && self.is_concretized() && self.eval == 0
    }
    pub fn expect_bool(&self) -> ExprResult<()> {
        if self.is_bool() {
            Ok(())
        } else {
            Err(ExprError::UnexpectedSort(Sort::Bool, self.sort))
        }
    }
    pub fn expect_bitv(&self) -> ExprResult<()> {
        if self.is_bitv() {
            Ok(())
        } else {
            Err(ExprError::UnexpectedSort(Sort::Bitv(0), self.sort))
        }
    }
    pub fn expect_same_sort_with(&self, other: &Pure) -> ExprResult<()> {
        if self.sort == other.sort {
            Ok(())
        } else {
            Err(ExprError::SortIntegrity(self.sort, other.sort))
        }
    }
}

/// Mask keeping the low `width` bits. Widths past 128 saturate.
pub fn bitmask(width: usize) -> u128 {
    if width >= MAX_CONCRETE_BITS {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

#[cfg(test)]
mod test {
    use super::{bitmask, Pure, PureCode, PureRef, Sort};

    #[test]
    fn hash_follows_structure() {
        let a: PureRef = Pure::new(PureCode::Bitv, vec![], false, Sort::Bitv(8), 0x41).into();
        let b: PureRef = Pure::new(PureCode::Bitv, vec![], false, Sort::Bitv(8), 0x41).into();
        let c: PureRef = Pure::new(PureCode::Bitv, vec![], false, Sort::Bitv(16), 0x41).into();
        assert!(a.is_identical(&b));
        assert!(!a.is_identical(&c));
        assert_eq!(a.as_u64(), Some(0x41));
    }

    #[test]
    fn masks() {
        assert_eq!(bitmask(1), 1);
        assert_eq!(bitmask(8), 0xff);
        assert_eq!(bitmask(64), u64::MAX as u128);
        assert_eq!(bitmask(128), u128::MAX);
        assert_eq!(bitmask(256), u128::MAX);
    }
}
