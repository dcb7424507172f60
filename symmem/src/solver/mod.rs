//! Constraint solving over expressions.

mod convert;
mod z3;

pub use self::convert::{ConvertToSymExp, Translator};
pub use self::z3::Z3Solver;

use crate::error::Result;
use crate::expr::PureRef;

pub trait Solver: Clone + std::fmt::Debug {
    /// Add a boolean constraint to the path condition.
    fn assert(&mut self, constraint: PureRef) -> Result<()>;

    fn constraints(&self) -> &[PureRef];

    /// Whether the path condition together with `extra` has a model.
    fn is_satisfiable(&self, extra: &[PureRef]) -> Result<bool>;

    /// Up to `n` distinct values of `target`, sorted ascending.
    /// Fails with `Unsat` when the path condition has no model.
    fn evaluate(&self, target: &PureRef, n: usize) -> Result<Vec<u64>>;

    fn get_min(&self, target: &PureRef) -> Result<u64>;

    fn get_max(&self, target: &PureRef) -> Result<u64>;

    fn get_range(&self, target: &PureRef) -> Result<(u64, u64)> {
        if let Some(val) = target.as_u64() {
            return Ok((val, val));
        }
        Ok((self.get_min(target)?, self.get_max(target)?))
    }

    /// The single value `target` can take, if there is exactly one.
    fn get_unique(&self, target: &PureRef) -> Result<Option<u64>> {
        let vals = self.evaluate(target, 2)?;
        Ok(if vals.len() == 1 { Some(vals[0]) } else { None })
    }
}
