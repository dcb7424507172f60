use super::{ConvertToSymExp, Solver, Translator};
use crate::error::{Error, Result};
use crate::expr::PureRef;
use log::trace;
use z3::ast::{Ast, BV};
use z3::SatResult;

/// z3 backed solver. The path condition is kept as expressions and is
/// translated into a fresh z3 solver for every query.
pub struct Z3Solver {
    ctx: z3::Context,
    constraints: Vec<PureRef>,
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Z3Solver {
    fn clone(&self) -> Self {
        Z3Solver {
            ctx: z3::Context::new(&z3::Config::new()),
            constraints: self.constraints.clone(),
        }
    }
}

impl std::fmt::Debug for Z3Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Z3Solver")
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

fn get_interp(val: Option<BV>) -> Result<u64> {
    match val.and_then(|v| v.as_u64()) {
        Some(val) => Ok(val),
        None => Err(Error::Solver("returned invalid model (not concretized).".to_owned())),
    }
}

fn expect_word(target: &PureRef) -> Result<()> {
    target.expect_bitv()?;
    if target.get_size() > 64 {
        return Err(Error::Solver(format!(
            "cannot concretize a {}-bit vector.",
            target.get_size()
        )));
    }
    Ok(())
}

impl Z3Solver {
    pub fn new() -> Self {
        Z3Solver {
            ctx: z3::Context::new(&z3::Config::new()),
            constraints: Vec::new(),
        }
    }

    fn new_solver<'ctx>(
        &'ctx self,
        translator: &mut Translator<'ctx>,
        extra: &[PureRef],
    ) -> Result<z3::Solver<'ctx>> {
        let solver = z3::Solver::new(&self.ctx);
        for op in self.constraints.iter().chain(extra) {
            solver.assert(&translator.convert_bool(op)?);
        }
        Ok(solver)
    }

    fn optimize(&self, target: &PureRef, maximize: bool) -> Result<u64> {
        if let Some(val) = target.as_u64() {
            return Ok(val);
        }
        expect_word(target)?;
        let mut translator = Translator::new(&self.ctx);
        let opt = z3::Optimize::new(&self.ctx);
        for op in &self.constraints {
            opt.assert(&translator.convert_bool(op)?);
        }
        let ast = translator.convert_bitv(target)?;
        if maximize {
            opt.maximize(&ast);
        } else {
            opt.minimize(&ast);
        }
        match opt.check(&[]) {
            SatResult::Sat => match opt.get_model() {
                Some(model) => get_interp(model.eval(&ast, true)),
                None => Err(Error::Solver("returned no model.".to_owned())),
            },
            SatResult::Unsat => Err(Error::Unsat),
            SatResult::Unknown => Err(Error::Solver("optimization gave up.".to_owned())),
        }
    }
}

impl Solver for Z3Solver {
    fn assert(&mut self, constraint: PureRef) -> Result<()> {
        constraint.expect_bool()?;
        if !constraint.is_const_true() {
            self.constraints.push(constraint);
        }
        Ok(())
    }

    fn constraints(&self) -> &[PureRef] {
        &self.constraints
    }

    fn is_satisfiable(&self, extra: &[PureRef]) -> Result<bool> {
        if extra.iter().any(|op| op.is_const_false()) {
            return Ok(false);
        }
        let mut translator = Translator::new(&self.ctx);
        let solver = self.new_solver(&mut translator, extra)?;
        match solver.check() {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown => Err(Error::Solver("satisfiability is unknown.".to_owned())),
        }
    }

    fn evaluate(&self, target: &PureRef, n: usize) -> Result<Vec<u64>> {
        if let Some(val) = target.as_u64() {
            return Ok(vec![val]);
        }
        expect_word(target)?;
        let mut translator = Translator::new(&self.ctx);
        let solver = self.new_solver(&mut translator, &[])?;
        let ast = translator.convert_bitv(target)?;
        let size = ast.get_size();

        let mut results = Vec::new();
        while results.len() < n {
            match solver.check() {
                SatResult::Sat => {
                    let model = solver
                        .get_model()
                        .ok_or_else(|| Error::Solver("returned no model.".to_owned()))?;
                    let val = get_interp(model.eval(&ast, true))?;
                    results.push(val);
                    // block the value just found
                    solver.assert(&ast._eq(&BV::from_u64(&self.ctx, val, size)).not());
                }
                SatResult::Unsat => break,
                SatResult::Unknown => {
                    return Err(Error::Solver("satisfiability is unknown.".to_owned()))
                }
            }
        }
        trace!("evaluate {} -> {:x?}", target, results);
        if results.is_empty() {
            Err(Error::Unsat)
        } else {
            results.sort_unstable();
            Ok(results)
        }
    }

    fn get_min(&self, target: &PureRef) -> Result<u64> {
        self.optimize(target, false)
    }

    fn get_max(&self, target: &PureRef) -> Result<u64> {
        self.optimize(target, true)
    }
}

#[cfg(test)]
mod test {
    use super::Z3Solver;
    use crate::error::Error;
    use crate::expr::{ExprBuilder, Sort};
    use crate::solver::Solver;

    #[test]
    fn unsat() {
        let b = ExprBuilder::new();
        let mut solver = Z3Solver::new();
        let x = b.new_unconstrained(Sort::Bitv(64), "x").unwrap();
        let one = b.new_bitv(64, 1);
        let two = b.new_bitv(64, 2);
        solver.assert(b.new_eq(x.clone(), one).unwrap()).unwrap();
        assert!(solver.is_satisfiable(&[]).unwrap());
        let eq_two = b.new_eq(x.clone(), two).unwrap();
        assert!(!solver.is_satisfiable(&[eq_two.clone()]).unwrap());
        solver.assert(eq_two).unwrap();
        assert!(matches!(solver.evaluate(&x, 1), Err(Error::Unsat)));
    }

    #[test]
    fn evaluate_and_range() {
        let b = ExprBuilder::new();
        let mut solver = Z3Solver::new();
        let x = b.new_unconstrained(Sort::Bitv(64), "x").unwrap();
        let lo = b.new_bitv(64, 0x1000);
        let hi = b.new_bitv(64, 0x1003);
        solver.assert(b.new_ule(lo, x.clone()).unwrap()).unwrap();
        solver.assert(b.new_ule(x.clone(), hi).unwrap()).unwrap();

        assert_eq!(solver.evaluate(&x, 10).unwrap(), vec![0x1000, 0x1001, 0x1002, 0x1003]);
        assert_eq!(solver.get_range(&x).unwrap(), (0x1000, 0x1003));
        assert_eq!(solver.get_unique(&x).unwrap(), None);

        let y = b.new_bvadd(x.clone(), b.new_bitv(64, 1)).unwrap();
        solver.assert(b.new_eq(y.clone(), b.new_bitv(64, 0x1002)).unwrap()).unwrap();
        assert_eq!(solver.get_unique(&x).unwrap(), Some(0x1001));
    }

    #[test]
    fn wide_constants() {
        let b = ExprBuilder::new();
        let mut solver = Z3Solver::new();
        let x = b.new_unconstrained(Sort::Bitv(128), "x").unwrap();
        let c = b.new_const(Sort::Bitv(128), 0x1122_3344_5566_7788_99aa_bbcc_ddee_ff00);
        solver.assert(b.new_eq(x.clone(), c).unwrap()).unwrap();
        let top = b.new_extract(x.clone(), 127, 64).unwrap();
        let bottom = b.new_extract(x, 63, 0).unwrap();
        assert_eq!(solver.get_unique(&top).unwrap(), Some(0x1122_3344_5566_7788));
        assert_eq!(solver.get_unique(&bottom).unwrap(), Some(0x99aa_bbcc_ddee_ff00));
    }

    #[test]
    fn clone_keeps_constraints() {
        let b = ExprBuilder::new();
        let mut solver = Z3Solver::new();
        let x = b.new_unconstrained(Sort::Bitv(8), "x").unwrap();
        solver.assert(b.new_eq(x.clone(), b.new_bitv(8, 7)).unwrap()).unwrap();
        let copy = solver.clone();
        assert_eq!(copy.constraints().len(), 1);
        assert_eq!(copy.get_unique(&x).unwrap(), Some(7));
    }
}
