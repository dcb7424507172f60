use crate::error::{Error, Result};
use crate::expr::{PureCode, PureRef, Sort};
use std::collections::HashMap;
use z3::ast::{Ast, Bool, Dynamic, BV};

pub trait ConvertToSymExp {
    type Any;
    type Bool;
    type Bitv;
    fn convert(&mut self, op: &PureRef) -> Result<Self::Any>;
    fn convert_bool(&mut self, op: &PureRef) -> Result<Self::Bool>;
    fn convert_bitv(&mut self, op: &PureRef) -> Result<Self::Bitv>;
}

/// Translates expressions into z3 terms of one context. Shared subterms are
/// translated once.
pub struct Translator<'ctx> {
    ctx: &'ctx z3::Context,
    memo: HashMap<u64, Dynamic<'ctx>>,
}

impl<'ctx> Translator<'ctx> {
    pub fn new(ctx: &'ctx z3::Context) -> Self {
        Translator {
            ctx,
            memo: HashMap::new(),
        }
    }

    fn const_bv(&self, val: u128, size: u32) -> BV<'ctx> {
        if size <= 64 {
            BV::from_u64(self.ctx, val as u64, size)
        } else {
            let low = BV::from_u64(self.ctx, val as u64, 64);
            let high = self.const_bv(val >> 64, size - 64);
            high.concat(&low)
        }
    }

    fn translate(&mut self, op: &PureRef) -> Result<Dynamic<'ctx>> {
        let ctx = self.ctx;
        let size: u32 = op
            .get_size()
            .try_into()
            .map_err(|_| Error::Solver(format!("{}-bit vector is too wide.", op.get_size())))?;

        match op.get_code() {
            PureCode::Var(id) => match op.get_sort() {
                Sort::Bool => Ok(Bool::new_const(ctx, id.get_uniq_name()).into()),
                Sort::Bitv(_) => Ok(BV::new_const(ctx, id.get_uniq_name(), size).into()),
            },
            PureCode::Ite => {
                let condition = self.convert_bool(&op.get_arg(0))?;
                let then = self.convert(&op.get_arg(1))?;
                let else_ = self.convert(&op.get_arg(2))?;
                Ok(condition.ite(&then, &else_))
            }
            PureCode::Bool => Ok(Bool::from_bool(ctx, op.evaluate_bool()).into()),
            PureCode::BoolInv => {
                let x = self.convert_bool(&op.get_arg(0))?;
                Ok(x.not().into())
            }
            PureCode::BoolAnd => {
                let x = self.convert_bool(&op.get_arg(0))?;
                let y = self.convert_bool(&op.get_arg(1))?;
                Ok(Bool::and(ctx, &[&x, &y]).into())
            }
            PureCode::BoolOr => {
                let x = self.convert_bool(&op.get_arg(0))?;
                let y = self.convert_bool(&op.get_arg(1))?;
                Ok(Bool::or(ctx, &[&x, &y]).into())
            }
            PureCode::Bitv => Ok(self.const_bv(op.evaluate(), size).into()),
            PureCode::Add => {
                let x = self.convert_bitv(&op.get_arg(0))?;
                let y = self.convert_bitv(&op.get_arg(1))?;
                Ok(x.bvadd(&y).into())
            }
            PureCode::Sub => {
                let x = self.convert_bitv(&op.get_arg(0))?;
                let y = self.convert_bitv(&op.get_arg(1))?;
                Ok(x.bvsub(&y).into())
            }
            PureCode::Equal => {
                let x = self.convert(&op.get_arg(0))?;
                let y = self.convert(&op.get_arg(1))?;
                Ok(x._eq(&y).into())
            }
            PureCode::Ule => {
                let x = self.convert_bitv(&op.get_arg(0))?;
                let y = self.convert_bitv(&op.get_arg(1))?;
                Ok(x.bvule(&y).into())
            }
            PureCode::Ult => {
                let x = self.convert_bitv(&op.get_arg(0))?;
                let y = self.convert_bitv(&op.get_arg(1))?;
                Ok(x.bvult(&y).into())
            }
            PureCode::Cast(signed) => {
                let x = self.convert_bitv(&op.get_arg(0))?;
                let extra = size - x.get_size();
                if *signed {
                    Ok(x.sign_ext(extra).into())
                } else {
                    Ok(x.zero_ext(extra).into())
                }
            }
            PureCode::Append => {
                let high = self.convert_bitv(&op.get_arg(0))?;
                let low = self.convert_bitv(&op.get_arg(1))?;
                Ok(high.concat(&low).into())
            }
            PureCode::Extract(high, low) => {
                let x = self.convert_bitv(&op.get_arg(0))?;
                Ok(x.extract(*high, *low).into())
            }
        }
    }
}

impl<'ctx> ConvertToSymExp for Translator<'ctx> {
    type Any = Dynamic<'ctx>;
    type Bool = Bool<'ctx>;
    type Bitv = BV<'ctx>;

    fn convert(&mut self, op: &PureRef) -> Result<Self::Any> {
        if let Some(ast) = self.memo.get(&op.get_hash()) {
            return Ok(ast.clone());
        }
        let ast = self.translate(op)?;
        self.memo.insert(op.get_hash(), ast.clone());
        Ok(ast)
    }

    fn convert_bool(&mut self, op: &PureRef) -> Result<Self::Bool> {
        self.convert(op)?
            .as_bool()
            .ok_or_else(|| Error::Solver(format!("{} is not a boolean.", op.get_sort())))
    }

    fn convert_bitv(&mut self, op: &PureRef) -> Result<Self::Bitv> {
        self.convert(op)?
            .as_bv()
            .ok_or_else(|| Error::Solver(format!("{} is not a bit-vector.", op.get_sort())))
    }
}
