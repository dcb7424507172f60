//! Hash-consed bit-vector and boolean expressions.

mod ast;
mod builder;
mod error;

pub use ast::*;
pub use builder::ExprBuilder;
pub use error::{ExprError, ExprResult};
