use crate::expr::ExprError;
use crate::memory::AccessKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The access may touch an unmapped byte or one lacking the needed permission.
    #[error("Invalid {kind} access at {addr:#x}.")]
    InvalidAccess { addr: u64, kind: AccessKind },

    #[error("Symbolic size is not supported for this operation.")]
    UnsupportedSymbolicSize,

    #[error("Access of {size} bytes exceeds the limit of {limit} bytes.")]
    SizeLimit { size: u64, limit: u64 },

    #[error("No region is mapped exactly at {addr:#x} with length {length:#x}.")]
    RegionNotFound { addr: u64, length: u64 },

    #[error("Unknown register {0}.")]
    UnknownRegister(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Expression construction failed: {0}")]
    Expr(#[from] ExprError),

    #[error("Z3 Solver failed: {0}")]
    Solver(String),

    #[error("Unsat")]
    Unsat,
}
