//! Symbolic process memory for symbolic execution engines.
//!
//! Every byte is resolved on load by folding all writes that may alias it
//! into an if-then-else chain, ordered by the time they were written.

pub mod error;
pub mod expr;
pub mod map;
pub mod memory;
pub mod solver;
pub mod state;

pub use error::{Error, Result};
pub use expr::{ExprBuilder, PureRef, Sort};
pub use memory::{
    AccessKind, BackingImage, Counters, Endian, Location, Memory, MemoryAccess, MemoryConfig,
    MemoryKind, MemoryOps, MemoryOptions, Metrics, Permissions, RegisterFile, SizeArg,
};
pub use solver::{Solver, Z3Solver};
pub use state::State;
