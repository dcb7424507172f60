use crate::error::{Error, Result};
use crate::expr::{ExprBuilder, PureRef};
use crate::memory::{Memory, MemoryAccess, MemoryConfig, RegisterFile};
use crate::solver::Solver;
use log::debug;
use std::collections::HashSet;

/// Memory, registers and path condition of one execution path.
#[derive(Clone, Debug)]
pub struct State<S: Solver> {
    solver: S,
    builder: ExprBuilder,
    memory: Memory,
    registers: Memory,
}

impl<S: Solver> State<S> {
    pub fn new(solver: S, builder: ExprBuilder, memory: Memory, registers: Memory) -> Self {
        State {
            solver,
            builder,
            memory,
            registers,
        }
    }

    /// Empty memory and an x86-64 register file.
    pub fn x86_64(solver: S, config: MemoryConfig) -> Result<Self> {
        let memory = Memory::new(config.clone())?;
        let registers = Memory::registers(config, RegisterFile::x86_64()?)?;
        Ok(Self::new(solver, ExprBuilder::new(), memory, registers))
    }

    pub fn memory(&mut self) -> MemoryAccess<'_, S> {
        MemoryAccess::new(&mut self.memory, &mut self.solver, &self.builder)
    }

    pub fn registers(&mut self) -> MemoryAccess<'_, S> {
        MemoryAccess::new(&mut self.registers, &mut self.solver, &self.builder)
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn builder(&self) -> &ExprBuilder {
        &self.builder
    }

    /// Fork this path. Memory is shared with the copy until written.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Join the paths `others` into this one. `conditions` holds the branch
    /// condition of `self` followed by those of `others`. The joined path
    /// condition is the one of `ancestor` plus the disjunction, over the
    /// branches, of each condition and the constraints its branch added
    /// since the fork.
    pub fn merge(&mut self, others: &[&Self], conditions: &[PureRef], ancestor: &Self) -> Result<usize> {
        if conditions.is_empty() {
            return Err(Error::InvalidArguments("no branch condition".to_owned()));
        }
        let memories: Vec<&Memory> = others.iter().map(|s| &s.memory).collect();
        let registers: Vec<&Memory> = others.iter().map(|s| &s.registers).collect();
        let count = self
            .memory
            .merge(&memories, conditions, &ancestor.memory, &self.builder)?
            + self
                .registers
                .merge(&registers, conditions, &ancestor.registers, &self.builder)?;

        let mut any = self.path_since(ancestor, &conditions[0])?;
        for (other, condition) in others.iter().zip(&conditions[1..]) {
            let path = other.path_since(ancestor, condition)?;
            any = self.builder.new_boolor(any, path)?;
        }
        self.solver = ancestor.solver.clone();
        self.solver.assert(any)?;
        debug!("merged {} states", others.len() + 1);
        Ok(count)
    }

    /// `condition` and every constraint this path gained after forking from
    /// `ancestor`.
    fn path_since(&self, ancestor: &Self, condition: &PureRef) -> Result<PureRef> {
        let known: HashSet<u64> = ancestor
            .solver
            .constraints()
            .iter()
            .map(|c| c.get_hash())
            .collect();
        let mut path = condition.clone();
        for constraint in self.solver.constraints() {
            if !known.contains(&constraint.get_hash()) {
                path = self.builder.new_booland(path, constraint.clone())?;
            }
        }
        Ok(path)
    }
}
