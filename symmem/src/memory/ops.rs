use super::{
    AccessKind, Address, Endian, ItemValue, Memory, MemoryItem, MemoryKind, MemoryOptions,
    Permissions, Slot,
};
use crate::error::{Error, Result};
use crate::expr::{ExprBuilder, PureRef, Sort};
use crate::solver::Solver;
use log::{debug, trace, warn};
use std::rc::Rc;

/// Where an access goes.
#[derive(Clone, Debug)]
pub enum Location {
    Concrete(u64),
    Symbolic(PureRef),
    Register(String),
}

impl From<u64> for Location {
    fn from(addr: u64) -> Self {
        Location::Concrete(addr)
    }
}

impl From<PureRef> for Location {
    fn from(addr: PureRef) -> Self {
        Location::Symbolic(addr)
    }
}

impl From<&PureRef> for Location {
    fn from(addr: &PureRef) -> Self {
        Location::Symbolic(addr.clone())
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Location::Register(name.to_string())
    }
}

pub trait MemoryOps {
    /// Read `size` bytes in the configured byte order.
    fn load(&mut self, location: impl Into<Location>, size: usize) -> Result<PureRef> {
        self.load_with(location, Some(SizeArg::Concrete(size as u64)), None, None)
    }

    /// Read a value. `size` defaults to the register width, `endian` to the
    /// configured byte order. With a `(condition, fallback)` guard the result
    /// is `fallback` wherever `condition` does not hold.
    fn load_with(
        &mut self,
        location: impl Into<Location>,
        size: Option<SizeArg>,
        endian: Option<Endian>,
        guard: Option<(PureRef, PureRef)>,
    ) -> Result<PureRef>;

    /// Write all bytes of `data` in the configured byte order.
    fn store(&mut self, location: impl Into<Location>, data: PureRef) -> Result<()> {
        self.store_with(location, data, None, None, None)
    }

    /// Write a value. A symbolic `size` writes its maximum number of bytes,
    /// with the bytes past its minimum guarded by the actual size. A
    /// `condition` guards the whole write.
    fn store_with(
        &mut self,
        location: impl Into<Location>,
        data: PureRef,
        size: Option<SizeArg>,
        endian: Option<Endian>,
        condition: Option<PureRef>,
    ) -> Result<()>;

    fn map_region(&mut self, location: impl Into<Location>, length: u64, perms: Permissions) -> Result<()>;

    fn unmap_region(&mut self, location: impl Into<Location>, length: u64) -> Result<()>;

    /// Permissions at an address, `None` when nothing is mapped there.
    fn permissions(&mut self, location: impl Into<Location>) -> Result<Option<Permissions>>;
}

/// Byte count of an access.
#[derive(Clone, Debug)]
pub enum SizeArg {
    Concrete(u64),
    Symbolic(PureRef),
}

impl From<u64> for SizeArg {
    fn from(size: u64) -> Self {
        SizeArg::Concrete(size)
    }
}

impl From<PureRef> for SizeArg {
    fn from(size: PureRef) -> Self {
        SizeArg::Symbolic(size)
    }
}

struct Resolved {
    addr: Address,
    min: u64,
    max: u64,
    register_size: Option<usize>,
}

enum StoreSize {
    Fixed(usize),
    Window { min: usize, max: usize, size: PureRef },
}

impl StoreSize {
    fn max(&self) -> usize {
        match self {
            StoreSize::Fixed(n) => *n,
            StoreSize::Window { max, .. } => *max,
        }
    }
}

/// A memory model paired with the solver and expression builder of its state.
pub struct MemoryAccess<'a, S: Solver> {
    memory: &'a mut Memory,
    solver: &'a mut S,
    builder: &'a ExprBuilder,
}

impl<'a, S: Solver> MemoryAccess<'a, S> {
    pub fn new(memory: &'a mut Memory, solver: &'a mut S, builder: &'a ExprBuilder) -> Self {
        MemoryAccess {
            memory,
            solver,
            builder,
        }
    }

    pub fn memory(&self) -> &Memory {
        self.memory
    }

    fn addr_bits(&self) -> usize {
        self.memory.config.addr_bits
    }

    fn resolve(&self, location: Location) -> Result<Resolved> {
        let concrete = |addr: u64, register_size| Resolved {
            addr: Address::Concrete(addr),
            min: addr,
            max: addr,
            register_size,
        };
        match location {
            Location::Register(name) => {
                if self.memory.kind != MemoryKind::Registers {
                    return Err(Error::InvalidArguments(format!(
                        "register {} accessed outside a register file",
                        name
                    )));
                }
                let spec = self.memory.register_file()?.get(&name)?;
                Ok(concrete(spec.get_offset(), Some(spec.get_size())))
            }
            Location::Concrete(addr) => Ok(concrete(addr, None)),
            Location::Symbolic(expr) => {
                expr.expect_bitv()?;
                if expr.get_size() > self.addr_bits() {
                    return Err(Error::InvalidArguments(format!(
                        "{}-bit address in a {}-bit address space",
                        expr.get_size(),
                        self.addr_bits()
                    )));
                }
                let expr = self.builder.new_cast(expr, self.addr_bits(), false)?;
                if let Some(addr) = expr.as_u64() {
                    return Ok(concrete(addr, None));
                }
                if self.memory.kind == MemoryKind::Registers {
                    return Err(Error::InvalidArguments(
                        "symbolic register offsets are not supported".to_owned(),
                    ));
                }
                let (min, max) = self.solver.get_range(&expr)?;
                if min == max {
                    return Ok(concrete(min, None));
                }
                Ok(Resolved {
                    addr: Address::Symbolic(expr),
                    min,
                    max,
                    register_size: None,
                })
            }
        }
    }

    /// Single concrete address of a location.
    fn resolve_unique(&self, location: Location) -> Result<u64> {
        let at = self.resolve(location)?;
        match at.addr {
            Address::Concrete(addr) => Ok(addr),
            Address::Symbolic(_) => Err(Error::InvalidArguments(format!(
                "address ranges over {:#x}..={:#x}",
                at.min, at.max
            ))),
        }
    }

    fn check_concrete_size(&self, n: u64) -> Result<usize> {
        if n == 0 {
            return Err(Error::InvalidArguments("zero-sized access".to_owned()));
        }
        let limit = self.memory.config.max_concrete_size;
        if n > limit {
            return Err(Error::SizeLimit { size: n, limit });
        }
        Ok(n as usize)
    }

    fn check_register_size(&self, at: &Resolved, n: usize) -> Result<()> {
        match at.register_size {
            Some(width) if width != n => Err(Error::InvalidArguments(format!(
                "{}-byte access to a {}-byte register",
                n, width
            ))),
            _ => Ok(()),
        }
    }

    fn load_size(&self, size: Option<SizeArg>, at: &Resolved) -> Result<usize> {
        let n = match size {
            Some(SizeArg::Concrete(n)) => n,
            Some(SizeArg::Symbolic(size)) => {
                size.expect_bitv()?;
                match size.as_u64() {
                    Some(n) => n,
                    None => match self.solver.get_unique(&size)? {
                        Some(n) => n,
                        None => return Err(Error::UnsupportedSymbolicSize),
                    },
                }
            }
            None => match at.register_size {
                Some(n) => n as u64,
                None => return Err(Error::InvalidArguments("load size is required".to_owned())),
            },
        };
        self.check_concrete_size(n)
    }

    fn store_size(&mut self, size: Option<SizeArg>, data: &PureRef) -> Result<StoreSize> {
        let size = match size {
            None => {
                data.expect_bitv()?;
                if data.get_size() % 8 != 0 {
                    return Err(Error::InvalidArguments(format!(
                        "{}-bit data is not made of whole bytes",
                        data.get_size()
                    )));
                }
                return Ok(StoreSize::Fixed(self.check_concrete_size(data.get_size() as u64 / 8)?));
            }
            Some(SizeArg::Concrete(n)) => return Ok(StoreSize::Fixed(self.check_concrete_size(n)?)),
            Some(SizeArg::Symbolic(size)) => size,
        };
        size.expect_bitv()?;
        if let Some(n) = size.as_u64() {
            return Ok(StoreSize::Fixed(self.check_concrete_size(n)?));
        }
        let (min, max) = self.solver.get_range(&size)?;
        if min == max {
            return Ok(StoreSize::Fixed(self.check_concrete_size(min)?));
        }
        let limit = self.memory.config.max_symbolic_size;
        if max > limit {
            return Err(Error::SizeLimit { size: max, limit });
        }
        warn!("symbolic store size bounded to {:#x}..={:#x}", min, max);
        let bound = self.builder.new_const(size.get_sort(), max as u128);
        self.solver.assert(self.builder.new_ule(size.clone(), bound)?)?;
        Ok(StoreSize::Window {
            min: min as usize,
            max: max as usize,
            size,
        })
    }

    fn checks_permissions(&self) -> bool {
        self.memory.kind == MemoryKind::Memory
            && self.memory.config.options.contains(MemoryOptions::CHECK_PERMISSIONS)
    }

    /// Fail if some solution of the address puts one of the `size` accessed
    /// bytes outside the regions permitting `kind`.
    fn check_access(&self, at: &Resolved, size: usize, kind: AccessKind) -> Result<()> {
        let span = size as u64 - 1;
        let hi = at.max.saturating_add(span);
        let bits = self.addr_bits();
        let result = self.memory.regions.check_access(at.min, hi, kind, |lo, hi| match &at.addr {
            Address::Concrete(addr) => Ok(*addr <= hi && lo <= addr.saturating_add(span)),
            Address::Symbolic(expr) => {
                let lo = self.builder.new_const(Sort::Bitv(bits), lo.saturating_sub(span) as u128);
                let hi = self.builder.new_const(Sort::Bitv(bits), hi as u128);
                let above = self.builder.new_ule(lo, expr.clone())?;
                let below = self.builder.new_ule(expr.clone(), hi)?;
                self.solver.is_satisfiable(&[above, below])
            }
        });
        if let (Err(Error::InvalidAccess { addr, .. }), Some(metrics)) = (&result, self.memory.metrics()) {
            metrics.on_fault(*addr);
        }
        result
    }

    /// Placeholder for a byte nobody wrote. Process memory remembers it as
    /// an implicit write so that later reads agree with this one.
    fn bottom(&mut self, addr: &Address, lo: u64, hi: u64) -> Result<PureRef> {
        if self.memory.config.options.contains(MemoryOptions::ZERO_FILL_UNCONSTRAINED) {
            return Ok(self.builder.new_const(Sort::Bitv(8), 0));
        }
        let prefix = match self.memory.kind {
            MemoryKind::Memory => "mem",
            MemoryKind::Registers => "reg",
        };
        let name = match addr.as_concrete() {
            Some(addr) => format!("{}_{:x}", prefix, addr),
            None => prefix.to_string(),
        };
        let bottom = self.builder.new_unconstrained(Sort::Bitv(8), &name)?;
        if self.memory.kind == MemoryKind::Memory {
            let t = self.memory.next_implicit();
            let item = MemoryItem::new(addr.clone(), ItemValue::Expr(bottom.clone()), t, None);
            Rc::make_mut(&mut self.memory.symbolic).insert(lo..hi.saturating_add(1), item);
        }
        Ok(bottom)
    }

    /// `ite(addr matches cases, value, otherwise)`. Several cases stand for a
    /// run of consecutive concrete addresses sharing one value.
    fn build_ite(
        &self,
        addr: &PureRef,
        cases: &[&MemoryItem],
        value: PureRef,
        otherwise: PureRef,
    ) -> Result<PureRef> {
        let b = self.builder;
        let bits = self.addr_bits();
        let (first, last) = match (cases.first(), cases.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Ok(otherwise),
        };
        let matches = if cases.len() == 1 {
            b.new_eq(addr.clone(), first.addr.to_expr(b, bits))?
        } else {
            let above = b.new_ule(first.addr.to_expr(b, bits), addr.clone())?;
            let below = b.new_ule(addr.clone(), last.addr.to_expr(b, bits))?;
            b.new_booland(above, below)?
        };
        let cond = match &first.guard {
            Some(guard) => b.new_booland(matches, guard.clone())?,
            None => matches,
        };
        if let Some(metrics) = self.memory.metrics() {
            metrics.on_ite();
        }
        Ok(b.new_ite(cond, value, otherwise)?)
    }

    /// Fold `candidates`, oldest first, on top of `bottom`.
    fn build_merged_ite(
        &self,
        addr: &Address,
        candidates: &[MemoryItem],
        bottom: PureRef,
    ) -> Result<PureRef> {
        let addr = addr.to_expr(self.builder, self.addr_bits());
        let mut obj = bottom;
        let mut run: Vec<&MemoryItem> = Vec::new();
        let mut run_value: Option<PureRef> = None;
        for item in candidates {
            let value = item.value.resolve(self.builder)?;
            let extends_run = match (run.last(), &run_value) {
                (Some(prev), Some(prev_value)) => {
                    item.is_unguarded_concrete()
                        && prev.addr.as_concrete().map(|a| a.wrapping_add(1)) == item.addr.as_concrete()
                        && prev_value.is_identical(&value)
                }
                _ => false,
            };
            if extends_run {
                run.push(item);
                continue;
            }
            if let Some(prev_value) = run_value.take() {
                obj = self.build_ite(&addr, &run, prev_value, obj)?;
                run.clear();
            }
            if item.is_unguarded_concrete() {
                run.push(item);
                run_value = Some(value);
            } else {
                obj = self.build_ite(&addr, &[item], value, obj)?;
            }
        }
        if let Some(prev_value) = run_value {
            obj = self.build_ite(&addr, &run, prev_value, obj)?;
        }
        Ok(obj)
    }

    fn load_byte(&mut self, at: &Resolved, k: u64) -> Result<PureRef> {
        let addr = at.addr.offset(self.builder, k)?;
        let lo = at.min.saturating_add(k);
        let hi = at.max.saturating_add(k);

        let mut candidates: Vec<MemoryItem> = self
            .memory
            .concrete
            .find(lo, hi)
            .flat_map(|(_, slot)| slot.items().iter().cloned())
            .collect();
        candidates.extend(
            self.memory
                .symbolic
                .overlapping(lo..hi.saturating_add(1))
                .map(|(_, _, item)| item.clone()),
        );
        candidates.sort_by_key(|item| (item.timestamp, item.addr.as_concrete().unwrap_or(0)));

        // the newest unguarded write to this very address hides every older one
        let shadowing = candidates
            .iter()
            .rposition(|item| item.guard.is_none() && item.addr.is_identical(&addr));
        let (base, newer) = match shadowing {
            Some(i) => (candidates[i].value.resolve(self.builder)?, &candidates[i + 1..]),
            None => (self.bottom(&addr, lo, hi)?, &candidates[..]),
        };
        trace!("byte {:#x}..={:#x}: {} candidates", lo, hi, newer.len());
        self.build_merged_ite(&addr, newer, base)
    }

    fn write_byte(&mut self, at: &Resolved, k: u64, item: MemoryItem) {
        match &item.addr {
            Address::Concrete(addr) => {
                let addr = *addr;
                let guarded = item.guard.is_some();
                match self.memory.concrete.get_mut(addr) {
                    // keep older candidates while any of them is conditional
                    Some(slot) if guarded || slot.items().iter().any(|i| i.guard.is_some()) => {
                        slot.push_front(item)
                    }
                    _ => {
                        self.memory.concrete.insert(addr, Slot::Single(item));
                    }
                }
            }
            Address::Symbolic(_) => {
                let lo = at.min.saturating_add(k);
                let hi = at.max.saturating_add(k).saturating_add(1);
                Rc::make_mut(&mut self.memory.symbolic).insert(lo..hi, item);
            }
        }
    }
}

impl<'a, S: Solver> MemoryOps for MemoryAccess<'a, S> {
    fn load_with(
        &mut self,
        location: impl Into<Location>,
        size: Option<SizeArg>,
        endian: Option<Endian>,
        guard: Option<(PureRef, PureRef)>,
    ) -> Result<PureRef> {
        if let Some((condition, fallback)) = &guard {
            condition.expect_bool()?;
            if condition.is_const_false() {
                return Ok(fallback.clone());
            }
        }
        let at = self.resolve(location.into())?;
        let n = self.load_size(size, &at)?;
        self.check_register_size(&at, n)?;
        if self.checks_permissions() {
            self.check_access(&at, n, AccessKind::Read)?;
        }
        self.memory.load_init_data(at.min, at.max.saturating_add(n as u64 - 1));

        let mut data = self.load_byte(&at, 0)?;
        for k in 1..n as u64 {
            let byte = self.load_byte(&at, k)?;
            data = self.builder.new_append(data, byte)?;
        }
        if endian.unwrap_or(self.memory.config.endian) == Endian::Little {
            data = self.builder.new_reverse_bytes(data)?;
        }
        if let Some((condition, fallback)) = guard {
            data = self.builder.new_ite(condition, data, fallback)?;
        }
        if let Some(metrics) = self.memory.metrics() {
            metrics.on_load(n);
        }
        trace!("load {:#x}..={:#x} x{} -> {}", at.min, at.max, n, data);
        Ok(data)
    }

    fn store_with(
        &mut self,
        location: impl Into<Location>,
        data: PureRef,
        size: Option<SizeArg>,
        endian: Option<Endian>,
        condition: Option<PureRef>,
    ) -> Result<()> {
        let condition = match condition {
            Some(condition) => {
                condition.expect_bool()?;
                if condition.is_const_false() {
                    return Ok(());
                }
                Some(condition).filter(|c| !c.is_const_true())
            }
            None => None,
        };
        data.expect_bitv()?;
        let at = self.resolve(location.into())?;
        let size = self.store_size(size, &data)?;
        let n_max = size.max();
        self.check_register_size(&at, n_max)?;

        let mut data = self.builder.new_cast(data, n_max * 8, false)?;
        if endian.unwrap_or(self.memory.config.endian) == Endian::Little {
            data = self.builder.new_reverse_bytes(data)?;
        }
        if self.checks_permissions() {
            self.check_access(&at, n_max, AccessKind::Write)?;
        }

        let t = self.memory.next_timestamp();
        for k in 0..n_max {
            let value = if n_max == 1 {
                ItemValue::Expr(data.clone())
            } else {
                ItemValue::Slice {
                    data: data.clone(),
                    byte: k as u32,
                }
            };
            let guard = match &size {
                StoreSize::Window { min, size, .. } if k >= *min => {
                    let k = self.builder.new_const(size.get_sort(), k as u128);
                    let within = self.builder.new_ult(k, size.clone())?;
                    Some(self.builder.and_maybe(condition.clone(), within)?)
                }
                _ => condition.clone(),
            };
            let addr = at.addr.offset(self.builder, k as u64)?;
            self.write_byte(&at, k as u64, MemoryItem::new(addr, value, t, guard));
        }
        if let Some(metrics) = self.memory.metrics() {
            metrics.on_store(n_max);
        }
        trace!("store {:#x}..={:#x} x{} t={}", at.min, at.max, n_max, t);
        Ok(())
    }

    fn map_region(&mut self, location: impl Into<Location>, length: u64, perms: Permissions) -> Result<()> {
        let base = self.resolve_unique(location.into())?;
        self.memory.map_region(base, length, perms)
    }

    fn unmap_region(&mut self, location: impl Into<Location>, length: u64) -> Result<()> {
        let base = self.resolve_unique(location.into())?;
        self.memory.unmap_region(base, length, self.builder)
    }

    fn permissions(&mut self, location: impl Into<Location>) -> Result<Option<Permissions>> {
        let addr = self.resolve_unique(location.into())?;
        debug!("permissions of {:#x}", addr);
        Ok(self.memory.permissions(addr))
    }
}
