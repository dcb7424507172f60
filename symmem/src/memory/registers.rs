use crate::error::{Error, Result};
use crate::map::{Interval, IntervalMap};
use std::collections::HashMap;

/// A named window of the register file: `size` bytes at byte `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegSpec {
    name: String,
    offset: u64,
    size: usize,
}

impl RegSpec {
    pub fn get_name(&self) -> &str {
        &self.name
    }
    pub fn get_offset(&self) -> u64 {
        self.offset
    }
    pub fn get_size(&self) -> usize {
        self.size
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    specs: HashMap<String, RegSpec>,
}

impl RegisterFile {
    /// Build from (name, offset, size) triples. Registers sharing bytes are
    /// aliases of the widest one among them.
    pub fn new<'a>(regs: impl IntoIterator<Item = (&'a str, u64, usize)>) -> Result<Self> {
        let regs: Vec<_> = regs.into_iter().collect();
        let mut largest_regs = IntervalMap::new();
        let mut by_size = regs.clone();
        by_size.sort_by(|a, b| b.2.cmp(&a.2).then(a.1.cmp(&b.1)));
        for (name, offset, size) in &by_size {
            if *size == 0 {
                return Err(Error::InvalidArguments(format!("register {} has no bytes", name)));
            }
            let range = *offset..*offset + *size as u64;
            if largest_regs.overlapping(range.clone()).next().is_none() {
                largest_regs.insert(range, *name);
            }
        }

        let mut specs = HashMap::new();
        for (name, offset, size) in regs {
            let range = Interval::new(offset..offset + size as u64);
            let aliased = largest_regs
                .overlapping(range.clone().into_range())
                .any(|(_, k, _)| Interval::new(k.clone()).covers(&range));
            if !aliased {
                return Err(Error::InvalidArguments(format!(
                    "register {} straddles two registers",
                    name
                )));
            }
            let spec = RegSpec {
                name: name.to_string(),
                offset,
                size,
            };
            if specs.insert(name.to_string(), spec).is_some() {
                return Err(Error::InvalidArguments(format!("register {} defined twice", name)));
            }
        }
        Ok(RegisterFile { specs })
    }

    /// General purpose registers of x86-64, with the legacy sub-registers of
    /// rax, rbx, rcx and rdx.
    pub fn x86_64() -> Result<Self> {
        const GPRS: [&str; 17] = [
            "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15", "rip",
        ];
        const LEGACY: [[&str; 4]; 4] = [
            ["eax", "ax", "al", "ah"],
            ["ebx", "bx", "bl", "bh"],
            ["ecx", "cx", "cl", "ch"],
            ["edx", "dx", "dl", "dh"],
        ];
        let mut regs = Vec::new();
        for (i, name) in GPRS.iter().enumerate() {
            regs.push((*name, i as u64 * 8, 8));
        }
        for (i, [r32, r16, r8l, r8h]) in LEGACY.iter().enumerate() {
            let offset = i as u64 * 8;
            regs.push((*r32, offset, 4));
            regs.push((*r16, offset, 2));
            regs.push((*r8l, offset, 1));
            regs.push((*r8h, offset + 1, 1));
        }
        Self::new(regs)
    }

    pub fn get(&self, name: &str) -> Result<&RegSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| Error::UnknownRegister(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
