use crate::error::{Error, Result};
use bitflags::bitflags;
use log::debug;
use std::fmt::Display;

bitflags! {
    #[derive(Clone, Debug, PartialEq, Copy, PartialOrd, Ord, Eq, Hash)]
    pub struct Permissions: u8 {
        const READ  = 0b001;
        const WRITE = 0b010;
        const EXEC  = 0b100;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
    Exec,
}

impl AccessKind {
    pub fn required(&self) -> Permissions {
        match self {
            AccessKind::Read => Permissions::READ,
            AccessKind::Write => Permissions::WRITE,
            AccessKind::Exec => Permissions::EXEC,
        }
    }
}

impl Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
            AccessKind::Exec => write!(f, "exec"),
        }
    }
}

/// Bytes `base..base + length` with uniform permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedRegion {
    pub base: u64,
    pub length: u64,
    pub perms: Permissions,
}

impl MappedRegion {
    fn end(&self) -> u128 {
        self.base as u128 + self.length as u128
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.base <= addr && (addr as u128) < self.end()
    }
}

/// Mapped regions ordered by base; regions with the same base keep their
/// mapping order. Regions may overlap, and the first region containing an
/// address decides its permissions.
#[derive(Clone, Debug, Default)]
pub struct RegionTable {
    regions: Vec<MappedRegion>,
}

impl RegionTable {
    pub fn new() -> Self {
        RegionTable {
            regions: Vec::new(),
        }
    }

    pub fn map(&mut self, base: u64, length: u64, perms: Permissions) -> Result<()> {
        if length == 0 {
            return Err(Error::InvalidArguments("empty region".to_owned()));
        }
        if base as u128 + length as u128 > 1u128 << 64 {
            return Err(Error::InvalidArguments(format!(
                "region {:#x}+{:#x} wraps around the address space",
                base, length
            )));
        }
        let at = self.regions.partition_point(|r| r.base <= base);
        self.regions.insert(at, MappedRegion { base, length, perms });
        debug!("mapped {:#x}..{:#x} {:?}", base, base as u128 + length as u128, perms);
        Ok(())
    }

    /// Remove the region mapped exactly at `base` with `length`.
    pub fn unmap(&mut self, base: u64, length: u64) -> Result<MappedRegion> {
        let at = self
            .position(base, length)
            .ok_or(Error::RegionNotFound { addr: base, length })?;
        Ok(self.regions.remove(at))
    }

    pub fn position(&self, base: u64, length: u64) -> Option<usize> {
        self.regions
            .iter()
            .position(|r| r.base == base && r.length == length)
    }

    pub fn permissions(&self, addr: u64) -> Option<Permissions> {
        self.regions
            .iter()
            .take_while(|r| r.base <= addr)
            .find(|r| r.contains(addr))
            .map(|r| r.perms)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedRegion> {
        self.regions.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Walk the bytes `lo..=hi` an access may touch and fail on the first
    /// unmapped or insufficiently permitted range the access can reach.
    /// `reachable(a, b)` tells whether the access can touch any of `a..=b`.
    pub fn check_access(
        &self,
        lo: u64,
        hi: u64,
        kind: AccessKind,
        mut reachable: impl FnMut(u64, u64) -> Result<bool>,
    ) -> Result<()> {
        let fault = |addr: u128| Error::InvalidAccess {
            addr: addr as u64,
            kind,
        };
        let hi = hi as u128;
        let mut next = lo as u128; // first byte not yet checked
        for r in &self.regions {
            let (base, end) = (r.base as u128, r.end());
            if hi < base || next > hi {
                break;
            }
            if next >= end {
                continue;
            }
            if next < base && reachable(next as u64, (base - 1) as u64)? {
                return Err(fault(next));
            }
            let from = next.max(base);
            let upper = hi.min(end - 1);
            if from <= upper
                && !r.perms.contains(kind.required())
                && reachable(from as u64, upper as u64)?
            {
                return Err(fault(from));
            }
            next = upper + 1;
        }
        if next <= hi && reachable(next as u64, hi as u64)? {
            return Err(fault(next));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{AccessKind, Permissions, RegionTable};
    use crate::error::Error;

    fn concrete(lo: u64, hi: u64) -> impl FnMut(u64, u64) -> crate::error::Result<bool> {
        move |a, b| Ok(a <= hi && lo <= b)
    }

    #[test]
    fn map_and_unmap() {
        let mut table = RegionTable::new();
        table.map(0x2000, 0x1000, Permissions::READ).unwrap();
        table.map(0x1000, 0x1000, Permissions::READ | Permissions::WRITE).unwrap();
        assert_eq!(table.iter().map(|r| r.base).collect::<Vec<_>>(), vec![0x1000, 0x2000]);
        assert_eq!(table.permissions(0x1fff), Some(Permissions::READ | Permissions::WRITE));
        assert_eq!(table.permissions(0x2fff), Some(Permissions::READ));
        assert_eq!(table.permissions(0x3000), None);

        assert!(matches!(
            table.unmap(0x1000, 0x800),
            Err(Error::RegionNotFound { addr: 0x1000, length: 0x800 })
        ));
        table.unmap(0x1000, 0x1000).unwrap();
        assert_eq!(table.permissions(0x1000), None);
        assert!(table.map(0x10, 0, Permissions::READ).is_err());
        assert!(table.map(u64::MAX, 2, Permissions::READ).is_err());
        table.map(u64::MAX, 1, Permissions::READ).unwrap();
        assert_eq!(table.permissions(u64::MAX), Some(Permissions::READ));
    }

    #[test]
    fn region_end_is_exclusive() {
        let mut table = RegionTable::new();
        table.map(0x1000, 0x10, Permissions::READ).unwrap();
        assert_eq!(table.permissions(0x100f), Some(Permissions::READ));
        assert_eq!(table.permissions(0x1010), None);
        assert!(matches!(
            table.check_access(0x100f, 0x1010, AccessKind::Read, concrete(0x100f, 0x1010)),
            Err(Error::InvalidAccess { addr: 0x1010, .. })
        ));
        table.map(0x1010, 0x10, Permissions::WRITE).unwrap();
        assert_eq!(table.permissions(0x1010), Some(Permissions::WRITE));
    }

    #[test]
    fn faults() {
        let mut table = RegionTable::new();
        table.map(0x1000, 0x1000, Permissions::READ | Permissions::WRITE).unwrap();
        table.map(0x2000, 0x1000, Permissions::READ).unwrap();
        table.map(0x4000, 0x1000, Permissions::READ).unwrap();

        let check = |lo, hi, kind| table.check_access(lo, hi, kind, concrete(lo, hi));
        assert!(check(0x1ffc, 0x2003, AccessKind::Read).is_ok());
        assert!(matches!(
            check(0x1ffc, 0x2003, AccessKind::Write),
            Err(Error::InvalidAccess { addr: 0x2000, kind: AccessKind::Write })
        ));
        assert!(matches!(
            check(0x2ffe, 0x3001, AccessKind::Read),
            Err(Error::InvalidAccess { addr: 0x3000, .. })
        ));
        assert!(matches!(
            check(0x4ffe, 0x5001, AccessKind::Read),
            Err(Error::InvalidAccess { addr: 0x5000, .. })
        ));
        assert!(matches!(
            check(0x800, 0x1000, AccessKind::Read),
            Err(Error::InvalidAccess { addr: 0x800, .. })
        ));
        assert!(matches!(
            check(0x1000, 0x1000, AccessKind::Exec),
            Err(Error::InvalidAccess { addr: 0x1000, kind: AccessKind::Exec })
        ));
    }

    #[test]
    fn unreachable_gaps_pass() {
        let mut table = RegionTable::new();
        table.map(0x1000, 0x1000, Permissions::READ).unwrap();
        table.map(0x3000, 0x1000, Permissions::READ).unwrap();
        // an access that can only land in one of the two regions
        let reachable = |a: u64, b: u64| {
            Ok((a <= 0x1000 && 0x1000 <= b) || (a <= 0x3000 && 0x3000 <= b))
        };
        assert!(table
            .check_access(0x1000, 0x3000, AccessKind::Read, reachable)
            .is_ok());
        assert!(matches!(
            table.check_access(0x1000, 0x3000, AccessKind::Write, reachable),
            Err(Error::InvalidAccess { addr: 0x1000, .. })
        ));
    }
}
