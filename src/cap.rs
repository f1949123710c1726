//! Capability and lease bit masks, and per-session capability records.
//! Mirrors the `bitflags!` usage the VFS constants module uses for its
//! own mmap-protection/flags bitsets.

use alloc::vec::Vec;

use bitflags::bitflags;

bitflags! {
    /// Capability bits a session can hold on an inode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapMask: u32 {
        const PIN        = 0x0001;
        const RD         = 0x0002;
        const CACHE      = 0x0004;
        const RDCACHE    = 0x0008;
        const WR         = 0x0010;
        const WRBUFFER   = 0x0020;
        const WREXTEND   = 0x0040;
        const LAZYIO     = 0x0080;
        const EXCL       = 0x0100;
        const SHARED     = Self::RD.bits() | Self::CACHE.bits();
        const RW         = Self::WR.bits() | Self::WRBUFFER.bits();
    }

    /// Lease bits a session can hold, either on an inode or a dentry.
    /// `ICONTENT` folds in directory-content (implicit all-dentries)
    /// coverage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LeaseMask: u32 {
        /// Dentry-name lease ("DN" in the reply wire format).
        const DN       = 0x01;
        const ICONTENT = 0x02;
    }
}

impl LeaseMask {
    /// Any `ICONTENT` bit implies all of them.
    pub fn normalize(self) -> Self {
        if self.contains(LeaseMask::ICONTENT) {
            LeaseMask::all()
        } else {
            self
        }
    }
}

/// `ceph_cap_string`-style short letter codes, used by warning-only log
/// sites to render which caps are held without spelling out full bitflag
/// names.
impl core::fmt::Display for CapMask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        const CODES: &[(CapMask, char)] = &[
            (CapMask::PIN, 'p'),
            (CapMask::RD, 'r'),
            (CapMask::RDCACHE, 'c'),
            (CapMask::WR, 'w'),
            (CapMask::WRBUFFER, 'b'),
            (CapMask::EXCL, 'x'),
        ];
        for &(bit, code) in CODES {
            if self.contains(bit) {
                write!(f, "{code}")?;
            }
        }
        Ok(())
    }
}

/// Per-file-mode open-fd counters. All-zero means
/// no descriptors are open in that mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenByMode {
    pub read: u32,
    pub write: u32,
    pub read_write: u32,
    pub lazy: u32,
}

impl OpenByMode {
    pub fn is_all_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// File-open mode, used to index [`OpenByMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    ReadWrite,
    Lazy,
}

impl OpenByMode {
    pub fn inc(&mut self, mode: FileMode) {
        match mode {
            FileMode::Read => self.read += 1,
            FileMode::Write => self.write += 1,
            FileMode::ReadWrite => self.read_write += 1,
            FileMode::Lazy => self.lazy += 1,
        }
    }

    /// Returns the field decremented, so the caller can tell when it hit
    /// zero.
    pub fn dec(&mut self, mode: FileMode) -> u32 {
        let field = match mode {
            FileMode::Read => &mut self.read,
            FileMode::Write => &mut self.write,
            FileMode::ReadWrite => &mut self.read_write,
            FileMode::Lazy => &mut self.lazy,
        };
        *field = field.saturating_sub(1);
        *field
    }
}

/// Non-negative reference counters that drive cap retention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapRefs {
    pub rd: u32,
    pub rdcache: u32,
    pub wr: u32,
    pub wrbuffer: u32,
    pub wrbuffer_head: u32,
}

/// A single MDS session's capability grant on one inode.
#[derive(Debug, Clone)]
pub struct CapRecord {
    pub mds: u32,
    pub issued: CapMask,
    pub wanted: CapMask,
    pub seq: u32,
    pub mseq: u32,
    pub gen: u64,
}

impl CapRecord {
    pub fn new(mds: u32, issued: CapMask, wanted: CapMask, seq: u32, mseq: u32, gen: u64) -> Self {
        Self {
            mds,
            issued,
            wanted,
            seq,
            mseq,
            gen,
        }
    }
}

/// Ordered-by-mds cap set.
#[derive(Debug, Clone, Default)]
pub struct CapTable {
    records: Vec<CapRecord>,
}

impl CapTable {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn get(&self, mds: u32) -> Option<&CapRecord> {
        self.records.iter().find(|c| c.mds == mds)
    }

    pub fn get_mut(&mut self, mds: u32) -> Option<&mut CapRecord> {
        self.records.iter_mut().find(|c| c.mds == mds)
    }

    pub fn upsert(&mut self, record: CapRecord) {
        match self.records.iter_mut().find(|c| c.mds == record.mds) {
            Some(slot) => *slot = record,
            None => self.records.push(record),
        }
    }

    pub fn remove(&mut self, mds: u32) -> Option<CapRecord> {
        let idx = self.records.iter().position(|c| c.mds == mds)?;
        Some(self.records.swap_remove(idx))
    }

    /// Union of every currently issued cap across all sessions holding
    /// this inode, used by the attribute reconciler.
    pub fn issued_union(&self) -> CapMask {
        self.records
            .iter()
            .fold(CapMask::empty(), |acc, c| acc | c.issued)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Result of [`put_fmode`]: whether the counter hit zero and a cap check
/// should be scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapCheckHint {
    None,
    ScheduleCheck,
}

/// `put_fmode(ci, mode)`: decrement the mode counter; on a
/// live (non-snapshot) inode reaching zero, the caller should schedule a
/// cap check. Snapshot inodes never hold write caps worth releasing, so
/// the hint only fires for live inodes -- callers pass that in via
/// `is_live`.
pub fn put_fmode(open_by_mode: &mut OpenByMode, mode: FileMode, is_live: bool) -> CapCheckHint {
    let after = open_by_mode.dec(mode);
    if is_live && after == 0 {
        CapCheckHint::ScheduleCheck
    } else {
        CapCheckHint::None
    }
}

/// Inode size-hint check: on a local size
/// change, if the new size has grown to within half of `max_size` while
/// the MDS-reported size hasn't, ask the caller to request a bigger
/// grant.
pub fn size_hint_needs_cap_check(new_size: u64, reported_size: u64, max_size: u64) -> bool {
    2 * new_size >= max_size && 2 * reported_size < max_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icontent_implies_dn() {
        let m = LeaseMask::ICONTENT.normalize();
        assert!(m.contains(LeaseMask::DN));
        assert!(m.contains(LeaseMask::ICONTENT));
    }

    #[test]
    fn put_fmode_fires_only_at_zero_on_live_inode() {
        let mut obm = OpenByMode::default();
        obm.inc(FileMode::Write);
        obm.inc(FileMode::Write);

        assert_eq!(put_fmode(&mut obm, FileMode::Write, true), CapCheckHint::None);
        assert_eq!(put_fmode(&mut obm, FileMode::Write, true), CapCheckHint::ScheduleCheck);
    }

    #[test]
    fn put_fmode_never_fires_on_snapshot_inode() {
        let mut obm = OpenByMode::default();
        obm.inc(FileMode::Read);
        assert_eq!(put_fmode(&mut obm, FileMode::Read, false), CapCheckHint::None);
    }

    #[test]
    fn cap_table_union_is_bitwise_or_of_issued() {
        let mut t = CapTable::new();
        t.upsert(CapRecord::new(0, CapMask::RD, CapMask::empty(), 0, 0, 0));
        t.upsert(CapRecord::new(1, CapMask::WR, CapMask::empty(), 0, 0, 0));
        assert_eq!(t.issued_union(), CapMask::RD | CapMask::WR);
    }

    #[test]
    fn size_hint_fires_when_doubled_size_crosses_max() {
        assert!(size_hint_needs_cap_check(600, 100, 1000));
        assert!(!size_hint_needs_cap_check(400, 900, 1000));
    }

    #[test]
    fn cap_mask_displays_short_letter_codes() {
        assert_eq!(alloc::format!("{}", CapMask::RD | CapMask::WR), "rw");
        assert_eq!(alloc::format!("{}", CapMask::EXCL), "x");
        assert_eq!(alloc::format!("{}", CapMask::empty()), "");
    }
}
