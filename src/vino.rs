//! Inode identity.

use core::fmt;

/// `NOSNAP` denotes the live (non-snapshot) view of a file.
pub const NOSNAP: u64 = u64::MAX;
/// `SNAPDIR` denotes the synthesized ".snap" directory of a real directory.
pub const SNAPDIR: u64 = u64::MAX - 1;

/// Identity of the synthesized filesystem root, matching the
/// `Dentry::root()` allocation convention of a well-known low ino.
pub const ROOT_INO: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionedIno {
    pub ino: u64,
    pub snap: u64,
}

impl VersionedIno {
    pub const fn new(ino: u64, snap: u64) -> Self {
        Self { ino, snap }
    }

    pub const fn live(ino: u64) -> Self {
        Self::new(ino, NOSNAP)
    }

    pub const fn root() -> Self {
        Self::live(ROOT_INO)
    }

    pub const fn is_snapshot(&self) -> bool {
        self.snap != NOSNAP
    }

    pub const fn is_snapdir(&self) -> bool {
        self.snap == SNAPDIR
    }
}

impl fmt::Display for VersionedIno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.snap {
            NOSNAP => write!(f, "{}", self.ino),
            SNAPDIR => write!(f, "{}.snapdir", self.ino),
            snap => write!(f, "{}.{snap:x}", self.ino),
        }
    }
}
