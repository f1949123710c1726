//! Reply-builder helpers for tests (std/test-only, per ambient test
//! tooling). Not part of the public no_std surface.

use alloc::vec::Vec;

use crate::attrs::Timespec;
use crate::cap::LeaseMask;
use crate::trace::{DirFragInfo, InodeInfo, LeaseInfo};
use crate::vino::VersionedIno;

/// Builds a minimal, internally consistent `InodeInfo` for tests, the
/// way a real reply decoder would hand one to [`crate::trace::fill_inode`].
pub struct InodeInfoBuilder {
    info: InodeInfo,
}

impl InodeInfoBuilder {
    pub fn new(ino: u64, version: u64) -> Self {
        Self {
            info: InodeInfo {
                vino: VersionedIno::live(ino),
                version,
                mode: 0o644,
                uid: 0,
                gid: 0,
                nlink: 1,
                rdev: 0,
                layout_stripe_unit: 0,
                layout_stripe_count: 0,
                truncate_seq: 0,
                time_warp_seq: 0,
                size: 0,
                max_size: 0,
                mtime: Timespec::new(0, 0),
                atime: Timespec::new(0, 0),
                ctime: Timespec::new(0, 0),
                rctime: Timespec::new(0, 0),
                files: 0,
                subdirs: 0,
                rfiles: 0,
                rsubdirs: 0,
                rbytes: 0,
                fragtree_splits: Vec::new(),
                symlink: None,
                xattr_blob: Vec::new(),
                is_dir: false,
            },
        }
    }

    pub fn dir(mut self) -> Self {
        self.info.is_dir = true;
        self
    }

    pub fn size(mut self, size: u64, truncate_seq: u32) -> Self {
        self.info.size = size;
        self.info.truncate_seq = truncate_seq;
        self
    }

    pub fn times(mut self, mtime: Timespec, atime: Timespec, ctime: Timespec, time_warp_seq: u32) -> Self {
        self.info.mtime = mtime;
        self.info.atime = atime;
        self.info.ctime = ctime;
        self.info.time_warp_seq = time_warp_seq;
        self
    }

    pub fn build(self) -> InodeInfo {
        self.info
    }
}

pub fn dn_lease(duration_ms: u64) -> LeaseInfo {
    LeaseInfo {
        mask: LeaseMask::DN,
        duration_ms,
    }
}

pub fn empty_lease() -> LeaseInfo {
    LeaseInfo {
        mask: LeaseMask::empty(),
        duration_ms: 0,
    }
}

pub fn no_dirfrag() -> Option<DirFragInfo> {
    None
}
