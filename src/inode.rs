//! The Inode record.
//!
//! Following an `Inode { ino, format, info: Spin<InodeInfo>, rwsem, ... }`
//! shape, attribute/cap state lives behind one spinlock and the fragment
//! tree behind its own mutex — the two are never taken together in this
//! cache (the fragtree mutex is a leaf).

use alloc::string::String;
use alloc::sync::Arc;

use crate::attrs::{SizeState, TimeState};
use crate::cap::{CapTable, OpenByMode};
use crate::frag::FragTree;
use crate::lease::InodeLeaseSlot;
use crate::sync::Spin;
use crate::vino::VersionedIno;

/// Non-negative reference counters driving cap retention.
#[derive(Debug, Clone, Copy, Default)]
pub struct InodeRefs {
    pub rd: u32,
    pub rdcache: u32,
    pub wr: u32,
    pub wrbuffer: u32,
    pub wrbuffer_head: u32,
}

/// `dir_stats`, present only conceptually for directories; `files == 0 &&
/// subdirs == 0` on a non-directory is simply unused.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirStats {
    pub files: u64,
    pub subdirs: u64,
    pub rfiles: u64,
    pub rsubdirs: u64,
    pub rbytes: u64,
}

/// Everything protected by the per-inode spinlock: identity attributes,
/// size/time state, caps, refs, and the lease slot. Kept as one struct so
/// a single lock acquisition covers a whole fill-inode update.
pub struct InodeState {
    pub version: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub rdev: u64,
    pub layout_stripe_unit: u32,
    pub layout_stripe_count: u32,

    pub size: SizeState,
    pub time: TimeState,
    pub max_size: u64,
    pub requested_max_size: u64,
    pub wanted_max_size: u64,

    pub old_atime: crate::attrs::Timespec,
    pub rctime: crate::attrs::Timespec,

    pub xattr_blob: alloc::vec::Vec<u8>,
    pub xattr_state: crate::xattr::XattrState,

    pub caps: CapTable,
    /// Implicit cap bits that apply to this inode when it is a snapshot
    /// view: snapshots hold no session caps of their own, but read-only
    /// access is always implicitly granted.
    pub snap_caps: crate::cap::CapMask,
    pub open_by_mode: OpenByMode,
    pub refs: InodeRefs,

    pub dir_stats: Option<DirStats>,

    /// signed size; `-1` (encoded as `None`) means no pending truncate.
    /// Stored as `Option<u64>` to make the "none" state unrepresentable
    /// as a bogus size.
    pub pending_truncate_to: Option<u64>,
}

impl InodeState {
    fn new_defaults() -> Self {
        Self {
            version: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 0,
            rdev: 0,
            layout_stripe_unit: 0,
            layout_stripe_count: 0,
            size: SizeState {
                size: 0,
                blocks: 0,
                reported_size: 0,
                truncate_seq: 0,
            },
            time: TimeState {
                mtime: crate::attrs::Timespec::new(0, 0),
                atime: crate::attrs::Timespec::new(0, 0),
                ctime: crate::attrs::Timespec::new(0, 0),
                time_warp_seq: 0,
            },
            max_size: 0,
            requested_max_size: 0,
            wanted_max_size: 0,
            old_atime: crate::attrs::Timespec::new(0, 0),
            rctime: crate::attrs::Timespec::new(0, 0),
            xattr_blob: alloc::vec::Vec::new(),
            xattr_state: crate::xattr::XattrState::Unknown,
            caps: CapTable::new(),
            snap_caps: crate::cap::CapMask::empty(),
            open_by_mode: OpenByMode::default(),
            refs: InodeRefs::default(),
            dir_stats: None,
            pending_truncate_to: None,
        }
    }
}

pub struct Inode {
    pub vino: VersionedIno,
    pub state: Spin<InodeState>,
    pub fragtree: Spin<FragTree>,
    pub lease: Spin<InodeLeaseSlot>,
    /// Stands in for the host's `i_mutex`: the trace assimilator only
    /// ever try-locks this when walking `d`'s parent directory, never blocks on it.
    pub dir_mutex: Spin<()>,
    /// Write-once; `OnceCell`-style manual enforcement since
    /// `core`/`alloc` carry no `no_std` `OnceCell` we can rely on being
    /// vendored for every target here.
    symlink_target: Spin<Option<String>>,
}

impl Inode {
    pub fn new(vino: VersionedIno) -> Arc<Self> {
        Arc::new(Self {
            vino,
            state: Spin::new(InodeState::new_defaults()),
            fragtree: Spin::new(FragTree::new()),
            lease: Spin::new(InodeLeaseSlot::default()),
            dir_mutex: Spin::new(()),
            symlink_target: Spin::new(None),
        })
    }

    pub fn is_snapshot(&self) -> bool {
        self.vino.is_snapshot()
    }

    /// Convenience accessor used by the lease engine and the reconciler:
    /// the union of every session's issued caps, folding in `snap_caps`
    /// for snapshot inodes (which hold no session caps of their own).
    pub fn caps(&self) -> crate::cap::CapMask {
        let state = self.state.lock();
        let mut issued = state.caps.issued_union();
        if self.is_snapshot() {
            issued |= state.snap_caps;
        }
        issued
    }

    /// Sets the symlink target the first time it is called; subsequent
    /// calls are no-ops, so the caller doesn't need to track whether it
    /// already filled the inode.
    pub fn set_symlink_target_once(&self, target: String) {
        let mut slot = self.symlink_target.lock();
        if slot.is_none() {
            *slot = Some(target);
        }
    }

    pub fn symlink_target(&self) -> Option<String> {
        self.symlink_target.lock().clone()
    }
}
