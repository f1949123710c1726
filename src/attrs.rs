//! Attribute reconciler: decides how MDS-reported size and
//! timestamps merge with locally held state, depending on which caps are
//! currently issued.

use crate::cap::CapMask;

/// A `(sec, nsec)` timestamp pair, compared the way `timespec_compare`
/// does: by value, not by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i32,
}

impl Timespec {
    pub const fn new(sec: i64, nsec: i32) -> Self {
        Self { sec, nsec }
    }
}

/// The size/truncate-seq fields the reconciler reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct SizeState {
    pub size: u64,
    pub blocks: u64,
    pub reported_size: u64,
    pub truncate_seq: u32,
}

impl SizeState {
    fn set_size(&mut self, size: u64) {
        self.size = size;
        // blocks = ceil(size / 512).
        self.blocks = size.div_ceil(512);
    }
}

/// The timestamp fields the reconciler reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct TimeState {
    pub mtime: Timespec,
    pub atime: Timespec,
    pub ctime: Timespec,
    pub time_warp_seq: u32,
}

/// MDS-reported values carried in a fill-inode reply.
#[derive(Debug, Clone, Copy)]
pub struct ReportedAttrs {
    pub truncate_seq: u32,
    pub size: u64,
    pub time_warp_seq: u32,
    pub ctime: Timespec,
    pub mtime: Timespec,
    pub atime: Timespec,
}

/// Step 1: size/truncate_seq reconciliation, independent of held caps.
/// Returns `true` if the accepted size is a shrink relative to what was
/// held before (supplemented feature: `ceph_fill_file_size` size-hint on
/// read, not just on write -- `trace::fill_inode` uses this to reset
/// `max_size` request tracking on a shrink).
pub fn reconcile_size(state: &mut SizeState, reported: &ReportedAttrs) -> bool {
    let accept = reported.truncate_seq > state.truncate_seq
        || (reported.truncate_seq == state.truncate_seq && reported.size > state.size);

    if !accept {
        return false;
    }

    let shrunk = reported.size < state.size;
    state.set_size(reported.size);
    state.truncate_seq = reported.truncate_seq;
    state.reported_size = reported.size;
    shrunk
}

/// Step 2: timestamp policy by held caps. Returns `true` if a
/// "MDS outran us" / "monotonicity broken" warning should be logged.
pub fn reconcile_time(state: &mut TimeState, reported: &ReportedAttrs, issued: CapMask) -> bool {
    if issued.contains(CapMask::EXCL) {
        if reported.ctime > state.ctime {
            state.ctime = reported.ctime;
        }
        return reported.time_warp_seq > state.time_warp_seq;
    }

    if issued.intersects(CapMask::WR | CapMask::WRBUFFER) {
        if reported.time_warp_seq > state.time_warp_seq {
            adopt_triple(state, reported);
            return false;
        }
        if reported.time_warp_seq == state.time_warp_seq {
            if reported.ctime > state.ctime {
                state.ctime = reported.ctime;
            }
            if reported.mtime > state.mtime {
                state.mtime = reported.mtime;
            }
            if reported.atime > state.atime {
                state.atime = reported.atime;
            }
            return false;
        }
        // reported.time_warp_seq < state.time_warp_seq
        return true;
    }

    // No write caps held: adopt wholesale on >=, warn on regression.
    if reported.time_warp_seq >= state.time_warp_seq {
        adopt_triple(state, reported);
        false
    } else {
        true
    }
}

fn adopt_triple(state: &mut TimeState, reported: &ReportedAttrs) {
    state.ctime = reported.ctime;
    state.mtime = reported.mtime;
    state.atime = reported.atime;
    state.time_warp_seq = reported.time_warp_seq;
}
