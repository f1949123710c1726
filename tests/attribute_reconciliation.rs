//! Run with `cargo test --features std`.

use mdcache::testing::InodeInfoBuilder;
use mdcache::{Cache, CapMask, Timespec, VersionedIno};

/// Scenario 4: size reconciliation under EXCL.
#[test]
fn size_reconciliation_under_excl_rejects_smaller_same_seq_report() {
    let cache = Cache::new();
    let inode = cache.get_inode(VersionedIno::live(42));

    let first = InodeInfoBuilder::new(42, 1).size(1000, 3).build();
    mdcache::fill_inode(&inode, &first, None, CapMask::EXCL).unwrap();

    let second = InodeInfoBuilder::new(42, 2).size(500, 3).build();
    mdcache::fill_inode(&inode, &second, None, CapMask::EXCL).unwrap();

    let state = inode.state.lock();
    assert_eq!(state.size.size, 1000);
    assert_eq!(state.size.blocks, 2);
}

/// Scenario 3: time-monotonicity under WR cap.
#[test]
fn time_monotonicity_under_wr_cap() {
    let cache = Cache::new();
    let inode = cache.get_inode(VersionedIno::live(43));

    let first = InodeInfoBuilder::new(43, 1)
        .times(Timespec::new(100, 0), Timespec::new(100, 0), Timespec::new(100, 0), 5)
        .build();
    mdcache::fill_inode(&inode, &first, None, CapMask::WR).unwrap();

    let second = InodeInfoBuilder::new(43, 2)
        .times(Timespec::new(99, 0), Timespec::new(99, 0), Timespec::new(99, 0), 5)
        .build();
    mdcache::fill_inode(&inode, &second, None, CapMask::WR).unwrap();

    assert_eq!(inode.state.lock().time.mtime, Timespec::new(100, 0));
}
