//! Run with `cargo test --features std`.

use mdcache::testing::{dn_lease, InodeInfoBuilder};
use mdcache::{Cache, DEFAULT_HZ, Session, VersionedIno};

#[test]
fn stale_dentry_is_replaced_on_vino_mismatch() {
    let cache = Cache::new();
    let session = Session::new(1, 0, 1_000_000);

    let root = InodeInfoBuilder::new(1, 1).dir().build();
    let first = InodeInfoBuilder::new(200, 1).build();
    let lease = dn_lease(10_000);

    mdcache::assimilate(
        &cache,
        &session,
        1_000,
        DEFAULT_HZ,
        &[root, first],
        &[lease],
        &[Vec::from(b"x".as_slice())],
        &[lease],
        &[None, None],
        None,
        None,
        None,
    )
    .unwrap();

    assert!(cache.find_inode(VersionedIno::live(200)).is_some());

    // Reply says /x now points at a different inode under the same name.
    let root2 = InodeInfoBuilder::new(1, 1).dir().build();
    let second = InodeInfoBuilder::new(201, 1).build();

    let result = mdcache::assimilate(
        &cache,
        &session,
        2_000,
        DEFAULT_HZ,
        &[root2, second],
        &[lease],
        &[Vec::from(b"x".as_slice())],
        &[lease],
        &[None, None],
        None,
        None,
        None,
    )
    .unwrap();

    let dentry = result.expect("trace produced a dentry");
    assert!(dentry.has_vino(VersionedIno::live(201)));
    assert!(cache.find_inode(VersionedIno::live(201)).is_some());
}

#[test]
fn lease_gen_roll_invalidates_previously_valid_lease() {
    let cache = Cache::new();
    let session = Session::new(7, 7, 1_000_000);

    let root = InodeInfoBuilder::new(1, 1).dir().build();
    mdcache::fill_inode(&cache.get_inode(VersionedIno::root()), &root, None, mdcache::CapMask::empty()).unwrap();

    let inode = cache.get_inode(VersionedIno::live(42));
    let granted = mdcache::update_inode_lease(&inode, 10_000, DEFAULT_HZ, mdcache::LeaseMask::DN, &session, 1_000);
    assert!(!granted.is_empty());
    assert!(mdcache::inode_lease_valid(&inode, mdcache::LeaseMask::DN, 1_500));

    session.bump_cap_gen();

    assert!(!mdcache::inode_lease_valid(&inode, mdcache::LeaseMask::DN, 1_500));
}
