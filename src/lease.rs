//! Sessions and the per-inode / per-dentry lease slots they hold.
//!
//! A `Session` holds strong references to every inode and dentry it has
//! an outstanding lease on, in a `BTreeMap<touch_seq, Arc<_>>` ordered by
//! a monotonically increasing touch counter: touching a lease moves it to
//! the tail the way a dcache moves a dentry to the head of its RCU list
//! on lookup, but here the map's key ordering does the moving for us
//! instead of an intrusive link. The inode/dentry side only keeps a
//! `Weak<Session>` back-reference, so the two never form a reference
//! cycle.

use alloc::collections::btree_map::BTreeMap;
use alloc::sync::{Arc, Weak};

use crate::cap::LeaseMask;
use crate::clock::{lease_ttl, Jiffies};
use crate::dentry::DentryRecord;
use crate::inode::Inode;
use crate::sync::Spin;

/// A client session with one MDS, as far as lease bookkeeping is
/// concerned. The full session object (connection, auth state, etc.) is
/// a host concern; this is only the slice the cache needs.
pub struct Session {
    pub mds: u32,
    pub cap_gen: Spin<u64>,
    pub cap_ttl: Spin<Jiffies>,
    inode_leases: Spin<BTreeMap<u64, Arc<Inode>>>,
    dentry_leases: Spin<BTreeMap<u64, Arc<DentryRecord>>>,
    next_touch: Spin<u64>,
}

impl Session {
    pub fn new(mds: u32, cap_gen: u64, cap_ttl: Jiffies) -> Arc<Self> {
        Arc::new(Self {
            mds,
            cap_gen: Spin::new(cap_gen),
            cap_ttl: Spin::new(cap_ttl),
            inode_leases: Spin::new(BTreeMap::new()),
            dentry_leases: Spin::new(BTreeMap::new()),
            next_touch: Spin::new(0),
        })
    }

    fn next_touch_seq(&self) -> u64 {
        let mut n = self.next_touch.lock();
        *n += 1;
        *n
    }

    pub fn cap_gen(&self) -> u64 {
        *self.cap_gen.lock()
    }

    pub fn cap_ttl(&self) -> Jiffies {
        *self.cap_ttl.lock()
    }

    pub fn bump_cap_gen(&self) {
        *self.cap_gen.lock() += 1;
    }

    /// Pin `inode` in this session's FIFO, replacing any prior entry at
    /// `prev_seq` (invariant 5: touching moves a lease to the tail).
    fn touch_inode_lease(&self, prev_seq: Option<u64>, inode: Arc<Inode>) -> u64 {
        let seq = self.next_touch_seq();
        let mut leases = self.inode_leases.lock();
        if let Some(prev) = prev_seq {
            leases.remove(&prev);
        }
        leases.insert(seq, inode);
        seq
    }

    fn touch_dentry_lease(&self, prev_seq: Option<u64>, dentry: Arc<DentryRecord>) -> u64 {
        let seq = self.next_touch_seq();
        let mut leases = self.dentry_leases.lock();
        if let Some(prev) = prev_seq {
            leases.remove(&prev);
        }
        leases.insert(seq, dentry);
        seq
    }

    fn drop_inode_lease(&self, seq: u64) {
        self.inode_leases.lock().remove(&seq);
    }

    fn drop_dentry_lease(&self, seq: u64) {
        self.dentry_leases.lock().remove(&seq);
    }

    pub fn inode_lease_count(&self) -> usize {
        self.inode_leases.lock().len()
    }

    pub fn dentry_lease_count(&self) -> usize {
        self.dentry_leases.lock().len()
    }
}

/// Single-slot per-inode lease.
#[derive(Default)]
pub struct InodeLeaseSlot {
    session: Option<Weak<Session>>,
    touch_seq: Option<u64>,
    gen: u64,
    ttl: Jiffies,
    mask: LeaseMask,
}

impl InodeLeaseSlot {
    pub fn mask(&self) -> LeaseMask {
        self.mask
    }

    pub fn ttl(&self) -> Jiffies {
        self.ttl
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.as_ref().and_then(Weak::upgrade)
    }

    fn is_same_session(&self, session: &Arc<Session>) -> bool {
        match self.session() {
            Some(cur) => Arc::ptr_eq(&cur, session),
            None => false,
        }
    }

    fn has_no_session(&self) -> bool {
        match &self.session {
            None => true,
            Some(w) => w.upgrade().is_none(),
        }
    }
}

/// `update_inode_lease(inode, lease_info, session, req_started)`. `inode`
/// is the strong handle the caller already holds, pinned into the
/// session's FIFO on acceptance.
pub fn update_inode_lease(
    inode: &Arc<Inode>,
    duration_ms: u64,
    hz: u64,
    mask: LeaseMask,
    session: &Arc<Session>,
    req_started: Jiffies,
) -> LeaseMask {
    let new_ttl = lease_ttl(req_started, duration_ms, hz);
    let mut slot = inode.lease.lock();

    let gen_rolled = slot.session().map(|s| s.cap_gen()) != Some(session.cap_gen());
    let accept_ttl = slot.ttl == 0 && slot.touch_seq.is_none() || new_ttl >= slot.ttl || gen_rolled;
    let session_ok = slot.has_no_session() || slot.is_same_session(session);

    if !(accept_ttl && session_ok) {
        return LeaseMask::empty();
    }

    let prev_seq = if slot.is_same_session(session) {
        slot.touch_seq
    } else {
        None
    };

    let seq = session.touch_inode_lease(prev_seq, inode.clone());

    slot.session = Some(Arc::downgrade(session));
    slot.touch_seq = Some(seq);
    slot.gen = session.cap_gen();
    slot.ttl = new_ttl;
    slot.mask = mask.normalize();

    slot.mask
}

/// `inode_lease_valid(inode, mask)`.
pub fn inode_lease_valid(inode: &Inode, mask: LeaseMask, now: Jiffies) -> bool {
    let slot = inode.lease.lock();

    let mut have = slot.mask;
    if mask.contains(LeaseMask::ICONTENT) && inode.caps().contains(crate::cap::CapMask::EXCL) {
        have |= LeaseMask::ICONTENT;
    }
    have = have.normalize();

    let session = match slot.session() {
        Some(s) => s,
        None => return false,
    };

    session.cap_gen() == slot.gen && now < session.cap_ttl() && now < slot.ttl && (have & mask) == mask
}

/// Single-slot per-dentry lease.
#[derive(Default)]
pub struct DentryLeaseSlot {
    session: Option<Weak<Session>>,
    touch_seq: Option<u64>,
    /// `d_time`: parent inode version recorded when the reply carried an
    /// empty mask, so an implicit ICONTENT lease can later cover it.
    d_time: u64,
    ttl: Jiffies,
    mask: LeaseMask,
}

impl DentryLeaseSlot {
    pub fn ttl(&self) -> Jiffies {
        self.ttl
    }

    pub fn mask(&self) -> LeaseMask {
        self.mask
    }

    pub fn d_time(&self) -> u64 {
        self.d_time
    }

    /// Supplemented feature: a negative
    /// dentry whose `d_time` still matches the parent's current `version`
    /// can be trusted without contacting the MDS at all, even once its
    /// positive-lease `mask`/`ttl` have expired -- the directory hasn't
    /// changed since the negative result was recorded.
    pub fn valid_for_negative(&self, parent_version: u64) -> bool {
        self.d_time == parent_version
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.as_ref().and_then(Weak::upgrade)
    }

    fn is_same_session(&self, session: &Arc<Session>) -> bool {
        self.session().map(|s| Arc::ptr_eq(&s, session)).unwrap_or(false)
    }
}

/// `update_dentry_lease`. `parent_version` is the parent
/// inode's current `version`, recorded as `d_time` when `mask` is empty.
pub fn update_dentry_lease(
    dentry: &Arc<DentryRecord>,
    mask: LeaseMask,
    duration_ms: u64,
    hz: u64,
    session: &Arc<Session>,
    req_started: Jiffies,
    parent_version: u64,
) {
    let mut slot = dentry.lease.lock();

    if mask.is_empty() {
        slot.d_time = parent_version;
        return;
    }

    let new_ttl = lease_ttl(req_started, duration_ms, hz);

    // "Never replace a newer lease with an older one from the same
    // session."
    if slot.is_same_session(session) && new_ttl < slot.ttl {
        return;
    }

    let prev_seq = if slot.is_same_session(session) {
        slot.touch_seq
    } else {
        None
    };

    let seq = session.touch_dentry_lease(prev_seq, dentry.clone());

    slot.session = Some(Arc::downgrade(session));
    slot.touch_seq = Some(seq);
    slot.ttl = new_ttl;
    slot.mask = mask.normalize();
}

/// Drop a lease's back-reference and the session's strong pin on it, e.g.
/// on expiry or explicit revocation (design note 9).
pub fn revoke_inode_lease(inode: &Inode) {
    let mut slot = inode.lease.lock();
    if let (Some(session), Some(seq)) = (slot.session(), slot.touch_seq.take()) {
        session.drop_inode_lease(seq);
    }
    slot.session = None;
    slot.mask = LeaseMask::empty();
    slot.ttl = 0;
}

pub fn revoke_dentry_lease(dentry: &DentryRecord) {
    let mut slot = dentry.lease.lock();
    if let (Some(session), Some(seq)) = (slot.session(), slot.touch_seq.take()) {
        session.drop_dentry_lease(seq);
    }
    slot.session = None;
    slot.mask = LeaseMask::empty();
    slot.ttl = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vino::VersionedIno;
    use alloc::vec::Vec;

    #[test]
    fn update_inode_lease_accepts_first_grant_and_pins_session() {
        let session = Session::new(1, 0, 1_000_000);
        let inode = Inode::new(VersionedIno::live(1));

        let granted = update_inode_lease(&inode, 10_000, 1000, LeaseMask::DN, &session, 0);
        assert!(granted.contains(LeaseMask::DN));
        assert_eq!(session.inode_lease_count(), 1);
        assert_eq!(inode.lease.lock().ttl(), 10_000);
    }

    /// Idempotence property: identical re-application doesn't
    /// add a second FIFO entry.
    #[test]
    fn update_inode_lease_is_idempotent_on_identical_input() {
        let session = Session::new(1, 0, 1_000_000);
        let inode = Inode::new(VersionedIno::live(1));

        update_inode_lease(&inode, 10_000, 1000, LeaseMask::DN, &session, 0);
        update_inode_lease(&inode, 10_000, 1000, LeaseMask::DN, &session, 0);

        assert_eq!(session.inode_lease_count(), 1);
        assert_eq!(inode.lease.lock().ttl(), 10_000);
    }

    #[test]
    fn update_inode_lease_rejects_shorter_ttl_same_session() {
        let session = Session::new(1, 0, 1_000_000);
        let inode = Inode::new(VersionedIno::live(1));

        update_inode_lease(&inode, 10_000, 1000, LeaseMask::DN, &session, 0);
        let granted = update_inode_lease(&inode, 1_000, 1000, LeaseMask::DN, &session, 0);

        assert!(granted.is_empty());
        assert_eq!(inode.lease.lock().ttl(), 10_000);
    }

    /// Scenario 5: a session generation roll invalidates a
    /// previously valid lease even though its TTL hasn't expired.
    #[test]
    fn lease_gen_roll_invalidates_valid_lease() {
        let session = Session::new(1, 7, 1_000_000);
        let inode = Inode::new(VersionedIno::live(1));

        update_inode_lease(&inode, 10_000, 1000, LeaseMask::DN, &session, 0);
        assert!(inode_lease_valid(&inode, LeaseMask::DN, 5_000));

        session.bump_cap_gen();
        assert!(!inode_lease_valid(&inode, LeaseMask::DN, 5_000));
    }

    #[test]
    fn icontent_lease_folds_in_when_excl_held() {
        let session = Session::new(1, 0, 1_000_000);
        let inode = Inode::new(VersionedIno::live(1));
        inode
            .state
            .lock()
            .caps
            .upsert(crate::cap::CapRecord::new(1, crate::cap::CapMask::EXCL, crate::cap::CapMask::empty(), 0, 0, 0));

        // No ICONTENT lease was ever actually granted, but EXCL makes a
        // *request* for ICONTENT implicitly valid -- inode_lease_valid
        // still requires a live session/ttl on the lease slot itself, so
        // grant an empty-mask lease first to attach a session.
        update_inode_lease(&inode, 10_000, 1000, LeaseMask::empty(), &session, 0);
        assert!(inode_lease_valid(&inode, LeaseMask::ICONTENT, 5_000));
    }

    #[test]
    fn update_dentry_lease_records_d_time_on_empty_mask() {
        let session = Session::new(1, 0, 1_000_000);
        let parent = Inode::new(VersionedIno::live(1));
        let dn = DentryRecord::new(parent, Vec::from(&b"x"[..]));

        update_dentry_lease(&dn, LeaseMask::empty(), 0, 1000, &session, 0, 42);
        assert_eq!(dn.lease.lock().d_time(), 42);
        assert_eq!(session.dentry_lease_count(), 0);
    }

    #[test]
    fn update_dentry_lease_never_replaces_newer_with_older_same_session() {
        let session = Session::new(1, 0, 1_000_000);
        let parent = Inode::new(VersionedIno::live(1));
        let dn = DentryRecord::new(parent, Vec::from(&b"x"[..]));

        update_dentry_lease(&dn, LeaseMask::DN, 10_000, 1000, &session, 0, 1);
        update_dentry_lease(&dn, LeaseMask::DN, 1_000, 1000, &session, 0, 1);

        assert_eq!(dn.lease.lock().ttl(), 10_000);
    }

    /// Supplemented feature: a negative dentry recorded
    /// against the parent's current version stays trustworthy even after
    /// its positive-lease fields have nothing live in them.
    #[test]
    fn valid_for_negative_matches_recorded_parent_version() {
        let session = Session::new(1, 0, 1_000_000);
        let parent = Inode::new(VersionedIno::live(1));
        let dn = DentryRecord::new(parent, Vec::from(&b"gone"[..]));

        update_dentry_lease(&dn, LeaseMask::empty(), 0, 1000, &session, 0, 7);
        assert!(dn.lease.lock().valid_for_negative(7));
        assert!(!dn.lease.lock().valid_for_negative(8));
    }

    #[test]
    fn revoke_inode_lease_drops_session_pin() {
        let session = Session::new(1, 0, 1_000_000);
        let inode = Inode::new(VersionedIno::live(1));

        update_inode_lease(&inode, 10_000, 1000, LeaseMask::DN, &session, 0);
        assert_eq!(session.inode_lease_count(), 1);

        revoke_inode_lease(&inode);
        assert_eq!(session.inode_lease_count(), 0);
        assert!(inode.lease.lock().mask().is_empty());
    }
}
