//! Per-dentry side record and the splice operation, modeled after a
//! `Dentry { parent, name, hash, data: RCUPointer<DentryData> }` split
//! between "identity" and "mutable target" fields.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::{CacheError, CacheResult};
use crate::hash::hash_dentry_key;
use crate::inode::Inode;
use crate::lease::DentryLeaseSlot;
use crate::sync::Spin;

/// `(parent, name, hash)` as a unit, so [`DentryRecord::rename_to`] (the
/// `d_move` primitive, spec §6) can swap all three atomically under one
/// lock instead of leaving `hash` briefly inconsistent with `parent`/`name`.
struct DentryIdentity {
    parent: Arc<Inode>,
    name: Vec<u8>,
    hash: u64,
}

impl DentryIdentity {
    fn new(parent: Arc<Inode>, name: Vec<u8>) -> Self {
        let hash = hash_dentry_key(Arc::as_ptr(&parent) as usize, &name);
        Self { parent, name, hash }
    }
}

/// The per-dentry side record the host's own dentry structure points at.
/// Identity (`parent`, `name`, `hash`) moves only on an explicit
/// [`DentryRecord::rename_to`] (the host's `move` primitive); `target` and
/// `lease` are mutable under their own spinlocks.
pub struct DentryRecord {
    identity: Spin<DentryIdentity>,
    target: Spin<Option<Arc<Inode>>>,
    pub lease: Spin<DentryLeaseSlot>,
}

impl DentryRecord {
    pub fn new(parent: Arc<Inode>, name: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            identity: Spin::new(DentryIdentity::new(parent, name)),
            target: Spin::new(None),
            lease: Spin::new(DentryLeaseSlot::default()),
        })
    }

    pub fn parent(&self) -> Arc<Inode> {
        self.identity.lock().parent.clone()
    }

    pub fn name(&self) -> Vec<u8> {
        self.identity.lock().name.clone()
    }

    pub fn hash(&self) -> u64 {
        self.identity.lock().hash
    }

    /// True iff `dentry` currently sits at `(parent, name)`, without
    /// cloning either field.
    pub fn matches(&self, parent: &Arc<Inode>, name: &[u8]) -> bool {
        let id = self.identity.lock();
        Arc::ptr_eq(&id.parent, parent) && id.name == name
    }

    pub fn target(&self) -> Option<Arc<Inode>> {
        self.target.lock().clone()
    }

    pub fn is_positive(&self) -> bool {
        self.target.lock().is_some()
    }

    /// Vino mismatch check used by the trace assimilator.
    pub fn has_vino(&self, vino: crate::vino::VersionedIno) -> bool {
        self.target.lock().as_ref().map(|i| i.vino) == Some(vino)
    }

    fn clear(&self) {
        *self.target.lock() = None;
    }

    /// Binds `target` directly, bypassing [`splice`]'s host-alias
    /// negotiation. Used only for the root dentry, which has no parent
    /// lookup to race with.
    pub(crate) fn bind_target(&self, target: Arc<Inode>) {
        *self.target.lock() = Some(target);
    }

    /// `d_move`: relocate this dentry's identity to `(new_parent,
    /// new_name)`, recomputing its hash. The caller (`DentryHost::rename`)
    /// is responsible for moving the dcache bucket membership around this
    /// call -- this only updates the record itself.
    pub(crate) fn rename_to(&self, new_parent: Arc<Inode>, new_name: Vec<u8>) {
        *self.identity.lock() = DentryIdentity::new(new_parent, new_name);
    }
}

/// The host's "materialise unique" / hash-table primitives this module
/// needs. A real VFS backend
/// implements this over its own dentry cache; `crate::cache` wires the
/// concrete implementation in.
pub trait DentryHost {
    /// Bind `inode` to `dentry`. If an existing alias for the same
    /// `(parent, inode)` pair is preferred by the host dcache, return it
    /// instead of `dentry`.
    fn materialize_unique(&self, dentry: &Arc<DentryRecord>, inode: Arc<Inode>) -> Arc<DentryRecord>;

    fn is_hashed(&self, dentry: &Arc<DentryRecord>) -> bool;
    fn hash(&self, dentry: &Arc<DentryRecord>);
    fn unhash(&self, dentry: &Arc<DentryRecord>);

    /// `move`: relocate `dentry` to `(new_parent, new_name)`, preserving
    /// whether it was hashed (spec §4.4 step 6, `d_move`).
    fn rename(&self, dentry: &Arc<DentryRecord>, new_parent: Arc<Inode>, new_name: Vec<u8>);
}

/// `splice(dn, in, prehash)`. Returns the dentry the caller
/// should continue operating on (either `dn` itself or the alias the host
/// preferred) and whether the caller's `prehash` request is still live.
pub fn splice<H: DentryHost>(
    host: &H,
    dn: Arc<DentryRecord>,
    inode: Arc<Inode>,
    mut prehash: bool,
) -> (Arc<DentryRecord>, bool) {
    if host.is_hashed(&dn) {
        host.unhash(&dn);
    }

    let result = host.materialize_unique(&dn, inode.clone());

    let out = if Arc::ptr_eq(&result, &dn) {
        *dn.target.lock() = Some(inode);
        dn
    } else {
        // An existing alias was preferred; drop ours and adopt it,
        // re-initializing its side record's target.
        *result.target.lock() = Some(inode);
        result
    };

    if prehash {
        if !host.is_hashed(&out) {
            host.hash(&out);
        }
    } else {
        prehash = false;
    }

    (out, prehash)
}

/// setattr's `ReadOnly` guard.
pub fn check_writable(inode: &Inode) -> CacheResult<()> {
    if inode.is_snapshot() {
        Err(CacheError::ReadOnly)
    } else {
        Ok(())
    }
}

/// Negative-reply handling: if `dentry` currently has
/// a different (or any) inode and the reply says it is now negative,
/// the binding must be dropped so the caller can restart the lookup.
pub fn go_negative(dentry: &DentryRecord) -> bool {
    let was_positive = dentry.is_positive();
    dentry.clear();
    was_positive
}
