//! The top-level cache handle. Owns the inode-by-vino map, a sharded dentry cache, and
//! the session table; every other module takes references derived from
//! here rather than reaching for globals -- no state lives outside an
//! explicit handle.
//!
//! The dcache sharding mirrors a `[RCUList<Dentry>; 1 << DCACHE_HASH_BITS]`
//! style dentry cache, replacing the RCU intrusive list with a plain
//! `Vec` per bucket under a spinlock since there is no RCU reclamation
//! machinery here -- a lock per bucket is the direct replacement.

use alloc::collections::btree_map::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::dentry::{DentryHost, DentryRecord};
use crate::inode::Inode;
use crate::lease::Session;
use crate::sync::Spin;
use crate::vino::VersionedIno;

const DCACHE_HASH_BITS: u32 = 8;
const DCACHE_BUCKETS: usize = 1 << DCACHE_HASH_BITS;

pub struct Cache {
    inodes: Spin<BTreeMap<VersionedIno, Arc<Inode>>>,
    dcache: Vec<Spin<Vec<Arc<DentryRecord>>>>,
    sessions: Spin<BTreeMap<u32, Arc<Session>>>,
    root: Spin<Option<Arc<DentryRecord>>>,
}

impl Cache {
    pub fn new() -> Arc<Self> {
        let mut dcache = Vec::with_capacity(DCACHE_BUCKETS);
        for _ in 0..DCACHE_BUCKETS {
            dcache.push(Spin::new(Vec::new()));
        }

        Arc::new(Self {
            inodes: Spin::new(BTreeMap::new()),
            dcache,
            sessions: Spin::new(BTreeMap::new()),
            root: Spin::new(None),
        })
    }

    fn bucket(&self, hash: u64) -> &Spin<Vec<Arc<DentryRecord>>> {
        &self.dcache[hash as usize & (DCACHE_BUCKETS - 1)]
    }

    /// `ceph_get_inode(sb, vino)`: returns the existing record on a hit,
    /// allocates on a miss. Lookups always return the same record for
    /// equal vinos.
    pub fn get_inode(&self, vino: VersionedIno) -> Arc<Inode> {
        let mut inodes = self.inodes.lock();
        inodes.entry(vino).or_insert_with(|| Inode::new(vino)).clone()
    }

    pub fn find_inode(&self, vino: VersionedIno) -> Option<Arc<Inode>> {
        self.inodes.lock().get(&vino).cloned()
    }

    pub fn inode_count(&self) -> usize {
        self.inodes.lock().len()
    }

    pub fn root(&self) -> Option<Arc<DentryRecord>> {
        self.root.lock().clone()
    }

    /// Allocate the root dentry on first mount. Must
    /// only be called once; subsequent calls are no-ops.
    pub fn alloc_root(&self) -> Arc<DentryRecord> {
        let inode = self.get_inode(VersionedIno::root());
        let mut root = self.root.lock();
        if let Some(existing) = root.as_ref() {
            return existing.clone();
        }
        let dentry = DentryRecord::new(inode.clone(), Vec::new());
        dentry.bind_target(inode);
        *root = Some(dentry.clone());
        dentry
    }

    pub fn lookup_dentry(&self, parent: &Arc<Inode>, name: &[u8]) -> Option<Arc<DentryRecord>> {
        let hash = crate::hash::hash_dentry_key(Arc::as_ptr(parent) as usize, name);
        self.bucket(hash).lock().iter().find(|d| d.matches(parent, name)).cloned()
    }

    pub fn register_session(&self, session: Arc<Session>) {
        self.sessions.lock().insert(session.mds, session);
    }

    pub fn session(&self, mds: u32) -> Option<Arc<Session>> {
        self.sessions.lock().get(&mds).cloned()
    }
}

impl DentryHost for Cache {
    fn materialize_unique(&self, dentry: &Arc<DentryRecord>, _inode: Arc<Inode>) -> Arc<DentryRecord> {
        let mut bucket = self.bucket(dentry.hash()).lock();
        if let Some(existing) = bucket.iter().find(|d| d.matches(&dentry.parent(), &dentry.name())) {
            return existing.clone();
        }
        bucket.push(dentry.clone());
        dentry.clone()
    }

    fn is_hashed(&self, dentry: &Arc<DentryRecord>) -> bool {
        self.bucket(dentry.hash()).lock().iter().any(|d| Arc::ptr_eq(d, dentry))
    }

    fn hash(&self, dentry: &Arc<DentryRecord>) {
        let mut bucket = self.bucket(dentry.hash()).lock();
        if !bucket.iter().any(|d| Arc::ptr_eq(d, dentry)) {
            bucket.push(dentry.clone());
        }
    }

    fn unhash(&self, dentry: &Arc<DentryRecord>) {
        self.bucket(dentry.hash()).lock().retain(|d| !Arc::ptr_eq(d, dentry));
    }

    /// `d_move`: relocate `dentry` to `(new_parent, new_name)`, preserving
    /// hashed state across the move (spec §4.4 step 6).
    fn rename(&self, dentry: &Arc<DentryRecord>, new_parent: Arc<Inode>, new_name: Vec<u8>) {
        let was_hashed = self.is_hashed(dentry);
        if was_hashed {
            self.unhash(dentry);
        }
        dentry.rename_to(new_parent, new_name);
        if was_hashed {
            self.hash(dentry);
        }
    }
}

/// Deletes a dentry from the cache outright, used by the trace
/// assimilator's stale-dentry handling.
pub fn delete_dentry(cache: &Cache, dentry: &Arc<DentryRecord>) {
    cache.unhash(dentry);
}
