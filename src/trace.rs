//! Trace assimilator and read-dir prepopulate:
//! install an MDS reply's inode/dentry trace into the cache.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::attrs::{reconcile_size, reconcile_time, ReportedAttrs, Timespec};
use crate::cache::Cache;
use crate::cap::CapMask;
use crate::clock::Jiffies;
use crate::dentry::{splice, DentryHost, DentryRecord};
use crate::error::{CacheError, CacheResult};
use crate::frag::FragId;
use crate::inode::{DirStats, Inode};
use crate::lease::{update_dentry_lease, update_inode_lease, Session};
use crate::vino::VersionedIno;

/// Decoded `inode_info`.
pub struct InodeInfo {
    pub vino: VersionedIno,
    pub version: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub rdev: u64,
    pub layout_stripe_unit: u32,
    pub layout_stripe_count: u32,
    pub truncate_seq: u32,
    pub time_warp_seq: u32,
    pub size: u64,
    pub max_size: u64,
    pub mtime: Timespec,
    pub atime: Timespec,
    pub ctime: Timespec,
    pub rctime: Timespec,
    pub files: u64,
    pub subdirs: u64,
    pub rfiles: u64,
    pub rsubdirs: u64,
    pub rbytes: u64,
    pub fragtree_splits: Vec<(FragId, u8)>,
    pub symlink: Option<Vec<u8>>,
    pub xattr_blob: Vec<u8>,
    pub is_dir: bool,
}

/// Decoded `dirfrag`.
pub struct DirFragInfo {
    pub frag: FragId,
    pub auth: i32,
    pub dist: Vec<i32>,
}

/// Decoded `lease`.
#[derive(Clone, Copy)]
pub struct LeaseInfo {
    pub mask: crate::cap::LeaseMask,
    pub duration_ms: u64,
}

/// `fill-inode` contract. If `info.version > 0 &&
/// info.version == ci.version`, the attribute-update path is skipped but
/// fragtree/dirfrag merges still happen.
pub fn fill_inode(
    inode: &Arc<Inode>,
    info: &InodeInfo,
    dir: Option<&DirFragInfo>,
    issued: CapMask,
) -> CacheResult<()> {
    {
        let mut state = inode.state.lock();
        let up_to_date = info.version > 0 && info.version == state.version;

        if !up_to_date {
            state.mode = info.mode;
            state.uid = info.uid;
            state.gid = info.gid;
            state.nlink = info.nlink;
            state.rdev = info.rdev;
            state.layout_stripe_unit = info.layout_stripe_unit;
            state.layout_stripe_count = info.layout_stripe_count;

            let mut size_state = state.size;
            let shrunk = reconcile_size(
                &mut size_state,
                &ReportedAttrs {
                    truncate_seq: info.truncate_seq,
                    size: info.size,
                    time_warp_seq: info.time_warp_seq,
                    ctime: info.ctime,
                    mtime: info.mtime,
                    atime: info.atime,
                },
            );
            state.size = size_state;
            state.max_size = info.max_size;

            // Supplemented feature: a shrink via truncate
            // resets the outstanding max_size request tracking, so a
            // later grow isn't suppressed by a stale "already requested"
            // high-water mark from before the truncate.
            if shrunk {
                state.requested_max_size = 0;
                state.wanted_max_size = 0;
            }

            let mut time_state = state.time;
            let time_warning = reconcile_time(
                &mut time_state,
                &ReportedAttrs {
                    truncate_seq: info.truncate_seq,
                    size: info.size,
                    time_warp_seq: info.time_warp_seq,
                    ctime: info.ctime,
                    mtime: info.mtime,
                    atime: info.atime,
                },
                issued,
            );
            if time_warning {
                log::warn!(
                    "{}: time_warp_seq regression or EXCL-held lag (issued={issued}, local={}, mds={})",
                    info.vino,
                    state.time.time_warp_seq,
                    info.time_warp_seq,
                );
            }
            state.time = time_state;
            state.rctime = info.rctime;

            // Supplemented feature: a locally dirtied
            // xattr edit hasn't been confirmed flushed yet, so a
            // still-stale MDS-reported blob must not clobber it.
            if state.xattr_state != crate::xattr::XattrState::Dirty {
                if info.xattr_blob.len() != state.xattr_blob.len() {
                    state.xattr_blob = info.xattr_blob.clone();
                } else {
                    state.xattr_blob.copy_from_slice(&info.xattr_blob);
                }
                state.xattr_state = crate::xattr::XattrState::Cached;
            }

            if info.is_dir {
                state.dir_stats = Some(DirStats {
                    files: info.files,
                    subdirs: info.subdirs,
                    rfiles: info.rfiles,
                    rsubdirs: info.rsubdirs,
                    rbytes: info.rbytes,
                });
            }

            state.version = info.version;
        }
    }

    if let Some(target) = &info.symlink {
        if let Ok(s) = core::str::from_utf8(target) {
            if target.len() as u64 == info.size {
                inode.set_symlink_target_once(alloc::string::String::from(s));
            }
        }
    }

    {
        let mut fragtree = inode.fragtree.lock();
        fragtree.apply_splits(&info.fragtree_splits);
        if let Some(dirfrag) = dir {
            if let Ok(node) = fragtree.get_or_create(dirfrag.frag) {
                node.auth_mds = dirfrag.auth;
                node.set_dist(&dirfrag.dist);
            }
        }
    }

    Ok(())
}

/// One step of the trace walk, operating on a
/// parent already resolved to an `Arc<Inode>` plus the decoded reply
/// slice for that step.
struct StepInputs<'a> {
    name: &'a [u8],
    dlease: LeaseInfo,
    ilease: LeaseInfo,
    /// `None` iff `d + 1 == numi`: the reply has no inode for this name,
    /// i.e. a negative reply.
    next_inode: Option<&'a InodeInfo>,
    next_dir: Option<&'a DirFragInfo>,
}

/// Walk the full reply trace and install it into `cache`.
/// Returns the final dentry reached, or `None` if `numi == 0` ("the MDS
/// returned no trace" -- a no-op, per the boundary-behavior list).
#[allow(clippy::too_many_arguments)]
pub fn assimilate(
    cache: &Arc<Cache>,
    session: &Arc<Session>,
    req_started: Jiffies,
    hz: u64,
    trace_in: &[InodeInfo],
    trace_ilease: &[LeaseInfo],
    trace_dname: &[Vec<u8>],
    trace_dlease: &[LeaseInfo],
    trace_dir: &[Option<DirFragInfo>],
    snapdirpos: Option<usize>,
    r_last_dentry: Option<Arc<DentryRecord>>,
    r_old_dentry: Option<Arc<DentryRecord>>,
) -> CacheResult<Option<Arc<DentryRecord>>> {
    if trace_in.is_empty() {
        return Ok(None);
    }

    let root_info = &trace_in[0];
    let mut cur_inode = match cache.find_inode(root_info.vino) {
        Some(existing) => existing,
        None => {
            let created = cache.get_inode(root_info.vino);
            cache.alloc_root();
            created
        }
    };
    fill_inode(&cur_inode, root_info, None, cur_inode.caps())?;

    let mut last_dentry = cache.root();
    let numd = trace_dname.len();

    for d in 0..numd {
        let step = StepInputs {
            name: &trace_dname[d],
            dlease: trace_dlease.get(d).copied().unwrap_or(LeaseInfo {
                mask: crate::cap::LeaseMask::empty(),
                duration_ms: 0,
            }),
            ilease: trace_ilease.get(d).copied().unwrap_or(LeaseInfo {
                mask: crate::cap::LeaseMask::empty(),
                duration_ms: 0,
            }),
            next_inode: trace_in.get(d + 1),
            next_dir: trace_dir.get(d + 1).and_then(|o| o.as_ref()),
        };

        // Step 1: parent lock, try-lock only -- on failure, switch to
        // no-directory-mutex mode (skip relinking, still attach/fill).
        let parent_guard = cur_inode.dir_mutex.try_lock();
        let have_dir_mutex = parent_guard.is_some();

        // Step 2: renew parent inode lease; note ICONTENT.
        let granted = update_inode_lease(
            &cur_inode,
            step.ilease.duration_ms,
            hz,
            step.ilease.mask,
            session,
            req_started,
        );
        let have_icontent = granted.contains(crate::cap::LeaseMask::ICONTENT);

        // Step 3: dentry-lease availability.
        let have_lease = have_icontent || step.dlease.mask.contains(crate::cap::LeaseMask::DN);

        // Step 4: dentry lookup. On the last step, a caller-pre-supplied
        // dentry (`r_last_dentry`) is used in place of a miss, but only if
        // it is parented correctly; otherwise it is simply dropped.
        let mut dentry = cache.lookup_dentry(&cur_inode, step.name);
        let is_last_step = d + 1 == numd;
        if is_last_step {
            if let Some(provided) = &r_last_dentry {
                if dentry.is_none() && provided.matches(&cur_inode, step.name) {
                    dentry = Some(provided.clone());
                }
            }
        }

        // Step 5: null dentry (negative reply) -- d + 1 == numi, no inode
        // info follows this name.
        let Some(next_inode_info) = step.next_inode else {
            if let Some(existing) = &dentry {
                if existing.is_positive() {
                    crate::cache::delete_dentry(cache, existing);
                    dentry = None;
                }
            }
            let negative = dentry.unwrap_or_else(|| DentryRecord::new(cur_inode.clone(), step.name.to_vec()));
            if have_lease {
                cache.materialize_unique(&negative, cur_inode.clone());
            }
            update_dentry_lease(
                &negative,
                step.dlease.mask,
                step.dlease.duration_ms,
                hz,
                session,
                req_started,
                cur_inode.state.lock().version,
            );
            drop(parent_guard);
            return Ok(Some(negative));
        };

        // Step 6: rename. If the caller is replaying a `rename` reply, the
        // old dentry moves to this step's target name and continues as
        // `dentry`; whatever lookup/`r_last_dentry` result step 4 found at
        // the new name is discarded, mirroring the original's
        // "dn is dropped, dn = old_dentry" handoff.
        if is_last_step {
            if let Some(old_dentry) = &r_old_dentry {
                cache.rename(old_dentry, cur_inode.clone(), step.name.to_vec());
                dentry = Some(old_dentry.clone());
            }
        }

        // Step 7: attach inode (vino-mismatch retry first).
        if let Some(existing) = &dentry {
            if existing.is_positive() && !existing.has_vino(next_inode_info.vino) {
                crate::cache::delete_dentry(cache, existing);
                dentry = None;
            }
        }

        let dn = dentry.unwrap_or_else(|| DentryRecord::new(cur_inode.clone(), step.name.to_vec()));

        let next_inode_record = cache.get_inode(next_inode_info.vino);
        let (dn, _prehash) = splice(cache.as_ref(), dn, next_inode_record.clone(), have_dir_mutex);

        // Step 8: renew dentry lease.
        if have_lease {
            update_dentry_lease(
                &dn,
                step.dlease.mask,
                step.dlease.duration_ms,
                hz,
                session,
                req_started,
                cur_inode.state.lock().version,
            );
        }

        // Step 9: release parent mutex (RAII drop).
        drop(parent_guard);

        // Step 10: fill inode; abort walk (without deleting ancestors) on
        // failure, matching "trace walk failures delete the
        // partially-constructed dentry and stop descending".
        if fill_inode(&next_inode_record, next_inode_info, step.next_dir, next_inode_record.caps()).is_err() {
            crate::cache::delete_dentry(cache, &dn);
            return Err(CacheError::Io);
        }

        last_dentry = Some(dn);
        cur_inode = next_inode_record;

        // Step 11: snapshot divergence.
        if let Some(pos) = snapdirpos {
            if d == trace_in.len().saturating_sub(pos + 1) {
                let snapdir_vino = VersionedIno::new(cur_inode.vino.ino, crate::vino::SNAPDIR);
                cur_inode = cache.get_inode(snapdir_vino);
            }
        }
    }

    Ok(last_dentry)
}

/// Read-dir prepopulate. Skips (logging only) entries whose
/// fill-inode fails; returns the dentries successfully installed.
pub fn prepopulate_readdir(
    cache: &Arc<Cache>,
    session: &Arc<Session>,
    req_started: Jiffies,
    hz: u64,
    parent: &Arc<Inode>,
    entries: &[(Vec<u8>, InodeInfo, LeaseInfo, LeaseInfo)],
) -> Vec<Arc<DentryRecord>> {
    let mut out = Vec::with_capacity(entries.len());

    for (name, info, dlease, ilease) in entries {
        let mut existing = cache.lookup_dentry(parent, name);

        if let Some(dn) = &existing {
            if dn.is_positive() && !dn.has_vino(info.vino) {
                crate::cache::delete_dentry(cache, dn);
                existing = None;
            }
        }

        let dn = existing.unwrap_or_else(|| DentryRecord::new(parent.clone(), name.clone()));
        let inode = cache.get_inode(info.vino);
        let (dn, _) = splice(cache.as_ref(), dn, inode.clone(), false);

        if fill_inode(&inode, info, None, inode.caps()).is_err() {
            log::debug!("prepopulate: fill-inode failed for entry, skipping");
            continue;
        }

        update_dentry_lease(&dn, dlease.mask, dlease.duration_ms, hz, session, req_started, parent.state.lock().version);
        let _ = update_inode_lease(&inode, ilease.duration_ms, hz, ilease.mask, session, req_started);

        out.push(dn);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_ts() -> Timespec {
        Timespec::new(0, 0)
    }

    fn mk_info(ino: u64) -> InodeInfo {
        InodeInfo {
            vino: VersionedIno::live(ino),
            version: 1,
            mode: 0o755,
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
            mtime: zero_ts(),
            atime: zero_ts(),
            ctime: zero_ts(),
            rctime: zero_ts(),
            files: 0,
            subdirs: 0,
            rfiles: 0,
            rsubdirs: 0,
            rbytes: 0,
            fragtree_splits: Vec::new(),
            symlink: None,
            xattr_blob: Vec::new(),
            is_dir: true,
        }
    }

    /// Scenario: applying a reply with numi == 0 changes no state.
    #[test]
    fn empty_trace_is_noop() {
        let cache = Cache::new();
        let session = Session::new(1, 0, 1_000_000);
        let result = assimilate(
            &cache,
            &session,
            0,
            crate::clock::DEFAULT_HZ,
            &[],
            &[],
            &[],
            &[],
            &[],
            None,
            None,
            None,
        )
        .unwrap();
        assert!(result.is_none());
        assert_eq!(cache.inode_count(), 0);
    }

    /// Scenario 1: trace install, 3 levels.
    #[test]
    fn three_level_trace_installs_reachable_inodes() {
        let cache = Cache::new();
        let session = Session::new(1, 0, 1_000_000);

        let root = mk_info(1);
        let dir = mk_info(100);
        let file = mk_info(101);

        let lease = LeaseInfo {
            mask: crate::cap::LeaseMask::DN,
            duration_ms: 10_000,
        };

        let result = assimilate(
            &cache,
            &session,
            1_000,
            crate::clock::DEFAULT_HZ,
            &[root, dir, file],
            &[lease, lease],
            &[Vec::from(&b"dir"[..]), Vec::from(&b"file"[..])],
            &[lease, lease],
            &[None, None, None],
            None,
            None,
            None,
        )
        .unwrap();

        assert!(result.is_some());
        assert_eq!(cache.inode_count(), 3);
        assert!(cache.find_inode(VersionedIno::live(100)).is_some());
        assert!(cache.find_inode(VersionedIno::live(101)).is_some());

        let final_dentry = result.unwrap();
        assert_eq!(final_dentry.lease.lock().ttl(), 1_000 + 10_000);
    }

    /// Step 6: a rename reply moves the old dentry to its new name instead
    /// of installing a second one.
    #[test]
    fn rename_reply_moves_old_dentry_to_new_name() {
        let cache = Cache::new();
        let session = Session::new(1, 0, 1_000_000);

        let root = mk_info(1);
        let file = mk_info(200);
        let lease = LeaseInfo {
            mask: crate::cap::LeaseMask::DN,
            duration_ms: 10_000,
        };

        // First reply: install the file at "old-name".
        let first = assimilate(
            &cache,
            &session,
            1_000,
            crate::clock::DEFAULT_HZ,
            &[root, file],
            &[lease],
            &[Vec::from(&b"old-name"[..])],
            &[lease],
            &[None, None],
            None,
            None,
            None,
        )
        .unwrap()
        .unwrap();

        let root_inode = cache.find_inode(VersionedIno::live(1)).unwrap();
        assert!(cache.lookup_dentry(&root_inode, b"old-name").is_some());

        // Second reply: the rename, carrying the old dentry as
        // `r_old_dentry` and targeting "new-name".
        let second = assimilate(
            &cache,
            &session,
            2_000,
            crate::clock::DEFAULT_HZ,
            &[root, file],
            &[lease],
            &[Vec::from(&b"new-name"[..])],
            &[lease],
            &[None, None],
            None,
            None,
            Some(first.clone()),
        )
        .unwrap()
        .unwrap();

        assert!(Arc::ptr_eq(&second, &first));
        assert!(cache.lookup_dentry(&root_inode, b"old-name").is_none());
        let at_new_name = cache.lookup_dentry(&root_inode, b"new-name").unwrap();
        assert!(Arc::ptr_eq(&at_new_name, &first));
        assert!(at_new_name.has_vino(VersionedIno::live(200)));
    }

    /// Supplemented feature: a shrink via truncate resets
    /// outstanding max_size request tracking.
    #[test]
    fn shrink_resets_requested_max_size_tracking() {
        let inode = Inode::new(VersionedIno::live(9));
        {
            let mut state = inode.state.lock();
            state.requested_max_size = 4096;
            state.wanted_max_size = 4096;
        }

        let mut info = mk_info(9);
        info.version = 1;
        info.size = 100;
        info.truncate_seq = 1;

        fill_inode(&inode, &info, None, crate::cap::CapMask::empty()).unwrap();

        let mut shrunk_info = mk_info(9);
        shrunk_info.version = 2;
        shrunk_info.size = 10;
        shrunk_info.truncate_seq = 2;
        fill_inode(&inode, &shrunk_info, None, crate::cap::CapMask::empty()).unwrap();

        let state = inode.state.lock();
        assert_eq!(state.requested_max_size, 0);
        assert_eq!(state.wanted_max_size, 0);
    }
}
