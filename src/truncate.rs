//! Pending truncate worker.

use crate::inode::Inode;

/// `set_vmtruncate_to(inode, to)`: called by cap processing when the MDS
/// commits a size smaller than what the page cache holds.
pub fn set_vmtruncate_to(inode: &Inode, to: u64) {
    inode.state.lock().pending_truncate_to = Some(to);
}

/// What the caller of [`apply_pending`] must do with pages, and whether a
/// cap check should follow. The actual page-cache truncation is a host
/// VFS concern; this module only owns the atomic
/// read-and-clear and the `wrbuffer_ref == 0` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateOutcome {
    /// Nothing was pending.
    NoOp,
    /// Truncate pages to this size; `schedule_cap_check` says whether
    /// `wrbuffer_ref == 0` held at the moment of consuming the request.
    Apply { to: u64, schedule_cap_check: bool },
}

/// `apply_pending(inode)`, run under the inode's spinlock (standing in
/// for the "inode write mutex" the spec names, since this cache has no
/// separate i_mutex of its own -- see the reconciler, per-inode spinlock covers
/// attribute mutation including this field).
pub fn apply_pending(inode: &Inode) -> TruncateOutcome {
    let mut state = inode.state.lock();
    match state.pending_truncate_to.take() {
        None => TruncateOutcome::NoOp,
        Some(to) => {
            // Invariant 8: reset is atomic with reading wrbuffer_ref.
            let schedule_cap_check = state.refs.wrbuffer == 0;
            TruncateOutcome::Apply { to, schedule_cap_check }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vino::VersionedIno;

    #[test]
    fn apply_pending_is_noop_when_nothing_set() {
        let inode = Inode::new(VersionedIno::live(1));
        assert_eq!(apply_pending(&inode), TruncateOutcome::NoOp);
    }

    #[test]
    fn apply_pending_consumes_and_clears() {
        let inode = Inode::new(VersionedIno::live(1));
        set_vmtruncate_to(&inode, 4096);

        let outcome = apply_pending(&inode);
        assert_eq!(
            outcome,
            TruncateOutcome::Apply {
                to: 4096,
                schedule_cap_check: true
            }
        );
        assert_eq!(apply_pending(&inode), TruncateOutcome::NoOp);
    }

    #[test]
    fn apply_pending_does_not_schedule_check_with_live_wrbuffer() {
        let inode = Inode::new(VersionedIno::live(1));
        inode.state.lock().refs.wrbuffer = 1;
        set_vmtruncate_to(&inode, 4096);

        assert_eq!(
            apply_pending(&inode),
            TruncateOutcome::Apply {
                to: 4096,
                schedule_cap_check: false
            }
        );
    }
}
