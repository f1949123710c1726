//! Client-side metadata cache: inode and dentry records, capability and
//! lease bookkeeping, and MDS trace assimilation for a distributed
//! filesystem client.
//!
//! The cache keeps no global state. Every entry point into it is a method
//! on a `Cache` handle (see [`cache::Cache`]); callers own the handle and
//! decide its lifetime.

#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod attrs;
mod cache;
mod cap;
mod clock;
mod dentry;
mod error;
mod frag;
mod hash;
mod inode;
mod io;
mod lease;
mod sync;
mod trace;
mod truncate;
mod vino;
mod xattr;

#[cfg(any(test, feature = "std"))]
pub mod testing;

pub use attrs::{SizeState, TimeState, Timespec};
pub use cache::Cache;
pub use cap::{CapMask, LeaseMask};
pub use clock::{Jiffies, DEFAULT_HZ};
pub use dentry::DentryRecord;
pub use error::{CacheError, CacheResult};
pub use frag::{FragId, FragNode};
pub use inode::{Inode, InodeState};
pub use io::{Buffer, ByteBuffer, FillResult, LengthBuffer};
pub use lease::{inode_lease_valid, update_inode_lease, Session};
pub use trace::{assimilate, fill_inode, prepopulate_readdir, DirFragInfo, InodeInfo, LeaseInfo};
pub use vino::VersionedIno;
pub use xattr::{
    apply_remove as apply_remove_xattr, apply_set as apply_set_xattr, get as get_xattr, list as list_xattr,
    mark_dirty as mark_xattr_dirty, mark_synced as mark_xattr_synced, validate_remove, validate_set, XattrState,
};
