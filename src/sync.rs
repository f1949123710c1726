//! Lock primitives used throughout the cache.
//!
//! Acquisition order is session -> inode spinlock -> dentry spinlock (see
//! the reconciler). The fragtree mutex is a leaf and must never be held while
//! acquiring any of the above.

pub type Spin<T> = spin::Mutex<T>;
pub type SpinGuard<'a, T> = spin::MutexGuard<'a, T>;
