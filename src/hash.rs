//! Dentry-cache hashing, built around a small multiplicative `KernelHasher`.

use core::hash::Hasher;

#[derive(Default)]
pub struct KernelHasher {
    cur: u64,
}

impl Hasher for KernelHasher {
    fn finish(&self) -> u64 {
        self.cur
    }

    fn write(&mut self, bytes: &[u8]) {
        const SEED: u64 = 131;
        for &byte in bytes {
            self.cur = self.cur.wrapping_mul(SEED).wrapping_add(byte as u64)
        }
    }
}

/// Hash a (parent inode identity, name) pair the way the dentry cache keys
/// lookups in the trace assimilator: hash the name, then look up
/// `(parent, name)`.
pub fn hash_dentry_key(parent_addr: usize, name: &[u8]) -> u64 {
    use core::hash::{BuildHasher, BuildHasherDefault};

    let builder: BuildHasherDefault<KernelHasher> = Default::default();
    let mut hasher = builder.build_hasher();
    hasher.write_usize(parent_addr);
    hasher.write(name);
    hasher.finish()
}
