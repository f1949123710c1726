//! Error surface exposed to the host VFS.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    NotFound,
    ReadOnly,
    NotSupported,
    NoData,
    Range,
    Io,
    OutOfMemory,
    Invalid,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheError::NotFound => "not found",
            CacheError::ReadOnly => "read-only (snapshot)",
            CacheError::NotSupported => "not supported",
            CacheError::NoData => "no data",
            CacheError::Range => "buffer too small",
            CacheError::Io => "malformed reply data",
            CacheError::OutOfMemory => "out of memory",
            CacheError::Invalid => "invalid argument",
        };
        f.write_str(s)
    }
}

impl core::error::Error for CacheError {}

pub type CacheResult<T> = Result<T, CacheError>;
