//! Sized-buffer contract used by the xattr Get/List operations:
//! `size == 0` must report the required length without copying, and a
//! buffer shorter than the required length must fail with `Range` rather
//! than silently truncating.

use crate::error::{CacheError, CacheResult};

pub enum FillResult {
    Done(usize),
    Partial(usize),
    Full,
}

impl FillResult {
    pub fn ok_or_range(self) -> CacheResult<usize> {
        match self {
            FillResult::Done(n) => Ok(n),
            _ => Err(CacheError::Range),
        }
    }
}

pub trait Buffer {
    /// Total capacity of the buffer. `0` means "measure only".
    fn total(&self) -> usize;
    fn fill(&mut self, data: &[u8]) -> FillResult;
}

/// A `Buffer` backed by a caller-owned byte slice.
pub struct ByteBuffer<'a> {
    buf: &'a mut [u8],
    cur: usize,
}

impl<'a> ByteBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, cur: 0 }
    }

    pub fn available(&self) -> usize {
        self.buf.len() - self.cur
    }

    pub fn written(&self) -> usize {
        self.cur
    }
}

impl Buffer for ByteBuffer<'_> {
    fn total(&self) -> usize {
        self.buf.len()
    }

    fn fill(&mut self, data: &[u8]) -> FillResult {
        match self.available() {
            0 => FillResult::Full,
            n if n < data.len() => {
                self.buf[self.cur..self.cur + n].copy_from_slice(&data[..n]);
                self.cur += n;
                FillResult::Partial(n)
            }
            _ => {
                self.buf[self.cur..self.cur + data.len()].copy_from_slice(data);
                self.cur += data.len();
                FillResult::Done(data.len())
            }
        }
    }
}

/// A `Buffer` that never copies, just counts — used for "measure only"
/// (`size == 0`) calls.
pub struct LengthBuffer {
    len: usize,
}

impl LengthBuffer {
    pub const fn new() -> Self {
        Self { len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

impl Buffer for LengthBuffer {
    fn total(&self) -> usize {
        0
    }

    fn fill(&mut self, data: &[u8]) -> FillResult {
        self.len += data.len();
        FillResult::Done(data.len())
    }
}
