// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

//==============================================================================
// Buffer
//==============================================================================

/// An owned, reference-counted byte range. Cloning a [Buffer] is cheap (it
/// bumps a refcount); [trim_prefix] and [trim_suffix] produce non-owning
/// views over the same backing storage rather than copying.
#[derive(Clone, Default)]
pub struct Buffer {
    bytes: Option<Arc<[u8]>>,
    offset: usize,
    len: usize,
}

/// Associate functions for [Buffer].
impl Buffer {
    /// An empty buffer that owns no storage.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Copies `data` into a freshly allocated, owned buffer.
    pub fn copy_from(data: &[u8]) -> Self {
        Self {
            bytes: Some(Arc::from(data)),
            offset: 0,
            len: data.len(),
        }
    }

    /// Builds a buffer from an iterator of bytes, without an intermediate
    /// `Vec` allocation beyond what `Arc::from_iter` needs.
    pub fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let bytes: Arc<[u8]> = iter.into_iter().collect();
        let len = bytes.len();
        Self { bytes: Some(bytes), offset: 0, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a view with the first `n` bytes dropped. Panics if `n` is
    /// larger than the buffer.
    pub fn trim_prefix(&self, n: usize) -> Self {
        assert!(n <= self.len, "trim_prefix past end of buffer: {} vs. {}", n, self.len);
        Self {
            bytes: self.bytes.clone(),
            offset: self.offset + n,
            len: self.len - n,
        }
    }

    /// Returns a view with the last `n` bytes dropped. Panics if `n` is
    /// larger than the buffer.
    pub fn trim_suffix(&self, n: usize) -> Self {
        assert!(n <= self.len, "trim_suffix past start of buffer: {} vs. {}", n, self.len);
        Self {
            bytes: self.bytes.clone(),
            offset: self.offset,
            len: self.len - n,
        }
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        self.deref() == other.deref()
    }
}
impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Buffer({:?})", &self[..])
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self.bytes {
            None => &[],
            Some(ref bytes) => &bytes[self.offset..(self.offset + self.len)],
        }
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Self::copy_from(data)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        let len = data.len();
        Self { bytes: Some(Arc::from(data)), offset: 0, len }
    }
}

impl From<&str> for Buffer {
    fn from(data: &str) -> Self {
        Self::copy_from(data.as_bytes())
    }
}

impl From<String> for Buffer {
    fn from(data: String) -> Self {
        Self::from(data.into_bytes())
    }
}

//==============================================================================
// MutableBuffer
//==============================================================================

/// A growable, uniquely-owned byte buffer used as the backing storage for a
/// [crate::io::BufferedReader]. Splits into a read window (data already
/// received, awaiting consumption) and a write window (free space for the
/// next read).
pub struct MutableBuffer {
    data: Vec<u8>,
    /// Start of the unconsumed read window.
    read_start: usize,
    /// End of the unconsumed read window / start of the write window.
    read_end: usize,
    /// Ceiling the backing allocation is never grown past.
    max_capacity: usize,
}

impl MutableBuffer {
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Self {
        assert!(initial_capacity <= max_capacity);
        Self {
            data: vec![0u8; initial_capacity],
            read_start: 0,
            read_end: 0,
            max_capacity,
        }
    }

    /// The unconsumed bytes available to be read out.
    pub fn read_window(&self) -> &[u8] {
        &self.data[self.read_start..self.read_end]
    }

    /// Drops the first `n` bytes of the read window; they have been consumed.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.read_end - self.read_start);
        self.read_start += n;
        if self.read_start == self.read_end {
            self.read_start = 0;
            self.read_end = 0;
        }
    }

    /// Ensures at least `needed` bytes of write space exist after the read
    /// window, shifting the read window to the start of the backing array
    /// first if that alone is enough, otherwise doubling the backing array
    /// (bounded by `max_capacity`).
    ///
    /// Fails with `Fail::ResourceExhausted` if `needed` can never fit under
    /// `max_capacity`.
    pub fn reserve(&mut self, needed: usize) -> Result<(), crate::fail::Fail> {
        if self.data.len() - self.read_end >= needed {
            return Ok(());
        }

        // Shifting the read window back to the start may free enough space
        // without growing the allocation at all.
        if self.read_start > 0 {
            self.data.copy_within(self.read_start..self.read_end, 0);
            self.read_end -= self.read_start;
            self.read_start = 0;
            if self.data.len() - self.read_end >= needed {
                return Ok(());
            }
        }

        let required = self.read_end + needed;
        if required > self.max_capacity {
            return Err(crate::fail::Fail::ResourceExhausted {
                message: format!(
                    "buffered reader needs {} bytes, exceeding the {} byte maximum",
                    required, self.max_capacity
                ),
            });
        }

        let mut new_capacity = self.data.len().max(1);
        while new_capacity < required {
            new_capacity = (new_capacity * 2).min(self.max_capacity).max(new_capacity + 1);
        }
        self.data.resize(new_capacity, 0);
        Ok(())
    }

    /// The free space following the read window, ready to be written into by
    /// the underlying source's next `read()`.
    pub fn write_window(&mut self) -> &mut [u8] {
        &mut self.data[self.read_end..]
    }

    /// Marks `n` bytes, just written into the write window, as now part of
    /// the read window.
    pub fn commit_write(&mut self, n: usize) {
        assert!(self.read_end + n <= self.data.len());
        self.read_end += n;
    }
}

impl Deref for MutableBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.read_window()
    }
}

impl DerefMut for MutableBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        let (start, end) = (self.read_start, self.read_end);
        &mut self.data[start..end]
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_prefix_is_a_view() {
        let buf = Buffer::copy_from(&[1, 2, 3, 4]);
        let trimmed = buf.trim_prefix(2);
        assert_eq!(&trimmed[..], &[3, 4]);
        assert_eq!(&buf[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn trim_suffix_is_a_view() {
        let buf = Buffer::copy_from(&[1, 2, 3, 4]);
        let trimmed = buf.trim_suffix(2);
        assert_eq!(&trimmed[..], &[1, 2]);
    }

    #[test]
    fn equality_is_by_content() {
        assert_eq!(Buffer::copy_from(b"abc"), Buffer::from("abc"));
    }

    #[test]
    fn mutable_buffer_reserve_shifts_before_growing() {
        let mut buf = MutableBuffer::new(4, 16);
        buf.write_window()[..4].copy_from_slice(b"abcd");
        buf.commit_write(4);
        buf.consume(2);
        // 2 bytes of free space exist only before the read window; reserving
        // 2 more should shift rather than grow the allocation.
        buf.reserve(2).unwrap();
        assert_eq!(buf.data.len(), 4);
        assert_eq!(buf.read_window(), b"cd");
    }

    #[test]
    fn mutable_buffer_reserve_fails_past_max() {
        let mut buf = MutableBuffer::new(4, 8);
        assert!(buf.reserve(9).is_err());
    }
}
