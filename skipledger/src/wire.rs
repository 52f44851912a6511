//! Checked big-endian reads over a shared byte buffer.
//!
//! Every packaged format in this workspace is big-endian with raw 32-byte
//! hashes. Decoders must never panic on truncated or malformed input, so all
//! reads go through [`Reader`], which tracks the byte offset for error
//! reporting and hands out zero-copy [`Bytes`] slices of the backing buffer.

use bytes::Bytes;

use crate::hash::HashBytes;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of input at byte {offset}: needed {needed} more byte(s)")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("{reason} at byte {offset}")]
    BadFormat { offset: usize, reason: String },
}

pub struct Reader {
    data: Bytes,
    pos: usize,
}

impl Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Format violation at the current offset.
    pub fn bad(&self, reason: impl Into<String>) -> WireError {
        WireError::BadFormat {
            offset: self.pos,
            reason: reason.into(),
        }
    }

    pub fn take(&mut self, len: usize) -> Result<Bytes, WireError> {
        if self.remaining() < len {
            return Err(WireError::UnexpectedEof {
                offset: self.pos,
                needed: len - self.remaining(),
            });
        }
        let slice = self.data.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        if self.remaining() < N {
            return Err(WireError::UnexpectedEof {
                offset: self.pos,
                needed: N - self.remaining(),
            });
        }
        let mut out = [0; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        self.take_array::<1>().map(|b| b[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        self.take_array().map(u16::from_be_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        self.take_array().map(u32::from_be_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        self.take_array().map(u64::from_be_bytes)
    }

    /// Unsigned big-endian integer of `width` bytes, `1..=8`.
    pub fn read_uint(&mut self, width: usize) -> Result<u64, WireError> {
        debug_assert!((1..=8).contains(&width));
        let mut out = 0u64;
        for _ in 0..width {
            out = (out << 8) | u64::from(self.read_u8()?);
        }
        Ok(out)
    }

    pub fn read_hash(&mut self) -> Result<HashBytes, WireError> {
        self.take_array().map(HashBytes)
    }

    /// Trailing garbage after a self-delimited object is a format error.
    pub fn expect_end(&self) -> Result<(), WireError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(WireError::BadFormat {
                offset: self.pos,
                reason: format!("{} trailing byte(s)", self.remaining()),
            })
        }
    }
}

/// Appends an unsigned big-endian integer of `width` bytes, `1..=8`.
///
/// # Panics
///
/// Panics if `value` does not fit in `width` bytes.
pub fn put_uint(out: &mut Vec<u8>, value: u64, width: usize) {
    assert!((1..=8).contains(&width));
    assert!(
        width == 8 || value < (1 << (8 * width)),
        "{value} does not fit in {width} byte(s)"
    );
    out.extend_from_slice(&value.to_be_bytes()[8 - width..]);
}

/// Minimum bytes needed to encode `max_value`, at least 1.
pub fn uint_width(max_value: u64) -> usize {
    let bits = u64::BITS - max_value.leading_zeros();
    (bits as usize).div_ceil(8).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_reads() {
        let mut reader = Reader::new(Bytes::from_static(&[0x01, 0x02, 0x03]));
        assert_eq!(reader.read_u16().unwrap(), 0x0102);
        assert!(matches!(
            reader.read_u32(),
            Err(WireError::UnexpectedEof { offset: 2, needed: 3 })
        ));
        assert_eq!(reader.read_u8().unwrap(), 0x03);
        assert!(reader.expect_end().is_ok());
    }

    #[test]
    fn uint_round_trip() {
        for (value, width) in [(0u64, 1), (255, 1), (256, 2), (0xff_ffff, 3), (1 << 40, 6)] {
            assert_eq!(uint_width(value), width);
            let mut buf = Vec::new();
            put_uint(&mut buf, value, width);
            assert_eq!(buf.len(), width);
            let mut reader = Reader::new(Bytes::from(buf));
            assert_eq!(reader.read_uint(width).unwrap(), value);
        }
    }

    #[test]
    fn zero_copy_take() {
        let data = Bytes::from(vec![7u8; 40]);
        let mut reader = Reader::new(data.clone());
        let head = reader.take(8).unwrap();
        assert_eq!(head.as_ref(), &data[..8]);
        let hash = reader.read_hash().unwrap();
        assert_eq!(hash, HashBytes([7; 32]));
        assert_eq!(reader.offset(), 40);
    }
}
