//! Little-endian byte encoding shared by the index snapshot formats.
//!
//! Writing appends to a `Vec<u8>` and cannot fail. Reading walks a borrowed
//! slice; running out of bytes is reported as [`IndexError::CorruptData`].

use crate::error::{IndexError, IndexResult};
use crate::metric::Metric;
use crate::space::MetricSpace;
use byteorder::{LittleEndian, ReadBytesExt};

/// Append-only little-endian writer.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_f32s(&mut self, values: &[f32]) {
        for &v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// `dim` as `u32` followed by the metric byte.
    pub fn put_space(&mut self, space: &MetricSpace) {
        self.put_u32(space.num_dimensions() as u32);
        self.put_u8(space.metric().to_byte());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Little-endian reader over a byte slice.
#[derive(Debug)]
pub struct ByteReader<'a> {
    rest: &'a [u8],
}

fn truncated(what: &str) -> IndexError {
    IndexError::CorruptData(format!("buffer truncated while reading {}", what))
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { rest: data }
    }

    /// Consume `magic` or fail with `CorruptData`.
    pub fn expect_magic(&mut self, magic: &[u8]) -> IndexResult<()> {
        if self.rest.len() < magic.len() || &self.rest[..magic.len()] != magic {
            return Err(IndexError::CorruptData("invalid magic bytes".into()));
        }
        self.rest = &self.rest[magic.len()..];
        Ok(())
    }

    pub fn u8(&mut self, what: &str) -> IndexResult<u8> {
        self.rest.read_u8().map_err(|_| truncated(what))
    }

    pub fn u32(&mut self, what: &str) -> IndexResult<u32> {
        self.rest
            .read_u32::<LittleEndian>()
            .map_err(|_| truncated(what))
    }

    pub fn u64(&mut self, what: &str) -> IndexResult<u64> {
        self.rest
            .read_u64::<LittleEndian>()
            .map_err(|_| truncated(what))
    }

    pub fn i64(&mut self, what: &str) -> IndexResult<i64> {
        self.rest
            .read_i64::<LittleEndian>()
            .map_err(|_| truncated(what))
    }

    /// A `u64` length field that must fit in `usize`.
    pub fn len_u64(&mut self, what: &str) -> IndexResult<usize> {
        let v = self.u64(what)?;
        usize::try_from(v)
            .map_err(|_| IndexError::CorruptData(format!("{} out of range: {}", what, v)))
    }

    /// Read `n` floats, appending them to `out`.
    pub fn f32s_into(&mut self, n: usize, out: &mut Vec<f32>, what: &str) -> IndexResult<()> {
        let bytes = n
            .checked_mul(4)
            .ok_or_else(|| IndexError::CorruptData(format!("{} length overflow", what)))?;
        if self.rest.len() < bytes {
            return Err(truncated(what));
        }
        out.reserve(n);
        for _ in 0..n {
            out.push(
                self.rest
                    .read_f32::<LittleEndian>()
                    .map_err(|_| truncated(what))?,
            );
        }
        Ok(())
    }

    /// Read a space header written by [`ByteWriter::put_space`] and check it
    /// against `space`. Any difference is `CorruptData`.
    pub fn expect_space(&mut self, space: &MetricSpace) -> IndexResult<()> {
        let dim = self.u32("dimensions")? as usize;
        if dim != space.num_dimensions() {
            return Err(IndexError::CorruptData(format!(
                "data has {} dimensions, index expects {}",
                dim,
                space.num_dimensions()
            )));
        }
        let byte = self.u8("space kind")?;
        let metric = Metric::from_byte(byte)
            .ok_or_else(|| IndexError::CorruptData(format!("unknown space kind {}", byte)))?;
        if metric != space.metric() {
            return Err(IndexError::CorruptData(format!(
                "data uses the {} space, index uses {}",
                metric,
                space.metric()
            )));
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Fail unless the whole buffer was consumed.
    pub fn finish(self) -> IndexResult<()> {
        if !self.rest.is_empty() {
            return Err(IndexError::CorruptData(format!(
                "{} trailing bytes after index data",
                self.rest.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_write_then_read() {
        let mut w = ByteWriter::default();
        w.put_bytes(b"MAGIC");
        w.put_u8(2);
        w.put_u32(0xDEAD_BEEF);
        w.put_i64(-1);
        w.put_f32s(&[1.5, -2.0]);
        let bytes = w.into_inner();

        let mut r = ByteReader::new(&bytes);
        r.expect_magic(b"MAGIC").unwrap();
        assert_eq!(r.u8("kind").unwrap(), 2);
        assert_eq!(r.u32("word").unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.i64("entry").unwrap(), -1);
        let mut v = Vec::new();
        r.f32s_into(2, &mut v, "vector").unwrap();
        assert_eq!(v, vec![1.5, -2.0]);
        r.finish().unwrap();
    }

    #[test]
    fn test_truncation_is_corrupt_data() {
        let bytes = [1u8, 2, 3];
        let mut r = ByteReader::new(&bytes);
        let err = r.u32("count").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert!(err.to_string().contains("count"));

        let mut r = ByteReader::new(b"NOPE");
        assert_eq!(r.expect_magic(b"MAGIC").unwrap_err().kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_space_header() {
        let l2 = MetricSpace::new("l2", 4).unwrap();
        let mut w = ByteWriter::default();
        w.put_space(&l2);
        let bytes = w.into_inner();
        assert_eq!(bytes, vec![4, 0, 0, 0, 0]);

        ByteReader::new(&bytes).expect_space(&l2).unwrap();
        for other in [
            MetricSpace::new("ip", 4).unwrap(),
            MetricSpace::new("l2", 3).unwrap(),
        ] {
            let err = ByteReader::new(&bytes).expect_space(&other).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CorruptData);
        }
        let err = ByteReader::new(&[4, 0, 0, 0, 9]).expect_space(&l2).unwrap_err();
        assert!(err.to_string().contains("unknown space kind 9"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let r = ByteReader::new(&[0u8; 2]);
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.finish().unwrap_err().kind(), ErrorKind::CorruptData);
    }
}
