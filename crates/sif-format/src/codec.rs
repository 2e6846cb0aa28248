//! Fixed-width little-endian field codec
//!
//! Header and descriptor records are packed field after field with no padding.
//! [`FieldReader`] and [`FieldWriter`] walk a record buffer in declaration
//! order so the parsers never hand-compute byte offsets.

use sif_core::{Error, Result};

/// Sequential reader over a fixed-size record
pub struct FieldReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    record: &'static str,
}

impl<'a> FieldReader<'a> {
    /// Start reading `record` (used in error messages) from `bytes`
    pub fn new(bytes: &'a [u8], record: &'static str) -> Self {
        Self {
            bytes,
            pos: 0,
            record,
        }
    }

    /// Current byte position within the record
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Take the next `len` bytes
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.bytes.len());
        let Some(end) = end else {
            return Err(Error::malformed(format!(
                "{} truncated: need {} bytes at offset {}, have {}",
                self.record,
                len,
                self.pos,
                self.bytes.len()
            )));
        };
        let field = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(field)
    }

    /// Take the next `N` bytes as an array
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }
}

/// Sequential writer over a fixed-size record buffer
pub struct FieldWriter<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Current byte position within the record
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Write `field` into a slot of exactly `width` bytes, zero-padding the rest
    ///
    /// Panics if the record buffer is too small; record sizes are constants
    /// checked by the callers' tests.
    pub fn padded(&mut self, field: &[u8], width: usize) {
        let slot = &mut self.bytes[self.pos..self.pos + width];
        let n = field.len().min(width);
        slot[..n].copy_from_slice(&field[..n]);
        slot[n..].fill(0);
        self.pos += width;
    }

    pub fn bytes(&mut self, field: &[u8]) {
        self.padded(field, field.len());
    }

    pub fn u8(&mut self, value: u8) {
        self.bytes(&[value]);
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn i32(&mut self, value: i32) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn i64(&mut self, value: i64) {
        self.bytes(&value.to_le_bytes());
    }
}

/// Decode a NUL-terminated (or NUL-padded) string field
pub fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_walks_fields() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x4004u32.to_le_bytes());
        buf.push(1);
        buf.extend_from_slice(&(-5i64).to_le_bytes());

        let mut r = FieldReader::new(&buf, "test record");
        assert_eq!(r.u32().unwrap(), 0x4004);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.i64().unwrap(), -5);
        assert_eq!(r.position(), 13);
    }

    #[test]
    fn test_reader_truncated() {
        let buf = [0u8; 3];
        let mut r = FieldReader::new(&buf, "test record");
        let err = r.u32().unwrap_err();
        assert!(matches!(err, Error::MalformedDescriptor(ref m) if m.contains("test record")));
    }

    #[test]
    fn test_writer_pads() {
        let mut buf = [0xFFu8; 8];
        let mut w = FieldWriter::new(&mut buf);
        w.padded(b"ab", 4);
        w.u32(7);
        assert_eq!(w.position(), 8);
        assert_eq!(&buf, &[b'a', b'b', 0, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn test_cstr() {
        assert_eq!(cstr(b"SIF_MAGIC\0"), "SIF_MAGIC");
        assert_eq!(cstr(b"rootfs\0\0\0"), "rootfs");
        assert_eq!(cstr(b"full"), "full");
    }
}
