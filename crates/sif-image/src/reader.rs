//! Bounded reader over one object's payload

use std::io::{self, Read, Seek, SeekFrom};

/// A `Read + Seek` window over the payload of a single object.
///
/// Positions are relative to the payload start; reads stop at the payload end
/// even when the backing store continues.
///
/// # Example
///
/// ```rust
/// use sif_image::ObjectReader;
/// use std::io::{Cursor, Read};
///
/// let store = Cursor::new(b"headerPAYLOADtrailer".to_vec());
/// let mut reader = ObjectReader::new(store, 6, 7).unwrap();
///
/// let mut payload = String::new();
/// reader.read_to_string(&mut payload).unwrap();
/// assert_eq!(payload, "PAYLOAD");
/// ```
pub struct ObjectReader<R: Read + Seek> {
    inner: R,
    offset: u64,
    size: u64,
    position: u64,
}

impl<R: Read + Seek> ObjectReader<R> {
    /// Open a window of `size` bytes starting at file offset `offset`
    ///
    /// # Errors
    ///
    /// Returns an error if seeking to `offset` fails
    pub fn new(mut inner: R, offset: u64, size: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(offset))?;

        Ok(Self {
            inner,
            offset,
            size,
            position: 0,
        })
    }

    /// File offset of the payload
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left before the payload end
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.position)
    }
}

impl<R: Read + Seek> Read for ObjectReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(0);
        }

        let to_read = usize::try_from(remaining).map_or(buf.len(), |r| buf.len().min(r));

        // The store may be shared with other readers between calls
        self.inner
            .seek(SeekFrom::Start(self.offset + self.position))?;
        let n = self.inner.read(&mut buf[..to_read])?;
        self.position += n as u64;

        Ok(n)
    }
}

impl<R: Read + Seek> Seek for ObjectReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek before start of object",
            ));
        };
        if target > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Seek past end of object",
            ));
        }

        self.position = target;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store() -> Cursor<Vec<u8>> {
        Cursor::new((0..100).collect())
    }

    #[test]
    fn test_reader_bounds() {
        let mut reader = ObjectReader::new(store(), 20, 10).unwrap();
        assert_eq!(reader.offset(), 20);
        assert_eq!(reader.size(), 10);

        let mut buf = vec![0u8; 64];
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(&buf[..n], &(20..30).collect::<Vec<u8>>()[..]);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_reader_seek() {
        let mut reader = ObjectReader::new(store(), 20, 10).unwrap();

        assert_eq!(reader.seek(SeekFrom::Start(5)).unwrap(), 5);
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 25);

        assert_eq!(reader.seek(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(reader.seek(SeekFrom::Current(-8)).unwrap(), 0);
        assert_eq!(reader.remaining(), 10);
    }

    #[test]
    fn test_reader_seek_out_of_range() {
        let mut reader = ObjectReader::new(store(), 20, 10).unwrap();
        assert!(reader.seek(SeekFrom::Current(-1)).is_err());
        assert!(reader.seek(SeekFrom::Start(11)).is_err());
        assert!(reader.seek(SeekFrom::End(1)).is_err());
        // Failed seeks leave the position alone
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_reader_empty_object() {
        let mut reader = ObjectReader::new(store(), 50, 0).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
