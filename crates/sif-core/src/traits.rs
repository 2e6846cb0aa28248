//! Backing store traits

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Combined trait for Read + Write + Seek
///
/// A loaded container owns exactly one of these. Files opened read-only still
/// qualify; writes are refused before they reach the store.
pub trait ReadWriteSeek: Read + Write + Seek + Send {
    /// Current length of the store in bytes
    ///
    /// Restores the stream position afterwards.
    fn store_len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if pos != len {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(len)
    }
}

/// Blanket implementation for any type that implements Read + Write + Seek
impl<T: Read + Write + Seek + Send> ReadWriteSeek for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_store_len_keeps_position() {
        let mut cursor = Cursor::new(vec![0u8; 100]);
        cursor.seek(SeekFrom::Start(10)).unwrap();

        assert_eq!(cursor.store_len().unwrap(), 100);
        assert_eq!(cursor.stream_position().unwrap(), 10);
    }
}
