//! SIF error types

use thiserror::Error;

/// The main error type for SIF operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the backing store
    #[error("Backing store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An object ID that can never match (0) or does not name a used object
    #[error("Invalid object ID: {0}")]
    InvalidObjectId(u32),

    /// A group ID that can never match (0) or names no group in use
    #[error("Invalid group ID: {0}")]
    InvalidGroupId(u32),

    /// No descriptor matched where exactly one was required
    #[error("Object not found")]
    ObjectNotFound,

    /// Several descriptors matched where exactly one was required
    #[error("Multiple objects found ({0} matches)")]
    MultipleObjectsFound(usize),

    /// Descriptor contents are inconsistent or cannot be decoded
    #[error("Malformed descriptor: {0}")]
    MalformedDescriptor(String),

    /// Header offsets or sizes are inconsistent with the file
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    /// File does not start with the SIF magic
    #[error("Invalid magic: {0}")]
    InvalidMagic(String),

    /// SIF version is not supported
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    /// Mutation attempted on an image loaded without write access
    #[error("Container is read-only")]
    ReadOnlyContainer,

    /// No free descriptor slot left
    #[error("Descriptor table full (capacity {0})")]
    TableFull(usize),

    /// Caller supplied a value that cannot be encoded
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Result type alias for SIF operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a malformed descriptor error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedDescriptor(msg.into())
    }

    /// Create a corrupt header error
    pub fn corrupt_header(msg: impl Into<String>) -> Self {
        Error::CorruptHeader(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an already exists error
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Error::AlreadyExists(msg.into())
    }

    /// True for errors raised while building a query, before any table scan
    pub fn is_query_construction(&self) -> bool {
        matches!(self, Error::InvalidObjectId(0) | Error::InvalidGroupId(0))
    }

    /// True for errors that describe how many objects a query resolved to
    pub fn is_query_resolution(&self) -> bool {
        matches!(self, Error::ObjectNotFound | Error::MultipleObjectsFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::InvalidObjectId(0).to_string(), "Invalid object ID: 0");
        assert_eq!(
            Error::MultipleObjectsFound(2).to_string(),
            "Multiple objects found (2 matches)"
        );
        assert!(Error::corrupt_header("table past EOF")
            .to_string()
            .contains("table past EOF"));
    }

    #[test]
    fn test_error_kinds() {
        assert!(Error::InvalidGroupId(0).is_query_construction());
        assert!(!Error::InvalidGroupId(7).is_query_construction());
        assert!(Error::ObjectNotFound.is_query_resolution());
        assert!(!Error::ReadOnlyContainer.is_query_resolution());
    }

    #[test]
    fn test_io_passthrough() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    }
}
