//! SIF global header
//!
//! The header sits at offset 0 and locates everything else in the file.

use crate::codec::{cstr, FieldReader, FieldWriter};
use crate::descriptor::DESCRIPTOR_SIZE;
use chrono::{DateTime, Utc};
use sif_core::security::{
    align_up, checked_add_u64, checked_multiply_u64, i64_to_u64, u64_to_i64, u64_to_usize,
    validate_capacity, MAX_DESCRIPTOR_CAPACITY,
};
use sif_core::{Arch, Error, Result};
use uuid::Uuid;

/// File offset of the descriptor table
pub const DESCRIPTORS_OFFSET: u64 = 4096;

/// Alignment of the data region start
pub const DATA_ALIGNMENT: u64 = 4096;

const LAUNCH_LEN: usize = 32;
const HEADER_SIZE: usize = LAUNCH_LEN + 10 + 3 + Arch::CODE_LEN + 16 + 8 + 8 + 4 + 4 + 6 * 8;

/// SIF global header
///
/// ```text
/// launch[32] magic[10] version[3] arch[3] uuid[16]
/// ctime:i64 mtime:i64 next_id:u32 reserved[4]
/// dfree:i64 dtotal:i64 descroff:i64 descrlen:i64 dataoff:i64 datalen:i64
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Launch script, NUL-padded
    pub launch: [u8; LAUNCH_LEN],
    /// Architecture of the primary system partition
    pub arch: Arch,
    /// Container UUID
    pub id: Uuid,
    /// Creation time (Unix seconds)
    pub created: i64,
    /// Last modification time (Unix seconds)
    pub modified: i64,
    /// ID handed to the next added object
    pub next_id: u32,
    /// Number of free descriptor slots
    pub descriptors_free: u64,
    /// Descriptor table capacity
    pub descriptors_total: u64,
    /// File offset of the descriptor table
    pub descriptors_offset: u64,
    /// Size of the descriptor table in bytes
    pub descriptors_size: u64,
    /// File offset of the data region
    pub data_offset: u64,
    /// Size of the data region in bytes
    pub data_size: u64,
}

impl Header {
    /// Header magic "SIF_MAGIC"
    pub const MAGIC: &'static [u8; 10] = b"SIF_MAGIC\0";

    /// Supported format version
    pub const VERSION: &'static [u8; 3] = b"01\0";

    /// Default launch script
    pub const DEFAULT_LAUNCH: &'static str = "#!/usr/bin/env run-singularity\n";

    /// Size of the launch script field
    pub const LAUNCH_LEN: usize = LAUNCH_LEN;

    /// Size of the header in bytes
    pub const SIZE: usize = HEADER_SIZE;

    /// Create a header for an empty container with `capacity` descriptor slots
    pub fn new(capacity: usize, launch: &str, arch: Arch, id: Uuid, now: i64) -> Result<Self> {
        validate_capacity(capacity)?;
        if launch.len() > Self::LAUNCH_LEN {
            return Err(Error::invalid_input(format!(
                "Launch script is {} bytes, limit is {}",
                launch.len(),
                Self::LAUNCH_LEN
            )));
        }

        let mut launch_field = [0u8; LAUNCH_LEN];
        launch_field[..launch.len()].copy_from_slice(launch.as_bytes());

        let descriptors_size =
            checked_multiply_u64(capacity as u64, DESCRIPTOR_SIZE as u64, "descriptor table")?;
        let table_end = checked_add_u64(DESCRIPTORS_OFFSET, descriptors_size, "descriptor table")?;
        let data_offset = align_up(table_end, DATA_ALIGNMENT, "data region")?;

        Ok(Self {
            launch: launch_field,
            arch,
            id,
            created: now,
            modified: now,
            next_id: 1,
            descriptors_free: capacity as u64,
            descriptors_total: capacity as u64,
            descriptors_offset: DESCRIPTORS_OFFSET,
            descriptors_size,
            data_offset,
            data_size: 0,
        })
    }

    /// Parse a header, checking magic and version
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        // A short file with the wrong magic is not a container at all
        let magic_end = bytes.len().min(LAUNCH_LEN + Self::MAGIC.len());
        let magic: &[u8] = bytes.get(LAUNCH_LEN..magic_end).unwrap_or_default();
        if magic.is_empty() {
            return Err(Error::InvalidMagic(format!(
                "no magic in {} byte input",
                bytes.len()
            )));
        }
        if !Self::MAGIC.starts_with(magic) {
            return Err(Error::InvalidMagic(format!(
                "expected 'SIF_MAGIC', got '{}'",
                String::from_utf8_lossy(magic).trim_end_matches('\0')
            )));
        }
        if bytes.len() < Self::SIZE {
            return Err(Error::corrupt_header(format!(
                "Header too small: {} bytes, need {}",
                bytes.len(),
                Self::SIZE
            )));
        }

        let mut r = FieldReader::new(&bytes[..Self::SIZE], "header");
        let launch = r.array::<LAUNCH_LEN>()?;
        let _magic = r.take(Self::MAGIC.len())?;

        let version = r.array::<3>()?;
        if &version != Self::VERSION {
            return Err(Error::UnsupportedVersion(format!(
                "'{}' (supported: '{}')",
                cstr(&version),
                cstr(Self::VERSION)
            )));
        }

        let arch_code = r.array::<{ Arch::CODE_LEN }>()?;
        let arch = Arch::from_code(&arch_code).ok_or_else(|| {
            Error::corrupt_header(format!(
                "Unknown architecture code '{}'",
                cstr(&arch_code)
            ))
        })?;

        let id = Uuid::from_bytes(r.array::<16>()?);
        let created = r.i64()?;
        let modified = r.i64()?;
        let next_id = r.u32()?;
        let _reserved = r.take(4)?;
        let descriptors_free = i64_to_u64(r.i64()?, "free descriptors")?;
        let descriptors_total = i64_to_u64(r.i64()?, "total descriptors")?;
        let descriptors_offset = i64_to_u64(r.i64()?, "descriptor offset")?;
        let descriptors_size = i64_to_u64(r.i64()?, "descriptor size")?;
        let data_offset = i64_to_u64(r.i64()?, "data offset")?;
        let data_size = i64_to_u64(r.i64()?, "data size")?;

        Ok(Self {
            launch,
            arch,
            id,
            created,
            modified,
            next_id,
            descriptors_free,
            descriptors_total,
            descriptors_offset,
            descriptors_size,
            data_offset,
            data_size,
        })
    }

    /// Serialize the header
    pub fn serialize(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut w = FieldWriter::new(&mut bytes);
        w.bytes(&self.launch);
        w.bytes(Self::MAGIC);
        w.bytes(Self::VERSION);
        w.bytes(&self.arch.code());
        w.bytes(self.id.as_bytes());
        w.i64(self.created);
        w.i64(self.modified);
        w.u32(self.next_id);
        w.padded(&[], 4);
        w.i64(u64_to_i64(self.descriptors_free, "free descriptors")?);
        w.i64(u64_to_i64(self.descriptors_total, "total descriptors")?);
        w.i64(u64_to_i64(self.descriptors_offset, "descriptor offset")?);
        w.i64(u64_to_i64(self.descriptors_size, "descriptor size")?);
        w.i64(u64_to_i64(self.data_offset, "data offset")?);
        w.i64(u64_to_i64(self.data_size, "data size")?);
        Ok(bytes)
    }

    /// Check offsets and sizes against each other and the file length
    ///
    /// Returns the descriptor table capacity.
    pub fn validate(&self, file_len: u64) -> Result<usize> {
        let capacity = u64_to_usize(self.descriptors_total, "descriptor capacity")
            .map_err(|e| Error::corrupt_header(e.to_string()))?;
        if capacity == 0 || capacity > MAX_DESCRIPTOR_CAPACITY {
            return Err(Error::corrupt_header(format!(
                "Descriptor capacity {} out of range 1-{}",
                capacity, MAX_DESCRIPTOR_CAPACITY
            )));
        }
        if self.descriptors_free > self.descriptors_total {
            return Err(Error::corrupt_header(format!(
                "{} free descriptors exceed capacity {}",
                self.descriptors_free, self.descriptors_total
            )));
        }

        let expected_size =
            checked_multiply_u64(self.descriptors_total, DESCRIPTOR_SIZE as u64, "descriptor table")?;
        if self.descriptors_size != expected_size {
            return Err(Error::corrupt_header(format!(
                "Descriptor table size {} does not match {} x {}",
                self.descriptors_size, self.descriptors_total, DESCRIPTOR_SIZE
            )));
        }

        if self.descriptors_offset < Self::SIZE as u64 {
            return Err(Error::corrupt_header(format!(
                "Descriptor table at {} overlaps the header",
                self.descriptors_offset
            )));
        }
        let table_end =
            checked_add_u64(self.descriptors_offset, self.descriptors_size, "descriptor table")?;
        if table_end > file_len {
            return Err(Error::corrupt_header(format!(
                "Descriptor table ends at {} past end of file ({})",
                table_end, file_len
            )));
        }

        if self.data_offset < table_end {
            return Err(Error::corrupt_header(format!(
                "Data region at {} overlaps descriptor table ending at {}",
                self.data_offset, table_end
            )));
        }
        let data_end = checked_add_u64(self.data_offset, self.data_size, "data region")?;
        if data_end > file_len {
            return Err(Error::corrupt_header(format!(
                "Data region ends at {} past end of file ({})",
                data_end, file_len
            )));
        }

        Ok(capacity)
    }

    /// End of the data region (exclusive)
    pub fn data_end(&self) -> u64 {
        self.data_offset.saturating_add(self.data_size)
    }

    /// Launch script without NUL padding
    pub fn launch_script(&self) -> String {
        cstr(&self.launch)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified, 0)
    }
}
