//! Object descriptors
//!
//! A descriptor is the fixed-size record describing one object of the
//! container. Free slots of the descriptor table are decoded as `None` by
//! [`Descriptor::parse_slot`], so a [`Descriptor`] value always stands for a
//! used object.

use crate::codec::{cstr, FieldReader, FieldWriter};
use crate::extra::{CryptoMessageMetadata, ExtraRecord, PartitionMetadata, SignatureMetadata};
use crate::refs::{group_from_raw, group_to_raw, Link};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sif_core::security::{i64_to_u64, u64_to_i64};
use sif_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Length of the name field
pub const NAME_LEN: usize = 128;

/// Length of the type-specific extra block
pub const EXTRA_LEN: usize = 384;

/// Encoded size of one descriptor
pub const DESCRIPTOR_SIZE: usize = 4 + 1 + 4 + 4 + 4 + 8 + 8 + NAME_LEN + EXTRA_LEN + 8 + 8;

/// Kind of data an object holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u32)]
pub enum Datatype {
    Deffile = 0x4001,
    EnvVar = 0x4002,
    Labels = 0x4003,
    Partition = 0x4004,
    Signature = 0x4005,
    GenericJson = 0x4006,
    Generic = 0x4007,
    CryptoMessage = 0x4008,
}

impl Datatype {
    /// Parse a datatype from its on-disk value
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            0x4001 => Ok(Datatype::Deffile),
            0x4002 => Ok(Datatype::EnvVar),
            0x4003 => Ok(Datatype::Labels),
            0x4004 => Ok(Datatype::Partition),
            0x4005 => Ok(Datatype::Signature),
            0x4006 => Ok(Datatype::GenericJson),
            0x4007 => Ok(Datatype::Generic),
            0x4008 => Ok(Datatype::CryptoMessage),
            _ => Err(Error::malformed(format!("Invalid datatype: {:#x}", value))),
        }
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Datatype::Deffile => "Def.FILE",
            Datatype::EnvVar => "Env.Vars",
            Datatype::Labels => "JSON.Labels",
            Datatype::Partition => "FS",
            Datatype::Signature => "Signature",
            Datatype::GenericJson => "JSON.Generic",
            Datatype::Generic => "Generic/Raw",
            Datatype::CryptoMessage => "Cryptographic Message",
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deffile" => Ok(Datatype::Deffile),
            "envvar" => Ok(Datatype::EnvVar),
            "labels" => Ok(Datatype::Labels),
            "partition" => Ok(Datatype::Partition),
            "signature" => Ok(Datatype::Signature),
            "genericjson" | "json" => Ok(Datatype::GenericJson),
            "generic" => Ok(Datatype::Generic),
            "cryptomessage" => Ok(Datatype::CryptoMessage),
            other => Err(Error::invalid_input(format!("Unknown datatype: {}", other))),
        }
    }
}

/// Descriptor of one used object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    datatype: Datatype,
    id: u32,
    group: Option<u32>,
    link: Link,
    offset: u64,
    size: u64,
    name: String,
    #[serde(skip)]
    extra: [u8; EXTRA_LEN],
    created: i64,
    modified: i64,
}

impl Descriptor {
    /// Create a descriptor with no group, link, payload or metadata
    pub fn new(id: u32, datatype: Datatype) -> Self {
        Self {
            datatype,
            id,
            group: None,
            link: Link::None,
            offset: 0,
            size: 0,
            name: String::new(),
            extra: [0u8; EXTRA_LEN],
            created: 0,
            modified: 0,
        }
    }

    /// Set group membership
    pub fn with_group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    /// Set the link target
    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    /// Set the payload location
    pub fn with_range(mut self, offset: u64, size: u64) -> Self {
        self.offset = offset;
        self.size = size;
        self
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the raw extra block
    pub fn with_extra(mut self, extra: [u8; EXTRA_LEN]) -> Self {
        self.extra = extra;
        self
    }

    /// Set creation and modification times (Unix seconds)
    pub fn with_times(mut self, created: i64, modified: i64) -> Self {
        self.created = created;
        self.modified = modified;
        self
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Group number, or `None` when the object belongs to no group
    pub fn group_id(&self) -> Option<u32> {
        self.group
    }

    pub fn link(&self) -> Link {
        self.link
    }

    /// Target object ID of an object link
    pub fn linked_id(&self) -> Option<u32> {
        match self.link {
            Link::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Target group number of a group link
    pub fn linked_group_id(&self) -> Option<u32> {
        match self.link {
            Link::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Absolute file offset of the payload
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload length in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// End of the payload (exclusive)
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw extra block
    pub fn extra(&self) -> &[u8; EXTRA_LEN] {
        &self.extra
    }

    pub fn created_secs(&self) -> i64 {
        self.created
    }

    pub fn modified_secs(&self) -> i64 {
        self.modified
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.created, 0)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified, 0)
    }

    /// Decode the extra block as record `T`
    pub fn metadata<T: ExtraRecord>(&self) -> Result<T> {
        T::from_extra(self.datatype, &self.extra)
    }

    pub fn partition_metadata(&self) -> Result<PartitionMetadata> {
        self.metadata()
    }

    pub fn signature_metadata(&self) -> Result<SignatureMetadata> {
        self.metadata()
    }

    pub fn crypto_message_metadata(&self) -> Result<CryptoMessageMetadata> {
        self.metadata()
    }

    pub(crate) fn set_extra(&mut self, extra: [u8; EXTRA_LEN]) {
        self.extra = extra;
    }

    /// Replace the partition metadata of a partition descriptor
    pub fn set_partition_metadata(&mut self, meta: &PartitionMetadata, now: i64) -> Result<()> {
        if self.datatype != Datatype::Partition {
            return Err(Error::malformed(format!(
                "Object {} is a {} descriptor, not a partition",
                self.id, self.datatype
            )));
        }
        self.set_extra(meta.to_extra());
        self.modified = now;
        Ok(())
    }

    /// Parse one descriptor table slot
    ///
    /// Returns `None` for a free slot. Slots that are not marked used are free
    /// regardless of their remaining bytes.
    pub fn parse_slot(bytes: &[u8]) -> Result<Option<Self>> {
        if bytes.len() < DESCRIPTOR_SIZE {
            return Err(Error::malformed(format!(
                "Descriptor slot too small: {} bytes",
                bytes.len()
            )));
        }

        let mut r = FieldReader::new(&bytes[..DESCRIPTOR_SIZE], "descriptor");
        let datatype_raw = r.u32()?;
        let used = r.u8()?;
        if used == 0 {
            return Ok(None);
        }

        let datatype = Datatype::from_u32(datatype_raw)?;
        let id = r.u32()?;
        if id == 0 {
            return Err(Error::malformed("Used descriptor has ID 0"));
        }
        let group = group_from_raw(r.u32()?);
        let link = Link::from_raw(r.u32()?);
        let offset = i64_to_u64(r.i64()?, "descriptor offset")
            .map_err(|e| Error::malformed(format!("Object {}: {}", id, e)))?;
        let size = i64_to_u64(r.i64()?, "descriptor size")
            .map_err(|e| Error::malformed(format!("Object {}: {}", id, e)))?;
        let name = cstr(r.take(NAME_LEN)?);
        let extra = r.array::<EXTRA_LEN>()?;
        let created = r.i64()?;
        let modified = r.i64()?;

        Ok(Some(Self {
            datatype,
            id,
            group,
            link,
            offset,
            size,
            name,
            extra,
            created,
            modified,
        }))
    }

    /// Serialize into one descriptor table slot
    pub fn serialize(&self, bytes: &mut [u8; DESCRIPTOR_SIZE]) -> Result<()> {
        if self.name.len() > NAME_LEN {
            return Err(Error::invalid_input(format!(
                "Descriptor name is {} bytes, limit is {}",
                self.name.len(),
                NAME_LEN
            )));
        }

        let mut w = FieldWriter::new(bytes);
        w.u32(self.datatype as u32);
        w.u8(1);
        w.u32(self.id);
        w.u32(group_to_raw(self.group));
        w.u32(self.link.to_raw());
        w.i64(u64_to_i64(self.offset, "descriptor offset")?);
        w.i64(u64_to_i64(self.size, "descriptor size")?);
        w.padded(self.name.as_bytes(), NAME_LEN);
        w.bytes(&self.extra);
        w.i64(self.created);
        w.i64(self.modified);
        Ok(())
    }

    /// Serialize a free slot
    pub fn serialize_free(bytes: &mut [u8; DESCRIPTOR_SIZE]) {
        bytes.fill(0);
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Object {} [{} @ 0x{:08X}, {} bytes]",
            self.id, self.datatype, self.offset, self.size
        )?;
        if !self.name.is_empty() {
            write!(f, " \"{}\"", self.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extra::{FsType, PartType};
    use crate::refs::DESCR_GROUP_MASK;
    use sif_core::Arch;

    fn sample() -> Descriptor {
        Descriptor::new(3, Datatype::Partition)
            .with_group(1)
            .with_link(Link::Group(2))
            .with_range(32768, 4096)
            .with_name("rootfs")
            .with_extra(PartitionMetadata::new(FsType::Squash, PartType::PrimSys, Arch::Amd64).to_extra())
            .with_times(1_600_000_000, 1_600_000_100)
    }

    #[test]
    fn test_descriptor_size() {
        assert_eq!(DESCRIPTOR_SIZE, 561);
    }

    #[test]
    fn test_slot_roundtrip() {
        let descr = sample();
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        descr.serialize(&mut bytes).unwrap();

        let back = Descriptor::parse_slot(&bytes).unwrap().unwrap();
        assert_eq!(back, descr);
        assert_eq!(back.group_id(), Some(1));
        assert_eq!(back.linked_group_id(), Some(2));
        assert_eq!(back.linked_id(), None);
    }

    #[test]
    fn test_raw_field_layout() {
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        sample().serialize(&mut bytes).unwrap();

        assert_eq!(&bytes[0..4], &0x4004u32.to_le_bytes());
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..9], &3u32.to_le_bytes());
        assert_eq!(&bytes[9..13], &(1 | DESCR_GROUP_MASK).to_le_bytes());
        assert_eq!(&bytes[13..17], &(2 | DESCR_GROUP_MASK).to_le_bytes());
        assert_eq!(&bytes[17..25], &32768i64.to_le_bytes());
        assert_eq!(&bytes[33..39], b"rootfs");
    }

    #[test]
    fn test_free_slot() {
        let bytes = [0u8; DESCRIPTOR_SIZE];
        assert_eq!(Descriptor::parse_slot(&bytes).unwrap(), None);

        // Unused flag wins over leftover fields
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        sample().serialize(&mut bytes).unwrap();
        bytes[4] = 0;
        assert_eq!(Descriptor::parse_slot(&bytes).unwrap(), None);
    }

    #[test]
    fn test_unknown_datatype_is_malformed() {
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        sample().serialize(&mut bytes).unwrap();
        bytes[0..4].copy_from_slice(&0x9999u32.to_le_bytes());

        let err = Descriptor::parse_slot(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedDescriptor(_)));
    }

    #[test]
    fn test_name_too_long() {
        let descr = Descriptor::new(1, Datatype::Generic).with_name("x".repeat(NAME_LEN + 1));
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        assert!(matches!(
            descr.serialize(&mut bytes),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_metadata_accessors() {
        let descr = sample();
        let meta = descr.partition_metadata().unwrap();
        assert_eq!(meta.part_type, PartType::PrimSys);
        assert_eq!(meta.arch, Arch::Amd64);

        assert!(matches!(
            descr.signature_metadata(),
            Err(Error::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_datatype_parse() {
        assert_eq!("partition".parse::<Datatype>().unwrap(), Datatype::Partition);
        assert_eq!("JSON".parse::<Datatype>().unwrap(), Datatype::GenericJson);
        assert!("tarball".parse::<Datatype>().is_err());
        assert_eq!(Datatype::from_u32(0x4008).unwrap(), Datatype::CryptoMessage);
    }

    #[test]
    fn test_timestamps() {
        let descr = sample();
        assert_eq!(descr.created().unwrap().timestamp(), 1_600_000_000);
        assert_eq!(descr.modified_secs(), 1_600_000_100);
    }
}
