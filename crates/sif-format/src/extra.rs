//! Type-specific descriptor metadata
//!
//! Every descriptor carries a fixed [`EXTRA_LEN`]-byte block whose meaning
//! depends on its [`Datatype`]. Decoding is strict: a block is only accepted
//! when the datatype matches, the enumerated fields hold known values and
//! every byte past the record is zero. Anything else is reported as
//! [`Error::MalformedDescriptor`], never zero-filled.

use crate::codec::{FieldReader, FieldWriter};
use crate::descriptor::{Datatype, EXTRA_LEN};
use serde::Serialize;
use sif_core::{Arch, Error, Result};
use std::fmt;
use std::str::FromStr;

/// A record stored in a descriptor's extra block
pub trait ExtraRecord: Sized {
    /// Datatype of the descriptors that carry this record
    const DATATYPE: Datatype;

    /// Encoded size of the record in bytes
    const RECORD_LEN: usize;

    /// Decode the record fields
    fn decode(reader: &mut FieldReader<'_>) -> Result<Self>;

    /// Encode the record fields
    fn encode(&self, writer: &mut FieldWriter<'_>);

    /// Encode into a zero-padded extra block
    fn to_extra(&self) -> [u8; EXTRA_LEN] {
        let mut block = [0u8; EXTRA_LEN];
        let mut writer = FieldWriter::new(&mut block);
        self.encode(&mut writer);
        debug_assert_eq!(writer.position(), Self::RECORD_LEN);
        block
    }

    /// Decode from the extra block of a descriptor of type `datatype`
    fn from_extra(datatype: Datatype, extra: &[u8]) -> Result<Self> {
        if datatype != Self::DATATYPE {
            return Err(Error::malformed(format!(
                "{} descriptor has no {} metadata",
                datatype,
                Self::DATATYPE
            )));
        }
        if extra.len() < Self::RECORD_LEN {
            return Err(Error::malformed(format!(
                "{} metadata needs {} bytes, extra block has {}",
                Self::DATATYPE,
                Self::RECORD_LEN,
                extra.len()
            )));
        }
        if extra[Self::RECORD_LEN..].iter().any(|&b| b != 0) {
            return Err(Error::malformed(format!(
                "{} metadata is longer than its {}-byte record",
                Self::DATATYPE,
                Self::RECORD_LEN
            )));
        }

        let mut reader = FieldReader::new(&extra[..Self::RECORD_LEN], "extra block");
        Self::decode(&mut reader)
    }
}

/// Filesystem type of a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum FsType {
    Squash = 1,
    Ext3 = 2,
    ImmuObj = 3,
    Raw = 4,
    EncryptedSquashfs = 5,
}

impl FsType {
    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            1 => Ok(FsType::Squash),
            2 => Ok(FsType::Ext3),
            3 => Ok(FsType::ImmuObj),
            4 => Ok(FsType::Raw),
            5 => Ok(FsType::EncryptedSquashfs),
            _ => Err(Error::malformed(format!("Invalid filesystem type: {}", value))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FsType::Squash => "Squashfs",
            FsType::Ext3 => "Ext3",
            FsType::ImmuObj => "Data.Archive",
            FsType::Raw => "Raw.Data",
            FsType::EncryptedSquashfs => "Encrypted squashfs",
        }
    }
}

/// Role of a partition in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum PartType {
    System = 1,
    PrimSys = 2,
    Data = 3,
    Overlay = 4,
}

impl PartType {
    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            1 => Ok(PartType::System),
            2 => Ok(PartType::PrimSys),
            3 => Ok(PartType::Data),
            4 => Ok(PartType::Overlay),
            _ => Err(Error::malformed(format!("Invalid partition type: {}", value))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PartType::System => "System",
            PartType::PrimSys => "*System",
            PartType::Data => "Data",
            PartType::Overlay => "Overlay",
        }
    }
}

/// Hash algorithm of a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum HashType {
    Sha256 = 1,
    Sha384 = 2,
    Sha512 = 3,
    Blake2s = 4,
    Blake2b = 5,
}

impl HashType {
    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            1 => Ok(HashType::Sha256),
            2 => Ok(HashType::Sha384),
            3 => Ok(HashType::Sha512),
            4 => Ok(HashType::Blake2s),
            5 => Ok(HashType::Blake2b),
            _ => Err(Error::malformed(format!("Invalid hash type: {}", value))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashType::Sha256 => "SHA256",
            HashType::Sha384 => "SHA384",
            HashType::Sha512 => "SHA512",
            HashType::Blake2s => "BLAKE2S",
            HashType::Blake2b => "BLAKE2B",
        }
    }
}

/// Encoding of a cryptographic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum FormatType {
    OpenPgp = 1,
    Pem = 2,
}

impl FormatType {
    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            1 => Ok(FormatType::OpenPgp),
            2 => Ok(FormatType::Pem),
            _ => Err(Error::malformed(format!("Invalid format type: {}", value))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatType::OpenPgp => "OpenPGP",
            FormatType::Pem => "PEM",
        }
    }
}

/// Kind of cryptographic message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum MessageType {
    ClearSignature = 0x100,
    RsaOaep = 0x200,
}

impl MessageType {
    pub fn from_i32(value: i32) -> Result<Self> {
        match value {
            0x100 => Ok(MessageType::ClearSignature),
            0x200 => Ok(MessageType::RsaOaep),
            _ => Err(Error::malformed(format!("Invalid message type: {:#x}", value))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageType::ClearSignature => "Clear Signature",
            MessageType::RsaOaep => "RSA-OAEP",
        }
    }
}

macro_rules! display_by_name {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.name())
            }
        })*
    };
}

display_by_name!(FsType, PartType, HashType, FormatType, MessageType);

macro_rules! parse_by_alias {
    ($ty:ident, $what:literal, { $($alias:literal => $variant:ident),* $(,)? }) => {
        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.to_ascii_lowercase().as_str() {
                    $($alias => Ok($ty::$variant),)*
                    other => Err(Error::invalid_input(format!("Unknown {}: {}", $what, other))),
                }
            }
        }
    };
}

parse_by_alias!(FsType, "filesystem type", {
    "squashfs" => Squash,
    "squash" => Squash,
    "ext3" => Ext3,
    "immuobj" => ImmuObj,
    "raw" => Raw,
    "encryptedsquashfs" => EncryptedSquashfs,
});

parse_by_alias!(PartType, "partition type", {
    "system" => System,
    "primsys" => PrimSys,
    "data" => Data,
    "overlay" => Overlay,
});

parse_by_alias!(HashType, "hash type", {
    "sha256" => Sha256,
    "sha384" => Sha384,
    "sha512" => Sha512,
    "blake2s" => Blake2s,
    "blake2b" => Blake2b,
});

parse_by_alias!(FormatType, "format type", {
    "openpgp" => OpenPgp,
    "pgp" => OpenPgp,
    "pem" => Pem,
});

parse_by_alias!(MessageType, "message type", {
    "clearsignature" => ClearSignature,
    "clearsign" => ClearSignature,
    "rsaoaep" => RsaOaep,
    "rsa-oaep" => RsaOaep,
});

/// Extra block of a [`Datatype::Partition`] descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub fs_type: FsType,
    pub part_type: PartType,
    pub arch: Arch,
}

impl PartitionMetadata {
    pub fn new(fs_type: FsType, part_type: PartType, arch: Arch) -> Self {
        Self {
            fs_type,
            part_type,
            arch,
        }
    }
}

impl ExtraRecord for PartitionMetadata {
    const DATATYPE: Datatype = Datatype::Partition;
    const RECORD_LEN: usize = 4 + 4 + Arch::CODE_LEN;

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self> {
        let fs_type = FsType::from_i32(reader.i32()?)?;
        let part_type = PartType::from_i32(reader.i32()?)?;
        let code = reader.array::<{ Arch::CODE_LEN }>()?;
        let arch = Arch::from_code(&code).ok_or_else(|| {
            Error::malformed(format!(
                "Invalid partition architecture: {:?}",
                String::from_utf8_lossy(&code)
            ))
        })?;
        Ok(Self {
            fs_type,
            part_type,
            arch,
        })
    }

    fn encode(&self, writer: &mut FieldWriter<'_>) {
        writer.i32(self.fs_type as i32);
        writer.i32(self.part_type as i32);
        writer.bytes(&self.arch.code());
    }
}

const ENTITY_LEN: usize = 256;

/// Extra block of a [`Datatype::Signature`] descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMetadata {
    pub hash_type: HashType,
    /// Signing entity (key fingerprint), zero-padded
    pub entity: [u8; ENTITY_LEN],
}

impl SignatureMetadata {
    /// Size of the entity field
    pub const ENTITY_LEN: usize = ENTITY_LEN;

    pub fn new(hash_type: HashType, entity: &[u8]) -> Result<Self> {
        if entity.len() > Self::ENTITY_LEN {
            return Err(Error::invalid_input(format!(
                "Signature entity is {} bytes, limit is {}",
                entity.len(),
                Self::ENTITY_LEN
            )));
        }
        let mut padded = [0u8; ENTITY_LEN];
        padded[..entity.len()].copy_from_slice(entity);
        Ok(Self {
            hash_type,
            entity: padded,
        })
    }

    /// Entity bytes without the trailing zero padding
    pub fn entity(&self) -> &[u8] {
        let end = self
            .entity
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        &self.entity[..end]
    }
}

impl ExtraRecord for SignatureMetadata {
    const DATATYPE: Datatype = Datatype::Signature;
    const RECORD_LEN: usize = 4 + ENTITY_LEN;

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self> {
        let hash_type = HashType::from_i32(reader.i32()?)?;
        let entity = reader.array::<ENTITY_LEN>()?;
        Ok(Self { hash_type, entity })
    }

    fn encode(&self, writer: &mut FieldWriter<'_>) {
        writer.i32(self.hash_type as i32);
        writer.bytes(&self.entity);
    }
}

/// Extra block of a [`Datatype::CryptoMessage`] descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoMessageMetadata {
    pub format_type: FormatType,
    pub message_type: MessageType,
}

impl ExtraRecord for CryptoMessageMetadata {
    const DATATYPE: Datatype = Datatype::CryptoMessage;
    const RECORD_LEN: usize = 4 + 4;

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self> {
        let format_type = FormatType::from_i32(reader.i32()?)?;
        let message_type = MessageType::from_i32(reader.i32()?)?;
        Ok(Self {
            format_type,
            message_type,
        })
    }

    fn encode(&self, writer: &mut FieldWriter<'_>) {
        writer.i32(self.format_type as i32);
        writer.i32(self.message_type as i32);
    }
}
