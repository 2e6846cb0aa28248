//! # SIF Format
//!
//! Fixed-width on-disk records of a SIF container.
//!
//! ```text
//! 0x0000: Header (136 bytes)
//! 0x1000: Descriptor table (capacity x 561 bytes)
//! ....:   Data region (4 KiB aligned, object payloads appended)
//! ```
//!
//! Records are little-endian and unpadded. Group and link fields are decoded
//! into tagged values ([`Link`], `Option<u32>` groups) here, so nothing above
//! this crate ever sees the raw tag bit.
//!
//! ## Example
//!
//! ```rust
//! use sif_format::{Datatype, Descriptor, Link};
//!
//! let descr = Descriptor::new(2, Datatype::Signature)
//!     .with_group(1)
//!     .with_link(Link::Object(1));
//!
//! let mut bytes = [0u8; sif_format::DESCRIPTOR_SIZE];
//! descr.serialize(&mut bytes).unwrap();
//! let back = Descriptor::parse_slot(&bytes).unwrap();
//! assert_eq!(back, Some(descr));
//! ```

pub mod codec;
pub mod descriptor;
pub mod extra;
pub mod header;
pub mod refs;

pub use descriptor::{Datatype, Descriptor, DESCRIPTOR_SIZE, EXTRA_LEN, NAME_LEN};
pub use extra::{
    CryptoMessageMetadata, ExtraRecord, FormatType, FsType, HashType, MessageType, PartType,
    PartitionMetadata, SignatureMetadata,
};
pub use header::{Header, DATA_ALIGNMENT, DESCRIPTORS_OFFSET};
pub use refs::{Link, DESCR_GROUP_MASK, DESCR_UNUSED_GROUP, DESCR_UNUSED_LINK, MAX_REF_ID};
