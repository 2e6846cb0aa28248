//! Human-readable and JSON rendering of headers and descriptors

use chrono::{DateTime, Utc};
use serde::Serialize;
use sif_core::{format_size, Arch};
use sif_format::{
    Datatype, Descriptor, FormatType, FsType, HashType, Header, MessageType, PartType,
};
use std::fmt;

/// Global header, one field per line
pub struct HeaderView<'a>(pub &'a Header);

impl fmt::Display for HeaderView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.0;
        writeln!(f, "Launch:   {}", h.launch_script().trim_end())?;
        writeln!(f, "Magic:    SIF_MAGIC")?;
        writeln!(f, "Version:  01")?;
        writeln!(f, "Arch:     {}", h.arch)?;
        writeln!(f, "ID:       {}", h.id)?;
        writeln!(f, "Ctime:    {}", timestamp(h.created_at()))?;
        writeln!(f, "Mtime:    {}", timestamp(h.modified_at()))?;
        writeln!(f, "Next ID:  {}", h.next_id)?;
        writeln!(f, "Dfree:    {}", h.descriptors_free)?;
        writeln!(f, "Dtotal:   {}", h.descriptors_total)?;
        writeln!(f, "Descoff:  {}", h.descriptors_offset)?;
        writeln!(
            f,
            "Descrlen: {}",
            format_size(h.descriptors_size)
        )?;
        writeln!(f, "Dataoff:  {}", h.data_offset)?;
        writeln!(f, "Datalen:  {}", format_size(h.data_size))
    }
}

/// Descriptor table listing, one object per row
pub struct DescriptorList<'a>(pub Vec<&'a Descriptor>);

impl fmt::Display for DescriptorList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "No objects.");
        }

        writeln!(
            f,
            "{:<4} |{:<8} |{:<8} |{:<26} |{}",
            "ID", "GROUP", "LINK", "SIF POSITION (start-end)", "TYPE"
        )?;
        writeln!(f, "{}", "-".repeat(72))?;
        for descr in &self.0 {
            let position = format!("{}-{}", descr.offset(), descr.end());
            writeln!(
                f,
                "{:<4} |{:<8} |{:<8} |{:<26} |{}",
                descr.id(),
                group_label(descr.group_id()),
                descr.link().to_string(),
                position,
                type_summary(descr)
            )?;
        }
        Ok(())
    }
}

/// Every field of one descriptor
pub struct DescriptorInfo<'a>(pub &'a Descriptor);

impl fmt::Display for DescriptorInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        writeln!(f, "  Datatype: {}", d.datatype())?;
        writeln!(f, "  ID:       {}", d.id())?;
        writeln!(f, "  Used:     true")?;
        writeln!(f, "  Groupid:  {}", group_label(d.group_id()))?;
        writeln!(f, "  Link:     {}", d.link())?;
        writeln!(f, "  Fileoff:  {}", d.offset())?;
        writeln!(f, "  Filelen:  {} ({})", d.size(), format_size(d.size()))?;
        writeln!(f, "  Ctime:    {}", timestamp(d.created()))?;
        writeln!(f, "  Mtime:    {}", timestamp(d.modified()))?;
        writeln!(f, "  Name:     {}", d.name())?;

        match metadata_view(d) {
            Ok(Some(MetadataView::Partition {
                fs_type,
                part_type,
                arch,
            })) => {
                writeln!(f, "  Fstype:   {}", fs_type)?;
                writeln!(f, "  Parttype: {}", part_type)?;
                writeln!(f, "  Arch:     {}", arch)?;
            }
            Ok(Some(MetadataView::Signature { hash_type, entity })) => {
                writeln!(f, "  Hashtype: {}", hash_type)?;
                writeln!(f, "  Entity:   {}", entity)?;
            }
            Ok(Some(MetadataView::CryptoMessage {
                format_type,
                message_type,
            })) => {
                writeln!(f, "  Fmttype:  {}", format_type)?;
                writeln!(f, "  Msgtype:  {}", message_type)?;
            }
            Ok(None) => {}
            Err(e) => writeln!(f, "  Metadata: {}", e)?,
        }
        Ok(())
    }
}

/// JSON shape of one object
#[derive(Serialize)]
pub struct ObjectView<'a> {
    #[serde(flatten)]
    descriptor: &'a Descriptor,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<MetadataView>,
}

impl<'a> ObjectView<'a> {
    pub fn new(descriptor: &'a Descriptor) -> sif_core::Result<Self> {
        Ok(Self {
            descriptor,
            metadata: metadata_view(descriptor)?,
        })
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum MetadataView {
    Partition {
        fs_type: FsType,
        part_type: PartType,
        arch: Arch,
    },
    Signature {
        hash_type: HashType,
        /// Hex-encoded signing entity
        entity: String,
    },
    CryptoMessage {
        format_type: FormatType,
        message_type: MessageType,
    },
}

fn metadata_view(d: &Descriptor) -> sif_core::Result<Option<MetadataView>> {
    let view = match d.datatype() {
        Datatype::Partition => {
            let meta = d.partition_metadata()?;
            Some(MetadataView::Partition {
                fs_type: meta.fs_type,
                part_type: meta.part_type,
                arch: meta.arch,
            })
        }
        Datatype::Signature => {
            let meta = d.signature_metadata()?;
            Some(MetadataView::Signature {
                hash_type: meta.hash_type,
                entity: hex::encode_upper(meta.entity()),
            })
        }
        Datatype::CryptoMessage => {
            let meta = d.crypto_message_metadata()?;
            Some(MetadataView::CryptoMessage {
                format_type: meta.format_type,
                message_type: meta.message_type,
            })
        }
        _ => None,
    };
    Ok(view)
}

/// Datatype plus the most useful metadata, e.g. `FS (Squashfs/*System/amd64)`
pub fn type_summary(d: &Descriptor) -> String {
    match metadata_view(d) {
        Ok(Some(MetadataView::Partition {
            fs_type,
            part_type,
            arch,
        })) => format!("{} ({}/{}/{})", d.datatype(), fs_type, part_type, arch),
        Ok(Some(MetadataView::Signature { hash_type, .. })) => {
            format!("{} ({})", d.datatype(), hash_type)
        }
        Ok(Some(MetadataView::CryptoMessage {
            format_type,
            message_type,
        })) => format!("{} ({}/{})", d.datatype(), format_type, message_type),
        Ok(None) => d.datatype().to_string(),
        Err(_) => format!("{} (malformed metadata)", d.datatype()),
    }
}

fn group_label(group: Option<u32>) -> String {
    group.map_or_else(|| "NONE".to_string(), |g| g.to_string())
}

pub fn timestamp(time: Option<DateTime<Utc>>) -> String {
    time.map_or_else(
        || "invalid".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
