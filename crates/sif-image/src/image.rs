//! Container image lifecycle
//!
//! [`FileImage`] owns the backing store, the header and the descriptor table
//! of one container. The table is held in memory and written back by
//! [`FileImage::flush`], [`FileImage::unload`], or a best-effort flush when a
//! writable image is dropped. Payload bytes go to the store as soon as an
//! object is added.

use crate::options::{CreateOptions, DeleteOptions, DescriptorInput};
use crate::reader::ObjectReader;
use crate::select::{with_id, with_partition_type, IntoSelector};
use crate::table::DescriptorTable;
use chrono::{DateTime, Utc};
use sif_core::security::{
    align_up, checked_add_u64, validate_allocation_size, MAX_OBJECT_READ_SIZE,
};
use sif_core::{Arch, Error, ReadWriteSeek, Result};
use sif_format::refs::{validate_group_id, validate_object_id};
use sif_format::{
    Datatype, Descriptor, Header, PartType, PartitionMetadata, DESCRIPTOR_SIZE, NAME_LEN,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, SeekFrom};
use std::path::Path;
use uuid::Uuid;

/// A loaded SIF container
pub struct FileImage<S: ReadWriteSeek = File> {
    store: S,
    header: Header,
    table: DescriptorTable,
    writable: bool,
    dirty: bool,
}

impl FileImage<File> {
    /// Create a new container file at `path`
    ///
    /// The options are checked before the file is created, and a file whose
    /// layout could not be written is removed again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable options, `AlreadyExists` if `path`
    /// exists, or an I/O error if the file cannot be created or written.
    pub fn create(path: &Path, options: CreateOptions) -> Result<Self> {
        let (header, table) = new_layout(&options)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::already_exists(path.display().to_string()),
                _ => Error::Io(e),
            })?;

        tracing::info!("Creating SIF container {}", path.display());
        Self::from_layout(file, header, table).map_err(|e| {
            if let Err(remove) = std::fs::remove_file(path) {
                tracing::warn!(
                    "Failed to remove incomplete container {}: {}",
                    path.display(),
                    remove
                );
            }
            e
        })
    }

    /// Load an existing container file
    ///
    /// A read-only image rejects every mutation with `ReadOnlyContainer`.
    pub fn load(path: &Path, writable: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        tracing::debug!(
            "Loading SIF container {} ({})",
            path.display(),
            if writable { "read-write" } else { "read-only" }
        );
        Self::load_from(file, writable)
    }
}

impl<S: ReadWriteSeek> FileImage<S> {
    /// Write an empty container into `store`
    pub fn create_in(store: S, options: CreateOptions) -> Result<Self> {
        let (header, table) = new_layout(&options)?;
        Self::from_layout(store, header, table)
    }

    fn from_layout(store: S, header: Header, table: DescriptorTable) -> Result<Self> {
        let mut image = Self {
            store,
            header,
            table,
            writable: true,
            dirty: true,
        };
        if let Err(e) = image.write_layout() {
            // Nothing worth flushing from Drop
            image.dirty = false;
            return Err(e);
        }

        tracing::info!(
            "Created SIF container {} with {} descriptor slots",
            image.header.id,
            image.table.capacity()
        );
        Ok(image)
    }

    /// Load a container from `store`
    ///
    /// # Errors
    ///
    /// - `InvalidMagic` / `UnsupportedVersion` if the store is not a SIF container
    /// - `CorruptHeader` if the header locations disagree with each other or the store
    /// - `MalformedDescriptor` if a used descriptor cannot be trusted
    pub fn load_from(mut store: S, writable: bool) -> Result<Self> {
        let store_len = store.store_len()?;

        let header_len = store_len.min(Header::SIZE as u64) as usize;
        let mut header_bytes = vec![0u8; header_len];
        store.seek(SeekFrom::Start(0))?;
        store.read_exact(&mut header_bytes)?;

        let mut header = Header::parse(&header_bytes)?;
        let capacity = header.validate(store_len)?;

        let mut table_bytes = vec![0u8; capacity * DESCRIPTOR_SIZE];
        store.seek(SeekFrom::Start(header.descriptors_offset))?;
        store.read_exact(&mut table_bytes)?;

        let slots = table_bytes
            .chunks_exact(DESCRIPTOR_SIZE)
            .map(Descriptor::parse_slot)
            .collect::<Result<Vec<_>>>()?;
        let table = DescriptorTable::from_slots(slots)?;
        check_payloads(&header, &table)?;

        let mut repaired = false;
        if header.descriptors_free != table.free_count() as u64 {
            tracing::warn!(
                "Header free descriptor count {} does not match table ({}), repairing",
                header.descriptors_free,
                table.free_count()
            );
            header.descriptors_free = table.free_count() as u64;
            repaired = true;
        }
        let min_next_id = table.max_id().map_or(1, |max_id| max_id + 1);
        if header.next_id < min_next_id {
            tracing::warn!(
                "Header next ID {} is below the first unallocated ID {}, repairing",
                header.next_id,
                min_next_id
            );
            header.next_id = min_next_id;
            repaired = true;
        }

        tracing::debug!(
            "Loaded SIF container {}: {} of {} descriptors used",
            header.id,
            table.len(),
            table.capacity()
        );

        Ok(Self {
            store,
            header,
            table,
            writable,
            dirty: writable && repaired,
        })
    }

    /// Write the header and descriptor table back to the store
    ///
    /// Does nothing for a read-only image.
    pub fn flush(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }

        self.header.descriptors_free = self.table.free_count() as u64;
        let header = self.header.serialize()?;
        let table = self.serialize_table()?;

        self.store.seek(SeekFrom::Start(0))?;
        self.store.write_all(&header)?;
        self.store
            .seek(SeekFrom::Start(self.header.descriptors_offset))?;
        self.store.write_all(&table)?;
        self.store.flush()?;

        self.dirty = false;
        tracing::debug!("Flushed SIF container {}", self.header.id);
        Ok(())
    }

    /// Flush and release the backing store
    ///
    /// The returned error is the flush failure, if any. The store is released
    /// either way.
    pub fn unload(mut self) -> Result<()> {
        let result = self.flush();
        // Do not retry from Drop
        self.dirty = false;
        tracing::debug!("Unloaded SIF container {}", self.header.id);
        result
    }

    /// Add an object and return its ID
    ///
    /// The payload is appended to the data region, aligned to
    /// `input.alignment`. On error the descriptor table and header are left
    /// unchanged.
    pub fn add_object(&mut self, input: DescriptorInput, payload: &[u8]) -> Result<u32> {
        self.ensure_writable()?;

        if input.name.len() > NAME_LEN {
            return Err(Error::invalid_input(format!(
                "Object name is {} bytes, limit is {}",
                input.name.len(),
                NAME_LEN
            )));
        }
        let group = input.group.map(validate_group_id).transpose()?;
        self.table.check_link(input.link)?;

        if self.table.next_free_slot().is_none() {
            return Err(Error::TableFull(self.table.capacity()));
        }
        let id = self.header.next_id;
        validate_object_id(id).map_err(|_| Error::TableFull(self.table.capacity()))?;

        let now = input.time.unwrap_or_else(Utc::now).timestamp();
        let mut descr = Descriptor::new(id, input.datatype)
            .with_link(input.link)
            .with_name(input.name)
            .with_extra(input.extra)
            .with_times(now, now);
        if let Some(group) = group {
            descr = descr.with_group(group);
        }
        check_metadata(&descr)?;

        // Append the payload
        let data_end = self.header.data_end();
        let offset = align_up(data_end, input.alignment, "object payload")?;
        let size = payload.len() as u64;
        let end = checked_add_u64(offset, size, "object payload")?;

        self.store.seek(SeekFrom::Start(data_end))?;
        io::copy(&mut io::repeat(0).take(offset - data_end), &mut self.store)?;
        self.store.write_all(payload)?;

        let descr = descr.with_range(offset, size);
        let datatype = descr.datatype();
        let slot = self.table.insert(descr)?;

        self.header.next_id = id + 1;
        self.header.descriptors_free = self.table.free_count() as u64;
        self.header.data_size = end - self.header.data_offset;
        self.header.modified = now;
        self.dirty = true;

        tracing::info!(
            "Added object {} ({}, {} bytes at 0x{:X}) in slot {}",
            id,
            datatype,
            size,
            offset,
            slot
        );
        Ok(id)
    }

    /// Delete object `id`
    ///
    /// The slot becomes free for reuse. The ID is never handed out again.
    /// Deleting the primary partition resets the header architecture.
    pub fn delete_object(&mut self, id: u32, options: DeleteOptions) -> Result<()> {
        self.ensure_writable()?;

        let (offset, size, was_primary) = {
            let descr = self.table.get_descriptor([with_id(id)])?;
            let was_primary = match with_partition_type(PartType::PrimSys)?.matches(descr) {
                Ok(primary) => primary,
                Err(e) => {
                    tracing::warn!(
                        "Object {} has unreadable partition metadata, deleting anyway: {}",
                        id,
                        e
                    );
                    false
                }
            };
            (descr.offset(), descr.size(), was_primary)
        };

        if options.zero {
            self.store.seek(SeekFrom::Start(offset))?;
            io::copy(&mut io::repeat(0).take(size), &mut self.store)?;
        }

        let (slot, _) = self.table.remove(id)?;
        if was_primary {
            self.header.arch = Arch::Unknown;
        }
        self.header.descriptors_free = self.table.free_count() as u64;
        self.header.modified = Utc::now().timestamp();
        self.dirty = true;

        tracing::info!(
            "Deleted object {} from slot {}{}",
            id,
            slot,
            if options.zero { " (zeroed)" } else { "" }
        );
        Ok(())
    }

    /// Make partition `id` the primary system partition
    ///
    /// Any other primary partition is demoted to a system partition and the
    /// header architecture follows the new primary.
    pub fn set_primary_partition(&mut self, id: u32) -> Result<()> {
        self.ensure_writable()?;

        let mut primary = self.table.get_descriptor([with_id(id)])?.partition_metadata()?;

        let demoted = self
            .table
            .get_descriptors([with_partition_type(PartType::PrimSys)])?
            .into_iter()
            .filter(|descr| descr.id() != id)
            .map(|descr| Ok((descr.id(), descr.partition_metadata()?)))
            .collect::<Result<Vec<(u32, PartitionMetadata)>>>()?;

        let now = Utc::now().timestamp();
        for (other, mut meta) in demoted {
            meta.part_type = PartType::System;
            self.table
                .get_mut(other)
                .ok_or(Error::ObjectNotFound)?
                .set_partition_metadata(&meta, now)?;
            tracing::info!("Demoted object {} to system partition", other);
        }

        primary.part_type = PartType::PrimSys;
        self.table
            .get_mut(id)
            .ok_or(Error::ObjectNotFound)?
            .set_partition_metadata(&primary, now)?;

        self.header.arch = primary.arch;
        self.header.modified = now;
        self.dirty = true;

        tracing::info!(
            "Object {} is now the primary partition ({})",
            id,
            primary.arch
        );
        Ok(())
    }

    /// The primary system partition
    pub fn primary_partition(&self) -> Result<&Descriptor> {
        self.table
            .get_descriptor([with_partition_type(PartType::PrimSys)])
    }

    /// Read the payload of object `id`
    pub fn read_object(&mut self, id: u32) -> Result<Vec<u8>> {
        let mut reader = self.object_reader(id)?;
        let len = validate_allocation_size(reader.size(), MAX_OBJECT_READ_SIZE, "Object")?;

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        Ok(data)
    }

    /// Bounded reader over the payload of object `id`
    pub fn object_reader(&mut self, id: u32) -> Result<ObjectReader<&mut S>> {
        let (offset, size) = {
            let descr = self.table.get_descriptor([with_id(id)])?;
            (descr.offset(), descr.size())
        };
        Ok(ObjectReader::new(&mut self.store, offset, size)?)
    }

    /// Every used descriptor matching all `selectors`, in table order
    pub fn get_descriptors<I>(&self, selectors: I) -> Result<Vec<&Descriptor>>
    where
        I: IntoIterator,
        I::Item: IntoSelector,
    {
        self.table.get_descriptors(selectors)
    }

    /// The single used descriptor matching all `selectors`
    pub fn get_descriptor<I>(&self, selectors: I) -> Result<&Descriptor>
    where
        I: IntoIterator,
        I::Item: IntoSelector,
    {
        self.table.get_descriptor(selectors)
    }

    /// Visit used descriptors in table order until `visit` returns `false`
    pub fn with_descriptors<F>(&self, visit: F)
    where
        F: FnMut(&Descriptor) -> bool,
    {
        self.table.with_descriptors(visit)
    }

    /// Used descriptors in table order
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> + '_ {
        self.table.iter()
    }

    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Container UUID
    pub fn id(&self) -> Uuid {
        self.header.id
    }

    /// Architecture of the primary partition
    pub fn arch(&self) -> Arch {
        self.header.arch
    }

    pub fn descriptors_free(&self) -> usize {
        self.table.free_count()
    }

    pub fn descriptors_total(&self) -> usize {
        self.table.capacity()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.header.created_at()
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.header.modified_at()
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnlyContainer)
        }
    }

    fn serialize_table(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.table.capacity() * DESCRIPTOR_SIZE);
        let mut slot_bytes = [0u8; DESCRIPTOR_SIZE];
        for slot in self.table.slots() {
            match slot {
                Some(descr) => descr.serialize(&mut slot_bytes)?,
                None => Descriptor::serialize_free(&mut slot_bytes),
            }
            bytes.extend_from_slice(&slot_bytes);
        }
        Ok(bytes)
    }

    /// Write header, empty table and padding up to the data region
    fn write_layout(&mut self) -> Result<()> {
        self.flush()?;

        let table_end = self.header.descriptors_offset + self.header.descriptors_size;
        self.store.seek(SeekFrom::Start(table_end))?;
        io::copy(
            &mut io::repeat(0).take(self.header.data_offset - table_end),
            &mut self.store,
        )?;
        self.store.flush()?;
        Ok(())
    }
}

impl<S: ReadWriteSeek> Drop for FileImage<S> {
    fn drop(&mut self) {
        if self.writable && self.dirty {
            if let Err(e) = self.flush() {
                tracing::warn!(
                    "Failed to flush SIF container {} on drop: {}",
                    self.header.id,
                    e
                );
            }
        }
    }
}

/// Header and empty table for a new container
fn new_layout(options: &CreateOptions) -> Result<(Header, DescriptorTable)> {
    let now = options.time.unwrap_or_else(Utc::now).timestamp();
    let id = options.id.unwrap_or_else(Uuid::new_v4);
    let header = Header::new(
        options.capacity,
        &options.launch_script,
        options.arch,
        id,
        now,
    )?;
    let table = DescriptorTable::new(options.capacity)?;
    Ok((header, table))
}

/// Reject used descriptors whose payload leaves the data region or overlaps
/// another payload
fn check_payloads(header: &Header, table: &DescriptorTable) -> Result<()> {
    let mut ranges = Vec::with_capacity(table.len());
    for descr in table.iter() {
        if descr.offset() < header.data_offset || descr.end() > header.data_end() {
            return Err(Error::malformed(format!(
                "Object {} payload 0x{:X}..0x{:X} is outside the data region 0x{:X}..0x{:X}",
                descr.id(),
                descr.offset(),
                descr.end(),
                header.data_offset,
                header.data_end()
            )));
        }
        if descr.size() > 0 {
            ranges.push((descr.offset(), descr.end(), descr.id()));
        }
    }

    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        let (_, prev_end, prev_id) = pair[0];
        let (start, _, id) = pair[1];
        if start < prev_end {
            return Err(Error::malformed(format!(
                "Object {} payload overlaps object {}",
                id, prev_id
            )));
        }
    }
    Ok(())
}

/// Typed datatypes must carry a decodable extra block
fn check_metadata(descr: &Descriptor) -> Result<()> {
    match descr.datatype() {
        Datatype::Partition => descr.partition_metadata().map(drop),
        Datatype::Signature => descr.signature_metadata().map(drop),
        Datatype::CryptoMessage => descr.crypto_message_metadata().map(drop),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::with_data_type;
    use sif_format::{ExtraRecord, FsType, HashType, SignatureMetadata};
    use std::io::Cursor;

    fn new_image(store: &mut Cursor<Vec<u8>>) -> FileImage<&mut Cursor<Vec<u8>>> {
        FileImage::create_in(
            store,
            CreateOptions {
                capacity: 4,
                id: Some(Uuid::nil()),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn partition_input(part_type: PartType, arch: Arch) -> DescriptorInput {
        DescriptorInput::new(Datatype::Partition)
            .with_name("rootfs")
            .with_group(1)
            .with_metadata(&PartitionMetadata::new(FsType::Squash, part_type, arch))
    }

    #[test]
    fn test_create_layout() {
        let mut store = Cursor::new(Vec::new());
        let image = new_image(&mut store);
        assert_eq!(image.descriptors_total(), 4);
        assert_eq!(image.descriptors_free(), 4);
        assert_eq!(image.header().data_offset, 8192);
        image.unload().unwrap();

        assert_eq!(store.get_ref().len(), 8192);
        assert_eq!(&store.get_ref()[32..41], b"SIF_MAGIC");
    }

    #[test]
    fn test_add_and_read() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);

        let id = image
            .add_object(partition_input(PartType::PrimSys, Arch::Amd64), b"squash")
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(image.read_object(id).unwrap(), b"squash");

        let descr = image.get_descriptor([with_id(1)]).unwrap();
        assert_eq!(descr.offset(), 8192);
        assert_eq!(descr.size(), 6);
        assert_eq!(descr.name(), "rootfs");
        assert_eq!(image.header().data_size, 6);
        assert_eq!(image.primary_partition().unwrap().id(), 1);
    }

    #[test]
    fn test_add_alignment() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);

        image
            .add_object(DescriptorInput::new(Datatype::Generic), b"abc")
            .unwrap();
        let id = image
            .add_object(
                DescriptorInput::new(Datatype::Generic).with_alignment(512),
                b"def",
            )
            .unwrap();

        let descr = image.get_descriptor([with_id(id)]).unwrap();
        assert_eq!(descr.offset(), 8192 + 512);
        assert_eq!(image.header().data_size, 512 + 3);
    }

    #[test]
    fn test_add_rejects_bad_metadata() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);

        // Partition without a partition record
        assert!(matches!(
            image.add_object(DescriptorInput::new(Datatype::Partition), b"x"),
            Err(Error::MalformedDescriptor(_))
        ));

        let sig = SignatureMetadata::new(HashType::Sha256, b"fingerprint").unwrap();
        let input = DescriptorInput::new(Datatype::Signature).with_metadata(&sig);
        assert!(image.add_object(input, b"sig").is_ok());
        assert_eq!(image.table().len(), 1);
    }

    #[test]
    fn test_add_name_too_long() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);
        let input = DescriptorInput::new(Datatype::Generic).with_name("n".repeat(NAME_LEN + 1));
        assert!(matches!(
            image.add_object(input, b""),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(image.header().next_id, 1);
    }

    #[test]
    fn test_delete_primary_resets_arch() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);

        let id = image
            .add_object(partition_input(PartType::PrimSys, Arch::Arm64), b"fs")
            .unwrap();
        image.set_primary_partition(id).unwrap();
        assert_eq!(image.arch(), Arch::Arm64);

        image.delete_object(id, DeleteOptions::default()).unwrap();
        assert_eq!(image.arch(), Arch::Unknown);
        assert!(image
            .get_descriptors([with_data_type(Datatype::Partition)])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_delete_partition_with_bad_metadata() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);

        // Zeroed extra block does not decode as a partition record
        image
            .table
            .insert(Descriptor::new(1, Datatype::Partition).with_range(8192, 0))
            .unwrap();
        image.header.arch = Arch::Amd64;

        image.delete_object(1, DeleteOptions::default()).unwrap();
        assert!(image.table().is_empty());
        assert_eq!(image.arch(), Arch::Amd64);
    }

    #[test]
    fn test_set_primary_requires_partition() {
        let mut store = Cursor::new(Vec::new());
        let mut image = new_image(&mut store);
        let id = image
            .add_object(DescriptorInput::new(Datatype::Labels), b"{}")
            .unwrap();
        assert!(matches!(
            image.set_primary_partition(id),
            Err(Error::MalformedDescriptor(_))
        ));
        assert!(matches!(
            image.set_primary_partition(9),
            Err(Error::ObjectNotFound)
        ));
    }

    #[test]
    fn test_check_payloads_overlap() {
        let header = Header::new(4, "", Arch::Unknown, Uuid::nil(), 0).unwrap();
        let mut header = header;
        header.data_size = 100;

        let table = DescriptorTable::from_descriptors(
            4,
            [
                Descriptor::new(1, Datatype::Generic).with_range(8192, 50),
                Descriptor::new(2, Datatype::Generic).with_range(8192 + 40, 20),
            ],
        )
        .unwrap();
        assert!(matches!(
            check_payloads(&header, &table),
            Err(Error::MalformedDescriptor(_))
        ));

        let table = DescriptorTable::from_descriptors(
            4,
            [Descriptor::new(1, Datatype::Generic).with_range(8192 + 90, 20)],
        )
        .unwrap();
        assert!(matches!(
            check_payloads(&header, &table),
            Err(Error::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_check_metadata() {
        let meta = PartitionMetadata::new(FsType::Raw, PartType::Data, Arch::Unknown);
        let good = Descriptor::new(1, Datatype::Partition).with_extra(meta.to_extra());
        assert!(check_metadata(&good).is_ok());
        assert!(check_metadata(&Descriptor::new(2, Datatype::Generic)).is_ok());
        assert!(check_metadata(&Descriptor::new(3, Datatype::CryptoMessage)).is_err());
    }
}
