//! In-memory descriptor table
//!
//! The table is a fixed-capacity arena of slots. A slot holds `Some` while its
//! object is used and `None` once deleted or never filled. Deleted slots are
//! reused lowest index first and the table is never compacted, so slot order
//! (and therefore query order) stays stable across deletes.

use crate::select::{collect_selectors, matches_all, IntoSelector};
use sif_core::security::validate_capacity;
use sif_core::{Error, Result};
use sif_format::refs::validate_object_id;
use sif_format::{Descriptor, Link};
use std::collections::{BTreeSet, HashSet};

/// Fixed-capacity descriptor arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTable {
    slots: Vec<Option<Descriptor>>,
    free: BTreeSet<usize>,
}

impl DescriptorTable {
    /// Create an empty table with `capacity` slots
    pub fn new(capacity: usize) -> Result<Self> {
        validate_capacity(capacity)?;
        Ok(Self {
            slots: vec![None; capacity],
            free: (0..capacity).collect(),
        })
    }

    /// Build a table from parsed slots
    ///
    /// Fails with `MalformedDescriptor` if two used slots share an ID.
    pub fn from_slots(slots: Vec<Option<Descriptor>>) -> Result<Self> {
        validate_capacity(slots.len())?;

        let mut seen = HashSet::new();
        for descr in slots.iter().flatten() {
            if !seen.insert(descr.id()) {
                return Err(Error::malformed(format!(
                    "Duplicate object ID {} in descriptor table",
                    descr.id()
                )));
            }
        }

        let free = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect();

        Ok(Self { slots, free })
    }

    /// Build a table holding `descriptors` in the first slots
    pub fn from_descriptors<I>(capacity: usize, descriptors: I) -> Result<Self>
    where
        I: IntoIterator<Item = Descriptor>,
    {
        let mut table = Self::new(capacity)?;
        for descr in descriptors {
            table.insert(descr)?;
        }
        Ok(table)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of used slots
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.len() == self.slots.len()
    }

    /// Number of free slots
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// All slots in table order, free ones included
    pub fn slots(&self) -> &[Option<Descriptor>] {
        &self.slots
    }

    /// Used descriptors in table order
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> + '_ {
        self.slots.iter().flatten()
    }

    /// Slot the next insert will fill
    pub fn next_free_slot(&self) -> Option<usize> {
        self.free.first().copied()
    }

    /// Look up a used descriptor by ID
    pub fn get(&self, id: u32) -> Option<&Descriptor> {
        self.iter().find(|descr| descr.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut Descriptor> {
        self.slots.iter_mut().flatten().find(|descr| descr.id() == id)
    }

    /// True if a used descriptor has ID `id`
    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// True if at least one used descriptor is a member of `group`
    pub fn group_in_use(&self, group: u32) -> bool {
        self.iter().any(|descr| descr.group_id() == Some(group))
    }

    /// Largest ID among used descriptors
    pub fn max_id(&self) -> Option<u32> {
        self.iter().map(Descriptor::id).max()
    }

    /// Check that `link` names an existing object or a group in use
    pub fn check_link(&self, link: Link) -> Result<()> {
        match link.validate()? {
            Link::None => Ok(()),
            Link::Object(id) if self.contains(id) => Ok(()),
            Link::Object(id) => Err(Error::InvalidObjectId(id)),
            Link::Group(group) if self.group_in_use(group) => Ok(()),
            Link::Group(group) => Err(Error::InvalidGroupId(group)),
        }
    }

    /// Place `descr` in the lowest free slot
    ///
    /// Returns the slot index. The table is left unchanged on error.
    pub fn insert(&mut self, descr: Descriptor) -> Result<usize> {
        validate_object_id(descr.id())?;
        if self.contains(descr.id()) {
            return Err(Error::already_exists(format!("Object {}", descr.id())));
        }
        let slot = self
            .next_free_slot()
            .ok_or(Error::TableFull(self.capacity()))?;

        self.free.remove(&slot);
        self.slots[slot] = Some(descr);
        Ok(slot)
    }

    /// Free the slot holding object `id`
    ///
    /// Returns the slot index and the removed descriptor.
    pub fn remove(&mut self, id: u32) -> Result<(usize, Descriptor)> {
        let slot = self
            .slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|descr| descr.id() == id))
            .ok_or(Error::ObjectNotFound)?;

        let descr = self.slots[slot].take().ok_or(Error::ObjectNotFound)?;
        self.free.insert(slot);
        Ok((slot, descr))
    }

    /// Every used descriptor matching all `selectors`, in table order
    ///
    /// An invalid selector fails the query before the table is scanned. An
    /// empty result is not an error.
    pub fn get_descriptors<I>(&self, selectors: I) -> Result<Vec<&Descriptor>>
    where
        I: IntoIterator,
        I::Item: IntoSelector,
    {
        let selectors = collect_selectors(selectors)?;

        let mut found = Vec::new();
        for descr in self.iter() {
            if matches_all(&selectors, descr)? {
                found.push(descr);
            }
        }
        Ok(found)
    }

    /// The single used descriptor matching all `selectors`
    pub fn get_descriptor<I>(&self, selectors: I) -> Result<&Descriptor>
    where
        I: IntoIterator,
        I::Item: IntoSelector,
    {
        let mut found = self.get_descriptors(selectors)?;
        match found.len() {
            0 => Err(Error::ObjectNotFound),
            1 => Ok(found.remove(0)),
            n => Err(Error::MultipleObjectsFound(n)),
        }
    }

    /// Visit used descriptors in table order until `visit` returns `false`
    pub fn with_descriptors<F>(&self, mut visit: F)
    where
        F: FnMut(&Descriptor) -> bool,
    {
        for descr in self.iter() {
            if !visit(descr) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::{
        with_data_type, with_group_id, with_id, with_linked_group_id, with_linked_id,
        with_no_group, with_partition_type, Selector,
    };
    use sif_core::Arch;
    use sif_format::{Datatype, ExtraRecord, FsType, PartType, PartitionMetadata};

    /// Partition 1 in group 1, signature 2 in group 1 linked to object 1,
    /// signature 3 in no group linked to group 1
    fn sample_table() -> DescriptorTable {
        let meta = PartitionMetadata::new(FsType::Squash, PartType::PrimSys, Arch::Amd64);
        DescriptorTable::from_descriptors(
            8,
            [
                Descriptor::new(1, Datatype::Partition)
                    .with_group(1)
                    .with_extra(meta.to_extra()),
                Descriptor::new(2, Datatype::Signature)
                    .with_group(1)
                    .with_link(Link::Object(1)),
                Descriptor::new(3, Datatype::Signature).with_link(Link::Group(1)),
            ],
        )
        .unwrap()
    }

    fn ids(found: Vec<&Descriptor>) -> Vec<u32> {
        found.into_iter().map(Descriptor::id).collect()
    }

    #[test]
    fn test_get_descriptors() {
        let table = sample_table();

        let cases: Vec<(&str, Result<Selector>, Vec<u32>)> = vec![
            ("datatype", with_data_type(Datatype::Signature), vec![2, 3]),
            ("group", with_group_id(1), vec![1, 2]),
            ("no group", with_no_group(), vec![3]),
            ("linked id", with_linked_id(1), vec![2]),
            ("linked group", with_linked_group_id(1), vec![3]),
            ("id", with_id(3), vec![3]),
            ("partition type", with_partition_type(PartType::PrimSys), vec![1]),
            ("no match", with_group_id(2), vec![]),
        ];

        for (name, selector, want) in cases {
            let got = ids(table.get_descriptors([selector]).unwrap());
            assert_eq!(got, want, "{}", name);
        }
    }

    #[test]
    fn test_get_descriptors_combined() {
        let table = sample_table();
        let found = table
            .get_descriptors([with_data_type(Datatype::Signature), with_group_id(1)])
            .unwrap();
        assert_eq!(ids(found), vec![2]);
    }

    #[test]
    fn test_get_descriptors_no_selectors() {
        let table = sample_table();
        let found = table.get_descriptors(Vec::<Selector>::new()).unwrap();
        assert_eq!(ids(found), vec![1, 2, 3]);
    }

    #[test]
    fn test_get_descriptors_invalid_selector() {
        let table = sample_table();
        assert!(matches!(
            table.get_descriptors([with_data_type(Datatype::Signature), with_group_id(0)]),
            Err(Error::InvalidGroupId(0))
        ));
        assert!(matches!(
            table.get_descriptors([with_linked_id(0)]),
            Err(Error::InvalidObjectId(0))
        ));

        // Still fails on an empty table
        let empty = DescriptorTable::new(4).unwrap();
        assert!(matches!(
            empty.get_descriptors([with_id(0)]),
            Err(Error::InvalidObjectId(0))
        ));
    }

    #[test]
    fn test_get_descriptor() {
        let table = sample_table();

        assert_eq!(table.get_descriptor([with_id(2)]).unwrap().id(), 2);
        assert!(matches!(
            table.get_descriptor([with_group_id(1)]),
            Err(Error::MultipleObjectsFound(2))
        ));
        assert!(matches!(
            table.get_descriptor([with_group_id(2)]),
            Err(Error::ObjectNotFound)
        ));
        assert!(matches!(
            table.get_descriptor([with_id(0)]),
            Err(Error::InvalidObjectId(0))
        ));
    }

    #[test]
    fn test_with_descriptors() {
        let table = sample_table();

        let mut seen = Vec::new();
        table.with_descriptors(|descr| {
            seen.push(descr.id());
            true
        });
        assert_eq!(seen, vec![1, 2, 3]);

        // Early stop
        let mut seen = Vec::new();
        table.with_descriptors(|descr| {
            seen.push(descr.id());
            descr.id() != 2
        });
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_remove_and_reuse_slot() {
        let mut table = sample_table();

        let (slot, removed) = table.remove(2).unwrap();
        assert_eq!(slot, 1);
        assert_eq!(removed.id(), 2);
        assert_eq!(table.len(), 2);
        assert!(matches!(table.remove(2), Err(Error::ObjectNotFound)));

        // Deleted object is gone from queries
        let found = table
            .get_descriptors([with_data_type(Datatype::Signature)])
            .unwrap();
        assert_eq!(ids(found), vec![3]);

        // The freed slot is reused before later ones
        let slot = table
            .insert(Descriptor::new(4, Datatype::Generic))
            .unwrap();
        assert_eq!(slot, 1);
        let all = table.get_descriptors(Vec::<Selector>::new()).unwrap();
        assert_eq!(ids(all), vec![1, 4, 3]);
    }

    #[test]
    fn test_insert_errors() {
        let mut table = DescriptorTable::new(1).unwrap();
        table.insert(Descriptor::new(1, Datatype::Generic)).unwrap();

        assert!(matches!(
            table.insert(Descriptor::new(2, Datatype::Generic)),
            Err(Error::TableFull(1))
        ));
        assert!(matches!(
            table.insert(Descriptor::new(1, Datatype::Generic)),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            table.insert(Descriptor::new(0, Datatype::Generic)),
            Err(Error::InvalidObjectId(0))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_from_slots_duplicate_id() {
        let slots = vec![
            Some(Descriptor::new(1, Datatype::Generic)),
            None,
            Some(Descriptor::new(1, Datatype::Labels)),
        ];
        assert!(matches!(
            DescriptorTable::from_slots(slots),
            Err(Error::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_from_slots_free_list() {
        let slots = vec![None, Some(Descriptor::new(5, Datatype::Generic)), None];
        let table = DescriptorTable::from_slots(slots).unwrap();
        assert_eq!(table.free_count(), 2);
        assert_eq!(table.next_free_slot(), Some(0));
        assert_eq!(table.max_id(), Some(5));
    }

    #[test]
    fn test_check_link() {
        let table = sample_table();
        assert!(table.check_link(Link::None).is_ok());
        assert!(table.check_link(Link::Object(1)).is_ok());
        assert!(table.check_link(Link::Group(1)).is_ok());
        assert!(matches!(
            table.check_link(Link::Object(9)),
            Err(Error::InvalidObjectId(9))
        ));
        assert!(matches!(
            table.check_link(Link::Group(2)),
            Err(Error::InvalidGroupId(2))
        ));
    }
}
