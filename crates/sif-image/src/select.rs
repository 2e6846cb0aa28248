//! Descriptor selectors
//!
//! A [`Selector`] is one predicate over a [`Descriptor`]. Query operations
//! take a list of selectors and keep descriptors that satisfy all of them.
//!
//! Constructors reject questions that can never be answered (ID 0, group 0)
//! when the selector is built, so a bad query fails before any table scan:
//!
//! ```rust
//! use sif_image::select::{with_group_id, with_id};
//! use sif_core::Error;
//!
//! assert!(matches!(with_id(0), Err(Error::InvalidObjectId(0))));
//! assert!(matches!(with_group_id(0), Err(Error::InvalidGroupId(0))));
//! ```

use sif_core::Result;
use sif_format::refs::{validate_group_id, validate_object_id};
use sif_format::{Datatype, Descriptor, Link, PartType};

/// Predicate over a single descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Object ID equals
    Id(u32),
    /// Datatype equals
    DataType(Datatype),
    /// Member of group
    GroupId(u32),
    /// Member of no group
    NoGroup,
    /// Links directly to object
    LinkedId(u32),
    /// Links to group
    LinkedGroupId(u32),
    /// Partition of the given type
    PartitionType(PartType),
}

impl Selector {
    /// Check the selector can ever match
    pub fn validate(self) -> Result<Self> {
        match self {
            Selector::Id(id) | Selector::LinkedId(id) => {
                validate_object_id(id)?;
            }
            Selector::GroupId(group) | Selector::LinkedGroupId(group) => {
                validate_group_id(group)?;
            }
            Selector::DataType(_) | Selector::NoGroup | Selector::PartitionType(_) => {}
        }
        Ok(self)
    }

    /// Evaluate the selector against one descriptor
    ///
    /// Only [`Selector::PartitionType`] can fail, when a partition's extra
    /// block does not decode.
    pub fn matches(&self, descr: &Descriptor) -> Result<bool> {
        let matched = match *self {
            Selector::Id(id) => descr.id() == id,
            Selector::DataType(datatype) => descr.datatype() == datatype,
            Selector::GroupId(group) => descr.group_id() == Some(group),
            Selector::NoGroup => descr.group_id().is_none(),
            Selector::LinkedId(id) => descr.link() == Link::Object(id),
            Selector::LinkedGroupId(group) => descr.link() == Link::Group(group),
            Selector::PartitionType(part_type) => {
                if descr.datatype() != Datatype::Partition {
                    return Ok(false);
                }
                descr.partition_metadata()?.part_type == part_type
            }
        };
        Ok(matched)
    }
}

/// Anything a query accepts as a selector
///
/// Implemented for [`Selector`] and for the `Result<Selector>` returned by
/// the `with_*` constructors, so construction errors flow into the query.
pub trait IntoSelector {
    fn into_selector(self) -> Result<Selector>;
}

impl IntoSelector for Selector {
    fn into_selector(self) -> Result<Selector> {
        self.validate()
    }
}

impl IntoSelector for Result<Selector> {
    fn into_selector(self) -> Result<Selector> {
        self?.validate()
    }
}

/// Resolve a selector list, failing on the first invalid selector
pub(crate) fn collect_selectors<I>(selectors: I) -> Result<Vec<Selector>>
where
    I: IntoIterator,
    I::Item: IntoSelector,
{
    selectors
        .into_iter()
        .map(IntoSelector::into_selector)
        .collect()
}

/// True when `descr` satisfies every selector
pub(crate) fn matches_all(selectors: &[Selector], descr: &Descriptor) -> Result<bool> {
    for selector in selectors {
        if !selector.matches(descr)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Select the object with ID `id`
pub fn with_id(id: u32) -> Result<Selector> {
    Selector::Id(id).validate()
}

/// Select objects of datatype `datatype`
pub fn with_data_type(datatype: Datatype) -> Result<Selector> {
    Ok(Selector::DataType(datatype))
}

/// Select objects in group `group`
pub fn with_group_id(group: u32) -> Result<Selector> {
    Selector::GroupId(group).validate()
}

/// Select objects that belong to no group
pub fn with_no_group() -> Result<Selector> {
    Ok(Selector::NoGroup)
}

/// Select objects linked to object `id`
pub fn with_linked_id(id: u32) -> Result<Selector> {
    Selector::LinkedId(id).validate()
}

/// Select objects linked to group `group`
pub fn with_linked_group_id(group: u32) -> Result<Selector> {
    Selector::LinkedGroupId(group).validate()
}

/// Select partitions of type `part_type`
pub fn with_partition_type(part_type: PartType) -> Result<Selector> {
    Ok(Selector::PartitionType(part_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sif_core::{Arch, Error};
    use sif_format::{ExtraRecord, FsType, PartitionMetadata, EXTRA_LEN};

    fn partition(id: u32, part_type: PartType) -> Descriptor {
        let meta = PartitionMetadata::new(FsType::Squash, part_type, Arch::Amd64);
        Descriptor::new(id, Datatype::Partition).with_extra(meta.to_extra())
    }

    #[test]
    fn test_zero_ids_rejected() {
        assert!(matches!(with_id(0), Err(Error::InvalidObjectId(0))));
        assert!(matches!(with_linked_id(0), Err(Error::InvalidObjectId(0))));
        assert!(matches!(with_group_id(0), Err(Error::InvalidGroupId(0))));
        assert!(matches!(
            with_linked_group_id(0),
            Err(Error::InvalidGroupId(0))
        ));
    }

    #[test]
    fn test_raw_selector_validated() {
        assert!(matches!(
            Selector::GroupId(0).into_selector(),
            Err(Error::InvalidGroupId(0))
        ));
        assert_eq!(Selector::NoGroup.into_selector().unwrap(), Selector::NoGroup);
    }

    #[test]
    fn test_group_and_link_selectors() {
        let descr = Descriptor::new(2, Datatype::Signature)
            .with_group(1)
            .with_link(Link::Object(1));

        assert!(with_id(2).unwrap().matches(&descr).unwrap());
        assert!(with_group_id(1).unwrap().matches(&descr).unwrap());
        assert!(!with_no_group().unwrap().matches(&descr).unwrap());
        assert!(with_linked_id(1).unwrap().matches(&descr).unwrap());
        // An object link to 1 is not a group link to 1
        assert!(!with_linked_group_id(1).unwrap().matches(&descr).unwrap());
    }

    #[test]
    fn test_partition_type() {
        let prim = partition(1, PartType::PrimSys);
        let selector = with_partition_type(PartType::PrimSys).unwrap();
        assert!(selector.matches(&prim).unwrap());
        assert!(!selector.matches(&partition(2, PartType::Data)).unwrap());

        // Other datatypes never match
        let sig = Descriptor::new(3, Datatype::Signature);
        assert!(!selector.matches(&sig).unwrap());

        // Partition with an undecodable extra block
        let broken = Descriptor::new(4, Datatype::Partition).with_extra([0u8; EXTRA_LEN]);
        assert!(matches!(
            selector.matches(&broken),
            Err(Error::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn test_matches_all() {
        let descr = Descriptor::new(3, Datatype::Signature).with_link(Link::Group(1));
        let selectors =
            collect_selectors([with_data_type(Datatype::Signature), with_no_group()]).unwrap();
        assert!(matches_all(&selectors, &descr).unwrap());

        let selectors = collect_selectors([
            with_data_type(Datatype::Signature),
            with_linked_id(1),
        ])
        .unwrap();
        assert!(!matches_all(&selectors, &descr).unwrap());
        assert!(matches_all(&[], &descr).unwrap());
    }

    #[test]
    fn test_collect_stops_at_first_error() {
        let err = collect_selectors([with_group_id(1), with_id(0), with_group_id(0)]).unwrap_err();
        assert!(matches!(err, Error::InvalidObjectId(0)));
    }
}
