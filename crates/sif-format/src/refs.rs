//! Group and link references
//!
//! On disk, the group and link fields are plain `u32`s. The high-order tag bits
//! say whether the number names a group or an object:
//!
//! ```text
//! groupid: 0                      -> no group
//!          DESCR_GROUP_MASK | n   -> group n
//! link:    0                      -> no link
//!          id                     -> object `id`
//!          DESCR_GROUP_MASK | n   -> group n
//! ```
//!
//! The tag bits are applied and stripped only by the functions in this module.

use serde::Serialize;
use sif_core::{Error, Result};
use std::fmt;

/// Tag bits marking a group reference
pub const DESCR_GROUP_MASK: u32 = 0xF000_0000;

/// Raw groupid of an object that belongs to no group
pub const DESCR_UNUSED_GROUP: u32 = 0;

/// Raw link of an object with no relation
pub const DESCR_UNUSED_LINK: u32 = 0;

/// Largest object ID or group number that leaves the tag bits clear
pub const MAX_REF_ID: u32 = !DESCR_GROUP_MASK;

/// Where a descriptor's link points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Link {
    /// No relation
    #[default]
    None,
    /// Another object, by ID
    Object(u32),
    /// Every object of a group, by group number
    Group(u32),
}

impl Link {
    /// Link to an object, rejecting IDs that can never exist
    pub fn object(id: u32) -> Result<Self> {
        Ok(Link::Object(validate_object_id(id)?))
    }

    /// Link to a group, rejecting reserved group numbers
    pub fn group(group: u32) -> Result<Self> {
        Ok(Link::Group(validate_group_id(group)?))
    }

    /// Decode the raw on-disk link field
    pub fn from_raw(raw: u32) -> Self {
        if raw & DESCR_GROUP_MASK != 0 {
            match raw & !DESCR_GROUP_MASK {
                0 => Link::None,
                group => Link::Group(group),
            }
        } else if raw == DESCR_UNUSED_LINK {
            Link::None
        } else {
            Link::Object(raw)
        }
    }

    /// Encode to the raw on-disk link field
    pub fn to_raw(self) -> u32 {
        match self {
            Link::None => DESCR_UNUSED_LINK,
            Link::Object(id) => id,
            Link::Group(group) => group | DESCR_GROUP_MASK,
        }
    }

    /// Check the referenced number fits beside the tag bits
    pub fn validate(self) -> Result<Self> {
        match self {
            Link::None => Ok(self),
            Link::Object(id) => Link::object(id),
            Link::Group(group) => Link::group(group),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::None => write!(f, "NONE"),
            Link::Object(id) => write!(f, "{}", id),
            Link::Group(group) => write!(f, "{} (G)", group),
        }
    }
}

/// Decode the raw on-disk groupid field
///
/// A bare mask with a zero group number is the legacy spelling of "no group".
pub fn group_from_raw(raw: u32) -> Option<u32> {
    match raw & !DESCR_GROUP_MASK {
        0 => None,
        group => Some(group),
    }
}

/// Encode a group membership to the raw on-disk groupid field
pub fn group_to_raw(group: Option<u32>) -> u32 {
    match group {
        None => DESCR_UNUSED_GROUP,
        Some(group) => group | DESCR_GROUP_MASK,
    }
}

/// Reject object IDs that can never name an object
pub fn validate_object_id(id: u32) -> Result<u32> {
    if id == 0 || id > MAX_REF_ID {
        return Err(Error::InvalidObjectId(id));
    }
    Ok(id)
}

/// Reject group numbers that can never name a group
pub fn validate_group_id(group: u32) -> Result<u32> {
    if group == 0 || group > MAX_REF_ID {
        return Err(Error::InvalidGroupId(group));
    }
    Ok(group)
}
