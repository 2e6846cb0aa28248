//! Options for creating containers and adding or removing objects

use chrono::{DateTime, Utc};
use sif_core::{Arch, Result};
use sif_format::{Datatype, ExtraRecord, Header, Link, EXTRA_LEN};
use uuid::Uuid;

/// Default descriptor table capacity of a new container
pub const DEFAULT_CAPACITY: usize = 48;

/// Default payload alignment
pub const DEFAULT_ALIGNMENT: u64 = 1;

/// Options for container creation
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Launch script written at the start of the file
    pub launch_script: String,
    /// Container UUID (random v4 when `None`)
    pub id: Option<Uuid>,
    /// Descriptor table capacity
    pub capacity: usize,
    /// Initial architecture
    pub arch: Arch,
    /// Creation time (now when `None`)
    pub time: Option<DateTime<Utc>>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            launch_script: Header::DEFAULT_LAUNCH.to_string(),
            id: None,
            capacity: DEFAULT_CAPACITY,
            arch: Arch::Unknown,
            time: None,
        }
    }
}

/// Options for object deletion
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Overwrite the payload bytes with zeros
    pub zero: bool,
}

/// Description of an object to add
#[derive(Debug, Clone)]
pub struct DescriptorInput {
    pub datatype: Datatype,
    pub name: String,
    pub group: Option<u32>,
    pub link: Link,
    pub extra: [u8; EXTRA_LEN],
    /// Payload start alignment in bytes
    pub alignment: u64,
    /// Object timestamps (now when `None`)
    pub time: Option<DateTime<Utc>>,
}

impl DescriptorInput {
    pub fn new(datatype: Datatype) -> Self {
        Self {
            datatype,
            name: String::new(),
            group: None,
            link: Link::None,
            extra: [0u8; EXTRA_LEN],
            alignment: DEFAULT_ALIGNMENT,
            time: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    /// Link to another object by ID
    pub fn with_linked_id(self, id: u32) -> Result<Self> {
        Ok(self.with_link(Link::object(id)?))
    }

    /// Link to a group
    pub fn with_linked_group_id(self, group: u32) -> Result<Self> {
        Ok(self.with_link(Link::group(group)?))
    }

    /// Encode a typed metadata record into the extra block
    pub fn with_metadata<T: ExtraRecord>(mut self, meta: &T) -> Self {
        self.extra = meta.to_extra();
        self
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }
}
