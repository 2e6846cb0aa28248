//! # SIF Image
//!
//! Descriptor table model, selector engine and container lifecycle.
//!
//! - **DescriptorTable**: fixed-capacity arena of object descriptors
//! - **Selector**: composable predicates for locating objects
//! - **FileImage**: a loaded container (create, load, add, delete, flush, unload)
//! - **ObjectReader**: bounded `Read + Seek` view of one object's payload
//!
//! ## Example
//!
//! ```rust
//! use sif_image::select::{with_data_type, with_group_id};
//! use sif_image::{CreateOptions, DescriptorInput, FileImage};
//! use sif_format::Datatype;
//! use std::io::Cursor;
//!
//! let mut store = Cursor::new(Vec::new());
//! let mut image = FileImage::create_in(&mut store, CreateOptions::default()).unwrap();
//!
//! let input = DescriptorInput::new(Datatype::GenericJson)
//!     .with_name("labels.json")
//!     .with_group(1);
//! let id = image.add_object(input, br#"{"org":"example"}"#).unwrap();
//!
//! let found = image
//!     .get_descriptors([with_data_type(Datatype::GenericJson), with_group_id(1)])
//!     .unwrap();
//! assert_eq!(found[0].id(), id);
//! image.unload().unwrap();
//! ```

pub mod image;
pub mod options;
pub mod reader;
pub mod select;
pub mod table;

pub use image::FileImage;
pub use options::{CreateOptions, DeleteOptions, DescriptorInput, DEFAULT_CAPACITY};
pub use reader::ObjectReader;
pub use select::{IntoSelector, Selector};
pub use table::DescriptorTable;
