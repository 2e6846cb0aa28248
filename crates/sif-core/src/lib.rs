//! # SIF Core
//!
//! Core traits, types, and error handling shared by the SIF crates.
//!
//! A SIF (Singularity Image Format) file bundles opaque data objects together
//! with a descriptor table that records how the objects relate:
//! - **Header**: where the descriptor table and the data region live
//! - **Descriptor**: one object's type, identity, group, link and payload range
//! - **Data region**: the payload bytes of every object
//!
//! This crate only holds what every layer needs: the [`Error`] taxonomy, the
//! backing store traits, safety limits and a few shared value types.
//!
//! ## Example
//!
//! ```rust
//! use sif_core::{Arch, Error, Result};
//!
//! fn parse_arch(code: &[u8]) -> Result<Arch> {
//!     Arch::from_code(code).ok_or_else(|| Error::invalid_input("unknown architecture"))
//! }
//!
//! assert_eq!(parse_arch(b"02\0").unwrap(), Arch::Amd64);
//! ```

pub mod error;
pub mod security;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use error::{Error, Result};
pub use traits::ReadWriteSeek;
pub use types::{format_size, Arch};
