//! Security validation constants and helpers
//!
//! Limits and checked arithmetic that keep a hostile header from driving
//! allocations or offset math out of bounds.

use crate::Error;

/// Maximum descriptor table capacity accepted on create or load
pub const MAX_DESCRIPTOR_CAPACITY: usize = 4096;

/// Maximum payload size returned in one `read_object` call (1 GB)
pub const MAX_OBJECT_READ_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum payload alignment honored when appending objects (16 MB)
pub const MAX_ALIGNMENT: u64 = 16 * 1024 * 1024;

/// Validate that a size is within allocation limits
///
/// # Security
/// Prevents memory exhaustion from sizes read out of a container
pub fn validate_allocation_size(size: u64, limit: usize, context: &str) -> crate::Result<usize> {
    if size > limit as u64 {
        return Err(Error::invalid_input(format!(
            "{} size {} exceeds limit {}",
            context, size, limit
        )));
    }

    size.try_into()
        .map_err(|_| Error::invalid_input(format!("{} size exceeds platform limits", context)))
}

/// Safely multiply two u64 values with overflow checking
pub fn checked_multiply_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_mul(b)
        .ok_or_else(|| Error::corrupt_header(format!("{}: multiplication overflow", context)))
}

/// Safely add two u64 values with overflow checking
pub fn checked_add_u64(a: u64, b: u64, context: &str) -> crate::Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| Error::corrupt_header(format!("{}: addition overflow", context)))
}

/// Convert an on-disk signed field to an offset or size
///
/// Negative values never describe a valid location.
pub fn i64_to_u64(value: i64, context: &str) -> crate::Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::corrupt_header(format!("{}: negative value {}", context, value)))
}

/// Convert an offset or size to its on-disk signed form
pub fn u64_to_i64(value: u64, context: &str) -> crate::Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::invalid_input(format!("{}: value {} exceeds i64", context, value)))
}

/// Safely convert u64 to usize with platform checking
///
/// # Security
/// Prevents truncation on 32-bit platforms
pub fn u64_to_usize(value: u64, context: &str) -> crate::Result<usize> {
    value.try_into().map_err(|_| {
        Error::invalid_input(format!(
            "{}: value {} exceeds platform usize limit",
            context, value
        ))
    })
}

/// Round `value` up to the next multiple of `alignment`
pub fn align_up(value: u64, alignment: u64, context: &str) -> crate::Result<u64> {
    if alignment == 0 || alignment > MAX_ALIGNMENT {
        return Err(Error::invalid_input(format!(
            "{}: alignment {} must be 1-{}",
            context, alignment, MAX_ALIGNMENT
        )));
    }

    let rem = value % alignment;
    if rem == 0 {
        Ok(value)
    } else {
        checked_add_u64(value, alignment - rem, context)
    }
}

/// Validate a descriptor table capacity
pub fn validate_capacity(capacity: usize) -> crate::Result<()> {
    if capacity == 0 || capacity > MAX_DESCRIPTOR_CAPACITY {
        return Err(Error::invalid_input(format!(
            "Invalid descriptor capacity: {} (must be 1-{})",
            capacity, MAX_DESCRIPTOR_CAPACITY
        )));
    }
    Ok(())
}
