// vim: tw=80
//! Common utility functions used throughout araid

use std::ops::{Add, Div, Sub};

use crate::types::LbaT;

/// Component addresses always use 512 byte sectors, even if the underlying
/// device advertises a different block size.
pub const BYTES_PER_SECTOR: usize = 512;

/// Divide two unsigned numbers (usually integers), rounding up.
pub fn div_roundup<T>(dividend: T, divisor: T) -> T
    where T: Add<Output=T> + Copy + Div<Output=T> + From<u8> + Sub<Output=T>
{
    (dividend + divisor - T::from(1u8)) / divisor
}

/// Convert a sector-aligned byte count into sectors.
pub fn bytes_to_sectors(bytes: usize) -> LbaT {
    debug_assert_eq!(bytes % BYTES_PER_SECTOR, 0);
    (bytes / BYTES_PER_SECTOR) as LbaT
}

/// Convert a sector count into bytes.
pub fn sectors_to_bytes(sectors: LbaT) -> usize {
    sectors as usize * BYTES_PER_SECTOR
}

// LCOV_EXCL_STOP
