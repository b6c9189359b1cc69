// vim: tw=80
//! Decomposition planner
//!
//! Pure address arithmetic that maps one logical request onto an ordered list
//! of per-component fragments.  No I/O and no allocation beyond the returned
//! `Vec` happen here.

use std::cmp;

use crate::types::*;
use crate::util::*;

/// Where one fragment of a logical request lands.
///
/// The fragments planned for a single request partition `[0, len)` of the
/// request's buffer exactly: no gaps, no overlaps, no empty fragment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) struct Fragment {
    /// Index of the target component
    pub target: usize,

    /// Starting sector on the target, including the array's base offset
    pub lba: LbaT,

    /// Byte count of this fragment
    pub len: usize,

    /// Offset of this fragment's data within the request's buffer
    pub buf_offset: usize,
}

/// Address arithmetic for one array, fixed at activation.
#[derive(Debug)]
pub(super) enum Planner {
    /// Concatenation: components are filled in order, one after another.
    Span {
        /// Capacity of each component, in component order
        caps: Box<[LbaT]>,
    },
    /// Striping: logical sectors rotate across all components in units of
    /// `interleave` sectors.
    Stripe0 {
        width: LbaT,
        interleave: LbaT,
    },
}

impl Planner {
    /// Map the logical range `[start, start + len)` onto component fragments.
    ///
    /// Fails with `ERANGE` if the range exceeds `capacity` and with `EINVAL`
    /// if `len` is zero or not sector-aligned.  On failure no fragments are
    /// produced.
    pub fn plan(&self, capacity: LbaT, base_offset: LbaT, start: LbaT,
                len: usize) -> Result<Vec<Fragment>>
    {
        if len == 0 || len % BYTES_PER_SECTOR != 0 {
            return Err(Error::EINVAL);
        }
        let sectors = bytes_to_sectors(len);
        if start.checked_add(sectors).map_or(true, |end| end > capacity) {
            return Err(Error::ERANGE);
        }
        match self {
            Planner::Span { caps } =>
                plan_span(caps, base_offset, start, len),
            Planner::Stripe0 { width, interleave } =>
                plan_stripe0(*width, *interleave, capacity, base_offset,
                             start, len),
        }
    }
}

fn plan_span(caps: &[LbaT], base_offset: LbaT, start: LbaT, len: usize)
    -> Result<Vec<Fragment>>
{
    // Locate the starting component.  Concatenation order is component
    // order, and a request landing exactly on a boundary belongs to the next
    // component.
    let mut target = 0;
    let mut sector = start;
    while target < caps.len() && sector >= caps[target] {
        sector -= caps[target];
        target += 1;
    }

    let mut frags = Vec::new();
    let mut remaining = len;
    let mut buf_offset = 0;
    while remaining > 0 {
        if target == caps.len() {
            return Err(Error::ERANGE);
        }
        let avail = sectors_to_bytes(caps[target] - sector);
        let flen = cmp::min(remaining, avail);
        frags.push(Fragment {
            target,
            lba: sector + base_offset,
            len: flen,
            buf_offset,
        });
        remaining -= flen;
        buf_offset += flen;
        target += 1;
        sector = 0;
    }
    Ok(frags)
}

fn plan_stripe0(width: LbaT, interleave: LbaT, capacity: LbaT,
                base_offset: LbaT, start: LbaT, len: usize)
    -> Result<Vec<Fragment>>
{
    // Whole stripe units in the array.  Sectors past them form a short
    // trailing stripe, spread evenly across all components.
    let units = capacity / interleave;

    let mut frags = Vec::new();
    let mut bn = start;
    let mut remaining = len;
    let mut buf_offset = 0;
    while remaining > 0 {
        let unit = bn / interleave;
        let off = bn % interleave;
        let (target, pstart, avail) = if unit == units {
            // Trailing short stripe.  Activation guaranteed that the
            // remainder divides evenly among the components.
            let sz = (capacity - units * interleave) / width;
            (off / sz,
             (unit / width) * interleave + off % sz,
             sz - off % sz)
        } else {
            (unit % width,
             (unit / width) * interleave + off,
             interleave - off)
        };
        // A fragment never crosses a stripe unit boundary
        let flen = cmp::min(remaining, sectors_to_bytes(avail));
        frags.push(Fragment {
            target: target as usize,
            lba: pstart + base_offset,
            len: flen,
            buf_offset,
        });
        bn += bytes_to_sectors(flen);
        remaining -= flen;
        buf_offset += flen;
    }
    Ok(frags)
}

// LCOV_EXCL_STOP
