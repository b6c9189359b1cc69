// vim: tw=80
//! Bounded pool of component request records
//!
//! Every fragment in flight holds one record.  The pool is sized at startup
//! and never grows, which caps the array's per-request memory no matter how
//! much I/O the callers push.

use std::sync::Mutex;

use crate::types::*;

/// One physical request, addressed to a single component.
#[derive(Debug, Default)]
pub struct ComponentRequest {
    /// Index of the target component
    pub target: usize,

    /// Starting sector on the target
    pub lba: LbaT,

    /// Byte count
    pub len: usize,

    /// Offset of this fragment's data within the parent request's buffer
    pub buf_offset: usize,
}

/// Fixed-size freelist of [`ComponentRequest`] records.
///
/// `acquire` never blocks and never allocates.  When the freelist is empty it
/// fails immediately, so the caller can report resource exhaustion instead of
/// stalling.
#[derive(Debug)]
pub struct RequestPool {
    freelist: Mutex<Vec<ComponentRequest>>,
    capacity: usize,
}

impl RequestPool {
    pub fn with_capacity(capacity: usize) -> Self {
        let freelist = (0..capacity)
            .map(|_| ComponentRequest::default())
            .collect::<Vec<_>>();
        RequestPool {
            freelist: Mutex::new(freelist),
            capacity,
        }
    }

    /// Take one record, or fail with `ENOMEM` if none are free.
    pub fn acquire(&self) -> Result<ComponentRequest> {
        self.freelist.lock().unwrap().pop().ok_or(Error::ENOMEM)
    }

    /// Return a record to the freelist.
    ///
    /// Must only be called with records that came from this pool.
    pub fn release(&self, req: ComponentRequest) {
        let mut freelist = self.freelist.lock().unwrap();
        debug_assert!(freelist.len() < self.capacity);
        freelist.push(req);
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.freelist.lock().unwrap().len()
    }
}

// LCOV_EXCL_STOP
