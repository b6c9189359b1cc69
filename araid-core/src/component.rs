// vim: tw=80
//! Boundary to the per-disk I/O layer
//!
//! araid does not open or schedule disks itself.  Whatever does (a file
//! backend, a kernel block device, a network target) hands the array an
//! already-opened endpoint implementing [`ComponentDev`].

use std::pin::Pin;

#[cfg(test)] use mockall::automock;

use crate::types::*;

/// Future representing one physical operation on a component device.
pub type BoxCompFut =
    Pin<Box<dyn futures::Future<Output = Result<()>> + Send + Sync>>;

/// One already-opened member disk of an array.
///
/// `read_at` and `write_at` are asynchronous: they return immediately and the
/// returned future resolves exactly once, possibly from a different task or
/// thread than the submitter's.  Futures for distinct requests may resolve
/// concurrently; within a single component they must not be reordered.
#[cfg_attr(test, automock)]
pub trait ComponentDev: Send + Sync {
    /// Usable size of the device in sectors.
    ///
    /// Any reserved metadata area is excluded.  May not change for the
    /// lifetime of the handle.
    fn size(&self) -> LbaT;

    /// Read `buf.len()` bytes from the device, starting at `lba`.
    fn read_at(&self, buf: IoVecMut, lba: LbaT) -> BoxCompFut;

    /// Write the contents of `buf` to the device, starting at `lba`.
    fn write_at(&self, buf: IoVec, lba: LbaT) -> BoxCompFut;
}
