// vim: tw=80
//! Common type definitions used throughout araid

use divbuf::{DivBuf, DivBufMut};
use enum_primitive_derive::Primitive;
use num_traits::{FromPrimitive, ToPrimitive};
use thiserror::Error;
use std::{fmt, io};

/// Our `IoVec`.  Unlike the standard library's, ours is reference-counted so
/// it can have more than one owner.
pub type IoVec = DivBuf;

/// Mutable version of `IoVec`.  Uniquely owned.
pub type IoVecMut = DivBufMut;

/// Indexes an LBA.  LBAs are always 512 bytes at this layer.
pub type LbaT = u64;

/// araid's error type.  Basically just an errno
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq, Primitive)]
pub enum Error {
    #[error("Input/output error")]
    EIO             = libc::EIO as isize,
    #[error("Device not configured")]
    ENXIO           = libc::ENXIO as isize,
    #[error("Cannot allocate memory")]
    ENOMEM          = libc::ENOMEM as isize,
    #[error("Device busy")]
    EBUSY           = libc::EBUSY as isize,
    #[error("Invalid argument")]
    EINVAL          = libc::EINVAL as isize,
    #[error("Result too large")]
    ERANGE          = libc::ERANGE as isize,
    #[error("Resource temporarily unavailable")]
    EAGAIN          = libc::EAGAIN as isize,
    #[error("Broken pipe")]
    EPIPE           = libc::EPIPE as isize,
    #[error("Value too large to be stored in data type")]
    EOVERFLOW       = libc::EOVERFLOW as isize,

    //// araid custom error types below
    #[error("Unknown error")]
    EUNKNOWN        = 256,
}

impl Error {
    pub fn unhandled<E: fmt::Debug>(e: E) {
        panic!("Unhandled error {e:?}")
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        e.raw_os_error()
            .and_then(Error::from_i32)
            .unwrap_or(Error::EUNKNOWN)
    }
}

impl From<Error> for i32 {
    fn from(e: Error) -> Self {
        match e {
            Error::EUNKNOWN =>
                panic!("Unknown error codes should never be exposed"),
            _ => e.to_i32().unwrap()
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// LCOV_EXCL_STOP
