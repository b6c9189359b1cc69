// vim: tw=80

pub mod array;
pub mod component;
pub mod types;
pub mod util;

pub use crate::types::*;
pub use crate::util::*;
