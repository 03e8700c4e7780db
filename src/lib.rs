//! This is the compiler and virtual machine as a library.  See `src/bin`
//! directory for the executable programs using this library.

pub mod common;
pub mod error;
pub mod front;
pub mod middle;
pub mod back;
