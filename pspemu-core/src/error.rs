//! Error Types
//!
//! Only the recoverable edge gets `Result`s: callers feeding images in from
//! disk can hand us something structurally wrong and deserve a diagnosable
//! error. Programming errors (unknown instruction encodings, lookups during
//! a symbol update, breakpoint field violations) are asserted or panic at
//! the point of the bug instead of being threaded through the type system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Code images are word streams; a trailing partial word means the
    /// caller sliced the image wrong.
    #[error("code image of {length} bytes is not a whole number of words")]
    MisalignedImage { length: usize },

    /// The image would wrap the 32-bit guest address space.
    #[error("code image of {length} bytes at 0x{address:08X} overflows the address space")]
    AddressOverflow { address: u32, length: usize },
}
