// SPDX-License-Identifier: Apache-2.0

//! Message protocol for the postern virtual enclave boundary
//!
//! A [wicket](https://en.wikipedia.org/wiki/Wicket_gate) is the small door cut into a larger gate.
//! `wicket` is the protocol spoken through it: the host drives a virtual enclave runtime by
//! sending it requests over a Unix domain socket and the runtime answers every request with
//! exactly one response. There is no multiplexing and no pipelining.
//!
//! # Mechanism of action
//!
//! The host hands the runtime a syscall request with the minimal register context the kernel
//! needs. The runtime performs it through [`host::execute`] and returns the register results
//! together with any data the kernel produced.
//!
//! # Message format
//!
//! Every [message](message::Message) starts with a [header](message::Header) made of two
//! little-endian 64-bit words:
//!
//! * opcode: `u64`
//! * size: `u64`
//!
//! The size is the number of payload bytes following the header and MUST NOT exceed
//! [`MAX_PAYLOAD_SIZE`]. A message carrying an unknown opcode is a protocol violation.
//!
//! ## Opcodes
//!
//! * `INITIALIZE`: `1` - a UTF-8 version or version requirement
//! * `SYSCALL`: `2` - a forwarded syscall
//! * `TERMINATE`: `3` - a little-endian `i32` exit status
//! * `ERROR`: `4` - a little-endian `i32` errno
//!
//! ### Syscall
//!
//! A `SYSCALL` message has the following contents, each a little-endian 64-bit word:
//!
//! * `nmbr` - the syscall number
//! * `arg0` ... `arg5` - the arguments
//! * `ret0`, `ret1` - the return values
//! * `data`: `...` - data that can be referenced (optional)
//!
//! The argument values may contain numeric values. However, all pointers MUST be translated to
//! an offset from the beginning of the data section. A null pointer is encoded as [`NULL`].

#![deny(clippy::all)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod host;
pub mod message;

pub use channel::Channel;
pub use message::{Header, Message, Opcode, Syscall};

/// Error type used within this crate.
pub type Error = libc::c_int;

/// Result type returned by functionality exposed by this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Representation of a null pointer in the data section of a syscall.
pub const NULL: usize = usize::MAX;

/// The largest payload a single message may carry.
pub const MAX_PAYLOAD_SIZE: usize = 69632;

/// The wicket version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The wicket version requirement
///
/// This value provides a semver version requirement. It insists that the
/// other side must use a compatible release to this one. For example, if
/// the `VERSION` of wicket is 1.2.3, `REQUIRES` will contain `^1.2.3`.
pub const REQUIRES: &str = concat!("^", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires() {
        assert_eq!(REQUIRES.strip_prefix('^'), Some(VERSION));
    }
}
