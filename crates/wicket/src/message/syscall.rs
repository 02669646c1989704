// SPDX-License-Identifier: Apache-2.0

//! System call payload definitions

use crate::{Result, NULL};

use core::ffi::c_long;
use core::mem::size_of;

use libc::{EINVAL, ENOSYS};

/// Payload of a [`Message`](super::Message) with [`Opcode::Syscall`](super::Opcode::Syscall).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct Payload {
    /// The syscall number
    pub num: usize,
    /// The syscall arguments, pointers translated to data section offsets
    pub argv: [usize; 6],
    /// The return values
    pub ret: [usize; 2],
}

pub(crate) const USIZE_COUNT: usize = size_of::<Payload>() / size_of::<usize>();

/// Number of bytes the fixed part of a syscall occupies on the wire.
pub const ENCODED_SIZE: usize = USIZE_COUNT * size_of::<u64>();

impl Payload {
    /// Creates a request for syscall `num`.
    ///
    /// Unused arguments should be [`NULL`]. The return value is preset to `-ENOSYS`,
    /// which is what the requester observes if the other side does not execute it.
    pub fn new(num: c_long, argv: [usize; 6]) -> Self {
        Self {
            num: num as _,
            argv,
            ret: [-ENOSYS as _, 0],
        }
    }

    /// Creates a request for syscall `num` taking fewer than six arguments.
    pub fn with_args(num: c_long, args: &[usize]) -> Self {
        let mut argv = [NULL; 6];
        argv.iter_mut().zip(args).for_each(|(dst, src)| *dst = *src);
        Self::new(num, argv)
    }

    /// The first return value interpreted as a signed result.
    ///
    /// Negative values are `-errno`.
    pub fn result(&self) -> isize {
        self.ret[0] as _
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        core::iter::once(self.num)
            .chain(self.argv)
            .chain(self.ret)
            .for_each(|word| buf.extend_from_slice(&(word as u64).to_le_bytes()));
    }

    /// Splits `bytes` into the fixed syscall part and the data section.
    pub(crate) fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < ENCODED_SIZE {
            return Err(EINVAL);
        }
        let (head, data) = bytes.split_at(ENCODED_SIZE);

        let mut words = [0usize; USIZE_COUNT];
        for (word, chunk) in words.iter_mut().zip(head.chunks_exact(size_of::<u64>())) {
            let mut raw = [0u8; size_of::<u64>()];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw) as _;
        }

        let [num, a0, a1, a2, a3, a4, a5, r0, r1] = words;
        let payload = Self {
            num,
            argv: [a0, a1, a2, a3, a4, a5],
            ret: [r0, r1],
        };
        Ok((payload, data))
    }
}
