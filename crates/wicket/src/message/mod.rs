// SPDX-License-Identifier: Apache-2.0

//! Message definitions and framing

pub mod syscall;

pub use syscall::Payload as Syscall;

use crate::{Error, Result, MAX_PAYLOAD_SIZE};

use core::convert::TryFrom;
use core::ffi::c_int;
use core::fmt;
use core::mem::size_of;

use libc::{E2BIG, EINVAL};

/// `wicket` message opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Opcode {
    /// Version negotiation
    Initialize = 0x01,
    /// A forwarded syscall
    Syscall = 0x02,
    /// Orderly shutdown
    Terminate = 0x03,
    /// Failure report
    Error = 0x04,
}

impl TryFrom<usize> for Opcode {
    type Error = Error;

    #[inline]
    fn try_from(opcode: usize) -> Result<Self> {
        match opcode {
            opcode if opcode == Opcode::Initialize as _ => Ok(Opcode::Initialize),
            opcode if opcode == Opcode::Syscall as _ => Ok(Opcode::Syscall),
            opcode if opcode == Opcode::Terminate as _ => Ok(Opcode::Terminate),
            opcode if opcode == Opcode::Error as _ => Ok(Opcode::Error),
            _ => Err(EINVAL),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Initialize => "initialize",
            Opcode::Syscall => "syscall",
            Opcode::Terminate => "terminate",
            Opcode::Error => "error",
        };
        f.write_str(name)
    }
}

/// `wicket` message header.
///
/// The opcode is kept raw so that a receiver can report what it got before rejecting it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// The raw opcode
    pub opcode: usize,
    /// Number of payload bytes following the header
    pub size: usize,
}

impl Header {
    /// Encoded size of a header
    pub const SIZE: usize = 2 * size_of::<u64>();

    /// Encodes the header as two little-endian words.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..8].copy_from_slice(&(self.opcode as u64).to_le_bytes());
        bytes[8..].copy_from_slice(&(self.size as u64).to_le_bytes());
        bytes
    }

    /// Decodes a header.
    ///
    /// Fails with `E2BIG` if the announced payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Result<Self> {
        let mut word = [0u8; 8];

        word.copy_from_slice(&bytes[..8]);
        let opcode = u64::from_le_bytes(word);

        word.copy_from_slice(&bytes[8..]);
        let size = u64::from_le_bytes(word);

        let size = usize::try_from(size).map_err(|_| E2BIG)?;
        if size > MAX_PAYLOAD_SIZE {
            return Err(E2BIG);
        }

        Ok(Self {
            opcode: opcode as _,
            size,
        })
    }
}

/// `wicket` message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A version (reply) or version requirement (request)
    Initialize(String),
    /// A syscall and its data section
    Syscall(Syscall, Vec<u8>),
    /// An exit status
    Terminate(i32),
    /// An errno
    Error(c_int),
}

impl Message {
    /// The opcode this message is framed with.
    pub fn opcode(&self) -> Opcode {
        match self {
            Message::Initialize(..) => Opcode::Initialize,
            Message::Syscall(..) => Opcode::Syscall,
            Message::Terminate(..) => Opcode::Terminate,
            Message::Error(..) => Opcode::Error,
        }
    }

    /// Encodes the message including its header.
    ///
    /// Fails with `E2BIG` if the payload would exceed [`MAX_PAYLOAD_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        match self {
            Message::Initialize(version) => payload.extend_from_slice(version.as_bytes()),
            Message::Syscall(call, data) => {
                call.encode(&mut payload);
                payload.extend_from_slice(data);
            }
            Message::Terminate(status) => payload.extend_from_slice(&status.to_le_bytes()),
            Message::Error(errno) => payload.extend_from_slice(&errno.to_le_bytes()),
        }

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(E2BIG);
        }

        let header = Header {
            opcode: self.opcode() as _,
            size: payload.len(),
        };

        let mut bytes = Vec::with_capacity(Header::SIZE + payload.len());
        bytes.extend_from_slice(&header.to_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decodes the payload announced by `header`.
    ///
    /// Fails with `EINVAL` on an unknown opcode or a payload that does not match it.
    pub fn decode(header: &Header, payload: &[u8]) -> Result<Self> {
        if payload.len() != header.size {
            return Err(EINVAL);
        }

        match Opcode::try_from(header.opcode)? {
            Opcode::Initialize => core::str::from_utf8(payload)
                .map(|version| Message::Initialize(version.into()))
                .map_err(|_| EINVAL),
            Opcode::Syscall => {
                let (call, data) = Syscall::decode(payload)?;
                Ok(Message::Syscall(call, data.to_vec()))
            }
            Opcode::Terminate => decode_i32(payload).map(Message::Terminate),
            Opcode::Error => decode_i32(payload).map(Message::Error),
        }
    }
}

fn decode_i32(payload: &[u8]) -> Result<i32> {
    <[u8; 4]>::try_from(payload)
        .map(i32::from_le_bytes)
        .map_err(|_| EINVAL)
}
