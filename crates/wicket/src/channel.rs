// SPDX-License-Identifier: Apache-2.0

//! Control channel
//!
//! A [`Channel`] frames [`Message`]s over a connected Unix stream socket. Besides plain
//! messages it can carry one file descriptor alongside a message as `SCM_RIGHTS`
//! ancillary data, which is how the host hands the runtime its main socket.

use crate::message::{Header, Message};

use std::io::{self, ErrorKind, Read, Write};
use std::mem::{size_of, zeroed};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::ptr;

use libc::{c_void, cmsghdr, iovec, msghdr};
use log::trace;

/// A request/response channel over a Unix stream socket.
#[derive(Debug)]
pub struct Channel(UnixStream);

impl From<UnixStream> for Channel {
    fn from(stream: UnixStream) -> Self {
        Self(stream)
    }
}

impl From<OwnedFd> for Channel {
    fn from(fd: OwnedFd) -> Self {
        Self(fd.into())
    }
}

impl FromRawFd for Channel {
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self(UnixStream::from_raw_fd(fd))
    }
}

impl AsRawFd for Channel {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl Channel {
    /// Creates a connected pair of channels.
    pub fn pair() -> io::Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((a.into(), b.into()))
    }

    /// Sends `message`.
    pub fn send(&mut self, message: &Message) -> io::Result<()> {
        trace!("send {}", message.opcode());
        let bytes = encode(message)?;
        self.0.write_all(&bytes)
    }

    /// Sends `message` with `fd` attached.
    ///
    /// The receiver gets its own descriptor referring to the same open file.
    pub fn send_with_fd(&mut self, message: &Message, fd: RawFd) -> io::Result<()> {
        trace!("send {} with fd {fd}", message.opcode());
        let bytes = encode(message)?;
        let sent = sendmsg_fd(self.0.as_raw_fd(), &bytes, fd)?;
        self.0.write_all(&bytes[sent..])
    }

    /// Receives the next message.
    ///
    /// Oversized, malformed or unknown messages fail with [`ErrorKind::InvalidData`].
    /// A peer that closed the channel yields [`ErrorKind::UnexpectedEof`].
    pub fn recv(&mut self) -> io::Result<Message> {
        let mut head = [0u8; Header::SIZE];
        self.0.read_exact(&mut head)?;
        self.finish_recv(&head)
    }

    /// Receives the next message and the descriptor attached to it, if any.
    pub fn recv_with_fd(&mut self) -> io::Result<(Message, Option<OwnedFd>)> {
        let mut head = [0u8; Header::SIZE];
        let (read, fd) = recvmsg_fd(self.0.as_raw_fd(), &mut head)?;
        if read == 0 {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        self.0.read_exact(&mut head[read..])?;
        let message = self.finish_recv(&head)?;
        Ok((message, fd))
    }

    /// Sends `request` and waits for its response.
    pub fn call(&mut self, request: &Message) -> io::Result<Message> {
        self.send(request)?;
        self.recv()
    }

    fn finish_recv(&mut self, head: &[u8; Header::SIZE]) -> io::Result<Message> {
        let header = Header::from_bytes(head).map_err(|_| {
            invalid(format!(
                "message exceeds the payload limit of {} bytes",
                crate::MAX_PAYLOAD_SIZE
            ))
        })?;

        let mut payload = vec![0u8; header.size];
        self.0.read_exact(&mut payload)?;

        let message = Message::decode(&header, &payload).map_err(|_| {
            invalid(format!(
                "malformed message with opcode {:#x} and {} payload bytes",
                header.opcode, header.size
            ))
        })?;
        trace!("recv {}", message.opcode());
        Ok(message)
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

fn encode(message: &Message) -> io::Result<Vec<u8>> {
    message.encode().map_err(|errno| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!(
                "{} message: {}",
                message.opcode(),
                io::Error::from_raw_os_error(errno)
            ),
        )
    })
}

/// Control message buffer with the alignment `cmsghdr` requires.
#[repr(C)]
union ControlBuffer {
    header: cmsghdr,
    bytes: [u8; 64],
}

fn sendmsg_fd(sock: RawFd, bytes: &[u8], fd: RawFd) -> io::Result<usize> {
    let mut iov = iovec {
        iov_base: bytes.as_ptr() as *mut c_void,
        iov_len: bytes.len(),
    };

    let mut control = ControlBuffer { bytes: [0; 64] };

    unsafe {
        let space = libc::CMSG_SPACE(size_of::<RawFd>() as _) as usize;
        debug_assert!(space <= size_of::<ControlBuffer>());

        let mut msg: msghdr = zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = &mut control as *mut _ as *mut c_void;
        msg.msg_controllen = space as _;

        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        if cmsg.is_null() {
            return Err(ErrorKind::InvalidInput.into());
        }
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(size_of::<RawFd>() as _) as _;
        ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut RawFd, fd);

        match libc::sendmsg(sock, &msg, libc::MSG_NOSIGNAL) {
            n if n < 0 => Err(io::Error::last_os_error()),
            n => Ok(n as usize),
        }
    }
}

fn recvmsg_fd(sock: RawFd, buf: &mut [u8]) -> io::Result<(usize, Option<OwnedFd>)> {
    let mut iov = iovec {
        iov_base: buf.as_mut_ptr() as *mut c_void,
        iov_len: buf.len(),
    };

    let mut control = ControlBuffer { bytes: [0; 64] };

    unsafe {
        let mut msg: msghdr = zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = &mut control as *mut _ as *mut c_void;
        msg.msg_controllen = size_of::<ControlBuffer>() as _;

        let read = match libc::recvmsg(sock, &mut msg, libc::MSG_CMSG_CLOEXEC) {
            n if n < 0 => return Err(io::Error::last_os_error()),
            n => n as usize,
        };

        // Take ownership of everything we were sent before judging it,
        // so that nothing leaks on the error paths.
        let mut fds = Vec::new();
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(cmsg);
                let len = (*cmsg).cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                for i in 0..len / size_of::<RawFd>() {
                    let fd = ptr::read_unaligned((data as *const RawFd).add(i));
                    fds.push(OwnedFd::from_raw_fd(fd));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }

        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            return Err(invalid("ancillary data truncated".into()));
        }
        if fds.len() > 1 {
            return Err(invalid(format!("expected one descriptor, got {}", fds.len())));
        }

        Ok((read, fds.pop()))
    }
}
