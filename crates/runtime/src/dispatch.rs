// SPDX-License-Identifier: Apache-2.0

//! Message dispatch loop
//!
//! Receiving a request is the runtime's entry and sending the response is its
//! exit, so every request goes through the same descriptor bookkeeping as an
//! enclave crossing: [`ThreadData::enter`] on receipt, [`ThreadData::leave`] once
//! handled and [`ThreadData::record_exit`] right before the reply leaves.

use crate::{Error, Result};

use log::{debug, error, trace};
use postern_shim::exit::stack_pointer;
use postern_shim::{ExitKind, HostFrame, ThreadData};
use wicket::{host, Channel, Message};

enum Flow {
    Continue,
    Stop(i32),
}

/// Serves requests on a main channel.
#[derive(Debug)]
pub struct Dispatcher<'a> {
    channel: &'a mut Channel,
    td: &'a mut ThreadData,
    handled: usize,
}

impl<'a> Dispatcher<'a> {
    /// Creates a dispatcher serving `channel` on behalf of `td`.
    pub fn new(channel: &'a mut Channel, td: &'a mut ThreadData) -> Self {
        Self {
            channel,
            td,
            handled: 0,
        }
    }

    /// Number of requests answered so far.
    pub fn handled(&self) -> usize {
        self.handled
    }

    /// Serves requests until the host asks to terminate.
    ///
    /// Returns the exit status the host asked for. A malformed or unexpected
    /// request is answered with an [`Error`](Message::Error) and ends the loop
    /// with [`Error::Protocol`].
    pub fn serve(&mut self) -> Result<i32> {
        loop {
            let request = match self.channel.recv() {
                Ok(request) => request,
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    return Err(self.reject(libc::EINVAL, e.to_string()));
                }
                Err(e) => return Err(e.into()),
            };

            match self.handle(request)? {
                Flow::Continue => self.handled += 1,
                Flow::Stop(status) => {
                    self.handled += 1;
                    return Ok(status);
                }
            }
        }
    }

    fn handle(&mut self, request: Message) -> Result<Flow> {
        trace!("request {}", request.opcode());

        match request {
            Message::Syscall(mut call, mut data) => {
                self.td.enter(HostFrame::default());
                host::execute(&mut call, &mut data);
                self.leave()?;
                self.reply(&Message::Syscall(call, data))?;
                Ok(Flow::Continue)
            }

            Message::Terminate(status) => {
                if self.td.depth() != 0 {
                    let depth = self.td.depth();
                    return Err(self.reject(
                        libc::EBUSY,
                        format!("terminate requested with {depth} calls active"),
                    ));
                }
                if !(0..=255).contains(&status) {
                    return Err(self.reject(
                        libc::EINVAL,
                        format!("terminate status {status} is not an exit status"),
                    ));
                }
                self.reply(&Message::Terminate(status))?;
                debug!("terminating with status {status}");
                Ok(Flow::Stop(status))
            }

            unexpected @ (Message::Initialize(..) | Message::Error(..)) => Err(self.reject(
                libc::EPROTO,
                format!("unexpected {} while serving", unexpected.opcode()),
            )),
        }
    }

    fn leave(&mut self) -> Result<()> {
        self.td
            .leave()
            .map_err(|e| Error::Protocol(e.to_string()))
    }

    fn reply(&mut self, response: &Message) -> Result<()> {
        if self.td.record_exit(stack_pointer()) == ExitKind::Nested {
            let depth = self.td.depth();
            return Err(self.reject(
                libc::EPROTO,
                format!("reply with {depth} calls still active"),
            ));
        }
        self.channel.send(response)?;
        Ok(())
    }

    /// Answers a protocol violation and turns it into the error ending the loop.
    fn reject(&mut self, errno: libc::c_int, reason: String) -> Error {
        error!("{reason}");
        if let Err(e) = self.channel.send(&Message::Error(errno)) {
            debug!("unable to report protocol violation: {e}");
        }
        Error::Protocol(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::thread::{self, JoinHandle};

    use wicket::{Header, Opcode, Syscall, NULL};

    type Served = JoinHandle<(Result<i32>, usize, ThreadData)>;

    fn serve_on(mut keep: Channel) -> Served {
        thread::spawn(move || {
            let mut td = ThreadData::new(true);
            let mut dispatcher = Dispatcher::new(&mut keep, &mut td);
            let result = dispatcher.serve();
            let handled = dispatcher.handled();
            (result, handled, td)
        })
    }

    fn serve() -> (Channel, Served) {
        let (host, keep) = Channel::pair().unwrap();
        (host, serve_on(keep))
    }

    #[test]
    fn forwarded_write() {
        let mut file = tempfile::tempfile().unwrap();
        let (mut host, keep) = serve();

        let call = Syscall::with_args(libc::SYS_write, &[file.as_raw_fd() as _, 0, 3]);
        let reply = host
            .call(&Message::Syscall(call, b"ok\n".to_vec()))
            .unwrap();
        let (call, data) = match reply {
            Message::Syscall(call, data) => (call, data),
            other => panic!("unexpected reply {other:?}"),
        };
        assert_eq!(call.result(), 3);
        assert_eq!(data, b"ok\n");

        assert_eq!(
            host.call(&Message::Terminate(0)).unwrap(),
            Message::Terminate(0)
        );

        let (result, handled, td) = keep.join().unwrap();
        assert_eq!(result.unwrap(), 0);
        assert_eq!(handled, 2);
        assert_eq!(td.depth(), 0);
        assert_eq!(td.last_sp(), None);

        let mut contents = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "ok\n");
    }

    #[test]
    fn forwarded_read() {
        let (reader, mut writer) = UnixStream::pair().unwrap();
        writer.write_all(b"abc").unwrap();
        let (mut host, keep) = serve();

        let call = Syscall::with_args(libc::SYS_read, &[reader.as_raw_fd() as _, 1, 3]);
        match host.call(&Message::Syscall(call, vec![0; 4])).unwrap() {
            Message::Syscall(call, data) => {
                assert_eq!(call.result(), 3);
                assert_eq!(data, b"\0abc");
            }
            other => panic!("unexpected reply {other:?}"),
        }

        host.call(&Message::Terminate(0)).unwrap();
        assert_eq!(keep.join().unwrap().0.unwrap(), 0);
    }

    #[test]
    fn failures_are_results() {
        let (mut host, keep) = serve();

        for call in [
            Syscall::with_args(libc::SYS_close, &[9999]),
            Syscall::new(libc::SYS_exit_group, [0, NULL, NULL, NULL, NULL, NULL]),
            Syscall::with_args(libc::SYS_write, &[1, 0, 64]),
        ] {
            match host.call(&Message::Syscall(call, vec![])).unwrap() {
                Message::Syscall(call, _) => assert!(call.result() < 0),
                other => panic!("unexpected reply {other:?}"),
            }
        }

        host.call(&Message::Terminate(3)).unwrap();
        let (result, handled, _) = keep.join().unwrap();
        assert_eq!(result.unwrap(), 3);
        assert_eq!(handled, 4);
    }

    #[test]
    fn unexpected_initialize() {
        let (mut host, keep) = serve();

        let reply = host
            .call(&Message::Initialize(wicket::REQUIRES.into()))
            .unwrap();
        assert_eq!(reply, Message::Error(libc::EPROTO));

        let (result, handled, _) = keep.join().unwrap();
        assert!(matches!(result, Err(Error::Protocol(..))));
        assert_eq!(handled, 0);
    }

    #[test]
    fn unknown_opcode() {
        let (raw, keep) = UnixStream::pair().unwrap();
        let keep = serve_on(keep.into());

        let header = Header {
            opcode: 0x42,
            size: 0,
        };
        (&raw).write_all(&header.to_bytes()).unwrap();

        let mut host = Channel::from(raw);
        assert_eq!(host.recv().unwrap(), Message::Error(libc::EINVAL));

        let (result, _, _) = keep.join().unwrap();
        assert!(matches!(result, Err(Error::Protocol(..))));
    }

    #[test]
    fn oversized_message() {
        let (raw, keep) = UnixStream::pair().unwrap();
        let keep = serve_on(keep.into());

        let header = Header {
            opcode: Opcode::Syscall as _,
            size: wicket::MAX_PAYLOAD_SIZE + 1,
        };
        (&raw).write_all(&header.to_bytes()).unwrap();

        let mut host = Channel::from(raw);
        assert_eq!(host.recv().unwrap(), Message::Error(libc::EINVAL));

        let (result, handled, _) = keep.join().unwrap();
        assert!(matches!(result, Err(Error::Protocol(..))));
        assert_eq!(handled, 0);
    }

    #[test]
    fn host_hangs_up() {
        let (host, keep) = serve();
        drop(host);

        let (result, handled, _) = keep.join().unwrap();
        assert!(matches!(result, Err(Error::Channel(..))));
        assert_eq!(handled, 0);
    }

    #[test]
    fn terminate_status_range() {
        for status in [256, -1, i32::MIN] {
            let (mut host, keep) = serve();
            assert_eq!(
                host.call(&Message::Terminate(status)).unwrap(),
                Message::Error(libc::EINVAL),
                "status {status}"
            );
            let (result, handled, _) = keep.join().unwrap();
            assert!(matches!(result, Err(Error::Protocol(..))));
            assert_eq!(handled, 0);
        }

        let (mut host, keep) = serve();
        host.call(&Message::Terminate(255)).unwrap();
        assert_eq!(keep.join().unwrap().0.unwrap(), 255);
    }

    #[test]
    fn nested_reply_is_reported() {
        let (mut host, mut keep) = Channel::pair().unwrap();
        let runtime = thread::spawn(move || {
            let mut td = ThreadData::new(true);
            td.enter(HostFrame::default());
            Dispatcher::new(&mut keep, &mut td).serve()
        });

        let call = Syscall::new(libc::SYS_getpid, [NULL; 6]);
        assert_eq!(
            host.call(&Message::Syscall(call, vec![])).unwrap(),
            Message::Error(libc::EPROTO)
        );
        assert!(matches!(runtime.join().unwrap(), Err(Error::Protocol(..))));
    }

    #[test]
    fn terminate_while_nested() {
        let (mut host, mut keep) = Channel::pair().unwrap();
        let runtime = thread::spawn(move || {
            let mut td = ThreadData::new(true);
            td.enter(HostFrame::default());
            Dispatcher::new(&mut keep, &mut td).serve()
        });

        assert_eq!(
            host.call(&Message::Terminate(0)).unwrap(),
            Message::Error(libc::EBUSY)
        );
        assert!(matches!(runtime.join().unwrap(), Err(Error::Protocol(..))));
    }
}
