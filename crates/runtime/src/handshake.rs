// SPDX-License-Identifier: Apache-2.0

//! Initialization handshake
//!
//! The host owns two socket pairs. One end of the bootstrap pair is inherited by
//! the runtime. Over it, the host sends an [`Initialize`](Message::Initialize)
//! message carrying its `wicket` version requirement, with the runtime's end of
//! the main pair attached. The runtime answers on the main socket with its own
//! version, or with an [`Error`](Message::Error) if it cannot satisfy the
//! requirement. All further traffic uses the main socket.

use crate::config::{DEFAULT_INIT_FD, INIT_FD_VAR};
use crate::{Error, Result};

use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::Command;

use log::{debug, error};
use semver::{Version, VersionReq};
use wicket::{Channel, Message};

fn check_version(requirement: &str) -> Result<()> {
    let version = Version::parse(wicket::VERSION)
        .map_err(|e| Error::Bootstrap(format!("invalid own version: {e}")))?;
    let req = VersionReq::parse(requirement)
        .map_err(|e| Error::Bootstrap(format!("invalid version requirement {requirement:?}: {e}")))?;

    if !req.matches(&version) {
        return Err(Error::Bootstrap(format!(
            "unable to satisfy wicket version requirement {requirement} with {version}"
        )));
    }
    Ok(())
}

/// Runtime side: waits on `bootstrap` for the main channel.
pub fn accept(bootstrap: &mut Channel) -> Result<Channel> {
    let (message, fd) = bootstrap
        .recv_with_fd()
        .map_err(|e| Error::Bootstrap(format!("no initialization received: {e}")))?;

    let requirement = match message {
        Message::Initialize(requirement) => requirement,
        other => {
            return Err(Error::Bootstrap(format!(
                "expected initialize, received {}",
                other.opcode()
            )))
        }
    };

    let mut main = fd
        .map(Channel::from)
        .ok_or_else(|| Error::Bootstrap("initialization carried no main socket".into()))?;

    if let Err(e) = check_version(&requirement) {
        error!("{e}");
        // best effort, the host may be gone already
        let _ = main.send(&Message::Error(libc::EINVAL));
        return Err(e);
    }

    main.send(&Message::Initialize(wicket::VERSION.into()))?;
    debug!("handshake completed, host requires {requirement}");
    Ok(main)
}

/// Host side: lets the runtime started by `command` inherit `bootstrap`.
///
/// The socket shows up as the runtime's default bootstrap descriptor. No other
/// process spawned concurrently inherits it.
pub fn inherit<'a>(command: &'a mut Command, bootstrap: &UnixStream) -> &'a mut Command {
    let fd = bootstrap.as_raw_fd();

    // Safety: only async-signal-safe calls run between fork and exec.
    unsafe {
        command.pre_exec(move || {
            let rc = if fd == DEFAULT_INIT_FD {
                libc::fcntl(fd, libc::F_SETFD, 0)
            } else {
                libc::dup2(fd, DEFAULT_INIT_FD)
            };
            match rc {
                rc if rc < 0 => Err(io::Error::last_os_error()),
                _ => Ok(()),
            }
        });
    }

    command.env(INIT_FD_VAR, DEFAULT_INIT_FD.to_string())
}

/// Host side: hands `keep` to the runtime and waits for its answer on `host`.
///
/// `keep` and `host` must be the two ends of the main socket pair. Returns the
/// host's main channel and the runtime's version.
pub fn offer(
    bootstrap: &mut Channel,
    requirement: &str,
    keep: UnixStream,
    host: UnixStream,
) -> Result<(Channel, String)> {
    bootstrap.send_with_fd(&Message::Initialize(requirement.into()), keep.as_raw_fd())?;
    drop(keep);

    let mut main = Channel::from(host);
    match main.recv()? {
        Message::Initialize(version) => {
            debug!("runtime speaks wicket {version}");
            Ok((main, version))
        }
        Message::Error(errno) => Err(Error::Bootstrap(format!(
            "runtime refused the handshake: {}",
            io::Error::from_raw_os_error(errno)
        ))),
        other => Err(Error::Protocol(format!(
            "expected initialize, received {}",
            other.opcode()
        ))),
    }
}
