// SPDX-License-Identifier: Apache-2.0

//! Host handle of a running virtual enclave

use std::io;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

use anyhow::{bail, Context};
use log::debug;
use postern_runtime::config::HEAP_SIZE_VAR;
use postern_runtime::handshake;
use wait_timeout::ChildExt;
use wicket::{Channel, Message, Syscall};

/// A spawned runtime and the host end of its main channel.
///
/// Dropping the handle kills the runtime.
pub struct Keep {
    child: Child,
    channel: Channel,
    version: String,
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl Keep {
    /// Spawns `runtime` and performs the handshake with it.
    pub fn spawn(runtime: &Path, heap_size: usize) -> anyhow::Result<Self> {
        let (host_boot, keep_boot) =
            UnixStream::pair().context("failed to create the bootstrap socket")?;

        let mut cmd = Command::new(runtime);
        handshake::inherit(&mut cmd, &keep_boot).env(HEAP_SIZE_VAR, heap_size.to_string());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", runtime.display()))?;
        drop(keep_boot);
        debug!("spawned {} as {}", runtime.display(), child.id());

        let mut bootstrap = Channel::from(host_boot);
        let offered = UnixStream::pair()
            .map_err(Into::into)
            .and_then(|(keep, host)| {
                handshake::offer(&mut bootstrap, wicket::REQUIRES, keep, host)
            });

        match offered {
            Ok((channel, version)) => Ok(Self {
                child,
                channel,
                version,
            }),
            Err(e) => {
                reap(&mut child);
                Err(e).context("handshake with the runtime failed")
            }
        }
    }

    /// The `wicket` version the runtime speaks.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Forwards `call` with its data section and returns the runtime's answer.
    pub fn syscall(&mut self, call: Syscall, data: Vec<u8>) -> anyhow::Result<(Syscall, Vec<u8>)> {
        let reply = self
            .channel
            .call(&Message::Syscall(call, data))
            .context("runtime channel failed")?;

        match reply {
            Message::Syscall(call, data) => Ok((call, data)),
            Message::Error(errno) => bail!(
                "runtime rejected the request: {}",
                io::Error::from_raw_os_error(errno)
            ),
            other => bail!("unexpected {} reply", other.opcode()),
        }
    }

    /// Has the runtime write `buf` to `fd` and returns the result.
    pub fn write(&mut self, fd: RawFd, buf: &[u8]) -> anyhow::Result<isize> {
        let call = Syscall::with_args(libc::SYS_write, &[fd as usize, 0, buf.len()]);
        let (call, _) = self.syscall(call, buf.to_vec())?;
        Ok(call.result())
    }

    /// Asks the runtime to terminate with `status` and waits up to `timeout`
    /// for it to exit.
    pub fn terminate(mut self, status: i32, timeout: Duration) -> anyhow::Result<ExitStatus> {
        match self
            .channel
            .call(&Message::Terminate(status))
            .context("runtime channel failed")?
        {
            Message::Terminate(acked) => debug!("runtime acknowledged termination with {acked}"),
            Message::Error(errno) => bail!(
                "runtime refused to terminate: {}",
                io::Error::from_raw_os_error(errno)
            ),
            other => bail!("unexpected {} reply", other.opcode()),
        }

        match self.child.wait_timeout(timeout)? {
            Some(status) => Ok(status),
            None => bail!("runtime did not exit within {timeout:?}"),
        }
    }
}

impl Drop for Keep {
    fn drop(&mut self) {
        reap(&mut self.child);
    }
}
