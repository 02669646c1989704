// SPDX-License-Identifier: Apache-2.0

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use postern_runtime::config::LOG_VAR;
use postern_runtime::handshake;
use wait_timeout::ChildExt;
use wicket::Channel;

pub const RUNTIME_BIN: &str = env!("CARGO_BIN_EXE_postern-runtime");
pub const TIMEOUT_SECS: u64 = 10;

/// A runtime process and the host ends of its sockets.
pub struct Keep {
    pub child: Child,
    pub bootstrap: Option<Channel>,
}

impl Keep {
    /// Spawns the runtime with its bootstrap socket, stdin and stdout piped.
    pub fn spawn() -> Self {
        let (host, keep) = UnixStream::pair().unwrap();

        let mut cmd = Command::new(RUNTIME_BIN);
        handshake::inherit(&mut cmd, &keep)
            .env(LOG_VAR, "postern_runtime=debug")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = cmd
            .spawn()
            .unwrap_or_else(|e| panic!("failed to run `{RUNTIME_BIN}`: {e:#?}"));

        Self {
            child,
            bootstrap: Some(host.into()),
        }
    }

    /// Performs the handshake and returns the main channel.
    pub fn handshake(&mut self) -> Channel {
        self.offer(wicket::REQUIRES)
            .unwrap_or_else(|e| panic!("handshake failed: {e}"))
    }

    /// Offers the main socket with `requirement`.
    pub fn offer(&mut self, requirement: &str) -> postern_runtime::Result<Channel> {
        let mut bootstrap = self.bootstrap.take().expect("handshake already offered");
        let (keep, host) = UnixStream::pair().unwrap();
        handshake::offer(&mut bootstrap, requirement, keep, host).map(|(main, _)| main)
    }

    /// Waits for the runtime to exit, killing it if it does not.
    pub fn wait(&mut self) -> ExitStatus {
        match self
            .child
            .wait_timeout(Duration::from_secs(TIMEOUT_SECS))
            .unwrap()
        {
            Some(status) => status,
            None => {
                self.child.kill().unwrap();
                panic!("killed by watchdog!");
            }
        }
    }

    /// Everything the runtime wrote to its stdout and stderr.
    ///
    /// Call after [`wait`](Self::wait).
    pub fn output(&mut self) -> (String, String) {
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = self.child.stdout.take() {
            out.read_to_string(&mut stdout).unwrap();
        }
        if let Some(mut err) = self.child.stderr.take() {
            err.read_to_string(&mut stderr).unwrap();
        }
        (stdout, stderr)
    }
}

impl Drop for Keep {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
