// SPDX-License-Identifier: Apache-2.0

use crate::backend::sim::{self, RUNTIME_VAR};
use crate::keep::Keep;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail};
use clap::Args;
use log::info;
use postern_runtime::config::DEFAULT_HEAP_SIZE;

/// Run a virtual enclave that writes each LINE to standard output.
#[derive(Args, Debug)]
pub struct Options {
    /// Path of the postern-runtime binary
    ///
    /// Defaults to the postern-runtime binary next to postern.
    #[clap(long, env = "POSTERN_RUNTIME", parse(from_os_str))]
    pub runtime: Option<PathBuf>,

    /// Size of the runtime's confined heap in bytes
    #[clap(long, default_value_t = DEFAULT_HEAP_SIZE)]
    pub heap_size: usize,

    /// Seconds to wait for the runtime to exit once terminated
    #[clap(long, default_value_t = 5)]
    pub timeout: u64,

    /// Exit status to terminate the runtime with
    #[clap(long, default_value_t = 0)]
    pub status: i32,

    /// Lines to write from inside the enclave
    #[clap(value_name = "LINE")]
    pub lines: Vec<String>,
}

impl Options {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        let runtime = self
            .runtime
            .or_else(sim::default_runtime)
            .ok_or_else(|| anyhow!("unable to locate the runtime, set {RUNTIME_VAR}"))?;

        let mut keep = Keep::spawn(&runtime, self.heap_size)?;
        info!("runtime speaks wicket {}", keep.version());

        for line in &self.lines {
            let line = format!("{line}\n");
            let written = keep.write(libc::STDOUT_FILENO, line.as_bytes())?;
            if written < 0 {
                bail!(
                    "enclave write failed: {}",
                    std::io::Error::from_raw_os_error(-written as i32)
                );
            }
        }

        let status = keep.terminate(self.status, Duration::from_secs(self.timeout))?;
        info!("runtime exited with {status}");

        Ok(match status.code() {
            Some(code) => ExitCode::from(code as u8),
            None => ExitCode::FAILURE,
        })
    }
}
