// SPDX-License-Identifier: Apache-2.0

//! The postern virtual enclave runtime
//!
//! Started by the host with the bootstrap socket inherited. Standard output is
//! left to forwarded syscalls, diagnostics go to standard error.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(rust_2018_idioms)]

use std::os::unix::io::FromRawFd;
use std::process::ExitCode;

use anyhow::Context;
use log::{debug, info};
use postern_runtime::{Callbacks, Config, Runtime};
use wicket::Channel;

fn main() -> anyhow::Result<ExitCode> {
    let config = Config::from_env().context("failed to read the runtime configuration")?;

    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    if let Some(filter) = &config.log_filter {
        builder.parse_filters(filter);
    }
    builder.init();

    info!("postern-runtime {} starting", env!("CARGO_PKG_VERSION"));

    let mut callbacks = Callbacks::default();
    callbacks
        .on_init(|| debug!("runtime initialized"))
        .on_fini(|| debug!("runtime finalized"));

    // Safety: the host hands this descriptor to us and nothing else in this
    // process refers to it.
    let bootstrap = unsafe { Channel::from_raw_fd(config.init_fd) };

    let status = Runtime::new(config, callbacks)
        .run(bootstrap)
        .context("virtual enclave failed")?;

    Ok(match u8::try_from(status) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    })
}
