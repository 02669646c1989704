// SPDX-License-Identifier: Apache-2.0

//! This crate provides the `postern` executable, the host side of a virtual
//! enclave.
//!
//! `postern run` spawns the `postern-runtime` binary, performs the handshake
//! with it and drives it over the main channel. Every line given on the
//! command line is forwarded to the runtime as a `write` to its standard
//! output, after which the runtime is asked to terminate:
//!
//! ```console
//! $ postern run "hello" "world"
//! hello
//! world
//! ```
//!
//! `postern platform info` reports which transition backends this machine
//! supports.

#![deny(clippy::all)]

mod backend;
mod cli;
mod keep;

use std::process::ExitCode;

use clap::Parser;

fn main() -> anyhow::Result<ExitCode> {
    let app = cli::Options::parse();
    app.execute()
}
