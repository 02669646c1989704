// SPDX-License-Identifier: Apache-2.0

mod info;

use std::process::ExitCode;

use clap::Subcommand;

/// Commands for inspecting the platform.
#[derive(Subcommand, Debug)]
pub enum Subcommands {
    Info(info::Options),
}

impl Subcommands {
    pub fn dispatch(self) -> anyhow::Result<ExitCode> {
        match self {
            Self::Info(cmd) => cmd.execute(),
        }
    }
}
