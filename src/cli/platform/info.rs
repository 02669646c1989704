// SPDX-License-Identifier: Apache-2.0

use crate::backend::{probe, Backend, Datum, BACKENDS};

use std::fmt::{self, Formatter};
use std::process::ExitCode;

use clap::Args;
use serde::Serialize;

/// Show details about backend support on this system
#[derive(Args, Debug)]
pub struct Options {
    #[clap(short, long)]
    /// Emit JSON rather than human-readable output
    json: bool,
}

impl Options {
    pub fn execute(self) -> anyhow::Result<ExitCode> {
        let info = Info::gather(BACKENDS);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            print!("{info}");
        }

        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Serialize)]
struct Report {
    backend: &'static str,
    have: bool,
    data: Vec<Datum>,
}

#[derive(Serialize)]
struct Info {
    version: &'static str,
    wicket: &'static str,
    system_info: String,
    backends: Vec<Report>,
}

impl Info {
    fn gather(backends: &[&dyn Backend]) -> Self {
        let backends = backends
            .iter()
            .map(|b| {
                let data = b.data();
                Report {
                    backend: b.name(),
                    have: data.iter().all(|d| d.pass),
                    data,
                }
            })
            .collect();

        Self {
            version: env!("CARGO_PKG_VERSION"),
            wicket: wicket::VERSION,
            system_info: probe::system_info(),
            backends,
        }
    }
}

fn icon(pass: bool) -> &'static str {
    match pass {
        true => "✔",
        false => "✗",
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "postern version {} (wicket {})", self.version, self.wicket)?;
        writeln!(f, "System Info: {}", self.system_info)?;

        for report in &self.backends {
            writeln!(f, "{} Backend: {}", icon(report.have), report.backend)?;

            for datum in &report.data {
                write!(f, "  {} {}", icon(datum.pass), datum.name)?;
                if let Some(ref info) = datum.info {
                    write!(f, ": {info}")?;
                }
                writeln!(f)?;
            }

            for datum in &report.data {
                if let Some(mesg) = datum.mesg.as_ref() {
                    writeln!(f, "\n  {mesg}\n")?;
                }
            }
        }
        Ok(())
    }
}
