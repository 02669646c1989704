// SPDX-License-Identifier: Apache-2.0

//! Simulated transitions in an ordinary process

use super::Datum;

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the runtime binary.
pub const RUNTIME_VAR: &str = "POSTERN_RUNTIME";

const RUNTIME_BIN: &str = "postern-runtime";

/// The runtime binary next to the running executable.
pub fn default_runtime() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.join(RUNTIME_BIN))
}

/// The runtime binary to spawn: `POSTERN_RUNTIME` if set, the default otherwise.
pub fn runtime() -> Option<PathBuf> {
    env::var_os(RUNTIME_VAR)
        .map(PathBuf::from)
        .or_else(default_runtime)
}

pub struct Backend;

impl super::Backend for Backend {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn data(&self) -> Vec<Datum> {
        let runtime = runtime();
        let pass = runtime.as_ref().map_or(false, |path| path.is_file());

        vec![Datum {
            name: "Runtime".into(),
            pass,
            info: runtime.map(|path| path.display().to_string()),
            mesg: (!pass).then(|| {
                format!("Install {RUNTIME_BIN} next to postern or point {RUNTIME_VAR} at it.")
            }),
        }]
    }
}
