// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration
//!
//! The host configures the runtime through its environment:
//!
//! * `POSTERN_INIT_FD` - descriptor of the bootstrap socket (default `3`)
//! * `POSTERN_HEAP_SIZE` - size of the confined heap in bytes (default 1 MiB)
//! * `POSTERN_LOG` - `env_logger` filter directives

use crate::{Error, Result};

use std::os::unix::io::RawFd;

/// Environment variable naming the bootstrap descriptor.
pub const INIT_FD_VAR: &str = "POSTERN_INIT_FD";

/// Environment variable holding the confined heap size.
pub const HEAP_SIZE_VAR: &str = "POSTERN_HEAP_SIZE";

/// Environment variable holding the log filter.
pub const LOG_VAR: &str = "POSTERN_LOG";

/// Bootstrap descriptor used when none is configured.
pub const DEFAULT_INIT_FD: RawFd = 3;

/// Confined heap size used when none is configured.
pub const DEFAULT_HEAP_SIZE: usize = 1 << 20;

/// Runtime configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Bootstrap socket descriptor
    pub init_fd: RawFd,
    /// Requested confined heap size in bytes
    pub heap_size: usize,
    /// Log filter directives
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            init_fd: DEFAULT_INIT_FD,
            heap_size: DEFAULT_HEAP_SIZE,
            log_filter: None,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Reads the configuration from `vars`, ignoring unrelated variables.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                INIT_FD_VAR => {
                    config.init_fd = value
                        .parse()
                        .ok()
                        .filter(|fd| *fd >= 0)
                        .ok_or_else(|| invalid(INIT_FD_VAR, value))?
                }
                HEAP_SIZE_VAR => {
                    config.heap_size = value
                        .parse()
                        .ok()
                        .filter(|size| *size > 0)
                        .ok_or_else(|| invalid(HEAP_SIZE_VAR, value))?
                }
                LOG_VAR => config.log_filter = Some(value.into()),
                _ => {}
            }
        }

        Ok(config)
    }
}

fn invalid(var: &str, value: &str) -> Error {
    Error::Bootstrap(format!("invalid value {value:?} for {var}"))
}
