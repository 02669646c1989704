// SPDX-License-Identifier: Apache-2.0

//! The postern virtual enclave runtime
//!
//! A simulated enclave lives in its own process. The host talks to it only
//! through a `wicket` channel: it enters the enclave by sending a request and
//! the runtime leaves it by sending the response. In between the runtime applies
//! the same descriptor bookkeeping a hardware crossing does.
//!
//! The life cycle is
//! [`Uninitialized`](runtime::State::Uninitialized) →
//! [`AwaitingHandshake`](runtime::State::AwaitingHandshake) →
//! [`Serving`](runtime::State::Serving) →
//! [`Terminated`](runtime::State::Terminated).

#![deny(clippy::all)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod dispatch;
pub mod handshake;
pub mod heap;
pub mod init;
pub mod runtime;

mod error;

pub use config::Config;
pub use error::{Error, Result};
pub use init::Callbacks;
pub use runtime::{Runtime, State};
