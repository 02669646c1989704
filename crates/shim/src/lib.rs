// SPDX-License-Identifier: Apache-2.0
#![cfg(target_arch = "x86_64")]
//! The postern shim
//!
//! This crate contains the trusted side of every enclave crossing: the per-thread
//! descriptor, the controller that decides how control leaves the enclave, the
//! register sanitizer and the two transition backends.
//!
//! Nothing here keeps hidden per-thread state. Every operation takes the
//! [`ThreadData`] it works on as an explicit `&mut` handle.

#![cfg_attr(not(test), no_std)]
#![deny(clippy::all)]
#![deny(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backend;
pub mod exit;
pub mod regs;
pub mod thread;

pub use backend::{HardwareTransition, SimulatedTransition, TransitionBackend, TransitionFailure};
pub use exit::{exit_enclave, Controller, Logged, Notify, Silent};
pub use regs::ExitRegisters;
pub use thread::{DepthUnderflow, Entry, ExitKind, HostFrame, ThreadData};
