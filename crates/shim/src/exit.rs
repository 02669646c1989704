// SPDX-License-Identifier: Apache-2.0

//! Transition controller
//!
//! Every time the trusted context hands control back to the host, either because
//! a host-initiated call completed or because it issues a call of its own, it goes
//! through [`Controller::exit`]:
//!
//! 1. the descriptor is consulted and the clean or nested bookkeeping is applied,
//! 2. a nested exit is announced through [`Notify::nested_exit_start`],
//! 3. the sanitized register image is built,
//! 4. the image is handed to the backend selected by the descriptor.

use crate::backend::{HardwareTransition, SimulatedTransition, TransitionBackend, TransitionFailure};
use crate::regs::ExitRegisters;
use crate::thread::{ExitKind, ThreadData};

use core::arch::asm;

/// Observer of the controller's progress.
pub trait Notify {
    /// A nested exit is about to leave.
    ///
    /// The descriptor already holds the saved stack pointer and no register has
    /// been cleared yet.
    fn nested_exit_start(&mut self, _td: &ThreadData) {}

    /// The sanitized image is about to be handed to a backend.
    fn sanitized(&mut self, _regs: &ExitRegisters) {}
}

/// A [`Notify`] that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Notify for Silent {}

/// A [`Notify`] that logs nested exits.
#[derive(Clone, Copy, Debug, Default)]
pub struct Logged;

impl Notify for Logged {
    fn nested_exit_start(&mut self, td: &ThreadData) {
        let sp = td.last_sp().map_or(0, |sp| sp.get());
        log::debug!(
            "nested exit at depth {}, trusted stack saved at {sp:#x}",
            td.depth()
        );
    }
}

/// Decides how control leaves the enclave and performs the transfer.
#[derive(Debug, Default)]
pub struct Controller<H = HardwareTransition, S = SimulatedTransition, N = Silent> {
    hardware: H,
    simulated: S,
    notify: N,
}

impl Controller {
    /// A controller using the real backends.
    pub const fn new() -> Self {
        Self {
            hardware: HardwareTransition,
            simulated: SimulatedTransition,
            notify: Silent,
        }
    }
}

impl<H: TransitionBackend, S: TransitionBackend, N: Notify> Controller<H, S, N> {
    /// A controller with the given backends and observer.
    pub fn with(hardware: H, simulated: S, notify: N) -> Self {
        Self {
            hardware,
            simulated,
            notify,
        }
    }

    /// The observer
    pub fn notify(&self) -> &N {
        &self.notify
    }

    /// Leaves the enclave, handing `arg1` and `arg2` to the host.
    ///
    /// The depth is never changed here; that is the job of the entry path.
    /// This only returns if the backend did not transfer control.
    pub fn exit(&mut self, td: &mut ThreadData, arg1: u64, arg2: u64) -> TransitionFailure {
        if td.record_exit(stack_pointer()) == ExitKind::Nested {
            self.notify.nested_exit_start(td);
        }

        let regs = ExitRegisters::sanitized(td.host(), arg1, arg2);
        self.notify.sanitized(&regs);

        if td.is_simulated() {
            self.simulated.transfer(&regs)
        } else {
            self.hardware.transfer(&regs)
        }
    }
}

/// The current stack pointer
#[inline(always)]
pub fn stack_pointer() -> usize {
    let sp: usize;
    unsafe { asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags)) };
    sp
}

/// Leaves the enclave through the backend selected by `td`.
///
/// If the backend fails to transfer control the failure is logged and the
/// thread halts. Trusted execution never resumes from here.
pub fn exit_enclave(td: &mut ThreadData, arg1: u64, arg2: u64) -> ! {
    let mut controller = Controller::with(HardwareTransition, SimulatedTransition, Logged);
    let failure = controller.exit(td, arg1, arg2);
    log::error!("{failure}");
    loop {
        core::hint::spin_loop();
    }
}
