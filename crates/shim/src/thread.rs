// SPDX-License-Identifier: Apache-2.0

//! Per-thread crossing state

use core::fmt;
use core::num::NonZeroUsize;

/// Host registers captured when the host entered the enclave.
///
/// These are handed back on exit so that the host resumes where it left off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct HostFrame {
    /// Host return address
    pub rip: u64,
    /// Host stack pointer
    pub rsp: u64,
    /// Host frame pointer
    pub rbp: u64,
}

/// How an inbound crossing found the descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entry {
    /// No trusted frame is suspended.
    Fresh,
    /// A nested exit suspended the trusted frame at this stack pointer.
    Resume(NonZeroUsize),
}

/// How an outbound crossing leaves the enclave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitKind {
    /// No inbound call is active; nothing needs to be resumed.
    Clean,
    /// An inbound call is still active and its stack was saved.
    Nested,
}

/// A [`ThreadData::leave`] without a matching [`ThreadData::enter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthUnderflow;

impl fmt::Display for DepthUnderflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("left a call that was never entered")
    }
}

/// Thread descriptor
///
/// Each thread of the trusted context owns exactly one. It is never shared,
/// so it carries no synchronization.
///
/// After every exit, `depth == 0` implies that no stack pointer is saved.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ThreadData {
    depth: usize,
    last_sp: Option<NonZeroUsize>,
    simulation: bool,
    host: HostFrame,
}

impl ThreadData {
    /// Creates an idle descriptor.
    ///
    /// `simulation` selects the simulated transition backend.
    pub const fn new(simulation: bool) -> Self {
        Self {
            depth: 0,
            last_sp: None,
            simulation,
            host: HostFrame {
                rip: 0,
                rsp: 0,
                rbp: 0,
            },
        }
    }

    /// Number of active inbound call frames.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Stack pointer saved by the last nested exit, if it was not consumed yet.
    pub fn last_sp(&self) -> Option<NonZeroUsize> {
        self.last_sp
    }

    /// Whether this thread leaves through the simulated backend.
    pub fn is_simulated(&self) -> bool {
        self.simulation
    }

    /// The host frame recorded by the latest entry.
    pub fn host(&self) -> &HostFrame {
        &self.host
    }

    /// Records an inbound crossing from `host`.
    ///
    /// The saved stack pointer is handed out once and cleared, so a suspended
    /// frame can never be resumed twice. Every `enter` must be matched by one
    /// [`leave`](Self::leave) before the exit that completes it.
    pub fn enter(&mut self, host: HostFrame) -> Entry {
        self.host = host;
        self.depth += 1;
        match self.last_sp.take() {
            Some(sp) => Entry::Resume(sp),
            None => Entry::Fresh,
        }
    }

    /// Completes the innermost inbound call.
    pub fn leave(&mut self) -> Result<(), DepthUnderflow> {
        self.depth = self.depth.checked_sub(1).ok_or(DepthUnderflow)?;
        Ok(())
    }

    /// Applies the exit bookkeeping for a crossing leaving from stack pointer `sp`.
    ///
    /// A clean exit clears the saved stack pointer. A nested exit saves `sp`.
    /// The depth is not changed either way.
    pub fn record_exit(&mut self, sp: usize) -> ExitKind {
        if self.depth == 0 {
            self.last_sp = None;
            ExitKind::Clean
        } else {
            self.last_sp = NonZeroUsize::new(sp);
            ExitKind::Nested
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use testaso::testaso;

    const HOST: HostFrame = HostFrame {
        rip: 0x1000,
        rsp: 0x2000,
        rbp: 0x2100,
    };

    #[test]
    fn fresh_enter_leave() {
        let mut td = ThreadData::new(false);
        assert_eq!(td.enter(HOST), Entry::Fresh);
        assert_eq!(td.depth(), 1);
        assert_eq!(td.host(), &HOST);

        assert_eq!(td.leave(), Ok(()));
        assert_eq!(td.depth(), 0);
        assert_eq!(td.record_exit(0x7000), ExitKind::Clean);
        assert_eq!(td.last_sp(), None);
    }

    #[test]
    fn nested_exit_is_resumed_once() {
        let mut td = ThreadData::new(true);
        td.enter(HOST);

        assert_eq!(td.record_exit(0x7ff0), ExitKind::Nested);
        assert_eq!(td.depth(), 1);
        let sp = NonZeroUsize::new(0x7ff0).unwrap();
        assert_eq!(td.last_sp(), Some(sp));

        assert_eq!(td.enter(HOST), Entry::Resume(sp));
        assert_eq!(td.last_sp(), None);
        assert_eq!(td.depth(), 2);

        td.leave().unwrap();
        td.leave().unwrap();
        assert_eq!(td.record_exit(0x7000), ExitKind::Clean);
        assert_eq!(td.enter(HOST), Entry::Fresh);
    }

    #[test]
    fn clean_exit_clears_saved_sp() {
        let mut td = ThreadData::new(false);
        td.enter(HOST);
        td.record_exit(0x7ff0);
        td.leave().unwrap();

        assert!(td.last_sp().is_some());
        assert_eq!(td.record_exit(0x7000), ExitKind::Clean);
        assert_eq!(td.last_sp(), None);
    }

    #[test]
    fn leave_underflow() {
        let mut td = ThreadData::default();
        assert_eq!(td.leave(), Err(DepthUnderflow));
        assert_eq!(td.depth(), 0);
    }

    testaso! {
        struct HostFrame: 8, 24 => {
            rip: 0,
            rsp: 8,
            rbp: 16
        }
    }
}
