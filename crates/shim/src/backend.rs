// SPDX-License-Identifier: Apache-2.0

//! Transition backends
//!
//! A backend loads a sanitized [`ExitRegisters`] image into the CPU and transfers
//! control out of the enclave. Both backends consume the very same image, so the
//! placement of the handoff values cannot differ between them.

use crate::regs::ExitRegisters;

use core::arch::asm;
use core::fmt;

/// A transition that did not leave the enclave.
///
/// There is no way to recover from this: the caller must halt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionFailure {
    /// Name of the backend that failed
    pub backend: &'static str,
}

impl fmt::Display for TransitionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} transition returned to the enclave", self.backend)
    }
}

/// Leaves the enclave with a given register image.
pub trait TransitionBackend {
    /// Backend name used in diagnostics
    fn name(&self) -> &'static str;

    /// Loads `regs` and transfers control to the host.
    ///
    /// Under correct operation this does not return. A returned value reports
    /// that no transfer happened.
    fn transfer(&self, regs: &ExitRegisters) -> TransitionFailure;
}

/// Exit through `ENCLU[EEXIT]`
#[derive(Clone, Copy, Debug, Default)]
pub struct HardwareTransition;

impl TransitionBackend for HardwareTransition {
    fn name(&self) -> &'static str {
        "hardware"
    }

    fn transfer(&self, regs: &ExitRegisters) -> TransitionFailure {
        // Safety: the image only holds handoff values and zeroes and the host
        // frame is the one captured on entry.
        unsafe {
            asm!(
                "mov rsp, {regs}",
                "pop rax",
                "pop rbx",
                "pop rcx",
                "pop rdx",
                "pop rsi",
                "pop rdi",
                "pop r8",
                "pop r9",
                "pop r10",
                "pop r11",
                "pop r12",
                "pop r13",
                "pop r14",
                "pop r15",
                "popfq",
                "mov rsp, rcx", // host stack
                "mov rbp, rdx", // host frame
                "enclu",
                "2:",
                "pause",
                "jmp 2b",

                regs = in(reg) regs as *const ExitRegisters as u64,
                options(noreturn)
            )
        }
    }
}

/// Exit of a simulated enclave
///
/// Without `ENCLU` there is nothing that performs a real exit. The image is loaded
/// exactly as for the hardware path, then control jumps through a cleared register,
/// which faults predictably instead of resuming the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulatedTransition;

impl TransitionBackend for SimulatedTransition {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn transfer(&self, regs: &ExitRegisters) -> TransitionFailure {
        // Safety: see `HardwareTransition::transfer`.
        unsafe {
            asm!(
                "mov rsp, {regs}",
                "pop rax",
                "pop rbx",
                "pop rcx",
                "pop rdx",
                "pop rsi",
                "pop rdi",
                "pop r8",
                "pop r9",
                "pop r10",
                "pop r11",
                "pop r12",
                "pop r13",
                "pop r14",
                "pop r15",
                "popfq",
                "mov rsp, rcx", // host stack
                "mov rbp, rdx", // host frame
                "mov ecx, 0",   // rflags stay clear
                "mov edx, 0",
                "jmp rcx",

                regs = in(reg) regs as *const ExitRegisters as u64,
                options(noreturn)
            )
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::thread::HostFrame;

    use core::ffi::c_void;
    use core::mem::zeroed;
    use core::ptr::null_mut;

    use libc::{c_int, siginfo_t, SIGILL, SIGSEGV};

    const HOST_RIP: u64 = 0x5a5a_0000;
    const ARG1: u64 = 0x1111;
    const ARG2: u64 = 0x2222;

    // CF, PF, AF, ZF, SF, TF, DF and OF
    const STATUS_FLAGS: u64 = 0xdd5;

    /// Runs `f` in a forked child and returns the raw wait status.
    fn in_child(f: impl FnOnce()) -> c_int {
        let pid = unsafe { libc::fork() };
        assert!(pid >= 0, "fork failed");

        if pid == 0 {
            let limit = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            unsafe { libc::setrlimit(libc::RLIMIT_CORE, &limit) };
            f();
            unsafe { libc::_exit(100) };
        }

        let mut status = 0;
        assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
        status
    }

    /// An exit image returning to a scratch stack inside `stack`.
    fn image(stack: &mut [u8]) -> ExitRegisters {
        let top = (stack.as_mut_ptr() as u64 + stack.len() as u64) & !0xf;
        let host = HostFrame {
            rip: HOST_RIP,
            rsp: top,
            rbp: top,
        };
        ExitRegisters::sanitized(&host, ARG1, ARG2)
    }

    extern "C" fn inspect(_: c_int, _: *mut siginfo_t, ctx: *mut c_void) {
        let gregs = unsafe { &(*(ctx as *const libc::ucontext_t)).uc_mcontext.gregs };
        let reg = |r: c_int| gregs[r as usize] as u64;

        let scrubbed = [
            libc::REG_R8,
            libc::REG_R9,
            libc::REG_R10,
            libc::REG_R11,
            libc::REG_R12,
            libc::REG_R13,
            libc::REG_R14,
            libc::REG_R15,
            libc::REG_RCX,
            libc::REG_RDX,
        ]
        .iter()
        .all(|r| reg(*r) == 0);

        let handoff = reg(libc::REG_RIP) == 0
            && reg(libc::REG_RAX) == sgx::enclu::EEXIT as u64
            && reg(libc::REG_RBX) == HOST_RIP
            && reg(libc::REG_RDI) == ARG1
            && reg(libc::REG_RSI) == ARG2;

        let flags = reg(libc::REG_EFL) & STATUS_FLAGS == 0;

        let code = match (scrubbed, handoff, flags) {
            (true, true, true) => 0,
            (false, _, _) => 1,
            (_, false, _) => 2,
            (_, _, false) => 3,
        };
        unsafe { libc::_exit(code) };
    }

    #[test]
    fn simulated_transfer_faults() {
        let mut stack = vec![0u8; 1 << 16];
        let regs = image(&mut stack);

        let status = in_child(|| {
            SimulatedTransition.transfer(&regs);
        });

        assert!(libc::WIFSIGNALED(status), "child exited with {status:#x}");
        assert_eq!(libc::WTERMSIG(status), SIGSEGV);
    }

    #[test]
    fn simulated_transfer_cpu_state() {
        let mut stack = vec![0u8; 1 << 16];
        let regs = image(&mut stack);

        let status = in_child(|| {
            let mut action: libc::sigaction = unsafe { zeroed() };
            action.sa_sigaction = inspect as usize;
            action.sa_flags = libc::SA_SIGINFO;
            unsafe { libc::sigaction(SIGSEGV, &action, null_mut()) };

            SimulatedTransition.transfer(&regs);
        });

        assert!(libc::WIFEXITED(status), "child died with {status:#x}");
        assert_eq!(libc::WEXITSTATUS(status), 0);
    }

    #[test]
    fn hardware_transfer_outside_enclave_faults() {
        let mut stack = vec![0u8; 1 << 16];
        let regs = image(&mut stack);

        let status = in_child(|| {
            HardwareTransition.transfer(&regs);
        });

        assert!(libc::WIFSIGNALED(status), "child exited with {status:#x}");
        assert!(
            [SIGILL, SIGSEGV].contains(&libc::WTERMSIG(status)),
            "child died of signal {}",
            libc::WTERMSIG(status)
        );
    }
}
