// SPDX-License-Identifier: Apache-2.0

//! Register sanitizer
//!
//! Before control leaves the enclave every general purpose register and the flags
//! are replaced. Registers carrying the exit handoff get their handoff value, all
//! others are zeroed so that no trusted state reaches the host.

use crate::thread::HostFrame;

/// The complete register image loaded right before control leaves the enclave.
///
/// The field order is the order in which the backends pop the image off memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
#[allow(missing_docs)]
pub struct ExitRegisters {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rflags: u64,
}

impl ExitRegisters {
    /// Builds the sanitized image for an exit to `host` carrying `arg1` and `arg2`.
    ///
    /// | register | value |
    /// |----------|-------|
    /// | `rax` | `EEXIT` |
    /// | `rbx` | host `rip` |
    /// | `rcx` | host `rsp` |
    /// | `rdx` | host `rbp` |
    /// | `rdi` | `arg1` |
    /// | `rsi` | `arg2` |
    /// | others, `rflags` | `0` |
    pub fn sanitized(host: &HostFrame, arg1: u64, arg2: u64) -> Self {
        Self {
            rax: sgx::enclu::EEXIT as _,
            rbx: host.rip,
            rcx: host.rsp,
            rdx: host.rbp,
            rdi: arg1,
            rsi: arg2,
            ..Self::default()
        }
    }

    /// Registers that must never carry anything across the boundary.
    pub fn scrubbed(&self) -> [u64; 9] {
        [
            self.r8,
            self.r9,
            self.r10,
            self.r11,
            self.r12,
            self.r13,
            self.r14,
            self.r15,
            self.rflags,
        ]
    }
}
