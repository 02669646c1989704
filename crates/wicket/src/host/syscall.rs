// SPDX-License-Identifier: Apache-2.0

use super::{deref, deref_sized};
use crate::message::Syscall as Payload;
use crate::Result;

use core::arch::asm;
use core::ffi::c_long;

use libc::{timespec, utsname, EFAULT, ENOSYS};

trait Execute {
    unsafe fn execute(self);
}

struct Syscall<'a, const ARGS: usize> {
    /// The syscall number for the request.
    ///
    /// See, for example, [`libc::SYS_read`](libc::SYS_read).
    num: c_long,

    /// The syscall argument vector.
    argv: [usize; ARGS],

    /// Return value.
    ret: &'a mut usize,
}

impl Execute for Syscall<'_, 0> {
    #[inline]
    unsafe fn execute(self) {
        asm!(
        "syscall",
        inlateout("rax") self.num as usize => *self.ret,
        lateout("rcx") _, // clobbered
        lateout("r11") _, // clobbered
        )
    }
}

impl Execute for Syscall<'_, 1> {
    #[inline]
    unsafe fn execute(self) {
        asm!(
        "syscall",
        inlateout("rax") self.num as usize => *self.ret,
        in("rdi") self.argv[0],
        lateout("rcx") _, // clobbered
        lateout("r11") _, // clobbered
        )
    }
}

impl Execute for Syscall<'_, 2> {
    #[inline]
    unsafe fn execute(self) {
        asm!(
        "syscall",
        inlateout("rax") self.num as usize => *self.ret,
        in("rdi") self.argv[0],
        in("rsi") self.argv[1],
        lateout("rcx") _, // clobbered
        lateout("r11") _, // clobbered
        )
    }
}

impl Execute for Syscall<'_, 3> {
    #[inline]
    unsafe fn execute(self) {
        asm!(
        "syscall",
        inlateout("rax") self.num as usize => *self.ret,
        in("rdi") self.argv[0],
        in("rsi") self.argv[1],
        in("rdx") self.argv[2],
        lateout("rcx") _, // clobbered
        lateout("r11") _, // clobbered
        )
    }
}

impl Execute for Syscall<'_, 4> {
    #[inline]
    unsafe fn execute(self) {
        asm!(
        "syscall",
        inlateout("rax") self.num as usize => *self.ret,
        in("rdi") self.argv[0],
        in("rsi") self.argv[1],
        in("rdx") self.argv[2],
        in("r10") self.argv[3],
        lateout("rcx") _, // clobbered
        lateout("r11") _, // clobbered
        )
    }
}

/// Executes the supported subset of syscalls.
///
/// Anything not matched fails with `ENOSYS`, whatever `ret` the request carried.
/// Process exit is absent, termination is a protocol message of its own.
pub(super) unsafe fn execute(call: &mut Payload, data: &mut [u8]) -> Result<()> {
    match call {
        Payload {
            num,
            argv: [fd, buf_offset, count, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_read as _ => {
            let buf = deref(data, *buf_offset, *count)?;
            Syscall {
                num: libc::SYS_read,
                argv: [*fd, buf as _, *count],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [fd, buf_offset, count, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_write as _ => {
            let buf = deref(data, *buf_offset, *count)?;
            Syscall {
                num: libc::SYS_write,
                argv: [*fd, buf as _, *count],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [fd, buf_offset, count, offset, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_pread64 as _ => {
            let buf = deref(data, *buf_offset, *count)?;
            Syscall {
                num: libc::SYS_pread64,
                argv: [*fd, buf as _, *count, *offset],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [fd, buf_offset, count, offset, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_pwrite64 as _ => {
            let buf = deref(data, *buf_offset, *count)?;
            Syscall {
                num: libc::SYS_pwrite64,
                argv: [*fd, buf as _, *count, *offset],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [fd, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_close as _ => Syscall {
            num: libc::SYS_close,
            argv: [*fd],
            ret,
        }
        .execute(),

        Payload {
            num,
            argv: [oldfd, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_dup as _ => Syscall {
            num: libc::SYS_dup,
            argv: [*oldfd],
            ret,
        }
        .execute(),

        Payload {
            num,
            argv: [oldfd, newfd, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_dup2 as _ => Syscall {
            num: libc::SYS_dup2,
            argv: [*oldfd, *newfd],
            ret,
        }
        .execute(),

        Payload {
            num,
            argv: [oldfd, newfd, flags, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_dup3 as _ => Syscall {
            num: libc::SYS_dup3,
            argv: [*oldfd, *newfd, *flags],
            ret,
        }
        .execute(),

        Payload {
            num,
            argv: [fd, cmd, arg, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_fcntl as _ => Syscall {
            num: libc::SYS_fcntl,
            argv: [*fd, *cmd, *arg],
            ret,
        }
        .execute(),

        Payload {
            num,
            argv: [fd, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_fsync as _ => Syscall {
            num: libc::SYS_fsync,
            argv: [*fd],
            ret,
        }
        .execute(),

        Payload {
            num,
            argv: [fd, offset, whence, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_lseek as _ => Syscall {
            num: libc::SYS_lseek,
            argv: [*fd, *offset, *whence],
            ret,
        }
        .execute(),

        Payload {
            num,
            ret: [ret, ..],
            ..
        } if *num == libc::SYS_sync as _ => Syscall {
            num: libc::SYS_sync,
            argv: [],
            ret,
        }
        .execute(),

        Payload {
            num,
            ret: [ret, ..],
            ..
        } if [
            libc::SYS_getpid,
            libc::SYS_getppid,
            libc::SYS_getuid,
            libc::SYS_geteuid,
            libc::SYS_getgid,
            libc::SYS_getegid,
        ]
        .contains(&(*num as c_long)) =>
        {
            Syscall {
                num: *num as _,
                argv: [],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [clockid, tp_offset, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_clock_gettime as _ => {
            let tp = deref_sized::<timespec>(data, *tp_offset)?;
            if tp.is_null() {
                return Err(EFAULT);
            }
            Syscall {
                num: libc::SYS_clock_gettime,
                argv: [*clockid, tp as _],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [clockid, res_offset, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_clock_getres as _ => {
            let res = deref_sized::<timespec>(data, *res_offset)?;
            Syscall {
                num: libc::SYS_clock_getres,
                argv: [*clockid, res as _],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [req_offset, rem_offset, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_nanosleep as _ => {
            let req = deref_sized::<timespec>(data, *req_offset)?;
            if req.is_null() {
                return Err(EFAULT);
            }
            let rem = deref_sized::<timespec>(data, *rem_offset)?;
            Syscall {
                num: libc::SYS_nanosleep,
                argv: [req as _, rem as _],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [buf_offset, buflen, flags, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_getrandom as _ => {
            let buf = deref(data, *buf_offset, *buflen)?;
            Syscall {
                num: libc::SYS_getrandom,
                argv: [buf as _, *buflen, *flags],
                ret,
            }
            .execute()
        }

        Payload {
            num,
            argv: [buf_offset, ..],
            ret: [ret, ..],
        } if *num == libc::SYS_uname as _ => {
            let buf = deref_sized::<utsname>(data, *buf_offset)?;
            if buf.is_null() {
                return Err(EFAULT);
            }
            Syscall {
                num: libc::SYS_uname,
                argv: [buf as _],
                ret,
            }
            .execute()
        }

        _ => return Err(ENOSYS),
    }
    Ok(())
}
