// SPDX-License-Identifier: Apache-2.0

//! Host-kernel execution of forwarded syscalls.

mod syscall;

use crate::message::Syscall;
use crate::{Result, NULL};

use core::mem::size_of;
use core::ptr::null_mut;

use libc::EFAULT;
use log::trace;

/// Validates that `data` contains `len` bytes at `offset` and returns a pointer to them.
///
/// A [`NULL`] offset yields a null pointer.
#[inline]
fn deref(data: &mut [u8], offset: usize, len: usize) -> Result<*mut u8> {
    if offset == NULL {
        return Ok(null_mut());
    }
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(data[offset..].as_mut_ptr()),
        _ => Err(EFAULT),
    }
}

/// Validates that `data` has room for a `T` at `offset`.
///
/// The data section carries no alignment guarantee, so values are only ever accessed with
/// unaligned reads and writes through the returned pointer.
#[inline]
fn deref_sized<T>(data: &mut [u8], offset: usize) -> Result<*mut T> {
    deref(data, offset, size_of::<T>()).map(|ptr| ptr as *mut T)
}

/// Executes `call` against the host kernel.
///
/// The results are written to `call.ret` and, for syscalls producing output, into `data`.
/// Failures are reported as a negative errno in `ret[0]`: an offset or length outside the data
/// section yields `-EFAULT` and an unsupported syscall yields `-ENOSYS`.
pub fn execute(call: &mut Syscall, data: &mut [u8]) {
    if let Err(errno) = unsafe { syscall::execute(call, data) } {
        call.ret = [-errno as _, 0];
    }
    trace!("syscall {} = {}", call.num, call.result());
}
