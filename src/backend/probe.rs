// SPDX-License-Identifier: Apache-2.0

use crate::backend::Datum;

use std::arch::x86_64::{CpuidResult, __cpuid_count};
use std::ffi::CStr;
use std::io;
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::path::Path;
use std::str::Utf8Error;

/// A single CPUID check.
pub struct CpuId {
    pub name: &'static str,
    pub leaf: u32,
    pub subl: u32,
    pub func: fn(CpuidResult) -> (bool, Option<String>),
}

impl From<&CpuId> for Datum {
    fn from(cpuid: &CpuId) -> Datum {
        let max = unsafe { __cpuid_count(0x00000000, 0x00000000) }.eax;

        let (pass, info) = if cpuid.leaf <= max {
            (cpuid.func)(unsafe { __cpuid_count(cpuid.leaf, cpuid.subl) })
        } else {
            (false, None)
        };

        Datum {
            name: cpuid.name.into(),
            mesg: None,
            pass,
            info,
        }
    }
}

/// The CPU vendor string from leaf 0.
pub fn vendor() -> String {
    let res = unsafe { __cpuid_count(0x00000000, 0x00000000) };
    [res.ebx, res.edx, res.ecx]
        .iter()
        .flat_map(|r| r.to_le_bytes())
        .map(char::from)
        .collect()
}

/// Formats a byte count with a binary unit.
pub fn humanize(mut size: f64) -> String {
    const SUFFIXES: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

    let mut iter = 0;
    while size >= 1024.0 && iter < SUFFIXES.len() - 1 {
        size /= 1024.0;
        iter += 1;
    }

    format!("{:.0} {}", size, SUFFIXES[iter])
}

/// Checks that a device node exists.
pub fn device(name: &str, path: &str, mesg: &str) -> Datum {
    let pass = Path::new(path).exists();
    Datum {
        name: name.into(),
        pass,
        info: Some(path.into()),
        mesg: (!pass).then(|| mesg.into()),
    }
}

/// Kernel and machine, as reported by `uname`.
pub fn system_info() -> String {
    fn array_to_str<const N: usize>(array: &'_ mut [c_char; N]) -> Result<&'_ str, Utf8Error> {
        array[N - 1] = 0;
        unsafe { CStr::from_ptr(array.as_ptr()) }.to_str()
    }

    let mut utsname = MaybeUninit::<libc::utsname>::uninit();
    if unsafe { libc::uname(utsname.as_mut_ptr()) } != 0 {
        return format!("[{}]", io::Error::last_os_error());
    }
    let mut utsname = unsafe { utsname.assume_init() };

    let mut info = || -> Result<String, Utf8Error> {
        Ok(format!(
            "{} {} {} {}",
            array_to_str(&mut utsname.sysname)?,
            array_to_str(&mut utsname.release)?,
            array_to_str(&mut utsname.version)?,
            array_to_str(&mut utsname.machine)?,
        ))
    };
    info().unwrap_or_else(|e| format!("[utf8 error: {e}]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn humanized() {
        assert_eq!(humanize(512.0), "512 B");
        assert_eq!(humanize(4096.0), "4 KiB");
        assert_eq!(humanize((1u64 << 36) as f64), "64 GiB");
        assert!(humanize(f64::MAX).ends_with(" EiB"));
    }

    #[test]
    fn vendor_length() {
        assert_eq!(vendor().chars().count(), 12);
    }

    #[test]
    fn missing_device() {
        let datum = device("Driver", "/dev/postern-does-not-exist", "load it");
        assert!(!datum.pass);
        assert_eq!(datum.mesg.as_deref(), Some("load it"));

        let datum = device("Null", "/dev/null", "unused");
        assert!(datum.pass);
        assert_eq!(datum.mesg, None);
    }

    #[test]
    fn uname() {
        assert!(system_info().starts_with("Linux "));
    }

    #[test]
    fn unreachable_leaf() {
        let datum = Datum::from(&CpuId {
            name: "Beyond",
            leaf: 0x0fff_ffff,
            subl: 0,
            func: |_| (true, None),
        });
        assert!(!datum.pass);
    }
}
