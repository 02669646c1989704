// SPDX-License-Identifier: Apache-2.0

//! Hardware transitions through `ENCLU[EEXIT]`

use super::probe::{self, CpuId};
use super::Datum;

const DEVICE: &str = "/dev/sgx_enclave";

const CPUIDS: &[CpuId] = &[
    CpuId {
        name: " SGX Support",
        leaf: 0x00000007,
        subl: 0x00000000,
        func: |res| (res.ebx & (1 << 2) != 0, None),
    },
    CpuId {
        name: "  Version 1",
        leaf: 0x00000012,
        subl: 0x00000000,
        func: |res| (res.eax & (1 << 0) != 0, None),
    },
    CpuId {
        name: "  Version 2",
        leaf: 0x00000012,
        subl: 0x00000000,
        func: |res| (res.eax & (1 << 1) != 0, None),
    },
    CpuId {
        name: "  FLC Support",
        leaf: 0x00000007,
        subl: 0x00000000,
        func: |res| (res.ecx & (1 << 30) != 0, None),
    },
    CpuId {
        name: "  Max Size (64-bit)",
        leaf: 0x00000012,
        subl: 0x00000000,
        func: |res| {
            let bits = res.edx >> 8 & 0xff;
            match bits {
                0 => (false, None),
                bits => (true, Some(probe::humanize(2f64.powi(bits as i32)))),
            }
        },
    },
];

pub struct Backend;

impl super::Backend for Backend {
    fn name(&self) -> &'static str {
        "sgx"
    }

    fn data(&self) -> Vec<Datum> {
        let vendor = probe::vendor();
        let intel = vendor == "GenuineIntel";

        let mut data = vec![
            probe::device(
                "Driver",
                DEVICE,
                "The SGX driver is part of Linux 5.11 and later.",
            ),
            Datum {
                name: "CPU".into(),
                pass: intel,
                info: Some(vendor),
                mesg: None,
            },
        ];

        if intel {
            data.extend(CPUIDS.iter().map(Datum::from));
        }

        data
    }
}
