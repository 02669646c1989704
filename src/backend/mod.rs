// SPDX-License-Identifier: Apache-2.0

pub mod probe;
mod sgx;
pub mod sim;

use serde::{Serialize, Serializer};

/// A transition backend the platform may support.
pub trait Backend: Sync {
    /// The name of the backend
    fn name(&self) -> &'static str;

    /// Whether or not the platform has support for this backend
    fn have(&self) -> bool {
        self.data().iter().all(|d| d.pass)
    }

    /// The tests that show platform support for the backend
    fn data(&self) -> Vec<Datum>;
}

/// All known backends, in order of preference.
pub static BACKENDS: &[&dyn Backend] = &[&sgx::Backend, &sim::Backend];

#[derive(Debug, Serialize)]
pub struct Datum {
    /// The name of this datum.
    ///
    /// Leading spaces nest the datum under the previous one when displayed.
    #[serde(serialize_with = "trimmed")]
    pub name: String,

    /// Whether the datum indicates support for the platform or not.
    pub pass: bool,

    /// Short additional information to display to the user.
    pub info: Option<String>,

    /// Longer explanatory message on how to resolve problems.
    pub mesg: Option<String>,
}

fn trimmed<S: Serializer>(name: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(name.trim_start())
}
