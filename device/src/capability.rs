//! Device compute-capability identification.

use std::fmt;

/// Compute capability of a target device, e.g. `sm_35` for `(3, 5)`.
///
/// The capability selects the compiler's architecture flag and segments the
/// compilation cache: one logical kernel is compiled at most once per
/// capability, never once per physical device. Two devices of the same
/// capability share compiled binaries; they never share loaded modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceCapability {
    pub major: u32,
    pub minor: u32,
}

impl DeviceCapability {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Architecture flag handed to the device compiler.
    pub fn arch_flag(&self) -> String {
        format!("-arch={self}")
    }
}

impl fmt::Display for DeviceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm_{}{}", self.major, self.minor)
    }
}

impl From<(u32, u32)> for DeviceCapability {
    fn from((major, minor): (u32, u32)) -> Self {
        Self { major, minor }
    }
}
