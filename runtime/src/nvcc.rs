//! External `nvcc` invocation.
//!
//! Writes the generated source and the bundled auxiliary headers into a temp
//! directory, runs `nvcc` with a fixed flag set derived from the target
//! capability, and reads back the emitted PTX. On any toolchain failure the
//! diagnostic log and the full offending source are captured for postmortem.

use std::process::Command;

use tracing::debug;

use iskra_device::DeviceCapability;

use crate::compiler::{CompileFailure, CompileProfile, Compiler};
use crate::headers;

/// Driver for the external `nvcc` toolchain binary.
pub struct NvccCompiler {
    profile: CompileProfile,
    command: String,
}

impl NvccCompiler {
    pub fn new(profile: CompileProfile) -> Self {
        Self { profile, command: "nvcc".to_string() }
    }

    /// Use an explicit toolchain binary instead of the `nvcc` on `$PATH`.
    pub fn with_command(profile: CompileProfile, command: impl Into<String>) -> Self {
        Self { profile, command: command.into() }
    }

    pub(crate) fn flags(&self, capability: DeviceCapability) -> Vec<String> {
        let mut flags = vec![capability.arch_flag(), "--std=c++14".to_string(), "-w".to_string(), "-ptx".to_string()];
        match self.profile {
            CompileProfile::Optimized => flags.push("-O3".to_string()),
            CompileProfile::Debug => {
                flags.extend(["-G".to_string(), "-lineinfo".to_string(), "-O0".to_string()]);
            }
        }
        flags
    }
}

impl Compiler for NvccCompiler {
    fn compile(&self, source: &str, entry: &str, capability: DeviceCapability) -> Result<Vec<u8>, CompileFailure> {
        let fail = |log: String| CompileFailure { log, source_text: source.to_string() };

        let tmp = tempfile::tempdir().map_err(|e| fail(format!("failed to create temp directory: {e}")))?;
        for (name, text) in headers::bundle() {
            let path = tmp.path().join(name);
            std::fs::write(&path, text).map_err(|e| fail(format!("failed to write {}: {e}", path.display())))?;
        }

        let src_path = tmp.path().join(format!("{entry}.cu"));
        let ptx_path = tmp.path().join(format!("{entry}.ptx"));
        std::fs::write(&src_path, source).map_err(|e| fail(format!("failed to write kernel source: {e}")))?;

        debug!(kernel.entry = %entry, capability = %capability, "invoking nvcc");

        let output = Command::new(&self.command)
            .args(self.flags(capability))
            .arg("-I")
            .arg(tmp.path())
            .arg("-o")
            .arg(&ptx_path)
            .arg(&src_path)
            .output()
            .map_err(|e| fail(format!("failed to run '{}': {e}. Is the CUDA toolkit installed?", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(fail(format!("nvcc exited with {}:\n{stderr}", output.status)));
        }

        let image = std::fs::read(&ptx_path).map_err(|e| fail(format!("nvcc produced no output: {e}")))?;

        if self.profile == CompileProfile::Debug {
            // Keep build products around for cuda-gdb and friends.
            let kept = tmp.keep();
            debug!(dir = %kept.display(), "retaining temporary build products");
        }

        Ok(image)
    }
}
