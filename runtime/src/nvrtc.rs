//! Embedded NVRTC compiler.
//!
//! Same invocation contract as the external driver, without leaving the
//! process: the bundled headers are staged into a temp directory handed to
//! NVRTC as an include path, and the emitted PTX text becomes the binary
//! image.

use tracing::debug;

use iskra_device::DeviceCapability;

use crate::compiler::{CompileFailure, CompileProfile, Compiler};
use crate::headers;

/// In-process compiler backed by `cudarc::nvrtc`.
pub struct NvrtcCompiler {
    profile: CompileProfile,
}

impl NvrtcCompiler {
    pub fn new(profile: CompileProfile) -> Self {
        Self { profile }
    }

    fn options(&self, capability: DeviceCapability, include_dir: &str) -> Vec<String> {
        let mut options = vec![
            format!("--gpu-architecture=compute_{}{}", capability.major, capability.minor),
            "--std=c++14".to_string(),
            "-w".to_string(),
            format!("--include-path={include_dir}"),
        ];
        if self.profile == CompileProfile::Debug {
            options.extend(["--device-debug".to_string(), "--generate-line-info".to_string()]);
        }
        options
    }
}

impl Compiler for NvrtcCompiler {
    fn compile(&self, source: &str, entry: &str, capability: DeviceCapability) -> Result<Vec<u8>, CompileFailure> {
        let fail = |log: String| CompileFailure { log, source_text: source.to_string() };

        let tmp = tempfile::tempdir().map_err(|e| fail(format!("failed to create temp directory: {e}")))?;
        for (name, text) in headers::bundle() {
            let path = tmp.path().join(name);
            std::fs::write(&path, text).map_err(|e| fail(format!("failed to write {}: {e}", path.display())))?;
        }

        debug!(kernel.entry = %entry, capability = %capability, "invoking nvrtc");

        let opts = cudarc::nvrtc::CompileOptions {
            options: self.options(capability, &tmp.path().display().to_string()),
            ..Default::default()
        };

        let ptx = cudarc::nvrtc::compile_ptx_with_opts(source, opts).map_err(|e| fail(e.to_string()))?;
        Ok(ptx.to_src().into_bytes())
    }
}
