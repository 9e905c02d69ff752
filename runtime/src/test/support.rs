//! Test doubles shared by the runtime unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use iskra_device::DeviceCapability;

use crate::compiler::{CompileFailure, Compiler};

/// Marker that makes the counting compiler reject a source.
pub const FAIL_MARKER: &str = "__refuse_to_compile__";

/// Compiler double that counts invocations and fabricates PTX-shaped output.
#[derive(Default)]
pub struct CountingCompiler {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep per compile, to widen concurrency windows in tests.
    pub fn with_delay(delay: Duration) -> Self {
        Self { calls: AtomicUsize::new(0), delay }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Compiler for CountingCompiler {
    fn compile(&self, source: &str, entry: &str, capability: DeviceCapability) -> Result<Vec<u8>, CompileFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if source.contains(FAIL_MARKER) {
            return Err(CompileFailure {
                log: format!("error: refusing to compile '{entry}'"),
                source_text: source.to_string(),
            });
        }
        Ok(format!(".version 7.0 // {entry}@{capability}\n{source}").into_bytes())
    }
}
