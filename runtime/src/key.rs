//! Content-addressed compile keys.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use iskra_device::DeviceCapability;
use serde::{Deserialize, Serialize};

/// Unique identity of one compilation: the target capability plus a content
/// hash of the generated source text.
///
/// Two fragments with identical generated text and capability collapse to a
/// single compilation; the same text for a different capability is an
/// independent compilation. The hash is taken with an unkeyed
/// `DefaultHasher`, which is stable across processes, so keys computed after
/// a restart line up with the persistent index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileKey {
    pub capability: DeviceCapability,
    pub source_hash: u64,
}

impl CompileKey {
    /// Key a generated source fragment for `capability`.
    pub fn of_source(capability: DeviceCapability, source: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        Self { capability, source_hash: hasher.finish() }
    }
}

impl fmt::Display for CompileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:016x}", self.capability, self.source_hash)
    }
}
