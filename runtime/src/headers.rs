//! Auxiliary device headers bundled with every compile.
//!
//! The front end's generated source may include these unconditionally; the
//! compiler drivers place them on the include path of each translation unit.

/// Assert guard shipped to every kernel translation unit.
pub const DEVICE_ASSERT_H: &str = include_str!("headers/device_assert.h");

/// `(file name, contents)` pairs made visible to the device compiler.
pub fn bundle() -> &'static [(&'static str, &'static str)] {
    &[("iskra_device_assert.h", DEVICE_ASSERT_H)]
}
