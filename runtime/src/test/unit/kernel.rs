//! End-to-end kernel builds through the driver glue.

use std::sync::Arc;

use iskra_device::ExecutionContext;
use iskra_device::DeviceCapability;
use iskra_device::test::mock::MockContext;

use crate::cache::CompilationCache;
use crate::kernel::{FreeVar, KernelRequest, build_kernel};
use crate::occupancy::DynamicSharedMemory;
use crate::test::support::CountingCompiler;

const CAP: DeviceCapability = DeviceCapability::new(3, 5);

fn request() -> KernelRequest {
    KernelRequest {
        source: "__global__ void zip_kernel(float* xs, float* ys) { }".to_string(),
        entry: "zip_kernel".to_string(),
        free_vars: vec![FreeVar::array("xs"), FreeVar::array("ys"), FreeVar::scalar("alpha")],
        problem_size: 10_000,
        dynamic_smem: DynamicSharedMemory::None,
    }
}

#[test]
fn test_build_kernel_produces_complete_handle() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());
    let ctx = MockContext::new(1, CAP);

    let kernel = build_kernel(&cache, &ctx, &request()).unwrap();

    assert_eq!(kernel.entry(), "zip_kernel");
    assert_eq!(kernel.module().context(), ctx.id());
    assert_eq!(compiler.calls(), 1);

    let launch = kernel.launch();
    let capacity =
        launch.grid_dim.0 as usize * launch.grid_dim.1 as usize * launch.grid_dim.2 as usize * launch.block_dim.0 as usize;
    assert!(capacity >= 10_000, "launch must cover the problem size");

    let arrays: Vec<_> = kernel.array_arguments().collect();
    assert_eq!(arrays, ["xs", "ys"]);
}

#[test]
fn test_rebuild_reuses_compile_and_link() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());
    let ctx = MockContext::new(1, CAP);

    let first = build_kernel(&cache, &ctx, &request()).unwrap();
    let second = build_kernel(&cache, &ctx, &request()).unwrap();

    assert_eq!(compiler.calls(), 1, "second build must be a cache hit");
    assert_eq!(ctx.link_count(), 1, "second build must reuse the linked module");
    assert!(Arc::ptr_eq(first.binary(), second.binary()));
    assert!(Arc::ptr_eq(first.module(), second.module()));
    assert_eq!(first.launch(), second.launch());
}

#[test]
fn test_expect_array_resolves_array_bindings() {
    let cache = CompilationCache::new(Arc::new(CountingCompiler::new()));
    let ctx = MockContext::new(1, CAP);

    let kernel = build_kernel(&cache, &ctx, &request()).unwrap();
    assert_eq!(kernel.expect_array("xs").name, "xs");
}

#[test]
#[should_panic(expected = "does not name a device array")]
fn test_expect_array_panics_on_scalar_binding() {
    let cache = CompilationCache::new(Arc::new(CountingCompiler::new()));
    let ctx = MockContext::new(1, CAP);

    let kernel = build_kernel(&cache, &ctx, &request()).unwrap();
    kernel.expect_array("alpha");
}

#[test]
#[should_panic(expected = "is not in the kernel environment")]
fn test_expect_array_panics_on_unknown_name() {
    let cache = CompilationCache::new(Arc::new(CountingCompiler::new()));
    let ctx = MockContext::new(1, CAP);

    let kernel = build_kernel(&cache, &ctx, &request()).unwrap();
    kernel.expect_array("nonexistent");
}
