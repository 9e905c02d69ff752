//! Compilation-cache behavior: at-most-one compile per key, shared blobs,
//! failure isolation, and per-context module fan-out.

use std::sync::Arc;
use std::time::Duration;

use iskra_device::ExecutionContext;
use iskra_device::DeviceCapability;
use iskra_device::test::mock::MockContext;

use crate::Error;
use crate::cache::CompilationCache;
use crate::key::CompileKey;
use crate::test::support::{CountingCompiler, FAIL_MARKER};

const CAP: DeviceCapability = DeviceCapability::new(3, 5);
const SOURCE: &str = "__global__ void map_kernel(float* a) { a[0] += 1.0f; }";

#[test]
fn test_single_compilation_per_key() {
    let compiler = Arc::new(CountingCompiler::with_delay(Duration::from_millis(20)));
    let cache = CompilationCache::new(compiler.clone());
    let key = CompileKey::of_source(CAP, SOURCE);

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            std::thread::spawn(move || cache.obtain_or_compile(key, SOURCE, "map_kernel").binary().unwrap())
        })
        .collect();

    let binaries: Vec<_> = waiters.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(compiler.calls(), 1, "concurrent requests for one key must compile once");
    for binary in &binaries[1..] {
        assert!(Arc::ptr_eq(&binaries[0], binary), "all waiters must observe the same blob");
    }
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_hit_performs_no_compile() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());
    let key = CompileKey::of_source(CAP, SOURCE);

    let first = cache.obtain_or_compile(key, SOURCE, "map_kernel").binary().unwrap();

    let entry = cache.obtain_or_compile(key, SOURCE, "map_kernel");
    assert!(entry.is_compiled());
    let second = entry.binary().unwrap();

    assert_eq!(compiler.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_capabilities_compile_independently() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());

    let key_a = CompileKey::of_source(DeviceCapability::new(3, 5), SOURCE);
    let key_b = CompileKey::of_source(DeviceCapability::new(5, 0), SOURCE);
    assert_ne!(key_a, key_b);

    let blob_a = cache.obtain_or_compile(key_a, SOURCE, "map_kernel").binary().unwrap();
    let blob_b = cache.obtain_or_compile(key_b, SOURCE, "map_kernel").binary().unwrap();

    assert_eq!(compiler.calls(), 2);
    assert_ne!(blob_a.image(), blob_b.image());
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_failure_carries_diagnostics_and_is_evicted() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());
    let source = format!("__global__ void bad() {{}} // {FAIL_MARKER}");
    let key = CompileKey::of_source(CAP, &source);

    let err = cache.obtain_or_compile(key, &source, "bad").binary().unwrap_err();
    match err {
        Error::CompileFailed { log, source_text } => {
            assert!(log.contains("refusing to compile 'bad'"));
            assert_eq!(source_text, source);
        }
        other => panic!("expected CompileFailed, got {other:?}"),
    }

    assert!(cache.get(key).is_none(), "failed entry must be evicted");

    // The same key may attempt a fresh compile afterwards.
    let err = cache.obtain_or_compile(key, &source, "bad").binary().unwrap_err();
    assert!(matches!(err, Error::CompileFailed { .. }));
    assert_eq!(compiler.calls(), 2, "retry must reach the compiler again");
}

#[test]
fn test_concurrent_waiters_receive_same_failure() {
    let compiler = Arc::new(CountingCompiler::with_delay(Duration::from_millis(20)));
    let cache = CompilationCache::new(compiler.clone());
    let source = format!("__global__ void bad() {{}} // {FAIL_MARKER}");
    let key = CompileKey::of_source(CAP, &source);

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let cache = cache.clone();
            let source = source.clone();
            std::thread::spawn(move || cache.obtain_or_compile(key, &source, "bad").binary())
        })
        .collect();

    for waiter in waiters {
        assert!(matches!(waiter.join().unwrap(), Err(Error::CompileFailed { .. })));
    }
    assert_eq!(compiler.calls(), 1);
}

#[test]
fn test_failure_does_not_block_other_keys() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());

    let bad_source = format!("__global__ void bad() {{}} // {FAIL_MARKER}");
    let bad_key = CompileKey::of_source(CAP, &bad_source);
    let good_key = CompileKey::of_source(CAP, SOURCE);

    assert!(cache.obtain_or_compile(bad_key, &bad_source, "bad").binary().is_err());
    let blob = cache.obtain_or_compile(good_key, SOURCE, "map_kernel").binary().unwrap();

    assert!(!blob.image().is_empty());
    assert_eq!(cache.len(), 1, "only the good key stays cached");
}

#[test]
fn test_per_context_isolation() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler.clone());
    let key = CompileKey::of_source(CAP, SOURCE);

    let ctx_a = MockContext::new(1, CAP);
    let ctx_b = MockContext::new(2, CAP);

    let entry = cache.obtain_or_compile(key, SOURCE, "map_kernel");
    let module_a = entry.resolve(&ctx_a).unwrap();
    let module_b = entry.resolve(&ctx_b).unwrap();

    assert!(!Arc::ptr_eq(&module_a, &module_b), "each context links its own module");
    assert_eq!(compiler.calls(), 1, "fan-out must not recompile");
    assert_eq!(entry.modules().context_count(), 2);

    // Resolving again within a context reuses the linked module.
    let again = entry.resolve(&ctx_a).unwrap();
    assert!(Arc::ptr_eq(&module_a, &again));
    assert_eq!(ctx_a.link_count(), 1);
}

#[test]
fn test_release_context_sweeps_only_that_context() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler);
    let key = CompileKey::of_source(CAP, SOURCE);

    let ctx_a = MockContext::new(1, CAP);
    let ctx_b = MockContext::new(2, CAP);

    let entry = cache.obtain_or_compile(key, SOURCE, "map_kernel");
    entry.resolve(&ctx_a).unwrap();
    entry.resolve(&ctx_b).unwrap();

    cache.release_context(ctx_a.id());

    assert_eq!(ctx_a.live_modules(), 0, "context A's module must be unloaded");
    assert_eq!(ctx_b.live_modules(), 1, "context B's module must survive");
    assert!(entry.is_compiled(), "the binary stays cached past context teardown");

    // A fresh use of context A relinks from the cached binary.
    entry.resolve(&ctx_a).unwrap();
    assert_eq!(ctx_a.link_count(), 2);
}

#[test]
fn test_link_failure_is_distinct_from_compile_failure() {
    let compiler = Arc::new(CountingCompiler::new());
    let cache = CompilationCache::new(compiler);
    let key = CompileKey::of_source(CAP, SOURCE);

    let broken = MockContext::failing(9, CAP);
    let entry = cache.obtain_or_compile(key, SOURCE, "map_kernel");

    let err = entry.resolve(&broken).unwrap_err();
    assert!(matches!(err, Error::Link { .. }));
    assert!(entry.is_compiled(), "a link failure must not disturb the compiled entry");
}
