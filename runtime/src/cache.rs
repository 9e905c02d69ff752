//! Content-addressed compilation cache.
//!
//! Maps (capability, source hash) to compiled device binaries. Uses papaya's
//! lock-free HashMap so lookups for different keys never contend, with the
//! `compute` idiom for atomic insertion: of N concurrent requesters for one
//! missing key, exactly one spawns the compile task and all observe the same
//! Pending entry.
//!
//! # Lifecycle
//!
//! An entry is born Pending, transitions to Compiled exactly once, and is
//! never rolled back or evicted afterwards; the table is bounded by program
//! size, not working-set pressure. A failed compile is the one exception:
//! the entry is removed so a later request for the same key may attempt a
//! fresh compile, and every waiter of the failed entry receives the same
//! fatal error.

use std::sync::Arc;

use papaya::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use iskra_device::{ContextId, DeviceCapability, ExecutionContext, LoadedModule, ModuleRegistry};

use crate::compiler::{AsyncCompiler, CompileFailure, Compiler};
use crate::disk::DiskStore;
use crate::error::Result;
use crate::future::{self, OnceFuture};
use crate::key::CompileKey;

/// Immutable compiled binary image, shared by every context that links it.
#[derive(Debug)]
pub struct CompiledBinary {
    key: CompileKey,
    image: Vec<u8>,
}

impl CompiledBinary {
    pub(crate) fn new(key: CompileKey, image: Vec<u8>) -> Self {
        Self { key, image }
    }

    pub fn key(&self) -> CompileKey {
        self.key
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }
}

/// Outcome distributed to every waiter of one compile task.
pub(crate) type CompileOutcome = std::result::Result<Arc<CompiledBinary>, CompileFailure>;

enum EntryState {
    /// Compile in flight; readers block on the future at first real use.
    Pending(OnceFuture<CompileOutcome>),
    /// Terminal: binary available, never rolled back.
    Compiled(Arc<CompiledBinary>),
}

/// One cache slot: the compile state plus the per-context module registry
/// for the compiled binary.
pub struct CacheEntry {
    key: CompileKey,
    entry_name: String,
    state: RwLock<EntryState>,
    modules: ModuleRegistry,
}

impl CacheEntry {
    fn pending(key: CompileKey, entry_name: &str, future: OnceFuture<CompileOutcome>) -> Self {
        Self {
            key,
            entry_name: entry_name.to_string(),
            state: RwLock::new(EntryState::Pending(future)),
            modules: ModuleRegistry::new(),
        }
    }

    fn compiled(key: CompileKey, entry_name: &str, binary: Arc<CompiledBinary>) -> Self {
        Self {
            key,
            entry_name: entry_name.to_string(),
            state: RwLock::new(EntryState::Compiled(binary)),
            modules: ModuleRegistry::new(),
        }
    }

    pub fn key(&self) -> CompileKey {
        self.key
    }

    /// Entry symbol of the kernel this slot compiles. The symbol is a
    /// function of the generated source, so one key carries one name.
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    /// Non-blocking state probe.
    pub fn is_compiled(&self) -> bool {
        matches!(&*self.state.read(), EntryState::Compiled(_))
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// The compiled binary, blocking while the compile is still in flight.
    ///
    /// This is the subsystem's only blocking point. Every waiter of one key
    /// observes the same binary or the same failure.
    pub fn binary(&self) -> Result<Arc<CompiledBinary>> {
        let future = match &*self.state.read() {
            EntryState::Compiled(binary) => return Ok(Arc::clone(binary)),
            EntryState::Pending(future) => future.clone(),
        };
        future.wait().map_err(Into::into)
    }

    /// Context-local module for this entry, forcing the pending compile if
    /// necessary and linking on first use within `ctx`.
    pub fn resolve(&self, ctx: &dyn ExecutionContext) -> Result<Arc<LoadedModule>> {
        use snafu::ResultExt;

        let binary = self.binary()?;
        self.modules.resolve(ctx, binary.image(), &self.entry_name).context(crate::error::LinkSnafu)
    }

    /// Transition Pending → Compiled. Called once by the compile task before
    /// any waiter is woken.
    pub(crate) fn promote(&self, binary: Arc<CompiledBinary>) {
        let mut state = self.state.write();
        debug_assert!(matches!(&*state, EntryState::Pending(_)), "cache entry promoted twice");
        *state = EntryState::Compiled(binary);
    }
}

/// State shared between the cache handle and its compile tasks.
pub(crate) struct CacheShared {
    pub(crate) entries: HashMap<CompileKey, Arc<CacheEntry>>,
    pub(crate) compiler: Arc<dyn Compiler>,
    pub(crate) store: Option<DiskStore>,
}

impl CacheShared {
    /// Remove a failed entry so a later request may retry, unless a newer
    /// entry already replaced it, which must not be clobbered.
    pub(crate) fn evict_failed(&self, key: CompileKey, failed: &Arc<CacheEntry>) {
        use papaya::Operation;

        let guard = self.entries.guard();
        let _ = self.entries.compute(
            key,
            |existing| match existing {
                Some((_, entry)) if Arc::ptr_eq(entry, failed) => Operation::Remove,
                _ => Operation::Abort(()),
            },
            &guard,
        );
    }
}

/// The content-addressed compilation cache.
///
/// An explicit, caller-owned service object: construct one per process (or
/// per device group) when contexts come up, and call
/// [`CompilationCache::release_context`] when one goes away. Cloning the
/// handle shares the underlying table.
#[derive(Clone)]
pub struct CompilationCache {
    inner: Arc<CacheShared>,
}

impl CompilationCache {
    /// Cache with no persistent mirror.
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { inner: Arc::new(CacheShared { entries: HashMap::new(), compiler, store: None }) }
    }

    /// Cache backed by a persistent store.
    ///
    /// The store's index is loaded wholesale; records matching one of the
    /// `live` capabilities become Compiled entries immediately, so a warm
    /// restart performs zero compiler invocations for known kernels.
    /// Records for other capabilities are left on disk untouched.
    pub fn with_store(compiler: Arc<dyn Compiler>, store: DiskStore, live: &[DeviceCapability]) -> Self {
        let entries = HashMap::new();
        {
            let guard = entries.guard();
            for stored in store.load(live) {
                let binary = Arc::new(CompiledBinary::new(stored.key, stored.image));
                let entry = Arc::new(CacheEntry::compiled(stored.key, &stored.entry, binary));
                entries.insert(stored.key, entry, &guard);
            }
        }

        let cache = Self { inner: Arc::new(CacheShared { entries, compiler, store: Some(store) }) };
        debug!(entries = cache.len(), "preloaded persistent kernel cache");
        cache
    }

    /// Entry for `key`, spawning a compile task when absent.
    ///
    /// Never blocks: concurrent callers with one missing key all observe the
    /// same Pending entry, and exactly one compile task is spawned for it.
    /// Present entries are returned regardless of state.
    pub fn obtain_or_compile(&self, key: CompileKey, source: &str, entry_name: &str) -> Arc<CacheEntry> {
        use papaya::{Compute, Operation};

        let entries = &self.inner.entries;
        let guard = entries.guard();

        // Fast path: entry exists in any state.
        if let Some(entry) = entries.get(&key, &guard) {
            return Arc::clone(entry);
        }

        // Build the Pending entry up front; only the winning inserter spawns
        // the compile task, so losing entries are dropped unstarted.
        let (promise, future) = future::channel();
        let pending = Arc::new(CacheEntry::pending(key, entry_name, future));

        match entries.compute(
            key,
            |existing| match existing {
                Some((_, entry)) => Operation::Abort(Arc::clone(entry)),
                None => Operation::Insert(Arc::clone(&pending)),
            },
            &guard,
        ) {
            Compute::Inserted(_, entry) => {
                let entry = Arc::clone(entry);
                AsyncCompiler::spawn(Arc::clone(&self.inner), Arc::clone(&entry), promise, source.to_string());
                entry
            }
            Compute::Aborted(entry) => entry,
            _ => pending,
        }
    }

    /// Entry for `key` without compiling on a miss.
    pub fn get(&self, key: CompileKey) -> Option<Arc<CacheEntry>> {
        let guard = self.inner.entries.guard();
        self.inner.entries.get(&key, &guard).map(Arc::clone)
    }

    pub fn contains(&self, key: CompileKey) -> bool {
        let guard = self.inner.entries.guard();
        self.inner.entries.contains_key(&key, &guard)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// React to teardown of an execution context: drop every module linked
    /// into it. Compiled binaries stay cached; only the context-local
    /// modules go.
    pub fn release_context(&self, id: ContextId) {
        let guard = self.inner.entries.guard();
        for (_, entry) in self.inner.entries.iter(&guard) {
            if entry.modules().release_context(id) {
                debug!(context = %id, key = %entry.key(), "released module for torn-down context");
            }
        }
    }
}
