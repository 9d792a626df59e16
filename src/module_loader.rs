//! Module loader (SPEC_FULL.md §4.5): resolves `use` statements to a
//! canonicalized file path, compiles and runs each module exactly once, and
//! caches the resulting namespace frame keyed by that path.
//!
//! Grounded in the teacher's script-sourcing cache in `interpreter/source.rs`
//! (`Arc<Mutex<HashMap<PathBuf, ...>>>`, looked up before falling back to
//! disk), generalized with an in-progress sentinel so a `use` cycle fails
//! with a `CompileError` instead of deadlocking or recursing forever.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::exception::{Cause, EvalResult, Exception};
use crate::scope::Frame;

enum CacheEntry {
    InProgress,
    Ready(Arc<Frame>),
}

/// Shared across every `EvalCtx` created while running one top-level script,
/// so that two `use`s of the same module (even from different closures)
/// observe the same namespace instance.
pub struct ModuleCache {
    entries: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl ModuleCache {
    pub fn new() -> Arc<Self> {
        Arc::new(ModuleCache {
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve `spec` (the `use` statement's module path, e.g. `a/b`) against
    /// `from_dir`, canonicalize it, and run `compile_and_run` to produce its
    /// namespace the first time it's seen. `compile_and_run` is handed the
    /// resolved path and must return the module's root frame after executing
    /// its top-level chunk against it.
    pub fn load(
        &self,
        spec: &str,
        from_dir: &Path,
        compile_and_run: impl FnOnce(&Path) -> EvalResult<Arc<Frame>>,
    ) -> EvalResult<Arc<Frame>> {
        let candidate = from_dir.join(format!("{spec}.rvl"));
        let path = candidate.canonicalize().map_err(|_| {
            Exception::new(Cause::CompileError(format!(
                "module not found: {spec}"
            )))
        })?;

        {
            let mut entries = self.entries.lock().unwrap();
            match entries.get(&path) {
                Some(CacheEntry::Ready(ns)) => return Ok(Arc::clone(ns)),
                Some(CacheEntry::InProgress) => {
                    return Err(Exception::new(Cause::CompileError(format!(
                        "import cycle detected at module: {spec}"
                    ))));
                }
                None => {
                    entries.insert(path.clone(), CacheEntry::InProgress);
                }
            }
        }

        let result = compile_and_run(&path);

        let mut entries = self.entries.lock().unwrap();
        match &result {
            Ok(ns) => {
                entries.insert(path, CacheEntry::Ready(Arc::clone(ns)));
            }
            Err(_) => {
                entries.remove(&path);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn loads_each_module_exactly_once() {
        let cache = ModuleCache::new();
        let dir = std::env::temp_dir();
        let path = dir.join("rivulet_test_module.rvl");
        std::fs::write(&path, "").unwrap();

        let calls = Cell::new(0);
        let run = |_p: &Path| {
            calls.set(calls.get() + 1);
            Ok(Frame::root())
        };

        let a = cache.load("rivulet_test_module", &dir, run).unwrap();
        let b = cache.load("rivulet_test_module", &dir, run).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.get(), 1);

        std::fs::remove_file(&path).ok();
    }
}
