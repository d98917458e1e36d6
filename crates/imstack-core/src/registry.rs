//! The set of registered modules, kept in front-to-back order.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info, warn};

use crate::context::UiContext;
use crate::error::RegisterError;
use crate::module::{Module, ModuleCallbacks};

/// Creates the UI context of a newly registered module.
pub type ContextFactory<C> = Box<dyn FnMut(&str) -> C + Send>;

/// Outcome of a registration that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    /// A module with this id already exists; it was left unchanged.
    Duplicate,
    /// Requested from inside a module callback. Applied once the running
    /// frame ends; a duplicate id is dropped then.
    Deferred,
}

/// Exclusive owner of every module.
///
/// Index 0 of the order is the topmost module: it paints last and gets input
/// first. The order only changes through [`register`](Self::register),
/// [`destroy`](Self::destroy) and [`bring_to_front`](Self::bring_to_front).
pub struct ModuleRegistry<C: UiContext> {
    modules: Vec<Module<C>>,
    factory: ContextFactory<C>,
}

impl<C: UiContext> std::fmt::Debug for ModuleRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry").field("modules", &self.modules).finish()
    }
}

impl<C: UiContext> ModuleRegistry<C> {
    pub fn new(factory: impl FnMut(&str) -> C + Send + 'static) -> Self {
        Self { modules: Vec::new(), factory: Box::new(factory) }
    }

    /// Add a module behind every existing one.
    ///
    /// A missing render callback is refused with an error; a duplicate id is
    /// a warning and the second registration is ignored.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        callbacks: ModuleCallbacks<C>,
    ) -> Result<Registration, RegisterError> {
        let id = id.into();
        Self::check(&id, &callbacks)?;
        if self.contains(&id) {
            warn!("module `{id}` is already registered, ignoring");
            return Ok(Registration::Duplicate);
        }

        let context = (self.factory)(&id);
        info!("registered module `{id}`");
        self.modules.push(Module::new(id, context, callbacks));
        Ok(Registration::Added)
    }

    /// Refusals that do not depend on what is already registered.
    pub(crate) fn check(id: &str, callbacks: &ModuleCallbacks<C>) -> Result<(), RegisterError> {
        if id.is_empty() {
            error!("refusing to register a module with an empty id");
            return Err(RegisterError::EmptyId);
        }
        if callbacks.on_render.is_none() {
            error!("refusing to register module `{id}`: no render callback");
            return Err(RegisterError::MissingRender(id.to_string()));
        }
        Ok(())
    }

    pub fn len(&self) -> usize { self.modules.len() }
    pub fn is_empty(&self) -> bool { self.modules.is_empty() }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Module<C>> {
        self.modules.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Module<C>> {
        self.modules.iter_mut().find(|m| m.id == id)
    }

    /// Ids in front-to-back order.
    pub fn ids(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module<C>> {
        self.modules.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Module<C>> {
        self.modules.iter_mut()
    }

    pub(crate) fn modules_mut(&mut self) -> &mut [Module<C>] {
        &mut self.modules
    }

    /// Move the module at `index` to the top. Returns `false` if it already is.
    pub fn bring_to_front(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.modules.len() {
            return false;
        }
        let module = self.modules.remove(index);
        self.modules.insert(0, module);
        true
    }

    /// Remove a module and release its context.
    ///
    /// Callbacks are detached before `on_dispose` runs so nothing can re-enter
    /// them. `teardown` receives the context when backend bindings were
    /// initialized for it, so they can release per-context state.
    pub fn destroy(&mut self, id: &str, teardown: impl FnOnce(&mut C)) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let mut module = self.modules.remove(pos);
        let callbacks = std::mem::take(&mut module.callbacks);

        if let Some(on_dispose) = callbacks.on_dispose {
            let context = &mut module.context;
            if catch_unwind(AssertUnwindSafe(|| on_dispose(context))).is_err() {
                error!("module `{id}`: dispose callback panicked");
            }
        }
        if module.bound {
            teardown(&mut module.context);
        }
        info!("destroyed module `{id}`");
        true
    }

    /// Destroy every module, front to back.
    pub fn destroy_all(&mut self, mut teardown: impl FnMut(&mut C)) {
        while let Some(id) = self.modules.first().map(|m| m.id.clone()) {
            self.destroy(&id, &mut teardown);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::testing::FakeContext;

    fn registry() -> ModuleRegistry<FakeContext> {
        ModuleRegistry::new(|_| FakeContext::default())
    }

    fn noop() -> ModuleCallbacks<FakeContext> {
        ModuleCallbacks::render(|_| Ok(()))
    }

    #[test]
    fn render_callback_is_mandatory() {
        let mut reg = registry();
        let err = reg.register("x", ModuleCallbacks::new().on_init(|_| Ok(()))).unwrap_err();
        assert_eq!(err, RegisterError::MissingRender("x".into()));
        assert!(reg.is_empty());
        assert_eq!(reg.register("", noop()), Err(RegisterError::EmptyId));
    }

    #[test]
    fn duplicate_id_is_ignored() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        let mut reg = ModuleRegistry::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            FakeContext::default()
        });
        assert_eq!(reg.register("x", noop()).unwrap(), Registration::Added);
        let second = ModuleCallbacks::render(|_| anyhow::bail!("should never run"));
        assert_eq!(reg.register("x", second).unwrap(), Registration::Duplicate);
        assert_eq!(reg.len(), 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);

        assert_eq!(reg.register("y", noop()).unwrap(), Registration::Added);
        assert_eq!(reg.ids(), ["x", "y"]);
    }

    #[test]
    fn bring_to_front_reorders() {
        let mut reg = registry();
        for id in ["a", "b", "c"] {
            reg.register(id, noop()).unwrap();
        }
        assert!(reg.bring_to_front(2));
        assert_eq!(reg.ids(), ["c", "a", "b"]);
        assert!(!reg.bring_to_front(0));
        assert!(!reg.bring_to_front(7));
    }

    #[test]
    fn destroy_runs_dispose_once_and_tears_down_live_contexts() {
        let mut reg = registry();
        let disposed = Arc::new(AtomicUsize::new(0));
        let d = disposed.clone();
        reg.register(
            "live",
            noop().on_dispose(move |_| {
                d.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        reg.register("cold", noop()).unwrap();
        reg.get_mut("live").unwrap().bound = true;

        let mut torn_down = 0;
        assert!(reg.destroy("live", |_| torn_down += 1));
        assert!(!reg.destroy("live", |_| torn_down += 1));
        assert!(reg.destroy("cold", |_| torn_down += 1));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(torn_down, 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn panicking_dispose_is_contained() {
        let mut reg = registry();
        reg.register("x", noop().on_dispose(|_| panic!("boom"))).unwrap();
        reg.register("y", noop()).unwrap();
        reg.destroy_all(|_| {});
        assert!(reg.is_empty());
    }
}
