//! Overlay modules: one UI context plus the callbacks that drive it.

use std::fmt;

use crate::context::UiContext;
use crate::message::WindowMessage;

pub type InitFn<C>    = Box<dyn FnMut(&mut C) -> anyhow::Result<()> + Send>;
pub type RenderFn<C>  = Box<dyn FnMut(&mut C) -> anyhow::Result<()> + Send>;
pub type DisposeFn<C> = Box<dyn FnOnce(&mut C) + Send>;
pub type MessageFn    = Box<dyn FnMut(&WindowMessage) -> bool + Send>;

// ─── ModuleCallbacks ─────────────────────────────────────────────────────────

/// User code attached to a module. Only `on_render` is mandatory.
pub struct ModuleCallbacks<C> {
    pub on_init:    Option<InitFn<C>>,
    pub on_render:  Option<RenderFn<C>>,
    pub on_dispose: Option<DisposeFn<C>>,
    /// Returns `true` when the module consumed the message.
    pub on_message: Option<MessageFn>,
}

impl<C> Default for ModuleCallbacks<C> {
    fn default() -> Self {
        Self { on_init: None, on_render: None, on_dispose: None, on_message: None }
    }
}

impl<C> ModuleCallbacks<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks with just a render function.
    pub fn render(f: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static) -> Self {
        Self::new().on_render(f)
    }

    pub fn on_init(mut self, f: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static) -> Self {
        self.on_init = Some(Box::new(f));
        self
    }

    pub fn on_render(mut self, f: impl FnMut(&mut C) -> anyhow::Result<()> + Send + 'static) -> Self {
        self.on_render = Some(Box::new(f));
        self
    }

    pub fn on_dispose(mut self, f: impl FnOnce(&mut C) + Send + 'static) -> Self {
        self.on_dispose = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl FnMut(&WindowMessage) -> bool + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }
}

impl<C> fmt::Debug for ModuleCallbacks<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCallbacks")
            .field("on_init", &self.on_init.is_some())
            .field("on_render", &self.on_render.is_some())
            .field("on_dispose", &self.on_dispose.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

// ─── Module ──────────────────────────────────────────────────────────────────

/// An independently registered overlay producer.
///
/// The context is allocated at registration and dropped exactly once, when
/// the module is destroyed.
pub struct Module<C: UiContext> {
    pub(crate) id:          String,
    pub(crate) context:     C,
    pub(crate) callbacks:   ModuleCallbacks<C>,
    /// `on_init` succeeded; the context is live.
    pub(crate) initialized: bool,
    /// Platform and graphics bindings hold per-context state.
    pub(crate) bound:       bool,
    /// Scheduled for destruction at the start of the next frame (failed
    /// message handler or explicit unregister).
    pub(crate) doomed:      bool,
}

impl<C: UiContext> Module<C> {
    pub(crate) fn new(id: String, context: C, callbacks: ModuleCallbacks<C>) -> Self {
        Self { id, context, callbacks, initialized: false, bound: false, doomed: false }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn is_initialized(&self) -> bool { self.initialized }
    pub fn context(&self) -> &C { &self.context }
    pub fn context_mut(&mut self) -> &mut C { &mut self.context }
}

impl<C: UiContext> fmt::Debug for Module<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("initialized", &self.initialized)
            .field("doomed", &self.doomed)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
