//! The overlay context object shared by the present hook and the
//! window-procedure hook.
//!
//! Those two hooks usually run on different host threads. Registry, compositor
//! and platform binding live behind one mutex:
//!
//! - the render thread takes it for the whole frame;
//! - the window procedure only `try_lock`s it. When the frame holds the lock
//!   the message is parked in a bounded queue and translated at the start of
//!   the next frame, so the message pump never waits on user render code.
//!
//! Module callbacks run with the lock held. Calls they make back into the
//! overlay (register, unregister, dispose) are recognised by thread and
//! queued until the frame or message dispatch is over instead of locking
//! again.
//!
//! The swallow decision itself only reads the [`InputGate`] published at the
//! end of each pre-pass, which is kept in atomics.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::compositor::InputGate;
use crate::config::OverlayConfig;
use crate::context::UiContext;
use crate::error::RegisterError;
use crate::message::{capture_decision, Dispatch, WindowMessage};
use crate::module::{Module, ModuleCallbacks};
use crate::orchestrator::{
    DeviceObjects, DeviceState, FrameOrchestrator, FrameReport, GraphicsBinding, PlatformBinding,
};
use crate::registry::{ModuleRegistry, Registration};

struct OverlayState<C: UiContext> {
    registry:     ModuleRegistry<C>,
    orchestrator: FrameOrchestrator,
    platform:     Box<dyn PlatformBinding<C>>,
    was_visible:  bool,
}

/// Registry changes requested from inside a module callback.
enum PendingOp<C: UiContext> {
    Register(String, ModuleCallbacks<C>),
    Unregister(String),
}

/// The state guard, tagged with the thread that holds it.
struct Held<'a, C: UiContext> {
    state:  MutexGuard<'a, OverlayState<C>>,
    holder: &'a Mutex<Option<ThreadId>>,
}

impl<C: UiContext> Deref for Held<'_, C> {
    type Target = OverlayState<C>;
    fn deref(&self) -> &Self::Target { &self.state }
}

impl<C: UiContext> DerefMut for Held<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.state }
}

impl<C: UiContext> Drop for Held<'_, C> {
    fn drop(&mut self) {
        *self.holder.lock() = None;
    }
}

/// Everything the overlay needs, owned in one place.
pub struct Overlay<C: UiContext> {
    config:            OverlayConfig,
    state:             Mutex<OverlayState<C>>,
    holder:            Mutex<Option<ThreadId>>,
    pending:           Mutex<VecDeque<WindowMessage>>,
    ops:               Mutex<VecDeque<PendingOp<C>>>,
    dispose_requested: AtomicBool,
    visible:           AtomicBool,
    capture_mouse:     AtomicBool,
    capture_keyboard:  AtomicBool,
}

impl<C: UiContext> std::fmt::Debug for Overlay<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("config", &self.config)
            .field("visible", &self.is_visible())
            .field("gate", &self.gate())
            .finish_non_exhaustive()
    }
}

impl<C: UiContext> Overlay<C> {
    pub fn new(
        config: OverlayConfig,
        factory: impl FnMut(&str) -> C + Send + 'static,
        platform: impl PlatformBinding<C> + 'static,
    ) -> Self {
        let visible = config.start_visible;
        Self {
            state: Mutex::new(OverlayState {
                registry:     ModuleRegistry::new(factory),
                orchestrator: FrameOrchestrator::new(),
                platform:     Box::new(platform),
                was_visible:  visible,
            }),
            holder:            Mutex::new(None),
            pending:           Mutex::new(VecDeque::new()),
            ops:               Mutex::new(VecDeque::new()),
            dispose_requested: AtomicBool::new(false),
            visible:           AtomicBool::new(visible),
            capture_mouse:     AtomicBool::new(false),
            capture_keyboard:  AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &OverlayConfig { &self.config }

    fn hold<'a>(&'a self, state: MutexGuard<'a, OverlayState<C>>) -> Held<'a, C> {
        *self.holder.lock() = Some(thread::current().id());
        Held { state, holder: &self.holder }
    }

    fn lock(&self) -> Held<'_, C> {
        self.hold(self.state.lock())
    }

    fn try_lock(&self) -> Option<Held<'_, C>> {
        self.state.try_lock().map(|state| self.hold(state))
    }

    /// Whether the calling thread is inside a frame or a message dispatch of
    /// this overlay, i.e. running a module callback.
    pub fn in_callback(&self) -> bool {
        *self.holder.lock() == Some(thread::current().id())
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Add a module behind every existing one.
    ///
    /// From inside a module callback the module is added once the running
    /// frame ends and this returns [`Registration::Deferred`].
    pub fn register(
        &self,
        id: impl Into<String>,
        callbacks: ModuleCallbacks<C>,
    ) -> Result<Registration, RegisterError> {
        let id = id.into();
        if self.in_callback() {
            ModuleRegistry::check(&id, &callbacks)?;
            debug!("module `{id}`: registration deferred to the next frame");
            self.ops.lock().push_back(PendingOp::Register(id, callbacks));
            return Ok(Registration::Deferred);
        }
        self.lock().registry.register(id, callbacks)
    }

    /// Schedule a module for destruction at the start of the next frame.
    ///
    /// From inside a module callback the id cannot be looked up, so this
    /// returns `true` and an unknown id is ignored later.
    pub fn unregister(&self, id: &str) -> bool {
        if self.in_callback() {
            self.ops.lock().push_back(PendingOp::Unregister(id.to_string()));
            return true;
        }
        doom(&mut self.lock(), id)
    }

    /// Ids in front-to-back order. Empty when called from a module callback.
    pub fn module_ids(&self) -> Vec<String> {
        if self.in_callback() {
            return Vec::new();
        }
        self.lock().registry.ids()
    }

    /// Run `f` on a module while holding the overlay lock. `None` when the
    /// module does not exist or when called from a module callback.
    pub fn with_module<R>(&self, id: &str, f: impl FnOnce(&mut Module<C>) -> R) -> Option<R> {
        if self.in_callback() {
            return None;
        }
        self.lock().registry.get_mut(id).map(f)
    }

    fn apply_ops(&self, state: &mut OverlayState<C>) {
        let ops: Vec<PendingOp<C>> = self.ops.lock().drain(..).collect();
        for op in ops {
            match op {
                PendingOp::Register(id, callbacks) => {
                    if let Err(e) = state.registry.register(id, callbacks) {
                        warn!("deferred registration refused: {e}");
                    }
                }
                PendingOp::Unregister(id) => {
                    if !doom(state, &id) {
                        debug!("deferred unregister of unknown module `{id}`");
                    }
                }
            }
        }
    }

    // ─── Visibility ──────────────────────────────────────────────────────────

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn set_visible(&self, visible: bool) {
        if self.visible.swap(visible, Ordering::AcqRel) != visible {
            info!("overlay {}", if visible { "shown" } else { "hidden" });
        }
        if !visible {
            self.publish(InputGate::default());
        }
    }

    pub fn toggle(&self) {
        self.set_visible(!self.is_visible());
    }

    pub fn gate(&self) -> InputGate {
        InputGate {
            capture_mouse:    self.capture_mouse.load(Ordering::Acquire),
            capture_keyboard: self.capture_keyboard.load(Ordering::Acquire),
        }
    }

    fn publish(&self, gate: InputGate) {
        self.capture_mouse.store(gate.capture_mouse, Ordering::Release);
        self.capture_keyboard.store(gate.capture_keyboard, Ordering::Release);
    }

    // ─── Window procedure path ───────────────────────────────────────────────

    /// Route one host window message. The caller forwards it to the original
    /// window procedure unless this returns [`Dispatch::Consume`].
    pub fn handle_message(&self, msg: &WindowMessage) -> Dispatch {
        if msg.is_key_press(self.config.toggle_key) {
            self.toggle();
            return Dispatch::Consume;
        }
        if !self.is_visible() {
            return Dispatch::PassThrough;
        }

        let consumed = match self.try_lock() {
            Some(mut state) => {
                let state = &mut *state;
                self.drain_pending(state);
                deliver(state, msg)
            }
            None => {
                self.park(*msg);
                false
            }
        };
        if consumed {
            return Dispatch::Consume;
        }
        let gate = self.gate();
        capture_decision(msg, gate.capture_mouse, gate.capture_keyboard, self.config.pass_button_up)
    }

    fn park(&self, msg: WindowMessage) {
        let mut pending = self.pending.lock();
        if pending.len() >= self.config.max_pending_messages {
            warn!("pending message queue full, dropping oldest");
            pending.pop_front();
        }
        pending.push_back(msg);
    }

    fn drain_pending(&self, state: &mut OverlayState<C>) {
        let parked: Vec<WindowMessage> = self.pending.lock().drain(..).collect();
        for msg in &parked {
            deliver(state, msg);
        }
    }

    // ─── Render thread path ──────────────────────────────────────────────────

    /// Run one overlay frame. Called from the present hook.
    pub fn render_frame<G>(&self, graphics: &mut G) -> FrameReport
    where
        G: GraphicsBinding<C> + ?Sized,
    {
        let mut held = self.lock();
        let state = &mut *held;
        if self.take_dispose(state, graphics) {
            return FrameReport::default();
        }
        self.apply_ops(state);
        self.drain_pending(state);

        if !self.is_visible() {
            if state.was_visible {
                // Nothing may stay pressed while the modules cannot see releases.
                for module in state.registry.iter_mut() {
                    module.context.clear_key_state();
                }
                state.was_visible = false;
            }
            self.publish(InputGate::default());
            return FrameReport::default();
        }
        state.was_visible = true;

        let report = state.orchestrator.frame(&mut state.registry, state.platform.as_mut(), graphics);
        self.publish(state.orchestrator.compositor().gate());
        if !self.take_dispose(state, graphics) {
            self.apply_ops(state);
        }
        report
    }

    pub fn before_resize<G: DeviceObjects + ?Sized>(&self, graphics: &mut G) {
        self.lock().orchestrator.before_resize(graphics);
    }

    pub fn after_resize<G: DeviceObjects + ?Sized>(&self, graphics: &mut G) {
        let mut state = self.lock();
        state.orchestrator.after_resize(graphics);
        if state.orchestrator.device_state() != DeviceState::Ready {
            self.publish(InputGate::default());
        }
    }

    /// Destroy every module. With `graphics`, per-context GPU state is
    /// released as well.
    ///
    /// From inside a module callback the teardown runs on the render thread
    /// once the current frame is over.
    pub fn dispose(&self, mut graphics: Option<&mut dyn GraphicsBinding<C>>) {
        if self.in_callback() {
            debug!("overlay dispose deferred to the end of the frame");
            self.dispose_requested.store(true, Ordering::Release);
            return;
        }
        let mut state = self.lock();
        self.dispose_locked(&mut state, |ctx| {
            if let Some(graphics) = graphics.as_deref_mut() {
                graphics.shutdown_context(ctx);
            }
        });
    }

    fn take_dispose<G>(&self, state: &mut OverlayState<C>, graphics: &mut G) -> bool
    where
        G: GraphicsBinding<C> + ?Sized,
    {
        if !self.dispose_requested.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.dispose_locked(state, |ctx| graphics.shutdown_context(ctx));
        true
    }

    fn dispose_locked(&self, state: &mut OverlayState<C>, mut release_gpu: impl FnMut(&mut C)) {
        let OverlayState { registry, platform, .. } = state;
        registry.destroy_all(|ctx| {
            release_gpu(ctx);
            platform.shutdown_context(ctx);
        });
        self.ops.lock().clear();
        self.pending.lock().clear();
        self.dispose_requested.store(false, Ordering::Release);
        self.publish(InputGate::default());
        info!("overlay disposed");
    }
}

fn doom<C: UiContext>(state: &mut OverlayState<C>, id: &str) -> bool {
    match state.registry.get_mut(id) {
        Some(module) => {
            module.doomed = true;
            true
        }
        None => false,
    }
}

/// Translate `msg` into every module, then ask each custom handler.
/// Returns whether any handler consumed it.
fn deliver<C: UiContext>(state: &mut OverlayState<C>, msg: &WindowMessage) -> bool {
    let mut consumed = false;
    for module in state.registry.iter_mut() {
        if module.doomed {
            continue;
        }
        state.platform.translate(&mut module.context, msg);
        let Some(handler) = module.callbacks.on_message.as_mut() else {
            continue;
        };
        match catch_unwind(AssertUnwindSafe(|| handler(msg))) {
            Ok(true) => consumed = true,
            Ok(false) => {}
            Err(_) => {
                error!("module `{}`: message handler panicked, scheduling removal", module.id);
                module.doomed = true;
            }
        }
    }
    consumed
}
