//! Per-present frame driver.
//!
//! Once per intercepted present call the orchestrator walks the module order
//! and advances every module's lifecycle:
//!
//! ```text
//! Uninitialized ──bindings + on_init──▶ Active ──on_render, every frame──▶ …
//!       │                                  │
//!       └────────── error / panic ─────────┴──▶ Destroyed
//! ```
//!
//! User callbacks are always run under `catch_unwind`; a failing module is
//! removed after the loop and never takes the others down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, info, trace, warn};

use crate::compositor::Compositor;
use crate::context::UiContext;
use crate::message::WindowMessage;
use crate::module::Module;
use crate::registry::ModuleRegistry;

// ─── Bindings ────────────────────────────────────────────────────────────────

/// Window-side integration of a context (input translation, display size,
/// cursor).
pub trait PlatformBinding<C>: Send {
    fn init_context(&mut self, ctx: &mut C) -> anyhow::Result<()>;

    /// Feed time step, display size and cursor state before the UI frame.
    fn new_frame(&mut self, ctx: &mut C) -> anyhow::Result<()>;

    /// Forward one raw message into the context, honouring its capabilities.
    fn translate(&mut self, ctx: &mut C, msg: &WindowMessage);

    fn shutdown_context(&mut self, ctx: &mut C);
}

/// GPU objects shared by every context (render targets, samplers).
pub trait DeviceObjects {
    /// Release render targets before the swap chain is resized.
    fn invalidate_device_objects(&mut self);

    /// Rebuild what `invalidate_device_objects` released.
    fn create_device_objects(&mut self) -> anyhow::Result<()>;
}

/// Graphics-side integration of a context for the active backend.
pub trait GraphicsBinding<C>: DeviceObjects {
    fn init_context(&mut self, ctx: &mut C) -> anyhow::Result<()>;
    fn new_frame(&mut self, ctx: &mut C) -> anyhow::Result<()>;

    /// Draw the context's finished frame. Called back to front.
    fn submit(&mut self, ctx: &mut C) -> anyhow::Result<()>;

    fn shutdown_context(&mut self, ctx: &mut C);
}

// ─── FrameOrchestrator ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Ready,
    /// Resize in progress: render targets are released.
    Resizing,
    /// Recreating device objects failed; frames are skipped until a later
    /// resize succeeds.
    Lost,
}

/// What happened during one frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Modules that produced draw data, in submission (back-to-front) order.
    pub submitted: Vec<String>,
    pub destroyed: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FrameOrchestrator {
    compositor: Compositor,
    device:     DeviceState,
    frame:      u64,
}

impl FrameOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compositor(&self) -> &Compositor { &self.compositor }
    pub fn device_state(&self) -> DeviceState { self.device }
    pub fn frame_count(&self) -> u64 { self.frame }

    /// Run one overlay frame.
    pub fn frame<C, P, G>(
        &mut self,
        registry: &mut ModuleRegistry<C>,
        platform: &mut P,
        graphics: &mut G,
    ) -> FrameReport
    where
        C: UiContext,
        P: PlatformBinding<C> + ?Sized,
        G: GraphicsBinding<C> + ?Sized,
    {
        let mut report = FrameReport::default();
        if self.device != DeviceState::Ready {
            trace!(state = ?self.device, "skipping frame");
            // Nothing is drawn, so nothing may keep capturing input.
            self.compositor.reset();
            return report;
        }
        self.frame += 1;

        // Scheduled destructions from the message path or unregister.
        let doomed: Vec<String> =
            registry.iter().filter(|m| m.doomed).map(|m| m.id.clone()).collect();
        for id in doomed {
            destroy(registry, &id, platform, graphics);
            report.destroyed.push(id);
        }

        self.compositor.pre_pass(registry);

        let mut rendered = Vec::new();
        let mut failed = Vec::new();
        for (index, module) in registry.modules_mut().iter_mut().enumerate() {
            if !module.initialized {
                if let Err(e) = init_module(module, platform, graphics) {
                    error!("module `{}` failed to initialize: {e:#}", module.id);
                    failed.push(module.id.clone());
                    continue;
                }
                info!("module `{}` initialized", module.id);
            }
            match render_module(index, module, &self.compositor, platform, graphics) {
                Ok(()) => rendered.push(index),
                Err(e) => {
                    error!("module `{}` failed to render: {e:#}", module.id);
                    failed.push(module.id.clone());
                }
            }
        }

        let modules = registry.modules_mut();
        for &index in rendered.iter().rev() {
            let module = &mut modules[index];
            match graphics.submit(&mut module.context) {
                Ok(()) => report.submitted.push(module.id.clone()),
                Err(e) => {
                    warn!("module `{}`: draw submission failed: {e:#}", module.id);
                    failed.push(module.id.clone());
                }
            }
        }

        for id in failed {
            destroy(registry, &id, platform, graphics);
            report.destroyed.push(id);
        }

        self.compositor.post_pass(registry);
        report
    }

    /// Release render targets. Module contexts and callbacks are untouched.
    pub fn before_resize<G: DeviceObjects + ?Sized>(&mut self, graphics: &mut G) {
        graphics.invalidate_device_objects();
        if self.device == DeviceState::Ready {
            self.device = DeviceState::Resizing;
        }
    }

    /// Recreate render targets; on failure the renderer stays down.
    pub fn after_resize<G: DeviceObjects + ?Sized>(&mut self, graphics: &mut G) {
        match graphics.create_device_objects() {
            Ok(()) => {
                if self.device == DeviceState::Lost {
                    info!("device objects recreated, resuming");
                }
                self.device = DeviceState::Ready;
            }
            Err(e) => {
                error!("could not recreate device objects, overlay disabled: {e:#}");
                self.device = DeviceState::Lost;
            }
        }
    }
}

// ─── Lifecycle steps ─────────────────────────────────────────────────────────

fn init_module<C, P, G>(module: &mut Module<C>, platform: &mut P, graphics: &mut G) -> anyhow::Result<()>
where
    C: UiContext,
    P: PlatformBinding<C> + ?Sized,
    G: GraphicsBinding<C> + ?Sized,
{
    let context = &mut module.context;
    let callbacks = &mut module.callbacks;
    let bound = &mut module.bound;
    let outcome = catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<()> {
        platform.init_context(context)?;
        if let Err(e) = graphics.init_context(context) {
            platform.shutdown_context(context);
            return Err(e);
        }
        *bound = true;
        if let Some(on_init) = callbacks.on_init.as_mut() {
            on_init(context)?;
        }
        Ok(())
    }));
    match outcome {
        Ok(Ok(())) => {
            module.initialized = true;
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(anyhow::anyhow!("panicked during initialization")),
    }
}

fn render_module<C, P, G>(
    index: usize,
    module: &mut Module<C>,
    compositor: &Compositor,
    platform: &mut P,
    graphics: &mut G,
) -> anyhow::Result<()>
where
    C: UiContext,
    P: PlatformBinding<C> + ?Sized,
    G: GraphicsBinding<C> + ?Sized,
{
    let context = &mut module.context;
    let callbacks = &mut module.callbacks;
    let mut frame_open = false;
    let outcome = catch_unwind(AssertUnwindSafe(|| -> anyhow::Result<()> {
        platform.new_frame(context)?;
        graphics.new_frame(context)?;
        context.new_frame();
        frame_open = true;
        compositor.post_new_frame(index, context);
        if let Some(on_render) = callbacks.on_render.as_mut() {
            on_render(context)?;
        }
        context.render();
        frame_open = false;
        Ok(())
    }));

    let result = match outcome {
        Ok(r) => r,
        Err(_) => Err(anyhow::anyhow!("panicked during render")),
    };
    if result.is_err() && frame_open {
        // Keep the UI library's begin/end pairing intact.
        if catch_unwind(AssertUnwindSafe(|| context.end_frame())).is_err() {
            error!("module `{}`: closing the aborted frame panicked", module.id);
        }
    }
    result
}

fn destroy<C, P, G>(registry: &mut ModuleRegistry<C>, id: &str, platform: &mut P, graphics: &mut G)
where
    C: UiContext,
    P: PlatformBinding<C> + ?Sized,
    G: GraphicsBinding<C> + ?Sized,
{
    registry.destroy(id, |ctx| {
        graphics.shutdown_context(ctx);
        platform.shutdown_context(ctx);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::InputGate;
    use crate::module::ModuleCallbacks;
    use crate::testing::{FakeContext, FakeGraphics, FakePlatform};

    struct Rig {
        registry:     ModuleRegistry<FakeContext>,
        orchestrator: FrameOrchestrator,
        platform:     FakePlatform,
        graphics:     FakeGraphics,
    }

    impl Rig {
        fn new() -> Self {
            Self {
                registry:     ModuleRegistry::new(FakeContext::named),
                orchestrator: FrameOrchestrator::new(),
                platform:     FakePlatform::default(),
                graphics:     FakeGraphics::default(),
            }
        }

        fn add(&mut self, id: &str, callbacks: ModuleCallbacks<FakeContext>) {
            self.registry.register(id, callbacks).unwrap();
        }

        fn frame(&mut self) -> FrameReport {
            self.orchestrator.frame(&mut self.registry, &mut self.platform, &mut self.graphics)
        }

        fn ctx(&self, id: &str) -> &FakeContext {
            self.registry.get(id).unwrap().context()
        }
    }

    fn ok() -> ModuleCallbacks<FakeContext> {
        ModuleCallbacks::render(|_| Ok(()))
    }

    #[test]
    fn empty_frame_is_a_no_op() {
        let mut rig = Rig::new();
        assert_eq!(rig.frame(), FrameReport::default());
        assert_eq!(rig.orchestrator.frame_count(), 1);
    }

    #[test]
    fn init_and_first_render_share_a_frame() {
        let mut rig = Rig::new();
        let mut inits = 0;
        rig.add(
            "a",
            ok().on_init(move |ctx| {
                inits += 1;
                assert_eq!(inits, 1);
                assert!(ctx.bindings_live);
                Ok(())
            }),
        );
        rig.frame();
        rig.frame();
        assert!(rig.registry.get("a").unwrap().is_initialized());
        assert_eq!(rig.ctx("a").frames_drawn, 2);
        assert_eq!(rig.platform.inits, 1);
    }

    #[test]
    fn draw_data_is_submitted_back_to_front() {
        let mut rig = Rig::new();
        for id in ["top", "middle", "bottom"] {
            rig.add(id, ok());
        }
        let report = rig.frame();
        assert_eq!(report.submitted, ["bottom", "middle", "top"]);
    }

    #[test]
    fn failing_render_is_removed_and_its_frame_closed() {
        let mut rig = Rig::new();
        rig.add("good", ok());
        rig.add("bad", ModuleCallbacks::render(|_| anyhow::bail!("widget state corrupt")));
        rig.add("after", ok());

        let report = rig.frame();
        assert_eq!(report.destroyed, ["bad"]);
        assert_eq!(report.submitted, ["after", "good"]);
        assert!(!rig.registry.contains("bad"));
        assert_eq!(rig.graphics.shutdowns, 1);
        assert_eq!(rig.platform.shutdowns, 1);

        let report = rig.frame();
        assert!(report.destroyed.is_empty());
        assert_eq!(rig.ctx("after").frames_drawn, 2);
    }

    #[test]
    fn panicking_render_keeps_frames_balanced() {
        let mut rig = Rig::new();
        let balanced = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = balanced.clone();
        rig.add(
            "bad",
            ModuleCallbacks::render(|ctx: &mut FakeContext| {
                assert!(ctx.frame_open);
                panic!("index out of bounds")
            })
            .on_dispose(move |ctx| {
                flag.store(ctx.is_balanced() && ctx.frames_ended == 1, std::sync::atomic::Ordering::SeqCst);
            }),
        );
        rig.add("good", ok());

        let report = rig.frame();
        assert_eq!(report.destroyed, ["bad"]);
        assert!(balanced.load(std::sync::atomic::Ordering::SeqCst));
        assert!(rig.ctx("good").is_balanced());
    }

    #[test]
    fn init_failure_is_isolated() {
        let mut rig = Rig::new();
        rig.add("refused", ok().on_init(|_| anyhow::bail!("missing font")));
        rig.add("fine", ok());

        let report = rig.frame();
        assert_eq!(report.destroyed, ["refused"]);
        assert_eq!(report.submitted, ["fine"]);
        // Bindings were initialized before on_init failed, so they are released.
        assert_eq!(rig.graphics.shutdowns, 1);
        assert_eq!(rig.platform.shutdowns, 1);
    }

    #[test]
    fn graphics_init_failure_unwinds_platform_binding() {
        let mut rig = Rig::new();
        rig.add("a", ok());
        rig.registry.get_mut("a").unwrap().context_mut().fail_graphics = true;

        let report = rig.frame();
        assert_eq!(report.destroyed, ["a"]);
        assert_eq!(rig.platform.inits, 1);
        assert_eq!(rig.platform.shutdowns, 1);
        assert_eq!(rig.graphics.shutdowns, 0);
    }

    #[test]
    fn doomed_modules_go_before_the_frame() {
        let mut rig = Rig::new();
        rig.add("a", ok());
        rig.add("b", ok());
        rig.frame();
        rig.registry.get_mut("a").unwrap().doomed = true;

        let report = rig.frame();
        assert_eq!(report.destroyed, ["a"]);
        assert_eq!(report.submitted, ["b"]);
    }

    #[test]
    fn resize_skips_frames_until_recreated() {
        let mut rig = Rig::new();
        let renders = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let r = renders.clone();
        rig.add(
            "a",
            ModuleCallbacks::render(move |_| {
                r.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }),
        );
        rig.frame();

        rig.orchestrator.before_resize(&mut rig.graphics);
        assert_eq!(rig.graphics.invalidations, 1);
        assert!(rig.frame().submitted.is_empty());

        rig.graphics.fail_recreate = true;
        rig.orchestrator.after_resize(&mut rig.graphics);
        assert_eq!(rig.orchestrator.device_state(), DeviceState::Lost);
        assert!(rig.frame().submitted.is_empty());

        rig.graphics.fail_recreate = false;
        rig.orchestrator.before_resize(&mut rig.graphics);
        rig.orchestrator.after_resize(&mut rig.graphics);
        assert_eq!(rig.orchestrator.device_state(), DeviceState::Ready);
        assert_eq!(rig.frame().submitted, ["a"]);

        // The context survived every resize and was never re-initialized.
        assert_eq!(renders.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(rig.platform.inits, 1);
    }

    #[test]
    fn skipped_frames_release_input() {
        let mut rig = Rig::new();
        rig.add("a", ok());
        rig.registry.get_mut("a").unwrap().context_mut().want_mouse = true;
        rig.frame();
        assert!(rig.orchestrator.compositor().gate().capture_mouse);

        rig.orchestrator.before_resize(&mut rig.graphics);
        rig.graphics.fail_recreate = true;
        rig.orchestrator.after_resize(&mut rig.graphics);
        rig.frame();
        assert_eq!(rig.orchestrator.compositor().gate(), InputGate::default());
        assert_eq!(rig.orchestrator.compositor().mouse_owner(), None);
    }
}
