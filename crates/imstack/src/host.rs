//! Process-wide entry points for the host loader's plugin lifecycle.
//!
//! ```no_run
//! use imstack::prelude::*;
//!
//! imstack::init(OverlayConfig::default())?;
//! imstack::register("stats", ModuleCallbacks::render(|ctx: &mut ImguiContext| {
//!     if let Some(ui) = ctx.ui() {
//!         ui.window("Stats").build(|| ui.text("hello"));
//!     }
//!     Ok(())
//! }))?;
//! // ... on unload
//! imstack::dispose();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::sync::Arc;
use std::thread;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{error, info};

use imstack_core::{
    Backend, BackendError, BackendKind, BackendSelector, ModuleCallbacks, Overlay, OverlayConfig,
    RegisterError, Registration,
};
use imstack_dx11::{
    Dx11Backend, Dx11Overlay, HostWindow, ImguiContext, ImguiContextFactory, MinHookEngine,
    ProcessModules, Win32Platform,
};

#[derive(Default)]
struct Host {
    selector: BackendSelector,
    overlay:  Option<Arc<Dx11Overlay>>,
}

static HOST: Lazy<Mutex<Host>> = Lazy::new(|| Mutex::new(Host::default()));

/// Detect the host's graphics API and hook it. Only the first call does
/// anything; later calls fail with [`BackendError::AlreadySelected`].
pub fn init(config: OverlayConfig) -> Result<BackendKind, BackendError> {
    let mut host = HOST.lock();
    let window = HostWindow::default();
    let factory = ImguiContextFactory { dark_theme: config.default_theme };
    let overlay = Arc::new(Overlay::new(
        config,
        move |id: &str| factory.create(id),
        Win32Platform::new(window.clone()),
    ));

    let candidates: Vec<Box<dyn Backend>> = vec![Box::new(Dx11Backend::new(
        Arc::new(MinHookEngine::new()),
        overlay.clone(),
        window,
    ))];
    let kind = host.selector.select(candidates, &ProcessModules)?;
    host.overlay = Some(overlay);
    Ok(kind)
}

/// The running overlay, for visibility control and module inspection.
pub fn overlay() -> Option<Arc<Dx11Overlay>> {
    HOST.lock().overlay.clone()
}

pub fn register(
    id: impl Into<String>,
    callbacks: ModuleCallbacks<ImguiContext>,
) -> Result<Registration, RegisterError> {
    let overlay = overlay().ok_or(RegisterError::NotRunning)?;
    overlay.register(id, callbacks)
}

/// Schedule a module for destruction on the next frame.
pub fn unregister(id: &str) -> bool {
    overlay().is_some_and(|overlay| overlay.unregister(id))
}

/// Remove every hook, restore the window procedure and destroy every module.
///
/// Called from a module callback, the teardown moves to a helper thread: the
/// frame in flight holds the renderer until it returns.
pub fn dispose() {
    if overlay().is_some_and(|overlay| overlay.in_callback()) {
        info!("dispose requested from a module callback, finishing after the frame");
        if let Err(e) = thread::Builder::new().name("imstack-dispose".into()).spawn(dispose) {
            error!("could not start the teardown thread: {e}");
        }
        return;
    }
    let mut host = HOST.lock();
    host.selector.dispose();
    if host.overlay.take().is_some() {
        info!("imstack disposed");
    }
}
