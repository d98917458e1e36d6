use std::ffi::c_void;
use std::sync::Arc;

use tracing::{debug, info};

use imstack_core::{Backend, BackendKind, HookEngine, HookSet, Interceptor};

use crate::hooks::{self, PresentFn, ResizeBuffersFn, Runtime, Trampolines};
use crate::platform::HostWindow;
use crate::{wndproc, Dx11Overlay, MinHookEngine};

/// Direct3D 11 integration: hooks the DXGI swap chain and draws `overlay`
/// on every present.
pub struct Dx11Backend {
    engine:  Arc<MinHookEngine>,
    overlay: Arc<Dx11Overlay>,
    window:  HostWindow,
    hooks:   HookSet,
}

impl std::fmt::Debug for Dx11Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dx11Backend")
            .field("window", &self.window.hwnd())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Dx11Backend {
    /// `window` must be the handle the overlay's [`Win32Platform`](crate::Win32Platform)
    /// was built with; it is filled in on the first present.
    pub fn new(engine: Arc<MinHookEngine>, overlay: Arc<Dx11Overlay>, window: HostWindow) -> Self {
        Self { engine, overlay, window, hooks: HookSet::default() }
    }

    pub fn overlay(&self) -> &Arc<Dx11Overlay> {
        &self.overlay
    }
}

impl Backend for Dx11Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::D3D11
    }

    fn init(&mut self) -> anyhow::Result<()> {
        let targets = hooks::find_targets()?;
        self.engine.initialize()?;
        let engine: Arc<dyn HookEngine> = self.engine.clone();

        let present = unsafe {
            Interceptor::create(
                engine.clone(),
                "IDXGISwapChain::Present",
                targets.present,
                hooks::present_detour as *const c_void,
            )?
        };
        let resize_buffers = unsafe {
            Interceptor::create(
                engine,
                "IDXGISwapChain::ResizeBuffers",
                targets.resize_buffers,
                hooks::resize_buffers_detour as *const c_void,
            )?
        };
        let trampolines = unsafe {
            Trampolines {
                present:        present.original::<PresentFn>(),
                resize_buffers: resize_buffers.original::<ResizeBuffersFn>(),
            }
        };

        // The runtime must be reachable before the first detour can run.
        hooks::install(Runtime::new(self.overlay.clone(), self.window.clone()), trampolines);
        self.hooks.push(present);
        self.hooks.push(resize_buffers);
        self.hooks.enable_all()?;
        info!("d3d11 hooks enabled");
        Ok(())
    }

    fn dispose(&mut self) {
        // Stop new frames first; a frame already in flight finishes under the
        // renderer lock taken by `shutdown`.
        self.hooks.dispose_all();
        wndproc::uninstall();
        match hooks::uninstall() {
            Some(runtime) => runtime.shutdown(),
            None => self.overlay.dispose(None),
        }
        self.engine.uninitialize();
        debug!("d3d11 backend disposed");
    }
}
