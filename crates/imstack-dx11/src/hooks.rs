//! `IDXGISwapChain::Present` and `ResizeBuffers` detours.
//!
//! Detours are plain function pointers, so what they need is reachable
//! through two statics: the trampolines, and the [`Runtime`] installed by
//! [`Dx11Backend`](crate::Dx11Backend) for as long as it is active.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};
use windows::core::{Interface, HRESULT};
use windows::Win32::Foundation::{BOOL, E_FAIL};
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_NULL, D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_11_0};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDeviceAndSwapChain, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_FLAG,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_MODE_SCALING_UNSPECIFIED,
    DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    IDXGISwapChain, DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_EFFECT_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use imstack_core::GraphicsBinding;

use crate::dummy::DummyHwnd;
use crate::platform::HostWindow;
use crate::renderer::D3D11Renderer;
use crate::{wndproc, Dx11Error, Dx11Overlay};

/// `DXGI_PRESENT_TEST`: the host only asks whether presenting would succeed.
const DXGI_PRESENT_TEST: u32 = 0x1;

pub(crate) type PresentFn = unsafe extern "system" fn(*mut c_void, u32, u32) -> HRESULT;
pub(crate) type ResizeBuffersFn =
    unsafe extern "system" fn(*mut c_void, u32, u32, u32, DXGI_FORMAT, u32) -> HRESULT;

pub(crate) struct Trampolines {
    pub(crate) present:        PresentFn,
    pub(crate) resize_buffers: ResizeBuffersFn,
}

static TRAMPOLINES: OnceLock<Trampolines> = OnceLock::new();
static RUNTIME: RwLock<Option<Arc<Runtime>>> = parking_lot::const_rwlock(None);

// ─── Runtime ─────────────────────────────────────────────────────────────────

enum RendererSlot {
    /// Waiting for the first `Present` to reveal the device.
    Pending,
    Ready(D3D11Renderer),
    /// Setup failed once; the overlay stays off.
    Failed,
}

/// State shared by the detours and the window procedure.
pub(crate) struct Runtime {
    pub(crate) overlay: Arc<Dx11Overlay>,
    window:             HostWindow,
    renderer:           Mutex<RendererSlot>,
}

impl Runtime {
    pub(crate) fn new(overlay: Arc<Dx11Overlay>, window: HostWindow) -> Self {
        Self { overlay, window, renderer: Mutex::new(RendererSlot::Pending) }
    }

    /// Destroy every module while the renderer can still release its
    /// per-context resources.
    pub(crate) fn shutdown(&self) {
        let mut slot = self.renderer.lock();
        match &mut *slot {
            RendererSlot::Ready(renderer) => self.overlay.dispose(Some(renderer as &mut dyn GraphicsBinding<_>)),
            _ => self.overlay.dispose(None),
        }
        *slot = RendererSlot::Failed;
    }
}

pub(crate) fn runtime() -> Option<Arc<Runtime>> {
    RUNTIME.read().clone()
}

/// Publish the runtime and the trampolines. Trampolines are set once per
/// process; MinHook hands out the same ones for the same targets.
pub(crate) fn install(runtime: Runtime, trampolines: Trampolines) {
    if TRAMPOLINES.set(trampolines).is_err() {
        debug!("trampolines already recorded");
    }
    *RUNTIME.write() = Some(Arc::new(runtime));
}

pub(crate) fn uninstall() -> Option<Arc<Runtime>> {
    RUNTIME.write().take()
}

// ─── Target discovery ────────────────────────────────────────────────────────

pub(crate) struct Targets {
    pub(crate) present:        *const c_void,
    pub(crate) resize_buffers: *const c_void,
}

/// Read the swap chain vtable of a throwaway null-driver device.
pub(crate) fn find_targets() -> Result<Targets, Dx11Error> {
    let dummy = DummyHwnd::new()?;
    let mut swap_chain: Option<IDXGISwapChain> = None;
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    unsafe {
        D3D11CreateDeviceAndSwapChain(
            None,
            D3D_DRIVER_TYPE_NULL,
            None,
            D3D11_CREATE_DEVICE_FLAG(0),
            Some(&[D3D_FEATURE_LEVEL_10_0, D3D_FEATURE_LEVEL_11_0]),
            D3D11_SDK_VERSION,
            Some(&DXGI_SWAP_CHAIN_DESC {
                BufferDesc: DXGI_MODE_DESC {
                    Format: DXGI_FORMAT_R8G8B8A8_UNORM,
                    ScanlineOrdering: DXGI_MODE_SCANLINE_ORDER_UNSPECIFIED,
                    Scaling: DXGI_MODE_SCALING_UNSPECIFIED,
                    ..Default::default()
                },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: 1,
                OutputWindow: dummy.hwnd(),
                Windowed: BOOL(1),
                SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, ..Default::default() },
                ..Default::default()
            }),
            Some(&mut swap_chain),
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }
    let swap_chain = swap_chain.ok_or(Dx11Error::Missing("D3D11CreateDeviceAndSwapChain"))?;
    let vtable = swap_chain.vtable();
    let targets = Targets {
        present:        vtable.Present as *const c_void,
        resize_buffers: vtable.ResizeBuffers as *const c_void,
    };
    trace!(
        "IDXGISwapChain::Present = {:p}, ResizeBuffers = {:p}",
        targets.present,
        targets.resize_buffers
    );
    Ok(targets)
}

// ─── Detours ─────────────────────────────────────────────────────────────────

fn on_present(swap_chain: &IDXGISwapChain) {
    let Some(runtime) = runtime() else {
        return;
    };
    let mut slot = runtime.renderer.lock();
    if let RendererSlot::Pending = *slot {
        *slot = match unsafe { D3D11Renderer::new(swap_chain) } {
            Ok(renderer) => {
                runtime.window.set(renderer.window());
                if let Err(e) = unsafe { wndproc::install(renderer.window()) } {
                    warn!("could not hook the window procedure, overlay gets no input: {e}");
                }
                info!("overlay attached to window {:?}", renderer.window());
                RendererSlot::Ready(renderer)
            }
            Err(e) => {
                error!("could not set up the d3d11 renderer, overlay disabled: {e}");
                RendererSlot::Failed
            }
        };
    }
    let RendererSlot::Ready(renderer) = &mut *slot else {
        return;
    };
    if !renderer.adopt(swap_chain) {
        return;
    }
    if let Err(e) = renderer.begin() {
        debug!("skipping overlay frame: {e}");
        return;
    }
    let report = runtime.overlay.render_frame(renderer);
    renderer.end();
    if !report.destroyed.is_empty() {
        warn!("modules removed this frame: {:?}", report.destroyed);
    }
}

pub(crate) unsafe extern "system" fn present_detour(this: *mut c_void, sync_interval: u32, flags: u32) -> HRESULT {
    if flags & DXGI_PRESENT_TEST == 0 {
        if let Some(swap_chain) = IDXGISwapChain::from_raw_borrowed(&this) {
            if catch_unwind(AssertUnwindSafe(|| on_present(swap_chain))).is_err() {
                error!("present hook panicked");
            }
        }
    }
    match TRAMPOLINES.get() {
        Some(trampolines) => (trampolines.present)(this, sync_interval, flags),
        None => E_FAIL,
    }
}

/// Run `f` with the renderer if it draws on the swap chain `this`.
fn with_renderer(this: *mut c_void, f: impl FnOnce(&Dx11Overlay, &mut D3D11Renderer)) {
    let Some(runtime) = runtime() else {
        return;
    };
    let mut slot = runtime.renderer.lock();
    if let RendererSlot::Ready(renderer) = &mut *slot {
        if renderer.presents_to(this) {
            f(&runtime.overlay, renderer);
        }
    }
}

pub(crate) unsafe extern "system" fn resize_buffers_detour(
    this: *mut c_void,
    buffer_count: u32,
    width: u32,
    height: u32,
    format: DXGI_FORMAT,
    flags: u32,
) -> HRESULT {
    trace!("IDXGISwapChain::ResizeBuffers({width}x{height})");
    let before = catch_unwind(AssertUnwindSafe(|| {
        with_renderer(this, |overlay, renderer| overlay.before_resize(renderer))
    }));
    if before.is_err() {
        error!("resize hook panicked before resizing");
    }

    let result = match TRAMPOLINES.get() {
        Some(trampolines) => (trampolines.resize_buffers)(this, buffer_count, width, height, format, flags),
        None => E_FAIL,
    };

    let after = catch_unwind(AssertUnwindSafe(|| {
        with_renderer(this, |overlay, renderer| overlay.after_resize(renderer))
    }));
    if after.is_err() {
        error!("resize hook panicked after resizing");
    }
    result
}
