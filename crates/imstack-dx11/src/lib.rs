//! # imstack-dx11
//!
//! Direct3D 11 backend for **imstack**.
//! Hooks `IDXGISwapChain::Present` and `ResizeBuffers` through MinHook,
//! subclasses the host window procedure for input, and gives every overlay
//! module its own Dear ImGui context drawn by a small D3D11 renderer.

#![cfg(windows)]

/// Re-exported so module authors draw with the same imgui version the
/// backend links.
pub use imgui;

mod backend;
mod context;
mod dummy;
mod hooks;
mod minhook;
mod platform;
mod probe;
mod renderer;
mod wndproc;

pub use backend::Dx11Backend;
pub use context::{ImguiContext, ImguiContextFactory};
pub use minhook::MinHookEngine;
pub use platform::{HostWindow, Win32Platform};
pub use probe::ProcessModules;
pub use renderer::D3D11Renderer;

/// The overlay type driven by this backend.
pub type Dx11Overlay = imstack_core::Overlay<ImguiContext>;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Dx11Error {
    #[error("Direct3D call failed: {0}")]
    Windows(#[from] windows::core::Error),
    #[error("{0} returned no object")]
    Missing(&'static str),
    #[error("shader compilation failed: {0}")]
    Shader(String),
    #[error("another imgui context is active on this thread")]
    ContextBusy,
    #[error(transparent)]
    Hook(#[from] imstack_core::HookError),
}
