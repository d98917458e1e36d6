//! # imstack-core
//!
//! Stacks several independent immediate-mode UI modules into one in-game
//! overlay. Each module owns its own UI context; the core decides every frame
//! who gets the mouse, the keyboard, the cursor shape and drag-and-drop
//! payloads, drives the per-module lifecycle and isolates failures.
//!
//! Nothing here touches a graphics API. Pair it with a backend crate:
//! - `imstack-dx11`  (Direct3D 11 present hook, Dear ImGui contexts)

pub mod backend;
pub mod compositor;
pub mod config;
pub mod context;
pub mod error;
pub mod hook;
pub mod message;
pub mod module;
pub mod orchestrator;
pub mod overlay;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

// ─── re-exports ──────────────────────────────────────────────────────────────
pub use backend::{Backend, BackendKind, BackendSelector, LoadedModules, ModuleProbe};
pub use compositor::{Compositor, InputGate};
pub use config::OverlayConfig;
pub use context::{Capabilities, CursorShape, DragDropPayload, UiContext};
pub use error::{BackendError, ConfigError, HookError, RegisterError};
pub use hook::{HookEngine, HookSet, HookState, Interceptor};
pub use message::{capture_decision, Dispatch, MessageClass, WindowMessage};
pub use module::{Module, ModuleCallbacks};
pub use orchestrator::{
    DeviceObjects, DeviceState, FrameOrchestrator, FrameReport, GraphicsBinding, PlatformBinding,
};
pub use overlay::Overlay;
pub use registry::{ModuleRegistry, Registration};

// ─── Prelude ─────────────────────────────────────────────────────────────────
pub mod prelude {
    pub use super::{
        Capabilities, CursorShape, Dispatch, DragDropPayload, ModuleCallbacks, Overlay,
        OverlayConfig, Registration, UiContext, WindowMessage,
    };
}
