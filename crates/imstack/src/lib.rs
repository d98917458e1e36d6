//! # imstack
//!
//! Stack independent Dear ImGui overlays on top of a host application's
//! frames. Umbrella crate: re-exports the core and the graphics backends, and
//! carries the entry points a host loader calls from its plugin lifecycle.
//!
//! ## Feature flags
//!
//! | Flag   | Backend                               |
//! |--------|---------------------------------------|
//! | `dx11` | Direct3D 11 present hook (default)    |

// ─── Core re-exports ─────────────────────────────────────────────────────────

pub use imstack_core::*;
pub use imstack_core as core;

pub mod logging;

// ─── Backends ────────────────────────────────────────────────────────────────

#[cfg(all(feature = "dx11", windows))]
pub mod dx11 {
    //! Direct3D 11 backend.
    pub use imstack_dx11::*;
}

#[cfg(all(feature = "dx11", windows))]
mod host;

#[cfg(all(feature = "dx11", windows))]
pub use host::{dispose, init, overlay, register, unregister};

// ─── Prelude ─────────────────────────────────────────────────────────────────

pub mod prelude {
    pub use imstack_core::prelude::*;

    #[cfg(all(feature = "dx11", windows))]
    pub use imstack_dx11::{imgui, ImguiContext};
}
