//! Function interception.
//!
//! An [`Interceptor`] redirects calls to a native function into a detour and
//! keeps a callable trampoline to the original code. The trampoline mechanics
//! (MinHook on Windows) live behind [`HookEngine`], so backends never patch
//! code themselves.
//!
//! ```text
//! Created ──enable──▶ Enabled ──disable──▶ Disabled ──dispose──▶ Disposed
//!    └──────────────────────────dispose──────────────────────────────▲
//! ```

use std::ffi::c_void;
use std::mem;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::HookError;

// ─── HookEngine ──────────────────────────────────────────────────────────────

/// Platform trampoline mechanics.
///
/// Implementations must refuse a second `create` on the same target with
/// [`HookError::AlreadyCreated`] and a non-executable target with
/// [`HookError::NotExecutable`].
pub trait HookEngine: Send + Sync {
    /// Build a trampoline over `target`, returning the address of a callable
    /// copy of the original entry point. The redirect is not active yet.
    ///
    /// # Safety
    ///
    /// `target` and `detour` must be functions with identical signatures.
    unsafe fn create(&self, target: *mut c_void, detour: *mut c_void) -> Result<*mut c_void, HookError>;

    /// # Safety
    ///
    /// `target` must have been passed to a successful `create`.
    unsafe fn enable(&self, target: *mut c_void) -> Result<(), HookError>;

    /// # Safety
    ///
    /// `target` must have been passed to a successful `create`.
    unsafe fn disable(&self, target: *mut c_void) -> Result<(), HookError>;

    /// Remove the trampoline and restore the original bytes.
    ///
    /// # Safety
    ///
    /// `target` must have been passed to a successful `create`.
    unsafe fn remove(&self, target: *mut c_void) -> Result<(), HookError>;
}

// ─── Interceptor ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Created,
    Enabled,
    Disabled,
    Disposed,
}

/// One installed redirect. Disposed on drop.
pub struct Interceptor {
    engine:   Arc<dyn HookEngine>,
    name:     &'static str,
    target:   usize,
    detour:   usize,
    original: usize,
    state:    HookState,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("name", &self.name)
            .field("target", &format_args!("{:#x}", self.target))
            .field("detour", &format_args!("{:#x}", self.detour))
            .field("state", &self.state)
            .finish()
    }
}

impl Interceptor {
    /// Install a (not yet enabled) redirect from `target` to `detour`.
    ///
    /// # Safety
    ///
    /// `target` and `detour` must be functions with identical signatures and
    /// calling conventions, and `detour` must stay valid until disposal.
    pub unsafe fn create(
        engine: Arc<dyn HookEngine>,
        name: &'static str,
        target: *const c_void,
        detour: *const c_void,
    ) -> Result<Self, HookError> {
        if target.is_null() || detour.is_null() {
            return Err(HookError::NullTarget);
        }
        let original = engine.create(target as *mut _, detour as *mut _)?;
        if original.is_null() {
            let _ = engine.remove(target as *mut _);
            return Err(HookError::NotCreated(target as usize));
        }
        debug!("{name}: hook created on {:#x}", target as usize);
        Ok(Self {
            engine,
            name,
            target: target as usize,
            detour: detour as usize,
            original: original as usize,
            state: HookState::Created,
        })
    }

    pub fn name(&self) -> &'static str { self.name }
    pub fn state(&self) -> HookState { self.state }
    pub fn target(&self) -> usize { self.target }

    /// Start redirecting calls. Enabling twice is a no-op.
    pub fn enable(&mut self) -> Result<(), HookError> {
        match self.state {
            HookState::Enabled => Ok(()),
            HookState::Disposed => Err(HookError::Disposed(self.target)),
            HookState::Created | HookState::Disabled => {
                unsafe { self.engine.enable(self.target as *mut _)? };
                self.state = HookState::Enabled;
                debug!("{}: enabled", self.name);
                Ok(())
            }
        }
    }

    /// Stop redirecting calls, keeping the trampoline. No-op unless enabled.
    pub fn disable(&mut self) -> Result<(), HookError> {
        match self.state {
            HookState::Enabled => {
                unsafe { self.engine.disable(self.target as *mut _)? };
                self.state = HookState::Disabled;
                debug!("{}: disabled", self.name);
                Ok(())
            }
            HookState::Disposed => Err(HookError::Disposed(self.target)),
            HookState::Created | HookState::Disabled => Ok(()),
        }
    }

    /// Reverse everything. Safe to call repeatedly and after partial failure.
    pub fn dispose(&mut self) {
        if self.state == HookState::Disposed {
            return;
        }
        if self.state == HookState::Enabled {
            if let Err(e) = unsafe { self.engine.disable(self.target as *mut _) } {
                warn!("{}: disable during dispose failed: {e}", self.name);
            }
        }
        if let Err(e) = unsafe { self.engine.remove(self.target as *mut _) } {
            warn!("{}: remove failed: {e}", self.name);
        }
        self.state = HookState::Disposed;
        debug!("{}: disposed", self.name);
    }

    /// The pre-redirect implementation, reinterpreted as `F`.
    ///
    /// # Safety
    ///
    /// `F` must be the function-pointer type of the hooked function.
    pub unsafe fn original<F: Copy>(&self) -> F {
        debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<usize>(), "F must be a function pointer");
        mem::transmute_copy(&self.original)
    }
}

impl Drop for Interceptor {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ─── HookSet ─────────────────────────────────────────────────────────────────

/// The interceptors a backend installed, enabled and torn down together.
#[derive(Debug, Default)]
pub struct HookSet(Vec<Interceptor>);

impl HookSet {
    pub fn push(&mut self, hook: Interceptor) {
        self.0.push(hook);
    }

    pub fn hooks(&self) -> &[Interceptor] {
        &self.0
    }

    /// Enable every hook. Stops at the first failure.
    pub fn enable_all(&mut self) -> Result<(), HookError> {
        self.0.iter_mut().try_for_each(Interceptor::enable)
    }

    pub fn dispose_all(&mut self) {
        // Reverse order: later hooks may have been installed over earlier state.
        for hook in self.0.iter_mut().rev() {
            hook.dispose();
        }
        self.0.clear();
    }
}
