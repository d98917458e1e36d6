//! [`HookEngine`] over MinHook.

use std::ffi::c_void;

use minhook_sys::{
    MH_CreateHook, MH_DisableHook, MH_EnableHook, MH_Initialize, MH_RemoveHook, MH_Uninitialize,
    MH_OK,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use imstack_core::{HookEngine, HookError};

// MinHook.h status codes.
const MH_ERROR_ALREADY_INITIALIZED: i32 = 1;
const MH_ERROR_ALREADY_CREATED: i32 = 3;
const MH_ERROR_NOT_CREATED: i32 = 4;
const MH_ERROR_ENABLED: i32 = 5;
const MH_ERROR_DISABLED: i32 = 6;
const MH_ERROR_NOT_EXECUTABLE: i32 = 7;

/// Process-wide MinHook instance. MinHook keeps global state, so every
/// backend shares this one.
#[derive(Debug, Default)]
pub struct MinHookEngine {
    initialized: Mutex<bool>,
}

impl MinHookEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// `MH_Initialize`, tolerating a library that is already up.
    pub fn initialize(&self) -> Result<(), HookError> {
        let mut initialized = self.initialized.lock();
        if *initialized {
            return Ok(());
        }
        let status = unsafe { MH_Initialize() };
        if status != MH_OK && status != MH_ERROR_ALREADY_INITIALIZED {
            return Err(HookError::Engine(status));
        }
        *initialized = true;
        debug!("minhook initialized");
        Ok(())
    }

    /// `MH_Uninitialize`. Every hook created through this engine must have
    /// been removed first.
    pub fn uninitialize(&self) {
        let mut initialized = self.initialized.lock();
        if !*initialized {
            return;
        }
        let status = unsafe { MH_Uninitialize() };
        if status != MH_OK {
            warn!("MH_Uninitialize returned {status}");
        }
        *initialized = false;
    }
}

fn check(status: i32, target: *mut c_void) -> Result<(), HookError> {
    let addr = target as usize;
    match status {
        s if s == MH_OK => Ok(()),
        MH_ERROR_ALREADY_CREATED => Err(HookError::AlreadyCreated(addr)),
        MH_ERROR_NOT_CREATED => Err(HookError::NotCreated(addr)),
        MH_ERROR_NOT_EXECUTABLE => Err(HookError::NotExecutable(addr)),
        other => Err(HookError::Engine(other)),
    }
}

impl HookEngine for MinHookEngine {
    unsafe fn create(&self, target: *mut c_void, detour: *mut c_void) -> Result<*mut c_void, HookError> {
        self.initialize()?;
        let mut original = std::ptr::null_mut();
        check(MH_CreateHook(target, detour, &mut original), target)?;
        Ok(original)
    }

    unsafe fn enable(&self, target: *mut c_void) -> Result<(), HookError> {
        match MH_EnableHook(target) {
            MH_ERROR_ENABLED => Ok(()),
            status => check(status, target),
        }
    }

    unsafe fn disable(&self, target: *mut c_void) -> Result<(), HookError> {
        match MH_DisableHook(target) {
            MH_ERROR_DISABLED => Ok(()),
            status => check(status, target),
        }
    }

    unsafe fn remove(&self, target: *mut c_void) -> Result<(), HookError> {
        check(MH_RemoveHook(target), target)
    }
}
