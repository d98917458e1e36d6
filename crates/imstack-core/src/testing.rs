//! In-memory stand-ins for the native collaborators, used by unit tests.

use std::ffi::c_void;

use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;

use crate::context::{Capabilities, CursorShape, DragDropPayload, UiContext};
use crate::error::HookError;
use crate::hook::HookEngine;
use crate::message::{WindowMessage, WM_LBUTTONDOWN, WM_LBUTTONUP};
use crate::orchestrator::{DeviceObjects, GraphicsBinding, PlatformBinding};

// ─── FakeEngine ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct EngineState {
    /// target → enabled
    hooks:          AHashMap<usize, bool>,
    not_executable: AHashSet<usize>,
    enable_calls:   usize,
}

/// Hook engine that records calls. The "trampoline" is the target itself, so
/// calling the original still runs the real function.
#[derive(Default)]
pub struct FakeEngine(Mutex<EngineState>);

impl FakeEngine {
    pub fn is_installed(&self, target: usize) -> bool {
        self.0.lock().hooks.contains_key(&target)
    }

    pub fn is_enabled(&self, target: usize) -> bool {
        self.0.lock().hooks.get(&target).copied().unwrap_or(false)
    }

    pub fn enable_calls(&self) -> usize {
        self.0.lock().enable_calls
    }

    pub fn mark_not_executable(&self, target: usize) {
        self.0.lock().not_executable.insert(target);
    }
}

impl HookEngine for FakeEngine {
    unsafe fn create(&self, target: *mut c_void, _detour: *mut c_void) -> Result<*mut c_void, HookError> {
        let mut s = self.0.lock();
        let key = target as usize;
        if s.not_executable.contains(&key) {
            return Err(HookError::NotExecutable(key));
        }
        if s.hooks.contains_key(&key) {
            return Err(HookError::AlreadyCreated(key));
        }
        s.hooks.insert(key, false);
        Ok(target)
    }

    unsafe fn enable(&self, target: *mut c_void) -> Result<(), HookError> {
        let mut s = self.0.lock();
        s.enable_calls += 1;
        match s.hooks.get_mut(&(target as usize)) {
            Some(enabled) => {
                *enabled = true;
                Ok(())
            }
            None => Err(HookError::NotCreated(target as usize)),
        }
    }

    unsafe fn disable(&self, target: *mut c_void) -> Result<(), HookError> {
        match self.0.lock().hooks.get_mut(&(target as usize)) {
            Some(enabled) => {
                *enabled = false;
                Ok(())
            }
            None => Err(HookError::NotCreated(target as usize)),
        }
    }

    unsafe fn remove(&self, target: *mut c_void) -> Result<(), HookError> {
        self.0
            .lock()
            .hooks
            .remove(&(target as usize))
            .map(|_| ())
            .ok_or(HookError::NotCreated(target as usize))
    }
}

// ─── FakeContext ─────────────────────────────────────────────────────────────

/// Scriptable UI context.
///
/// The IO fields are set by tests to describe what the context "saw" last
/// frame; the counters record what the core did to it.
#[derive(Debug, Default)]
pub struct FakeContext {
    pub label:          String,

    pub want_mouse:     bool,
    pub want_keyboard:  bool,
    pub hovered:        bool,
    pub cursor:         CursorShape,
    pub dragging:       Option<DragDropPayload>,
    pub clicked:        bool,
    pub keys_held:      bool,
    pub primary_held:   bool,

    pub caps:           Capabilities,
    pub frame_open:     bool,
    pub frames_begun:   usize,
    pub frames_ended:   usize,
    pub frames_drawn:   usize,
    pub injected:       Option<DragDropPayload>,
    pub key_clears:     usize,
    pub received:       Vec<WindowMessage>,

    pub fail_platform:  bool,
    pub fail_graphics:  bool,
    pub bindings_live:  bool,
    pub submitted:      usize,
}

impl FakeContext {
    pub fn named(label: &str) -> Self {
        Self { label: label.to_string(), ..Default::default() }
    }

    /// Every begun frame was closed exactly once.
    pub fn is_balanced(&self) -> bool {
        !self.frame_open && self.frames_begun == self.frames_ended + self.frames_drawn
    }
}

impl UiContext for FakeContext {
    fn new_frame(&mut self) {
        assert!(!self.frame_open, "{}: nested new_frame", self.label);
        self.frame_open = true;
        self.frames_begun += 1;
        self.clicked = false;
    }

    fn end_frame(&mut self) {
        assert!(self.frame_open, "{}: end_frame without new_frame", self.label);
        self.frame_open = false;
        self.frames_ended += 1;
    }

    fn render(&mut self) {
        assert!(self.frame_open, "{}: render without new_frame", self.label);
        self.frame_open = false;
        self.frames_drawn += 1;
    }

    fn want_capture_mouse(&self) -> bool { self.want_mouse }
    fn want_capture_keyboard(&self) -> bool { self.want_keyboard }
    fn is_window_hovered(&self) -> bool { self.hovered }
    fn requested_cursor(&self) -> CursorShape { self.cursor }

    fn drag_drop_source(&self) -> Option<DragDropPayload> {
        self.dragging.clone()
    }

    fn inject_drag_drop(&mut self, payload: &DragDropPayload) {
        assert!(self.frame_open, "{}: drag-drop injected outside a frame", self.label);
        assert!(self.primary_held, "{}: drag-drop injected with the button up", self.label);
        self.injected = Some(payload.clone());
    }

    fn sync_primary_button(&mut self, held: bool) {
        self.primary_held = held;
    }

    fn primary_clicked(&self) -> bool { self.clicked }

    fn clear_key_state(&mut self) {
        self.keys_held = false;
        self.key_clears += 1;
    }

    fn capabilities(&self) -> Capabilities { self.caps }
    fn set_capabilities(&mut self, caps: Capabilities) { self.caps = caps; }
}

// ─── Bindings ────────────────────────────────────────────────────────────────

/// Platform binding that delivers translated messages into `received` and
/// honours the capability gates the way the real one does.
#[derive(Debug, Default)]
pub struct FakePlatform {
    pub inits:     usize,
    pub shutdowns: usize,
}

impl PlatformBinding<FakeContext> for FakePlatform {
    fn init_context(&mut self, ctx: &mut FakeContext) -> anyhow::Result<()> {
        if ctx.fail_platform {
            anyhow::bail!("{}: window binding refused", ctx.label);
        }
        self.inits += 1;
        Ok(())
    }

    fn new_frame(&mut self, _ctx: &mut FakeContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn translate(&mut self, ctx: &mut FakeContext, msg: &WindowMessage) {
        let class = msg.class();
        if class.contains(crate::message::MessageClass::MOUSE) && !ctx.caps.contains(Capabilities::MOUSE) {
            return;
        }
        if class.contains(crate::message::MessageClass::KEYBOARD)
            && !ctx.caps.contains(Capabilities::KEYBOARD)
        {
            return;
        }
        match msg.msg {
            WM_LBUTTONDOWN => {
                ctx.clicked = true;
                ctx.primary_held = true;
            }
            WM_LBUTTONUP => ctx.primary_held = false,
            _ => {}
        }
        ctx.received.push(*msg);
    }

    fn shutdown_context(&mut self, _ctx: &mut FakeContext) {
        self.shutdowns += 1;
    }
}

/// Graphics binding that logs submissions by label.
#[derive(Debug, Default)]
pub struct FakeGraphics {
    pub submitted:       Vec<String>,
    pub shutdowns:       usize,
    pub invalidations:   usize,
    pub fail_recreate:   bool,
    pub device_objects:  bool,
}

impl GraphicsBinding<FakeContext> for FakeGraphics {
    fn init_context(&mut self, ctx: &mut FakeContext) -> anyhow::Result<()> {
        if ctx.fail_graphics {
            anyhow::bail!("{}: font atlas upload failed", ctx.label);
        }
        ctx.bindings_live = true;
        self.device_objects = true;
        Ok(())
    }

    fn new_frame(&mut self, _ctx: &mut FakeContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn submit(&mut self, ctx: &mut FakeContext) -> anyhow::Result<()> {
        ctx.submitted += 1;
        self.submitted.push(ctx.label.clone());
        Ok(())
    }

    fn shutdown_context(&mut self, ctx: &mut FakeContext) {
        ctx.bindings_live = false;
        self.shutdowns += 1;
    }
}

impl DeviceObjects for FakeGraphics {
    fn invalidate_device_objects(&mut self) {
        self.invalidations += 1;
        self.device_objects = false;
    }

    fn create_device_objects(&mut self) -> anyhow::Result<()> {
        if self.fail_recreate {
            anyhow::bail!("device removed");
        }
        self.device_objects = true;
        Ok(())
    }
}
