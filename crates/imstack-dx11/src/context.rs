//! One Dear ImGui context per overlay module.
//!
//! Dear ImGui has a single "current context" per process. Every module's
//! context is kept suspended and is only made current for the duration of an
//! operation on it, or from `new_frame` to `render`/`end_frame`. All of this
//! happens under the overlay lock, so two contexts are never current at once.
//!
//! The IO flags the compositor reads (capture wishes, hover, cursor, drag
//! source) are cached when the frame closes, so reading them never needs the
//! context to be current.

use std::ffi::CStr;
use std::mem;
use std::time::Instant;

use imgui::{sys, DrawData, MouseButton, Ui};
use tracing::{debug, warn};
use windows::Win32::Graphics::Direct3D11::ID3D11ShaderResourceView;
use windows::Win32::UI::Input::KeyboardAndMouse::VK_LBUTTON;

use imstack_core::{Capabilities, CursorShape, DragDropPayload, UiContext};

use crate::platform::key_is_down;
use crate::Dx11Error;

// ─── Slot ────────────────────────────────────────────────────────────────────

enum Slot {
    Active(imgui::Context),
    Suspended(imgui::SuspendedContext),
    /// Only observable if suspending or activating panicked halfway.
    Gone,
}

impl Slot {
    fn is_active(&self) -> bool {
        matches!(self, Slot::Active(_))
    }

    fn activate(&mut self) -> Result<(), Dx11Error> {
        match mem::replace(self, Slot::Gone) {
            Slot::Suspended(suspended) => match suspended.activate() {
                Ok(ctx) => {
                    *self = Slot::Active(ctx);
                    Ok(())
                }
                Err(suspended) => {
                    *self = Slot::Suspended(suspended);
                    Err(Dx11Error::ContextBusy)
                }
            },
            Slot::Active(ctx) => {
                *self = Slot::Active(ctx);
                Ok(())
            }
            Slot::Gone => Err(Dx11Error::Missing("imgui context")),
        }
    }

    fn suspend(&mut self) {
        *self = match mem::replace(self, Slot::Gone) {
            Slot::Active(ctx) => Slot::Suspended(ctx.suspend()),
            other => other,
        };
    }

    fn active_mut(&mut self) -> Option<&mut imgui::Context> {
        match self {
            Slot::Active(ctx) => Some(ctx),
            _ => None,
        }
    }
}

/// Suspends the slot again when dropped, unless it was already current.
struct Scope<'a> {
    slot:  &'a mut Slot,
    armed: bool,
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.slot.suspend();
        }
    }
}

// ─── Cached frame state ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FrameState {
    want_mouse:    bool,
    want_keyboard: bool,
    hovered:       bool,
    cursor:        CursorShape,
    drag:          Option<DragDropPayload>,
}

fn cursor_from_imgui(cursor: sys::ImGuiMouseCursor) -> CursorShape {
    match cursor {
        -1 => CursorShape::Hidden,
        1 => CursorShape::TextInput,
        2 => CursorShape::ResizeAll,
        3 => CursorShape::ResizeNS,
        4 => CursorShape::ResizeEW,
        5 => CursorShape::ResizeNESW,
        6 => CursorShape::ResizeNWSE,
        7 => CursorShape::Hand,
        8 => CursorShape::NotAllowed,
        _ => CursorShape::Arrow,
    }
}

/// Deep copy of the payload the current context is dragging, if any.
///
/// # Safety
///
/// An imgui context must be current.
unsafe fn current_payload() -> Option<DragDropPayload> {
    let payload = sys::igGetDragDropPayload();
    if payload.is_null() {
        return None;
    }
    let payload = &*payload;
    let data_type = CStr::from_ptr(payload.DataType.as_ptr()).to_string_lossy().into_owned();
    let data = if payload.Data.is_null() || payload.DataSize <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(payload.Data as *const u8, payload.DataSize as usize).to_vec()
    };
    Some(DragDropPayload { data_type, data })
}

// ─── ImguiContext ────────────────────────────────────────────────────────────

/// The [`UiContext`] of the Direct3D 11 backend.
///
/// Module render callbacks draw through [`ui`](Self::ui).
pub struct ImguiContext {
    name:         String,
    slot:         Slot,
    ui:           *mut Ui,
    draw_data:    *const DrawData,
    last_frame:   Option<Instant>,
    frame:        FrameState,
    caps:         Capabilities,
    clicked:      bool,
    injected:     bool,
    /// OS cursor in host client coordinates, refreshed every frame.
    cursor:       Option<[f32; 2]>,
    pub(crate) font_texture: Option<ID3D11ShaderResourceView>,
}

// The raw pointers point into the imgui context owned by `slot`, and every
// access goes through the overlay lock.
unsafe impl Send for ImguiContext {}

impl std::fmt::Debug for ImguiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImguiContext")
            .field("name", &self.name)
            .field("active", &self.slot.is_active())
            .field("caps", &self.caps)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl ImguiContext {
    pub fn new(name: &str, dark_theme: bool) -> Self {
        let mut this = Self {
            name:         name.to_string(),
            slot:         Slot::Suspended(imgui::SuspendedContext::create()),
            ui:           std::ptr::null_mut(),
            draw_data:    std::ptr::null(),
            last_frame:   None,
            frame:        FrameState::default(),
            caps:         Capabilities::empty(),
            clicked:      false,
            injected:     false,
            cursor:       None,
            font_texture: None,
        };
        let configured = this.with_context(|imgui| {
            imgui.set_ini_filename(None);
            imgui.set_log_filename(None);
            if dark_theme {
                apply_default_theme(imgui.style_mut());
            }
        });
        if let Err(e) = configured {
            warn!("{name}: could not configure imgui context: {e}");
        }
        this
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The frame being built. `Some` only inside the render callback.
    pub fn ui(&mut self) -> Option<&mut Ui> {
        if self.ui.is_null() || !self.slot.is_active() {
            return None;
        }
        Some(unsafe { &mut *self.ui })
    }

    /// Draw data of the last rendered frame, valid until the next `new_frame`.
    pub fn draw_data(&self) -> Option<&DrawData> {
        if self.draw_data.is_null() {
            return None;
        }
        Some(unsafe { &*self.draw_data })
    }

    /// Run `f` with this context current: style tweaks, font loading, IO.
    pub fn with_context<R>(&mut self, f: impl FnOnce(&mut imgui::Context) -> R) -> Result<R, Dx11Error> {
        let armed = !self.slot.is_active();
        self.slot.activate()?;
        let mut scope = Scope { slot: &mut self.slot, armed };
        let ctx = scope.slot.active_mut().ok_or(Dx11Error::Missing("imgui context"))?;
        Ok(f(ctx))
    }

    /// Seconds since the previous call, for `io.delta_time`.
    pub(crate) fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(1.0 / 60.0);
        self.last_frame = Some(now);
        // imgui asserts on a zero delta.
        delta.max(f32::EPSILON)
    }

    pub(crate) fn mark_clicked(&mut self) {
        self.clicked = true;
    }

    pub(crate) fn set_cursor(&mut self, pos: Option<[f32; 2]>) {
        self.cursor = pos;
    }

    /// Capture the IO flags of the frame that is about to close.
    ///
    /// # Safety
    ///
    /// This context must be current, between `new_frame` and `render`.
    unsafe fn cache_frame_state(&mut self) {
        self.frame.hovered = sys::igIsWindowHovered(sys::ImGuiHoveredFlags_AnyWindow as _);
        self.frame.cursor = cursor_from_imgui(sys::igGetMouseCursor());
        self.frame.drag = if self.injected { None } else { current_payload() };
    }

    fn cache_io(&mut self) {
        if let Some(ctx) = self.slot.active_mut() {
            let io = ctx.io();
            self.frame.want_mouse = io.want_capture_mouse;
            self.frame.want_keyboard = io.want_capture_keyboard;
        }
    }
}

/// Dark colors with slightly rounder widgets.
fn apply_default_theme(style: &mut imgui::Style) {
    style.use_dark_colors();
    style.window_rounding = 6.0;
    style.frame_rounding = 3.0;
    style.grab_rounding = 3.0;
    style.scrollbar_rounding = 6.0;
    style.window_border_size = 1.0;
}

impl UiContext for ImguiContext {
    /// # Panics
    ///
    /// If another imgui context is current on this process. The orchestrator
    /// contains the panic and removes the module.
    fn new_frame(&mut self) {
        if let Err(e) = self.slot.activate() {
            panic!("{}: cannot begin frame: {e}", self.name);
        }
        self.draw_data = std::ptr::null();
        self.injected = false;
        self.clicked = false;
        if let Some(ctx) = self.slot.active_mut() {
            self.ui = ctx.new_frame() as *mut Ui;
        }
    }

    fn end_frame(&mut self) {
        if self.slot.is_active() {
            unsafe {
                self.cache_frame_state();
                sys::igEndFrame();
            }
            self.cache_io();
        }
        self.ui = std::ptr::null_mut();
        self.slot.suspend();
    }

    fn render(&mut self) {
        self.ui = std::ptr::null_mut();
        if !self.slot.is_active() {
            return;
        }
        unsafe { self.cache_frame_state() };
        if let Some(ctx) = self.slot.active_mut() {
            self.draw_data = ctx.render() as *const DrawData;
        }
        self.cache_io();
        self.slot.suspend();
    }

    fn want_capture_mouse(&self) -> bool { self.frame.want_mouse }
    fn want_capture_keyboard(&self) -> bool { self.frame.want_keyboard }
    fn is_window_hovered(&self) -> bool { self.frame.hovered }
    fn requested_cursor(&self) -> CursorShape { self.frame.cursor }

    fn drag_drop_source(&self) -> Option<DragDropPayload> {
        self.frame.drag.clone()
    }

    fn inject_drag_drop(&mut self, payload: &DragDropPayload) {
        if !self.slot.is_active() {
            return;
        }
        // imgui limits the type tag to 32 bytes plus the terminator.
        let mut tag: Vec<u8> = payload.data_type.bytes().filter(|&b| b != 0).take(32).collect();
        tag.push(0);
        unsafe {
            if sys::igBeginDragDropSource(sys::ImGuiDragDropFlags_SourceExtern as _) {
                sys::igSetDragDropPayload(
                    tag.as_ptr().cast(),
                    payload.data.as_ptr().cast(),
                    payload.data.len(),
                    sys::ImGuiCond_Always as _,
                );
                sys::igEndDragDropSource();
                self.injected = true;
            }
        }
    }

    fn sync_primary_button(&mut self, held: bool) {
        // A release may already have been translated this frame.
        let held = held && key_is_down(VK_LBUTTON.0 as i32);
        let cursor = self.cursor;
        let Some(ctx) = self.slot.active_mut() else {
            return;
        };
        let io = ctx.io_mut();
        // BeginDragDropSource reads MouseDown directly this frame; the queued
        // events keep the state across the next NewFrame.
        if let Some(pos) = cursor {
            io.mouse_pos = pos;
            io.add_mouse_pos_event(pos);
        }
        io.mouse_down[0] = held;
        io.add_mouse_button_event(MouseButton::Left, held);
    }

    fn primary_clicked(&self) -> bool { self.clicked }

    fn clear_key_state(&mut self) {
        let cleared = self.with_context(|_| unsafe { sys::ImGuiIO_ClearInputKeys(sys::igGetIO()) });
        if let Err(e) = cleared {
            debug!("{}: could not clear key state: {e}", self.name);
        }
    }

    fn capabilities(&self) -> Capabilities { self.caps }
    fn set_capabilities(&mut self, caps: Capabilities) { self.caps = caps; }
}

// ─── Factory ─────────────────────────────────────────────────────────────────

/// Builds the context of each newly registered module.
#[derive(Debug, Clone, Copy)]
pub struct ImguiContextFactory {
    pub dark_theme: bool,
}

impl ImguiContextFactory {
    pub fn create(&self, module_id: &str) -> ImguiContext {
        ImguiContext::new(module_id, self.dark_theme)
    }
}
