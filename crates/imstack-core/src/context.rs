//! The seam between the core and the immediate-mode UI library.
//!
//! Every module owns exactly one value implementing [`UiContext`]. The core
//! never looks inside it; it only reads the per-frame IO flags it needs for
//! arbitration and writes back the capabilities it granted.

// ─── Capabilities ────────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// What a context is allowed to do this frame. Written by the compositor.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Receives mouse position, buttons and wheel.
        const MOUSE         = 1 << 0;
        /// Receives keyboard and text input.
        const KEYBOARD      = 1 << 1;
        /// May change the OS cursor shape.
        const CURSOR_CHANGE = 1 << 2;
    }
}

// ─── CursorShape ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorShape {
    #[default]
    Arrow,
    TextInput,
    ResizeAll,
    ResizeNS,
    ResizeEW,
    ResizeNESW,
    ResizeNWSE,
    Hand,
    NotAllowed,
    /// The context asks for the cursor to be hidden.
    Hidden,
}

impl CursorShape {
    #[inline]
    pub fn is_default(self) -> bool {
        self == CursorShape::Arrow
    }
}

// ─── DragDropPayload ─────────────────────────────────────────────────────────

/// Deep copy of a drag-and-drop payload taken from one context so it can be
/// injected into another. Owns its bytes; never aliases the source context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DragDropPayload {
    /// User-defined type tag (imgui limits it to 32 bytes).
    pub data_type: String,
    pub data: Vec<u8>,
}

impl DragDropPayload {
    pub fn new(data_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { data_type: data_type.into(), data: data.into() }
    }
}

// ─── UiContext ───────────────────────────────────────────────────────────────

/// One isolated UI-library context.
///
/// # Frame balance
///
/// Every [`new_frame`](UiContext::new_frame) is balanced by exactly one of
/// [`render`](UiContext::render) (normal path) or
/// [`end_frame`](UiContext::end_frame) (abort path).
///
/// # Timing of IO queries
///
/// The compositor pre-pass runs before any context starts its frame, so the
/// query methods report what the context observed during its previous frame
/// plus the input translated since then.
pub trait UiContext: Send + 'static {
    /// Begin a UI frame.
    fn new_frame(&mut self);

    /// Close the current frame without producing draw data.
    fn end_frame(&mut self);

    /// Finalize the current frame; draw data becomes available to the backend.
    fn render(&mut self);

    fn want_capture_mouse(&self) -> bool;
    fn want_capture_keyboard(&self) -> bool;

    /// Whether any window of this context is under the cursor.
    fn is_window_hovered(&self) -> bool;

    /// Cursor shape the context would like the OS cursor to have.
    fn requested_cursor(&self) -> CursorShape;

    /// Deep copy of the payload of an active drag started by this context.
    ///
    /// Returns `None` when no drag is active, or when the active drag was
    /// injected from outside via [`inject_drag_drop`](UiContext::inject_drag_drop).
    fn drag_drop_source(&self) -> Option<DragDropPayload>;

    /// Start an externally-sourced drag carrying `payload`.
    ///
    /// Only called between `new_frame` and `render`, after
    /// [`sync_primary_button`](UiContext::sync_primary_button).
    fn inject_drag_drop(&mut self, payload: &DragDropPayload);

    /// Force the primary mouse button state to `held` without waiting for a
    /// window message. A drop target that was denied the mouse when the drag
    /// began never saw the button go down.
    fn sync_primary_button(&mut self, held: bool);

    /// Whether the primary mouse button went down since the last frame.
    fn primary_clicked(&self) -> bool;

    /// Release every key this context believes is held.
    fn clear_key_state(&mut self);

    fn capabilities(&self) -> Capabilities;
    fn set_capabilities(&mut self, caps: Capabilities);
}
