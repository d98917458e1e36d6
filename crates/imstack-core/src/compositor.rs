//! Per-frame arbitration of input, cursor and drag-and-drop between modules.
//!
//! The compositor runs around the module loop of every frame:
//!
//! ```text
//! pre_pass ─▶ for each module { new_frame ─▶ post_new_frame ─▶ render } ─▶ post_pass
//! ```
//!
//! `pre_pass` decides, from the IO state each context reported last frame,
//! which module owns the mouse, the cursor shape, the keyboard and which ones
//! take part in a drag. It then writes the resulting [`Capabilities`] back into
//! every context. Nothing computed here outlives the frame.

use tracing::{debug, trace};

use crate::context::{Capabilities, DragDropPayload, UiContext};
use crate::registry::ModuleRegistry;

// ─── InputGate ───────────────────────────────────────────────────────────────

/// What the window-procedure hook must swallow until the next pre-pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputGate {
    /// Some module claimed the mouse.
    pub capture_mouse:    bool,
    /// The keyboard owner is actively reading keys (text field, hotkeys).
    pub capture_keyboard: bool,
}

// ─── Compositor ──────────────────────────────────────────────────────────────

/// Transient ownership state. Indices refer to the front-to-back order as it
/// was at the last `pre_pass` and are only meaningful until `post_pass`.
#[derive(Debug, Default)]
pub struct Compositor {
    mouse_owner:      Option<usize>,
    cursor_owner:     Option<usize>,
    keyboard_owner:   Option<usize>,
    drag_source:      Option<usize>,
    drag_destination: Option<usize>,
    payload:          Option<DragDropPayload>,
    promote:          Option<String>,
    gate:             InputGate,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mouse_owner(&self) -> Option<usize> { self.mouse_owner }
    pub fn cursor_owner(&self) -> Option<usize> { self.cursor_owner }
    pub fn keyboard_owner(&self) -> Option<usize> { self.keyboard_owner }
    pub fn drag_source(&self) -> Option<usize> { self.drag_source }
    pub fn drag_destination(&self) -> Option<usize> { self.drag_destination }
    pub fn payload(&self) -> Option<&DragDropPayload> { self.payload.as_ref() }
    pub fn gate(&self) -> InputGate { self.gate }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Compute this frame's ownership and grant capabilities.
    pub fn pre_pass<C: UiContext>(&mut self, registry: &mut ModuleRegistry<C>) {
        self.reset();
        let modules = registry.modules_mut();
        if modules.is_empty() {
            return;
        }

        // First sweep: claim ownership, front wins.
        for (i, module) in modules.iter().enumerate() {
            let ctx = &module.context;
            if self.mouse_owner.is_none() && ctx.want_capture_mouse() {
                self.mouse_owner = Some(i);
            }
            if self.drag_destination.is_none() && ctx.is_window_hovered() {
                self.drag_destination = Some(i);
            }
            if self.cursor_owner.is_none() && !ctx.requested_cursor().is_default() {
                self.cursor_owner = Some(i);
            }
            if self.keyboard_owner.is_none() && ctx.want_capture_keyboard() {
                self.keyboard_owner = Some(i);
            }
            if self.drag_source.is_none() {
                if let Some(payload) = ctx.drag_drop_source() {
                    self.drag_source = Some(i);
                    self.payload = Some(payload);
                }
            }
        }

        // Background modules never read keys unless they asked for them.
        // A module whose init has not run yet may not survive this frame.
        if self.keyboard_owner.is_none() {
            self.keyboard_owner = Some(modules.iter().position(|m| m.initialized).unwrap_or(0));
        }

        // A destination only makes sense while something is being dragged.
        if self.payload.is_none() {
            self.drag_destination = None;
        }
        if let (Some(src), Some(dst)) = (self.drag_source, self.drag_destination) {
            trace!(src, dst, "drag in progress");
        }

        let cursor_holder = self.cursor_owner.or(self.mouse_owner).unwrap_or(0);

        // Second sweep: grant.
        for (i, module) in modules.iter_mut().enumerate() {
            let mut caps = Capabilities::empty();
            if self.keyboard_owner == Some(i) {
                caps |= Capabilities::KEYBOARD;
            }
            if cursor_holder == i {
                caps |= Capabilities::CURSOR_CHANGE;
            }
            let in_front_of_owner = self.mouse_owner.map_or(true, |owner| i <= owner);
            if in_front_of_owner || self.drag_destination == Some(i) {
                caps |= Capabilities::MOUSE;
            }
            module.context.set_capabilities(caps);

            if i != 0 && self.mouse_owner == Some(i) && module.context.primary_clicked() {
                self.promote = Some(module.id.clone());
            }
        }

        let keyboard_owner = self.keyboard_owner.map(|k| &modules[k].context);
        self.gate = InputGate {
            capture_mouse:    self.mouse_owner.is_some(),
            capture_keyboard: keyboard_owner.is_some_and(|ctx| ctx.want_capture_keyboard()),
        };
    }

    /// Hand the copied drag payload to the destination, right after its
    /// `new_frame`.
    pub fn post_new_frame<C: UiContext>(&self, index: usize, ctx: &mut C) {
        if self.drag_destination != Some(index) || self.drag_source == Some(index) {
            return;
        }
        if let Some(payload) = &self.payload {
            // The source is still dragging, so its button is down.
            ctx.sync_primary_button(true);
            ctx.inject_drag_drop(payload);
        }
    }

    /// Apply a pending click-to-front and drop the transient payload.
    pub fn post_pass<C: UiContext>(&mut self, registry: &mut ModuleRegistry<C>) {
        self.payload = None;

        let Some(id) = self.promote.take() else {
            return;
        };
        // The module may have been destroyed during the frame.
        let Some(pos) = registry.position(&id) else {
            return;
        };
        if registry.bring_to_front(pos) {
            debug!("module `{id}` brought to front");
            for module in registry.iter_mut().skip(1) {
                module.context.clear_key_state();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CursorShape;
    use crate::module::ModuleCallbacks;
    use crate::testing::FakeContext;

    fn registry(ids: &[&str]) -> ModuleRegistry<FakeContext> {
        let mut reg = ModuleRegistry::new(FakeContext::named);
        for id in ids {
            reg.register(*id, ModuleCallbacks::render(|_| Ok(()))).unwrap();
        }
        reg
    }

    fn ctx<'a>(reg: &'a mut ModuleRegistry<FakeContext>, id: &str) -> &'a mut FakeContext {
        reg.get_mut(id).unwrap().context_mut()
    }

    fn caps(reg: &ModuleRegistry<FakeContext>) -> Vec<Capabilities> {
        reg.iter().map(|m| m.context().caps).collect()
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let mut reg = registry(&[]);
        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        comp.post_pass(&mut reg);
        assert_eq!(comp.keyboard_owner(), None);
        assert_eq!(comp.gate(), InputGate::default());
    }

    #[test]
    fn front_capture_revokes_mouse_behind_it() {
        let mut reg = registry(&["a", "b"]);
        ctx(&mut reg, "a").want_mouse = true;
        ctx(&mut reg, "a").hovered = true;
        ctx(&mut reg, "b").hovered = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);

        assert_eq!(comp.mouse_owner(), Some(0));
        assert!(caps(&reg)[0].contains(Capabilities::MOUSE));
        assert!(!caps(&reg)[1].contains(Capabilities::MOUSE));
        assert!(comp.gate().capture_mouse);
    }

    #[test]
    fn mouse_goes_to_owner_and_everything_in_front() {
        let mut reg = registry(&["a", "b", "c", "d"]);
        ctx(&mut reg, "c").want_mouse = true;
        ctx(&mut reg, "d").want_mouse = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);

        let mouse: Vec<bool> = caps(&reg).iter().map(|c| c.contains(Capabilities::MOUSE)).collect();
        assert_eq!(mouse, [true, true, true, false]);
        assert_eq!(comp.mouse_owner(), Some(2));
    }

    #[test]
    fn without_an_owner_everyone_sees_the_mouse() {
        let mut reg = registry(&["a", "b", "c"]);
        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert!(caps(&reg).iter().all(|c| c.contains(Capabilities::MOUSE)));
        assert!(!comp.gate().capture_mouse);
    }

    #[test]
    fn keyboard_has_exactly_one_owner() {
        let mut reg = registry(&["a", "b", "c"]);
        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert_eq!(comp.keyboard_owner(), Some(0));
        assert!(!comp.gate().capture_keyboard);

        ctx(&mut reg, "b").want_keyboard = true;
        ctx(&mut reg, "c").want_keyboard = true;
        comp.pre_pass(&mut reg);
        assert_eq!(comp.keyboard_owner(), Some(1));
        let owners = caps(&reg).iter().filter(|c| c.contains(Capabilities::KEYBOARD)).count();
        assert_eq!(owners, 1);
        assert!(comp.gate().capture_keyboard);
    }

    #[test]
    fn keyboard_fallback_skips_uninitialized_modules() {
        let mut reg = registry(&["fresh", "live"]);
        reg.get_mut("live").unwrap().initialized = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert_eq!(comp.keyboard_owner(), Some(1));
        assert!(caps(&reg)[1].contains(Capabilities::KEYBOARD));
        assert!(!caps(&reg)[0].contains(Capabilities::KEYBOARD));
    }

    #[test]
    fn cursor_shape_goes_to_first_non_default_request() {
        let mut reg = registry(&["a", "b", "c"]);
        ctx(&mut reg, "b").cursor = CursorShape::TextInput;
        ctx(&mut reg, "c").cursor = CursorShape::Hand;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert_eq!(comp.cursor_owner(), Some(1));
        let cursor: Vec<bool> =
            caps(&reg).iter().map(|c| c.contains(Capabilities::CURSOR_CHANGE)).collect();
        assert_eq!(cursor, [false, true, false]);
    }

    #[test]
    fn drag_payload_is_copied_to_destination_and_freed() {
        let mut reg = registry(&["a", "b"]);
        let payload = DragDropPayload::new("ITEM", vec![0xde, 0xad, 0xbe, 0xef]);
        ctx(&mut reg, "a").want_mouse = true;
        ctx(&mut reg, "a").dragging = Some(payload.clone());
        ctx(&mut reg, "b").hovered = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert_eq!(comp.drag_source(), Some(0));
        assert_eq!(comp.drag_destination(), Some(1));
        // The destination sits behind the mouse owner but still gets the mouse.
        assert!(caps(&reg)[1].contains(Capabilities::MOUSE));

        for (i, module) in reg.iter_mut().enumerate() {
            module.context.new_frame();
            comp.post_new_frame(i, &mut module.context);
            module.context.render();
        }
        assert_eq!(reg.get("b").unwrap().context().injected.as_ref(), Some(&payload));
        assert_eq!(reg.get("a").unwrap().context().injected, None);
        // Only the destination had its button state forced.
        assert!(reg.get("b").unwrap().context().primary_held);
        assert!(!reg.get("a").unwrap().context().primary_held);

        comp.post_pass(&mut reg);
        assert!(comp.payload().is_none());
    }

    #[test]
    fn drop_target_behind_owner_sees_the_button_held() {
        let mut reg = registry(&["a", "b", "c"]);
        ctx(&mut reg, "a").want_mouse = true;
        ctx(&mut reg, "a").dragging = Some(DragDropPayload::new("ITEM", [3u8]));
        ctx(&mut reg, "c").hovered = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert!(!caps(&reg)[1].contains(Capabilities::MOUSE));

        let c = ctx(&mut reg, "c");
        assert!(!c.primary_held);
        c.new_frame();
        // FakeContext refuses an injection while the button is up.
        comp.post_new_frame(2, &mut *c);
        c.render();
        let c = reg.get("c").unwrap().context();
        assert!(c.primary_held);
        assert!(c.injected.is_some());
    }

    #[test]
    fn source_hovering_itself_gets_nothing_injected() {
        let mut reg = registry(&["a", "b"]);
        ctx(&mut reg, "a").hovered = true;
        ctx(&mut reg, "a").dragging = Some(DragDropPayload::new("T", [1u8]));

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        let a = ctx(&mut reg, "a");
        a.new_frame();
        comp.post_new_frame(0, &mut *a);
        a.render();
        assert_eq!(reg.get("a").unwrap().context().injected, None);
    }

    #[test]
    fn hover_without_drag_assigns_no_destination() {
        let mut reg = registry(&["a", "b"]);
        ctx(&mut reg, "a").want_mouse = true;
        ctx(&mut reg, "b").hovered = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        assert_eq!(comp.drag_destination(), None);
        assert!(!caps(&reg)[1].contains(Capabilities::MOUSE));
    }

    #[test]
    fn click_promotes_owner_and_clears_other_keys() {
        let mut reg = registry(&["a", "b", "c"]);
        ctx(&mut reg, "c").want_mouse = true;
        ctx(&mut reg, "c").clicked = true;
        ctx(&mut reg, "a").keys_held = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        // Order is stable until the frame is over.
        assert_eq!(reg.ids(), ["a", "b", "c"]);
        comp.post_pass(&mut reg);

        assert_eq!(reg.ids(), ["c", "a", "b"]);
        assert!(!reg.get("a").unwrap().context().keys_held);
        assert_eq!(reg.get("a").unwrap().context().key_clears, 1);
        assert_eq!(reg.get("b").unwrap().context().key_clears, 1);
        assert_eq!(reg.get("c").unwrap().context().key_clears, 0);
    }

    #[test]
    fn click_on_front_module_changes_nothing() {
        let mut reg = registry(&["a", "b"]);
        ctx(&mut reg, "a").want_mouse = true;
        ctx(&mut reg, "a").clicked = true;

        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        comp.post_pass(&mut reg);
        assert_eq!(reg.ids(), ["a", "b"]);
        assert_eq!(reg.get("b").unwrap().context().key_clears, 0);
    }

    #[test]
    fn state_does_not_leak_between_frames() {
        let mut reg = registry(&["a", "b"]);
        ctx(&mut reg, "b").want_mouse = true;
        ctx(&mut reg, "b").dragging = Some(DragDropPayload::new("T", [7u8]));
        let mut comp = Compositor::new();
        comp.pre_pass(&mut reg);
        comp.post_pass(&mut reg);

        ctx(&mut reg, "b").want_mouse = false;
        ctx(&mut reg, "b").dragging = None;
        comp.pre_pass(&mut reg);
        assert_eq!(comp.mouse_owner(), None);
        assert_eq!(comp.drag_source(), None);
        assert!(comp.payload().is_none());
    }
}
