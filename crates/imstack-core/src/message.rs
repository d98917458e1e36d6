//! Window messages as seen by the shared window-procedure hook.
//!
//! The numeric values are the Win32 `WM_*` constants; they are duplicated
//! here so the routing rules can be exercised without Windows.

// ─── Message constants ───────────────────────────────────────────────────────

pub const WM_SETFOCUS:      u32 = 0x0007;
pub const WM_KILLFOCUS:     u32 = 0x0008;
pub const WM_SETCURSOR:     u32 = 0x0020;
pub const WM_KEYDOWN:       u32 = 0x0100;
pub const WM_KEYUP:         u32 = 0x0101;
pub const WM_CHAR:          u32 = 0x0102;
pub const WM_SYSKEYDOWN:    u32 = 0x0104;
pub const WM_SYSKEYUP:      u32 = 0x0105;
pub const WM_MOUSEMOVE:     u32 = 0x0200;
pub const WM_LBUTTONDOWN:   u32 = 0x0201;
pub const WM_LBUTTONUP:     u32 = 0x0202;
pub const WM_LBUTTONDBLCLK: u32 = 0x0203;
pub const WM_RBUTTONDOWN:   u32 = 0x0204;
pub const WM_RBUTTONUP:     u32 = 0x0205;
pub const WM_RBUTTONDBLCLK: u32 = 0x0206;
pub const WM_MBUTTONDOWN:   u32 = 0x0207;
pub const WM_MBUTTONUP:     u32 = 0x0208;
pub const WM_MBUTTONDBLCLK: u32 = 0x0209;
pub const WM_MOUSEWHEEL:    u32 = 0x020A;
pub const WM_XBUTTONDOWN:   u32 = 0x020B;
pub const WM_XBUTTONUP:     u32 = 0x020C;
pub const WM_XBUTTONDBLCLK: u32 = 0x020D;
pub const WM_MOUSEHWHEEL:   u32 = 0x020E;
pub const WM_MOUSELEAVE:    u32 = 0x02A3;

// ─── WindowMessage ───────────────────────────────────────────────────────────

/// A raw message delivered to the host window procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMessage {
    pub msg:    u32,
    pub wparam: usize,
    pub lparam: isize,
}

bitflags::bitflags! {
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MessageClass: u8 {
        const MOUSE     = 1 << 0;
        const KEYBOARD  = 1 << 1;
        /// A mouse button or key going up.
        const BUTTON_UP = 1 << 2;
    }
}

impl WindowMessage {
    pub fn new(msg: u32, wparam: usize, lparam: isize) -> Self {
        Self { msg, wparam, lparam }
    }

    pub fn class(&self) -> MessageClass {
        match self.msg {
            WM_LBUTTONUP | WM_RBUTTONUP | WM_MBUTTONUP | WM_XBUTTONUP => {
                MessageClass::MOUSE | MessageClass::BUTTON_UP
            }
            WM_MOUSEMOVE..=WM_MOUSEHWHEEL | WM_MOUSELEAVE => MessageClass::MOUSE,
            WM_KEYUP | WM_SYSKEYUP => MessageClass::KEYBOARD | MessageClass::BUTTON_UP,
            WM_KEYDOWN | WM_CHAR | WM_SYSKEYDOWN => MessageClass::KEYBOARD,
            _ => MessageClass::empty(),
        }
    }

    /// Virtual-key code of a key message.
    #[inline]
    pub fn virtual_key(&self) -> Option<u32> {
        matches!(self.msg, WM_KEYDOWN | WM_KEYUP | WM_SYSKEYDOWN | WM_SYSKEYUP)
            .then_some(self.wparam as u32)
    }

    /// `true` for the first key-down of a key (auto-repeat filtered out).
    #[inline]
    pub fn is_key_press(&self, vk: u32) -> bool {
        let repeat = (self.lparam >> 30) & 1 != 0;
        matches!(self.msg, WM_KEYDOWN | WM_SYSKEYDOWN) && self.wparam as u32 == vk && !repeat
    }
}

// ─── Routing ─────────────────────────────────────────────────────────────────

/// What the window-procedure hook does with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Forward to the host's original window procedure.
    PassThrough,
    /// Swallow; the host never sees it.
    Consume,
}

/// Capture-suppression rule of the window-procedure hook.
///
/// `pass_button_up` lets button/key releases through even while captured so
/// the host does not lose track of buttons it saw go down before capture.
pub fn capture_decision(
    msg: &WindowMessage,
    capture_mouse: bool,
    capture_keyboard: bool,
    pass_button_up: bool,
) -> Dispatch {
    let class = msg.class();
    if pass_button_up && class.contains(MessageClass::BUTTON_UP) {
        return Dispatch::PassThrough;
    }
    if (class.contains(MessageClass::MOUSE) && capture_mouse)
        || (class.contains(MessageClass::KEYBOARD) && capture_keyboard)
    {
        Dispatch::Consume
    } else {
        Dispatch::PassThrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mouse_and_keyboard() {
        assert_eq!(WindowMessage::new(WM_MOUSEMOVE, 0, 0).class(), MessageClass::MOUSE);
        assert_eq!(WindowMessage::new(WM_MOUSEWHEEL, 0, 0).class(), MessageClass::MOUSE);
        assert_eq!(
            WindowMessage::new(WM_RBUTTONUP, 0, 0).class(),
            MessageClass::MOUSE | MessageClass::BUTTON_UP
        );
        assert_eq!(WindowMessage::new(WM_CHAR, 'a' as usize, 0).class(), MessageClass::KEYBOARD);
        assert_eq!(
            WindowMessage::new(WM_SYSKEYUP, 0x12, 0).class(),
            MessageClass::KEYBOARD | MessageClass::BUTTON_UP
        );
        assert!(WindowMessage::new(WM_SETFOCUS, 0, 0).class().is_empty());
    }

    #[test]
    fn captured_mouse_is_swallowed_but_button_up_passes() {
        let down = WindowMessage::new(WM_LBUTTONDOWN, 0, 0);
        let up = WindowMessage::new(WM_LBUTTONUP, 0, 0);
        assert_eq!(capture_decision(&down, true, false, true), Dispatch::Consume);
        assert_eq!(capture_decision(&up, true, false, true), Dispatch::PassThrough);
        assert_eq!(capture_decision(&up, true, false, false), Dispatch::Consume);
        assert_eq!(capture_decision(&down, false, true, true), Dispatch::PassThrough);
    }

    #[test]
    fn captured_keyboard_is_swallowed() {
        let key = WindowMessage::new(WM_KEYDOWN, 0x41, 0);
        assert_eq!(capture_decision(&key, false, true, true), Dispatch::Consume);
        assert_eq!(capture_decision(&key, true, false, true), Dispatch::PassThrough);
        let focus = WindowMessage::new(WM_KILLFOCUS, 0, 0);
        assert_eq!(capture_decision(&focus, true, true, false), Dispatch::PassThrough);
    }

    #[test]
    fn key_press_ignores_auto_repeat() {
        assert!(WindowMessage::new(WM_KEYDOWN, 0x2D, 0).is_key_press(0x2D));
        assert!(!WindowMessage::new(WM_KEYDOWN, 0x2D, 1 << 30).is_key_press(0x2D));
        assert!(!WindowMessage::new(WM_KEYUP, 0x2D, 0).is_key_press(0x2D));
    }
}
