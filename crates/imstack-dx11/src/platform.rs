//! Win32 platform binding: feeds window messages, display size, frame time
//! and the OS cursor into each module's imgui IO.

use std::ffi::c_void;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use imgui::{sys, BackendFlags, Io, Key, MouseButton};
use windows::Win32::Foundation::{HWND, POINT, RECT};
use windows::Win32::Graphics::Gdi::ScreenToClient;
use windows::Win32::UI::Input::KeyboardAndMouse::GetKeyState;
use windows::Win32::UI::WindowsAndMessaging::{
    GetClientRect, GetCursorPos, LoadCursorW, SetCursor, HCURSOR, IDC_ARROW, IDC_HAND, IDC_IBEAM, IDC_NO,
    IDC_SIZEALL, IDC_SIZENESW, IDC_SIZENS, IDC_SIZENWSE, IDC_SIZEWE,
};

use imstack_core::message::*;
use imstack_core::{Capabilities, CursorShape, MessageClass, PlatformBinding, UiContext, WindowMessage};

use crate::context::ImguiContext;

// ─── HostWindow ──────────────────────────────────────────────────────────────

/// Handle of the host window, filled in once the first `Present` reveals it.
#[derive(Debug, Clone, Default)]
pub struct HostWindow(Arc<AtomicIsize>);

impl HostWindow {
    pub(crate) fn set(&self, hwnd: HWND) {
        self.0.store(hwnd.0 as isize, Ordering::Release);
    }

    pub fn hwnd(&self) -> Option<HWND> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            raw => Some(HWND(raw as *mut c_void)),
        }
    }

    fn client_size(&self) -> [f32; 2] {
        let Some(hwnd) = self.hwnd() else {
            return [0.0, 0.0];
        };
        let mut rect = RECT::default();
        if unsafe { GetClientRect(hwnd, &mut rect) }.is_err() {
            return [0.0, 0.0];
        }
        [(rect.right - rect.left) as f32, (rect.bottom - rect.top) as f32]
    }

    fn cursor_pos(&self) -> Option<[f32; 2]> {
        let hwnd = self.hwnd()?;
        let mut point = POINT::default();
        unsafe {
            GetCursorPos(&mut point).ok()?;
            if !ScreenToClient(hwnd, &mut point).as_bool() {
                return None;
            }
        }
        Some([point.x as f32, point.y as f32])
    }
}

// ─── Win32Platform ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Win32Platform {
    window: HostWindow,
}

impl Win32Platform {
    pub fn new(window: HostWindow) -> Self {
        Self { window }
    }
}

impl PlatformBinding<ImguiContext> for Win32Platform {
    fn init_context(&mut self, ctx: &mut ImguiContext) -> anyhow::Result<()> {
        ctx.with_context(|imgui| {
            imgui.set_platform_name(Some(format!("imstack-win32 {}", env!("CARGO_PKG_VERSION"))));
            imgui.io_mut().backend_flags.insert(BackendFlags::HAS_MOUSE_CURSORS);
        })?;
        Ok(())
    }

    fn new_frame(&mut self, ctx: &mut ImguiContext) -> anyhow::Result<()> {
        let display_size = self.window.client_size();
        let delta_time = ctx.tick();
        ctx.set_cursor(self.window.cursor_pos());
        ctx.with_context(|imgui| {
            let io = imgui.io_mut();
            io.display_size = display_size;
            io.delta_time = delta_time;
        })?;

        if ctx.capabilities().contains(Capabilities::CURSOR_CHANGE) {
            let cursor = ctx.requested_cursor();
            if ctx.want_capture_mouse() || !cursor.is_default() {
                set_os_cursor(cursor);
            }
        }
        Ok(())
    }

    fn translate(&mut self, ctx: &mut ImguiContext, msg: &WindowMessage) {
        let class = msg.class();
        let caps = ctx.capabilities();
        if class.contains(MessageClass::MOUSE) && !caps.contains(Capabilities::MOUSE) {
            return;
        }
        if class.contains(MessageClass::KEYBOARD) && !caps.contains(Capabilities::KEYBOARD) {
            return;
        }
        if matches!(msg.msg, WM_LBUTTONDOWN | WM_LBUTTONDBLCLK) {
            ctx.mark_clicked();
        }
        if let Err(e) = ctx.with_context(|imgui| apply_message(imgui.io_mut(), msg)) {
            tracing::trace!("{}: message {:#x} dropped: {e}", ctx.name(), msg.msg);
        }
    }

    fn shutdown_context(&mut self, ctx: &mut ImguiContext) {
        let _ = ctx.with_context(|imgui| imgui.set_platform_name(None));
    }
}

// ─── Message translation ─────────────────────────────────────────────────────

#[inline]
fn loword(v: isize) -> i16 {
    (v & 0xffff) as u16 as i16
}

#[inline]
fn hiword(v: isize) -> i16 {
    ((v >> 16) & 0xffff) as u16 as i16
}

fn wheel_delta(wparam: usize) -> f32 {
    hiword(wparam as isize) as f32 / 120.0
}

fn mouse_button(msg: &WindowMessage) -> Option<(MouseButton, bool)> {
    let extra = || if hiword(msg.wparam as isize) == 1 { MouseButton::Extra1 } else { MouseButton::Extra2 };
    Some(match msg.msg {
        WM_LBUTTONDOWN | WM_LBUTTONDBLCLK => (MouseButton::Left, true),
        WM_RBUTTONDOWN | WM_RBUTTONDBLCLK => (MouseButton::Right, true),
        WM_MBUTTONDOWN | WM_MBUTTONDBLCLK => (MouseButton::Middle, true),
        WM_XBUTTONDOWN | WM_XBUTTONDBLCLK => (extra(), true),
        WM_LBUTTONUP => (MouseButton::Left, false),
        WM_RBUTTONUP => (MouseButton::Right, false),
        WM_MBUTTONUP => (MouseButton::Middle, false),
        WM_XBUTTONUP => (extra(), false),
        _ => return None,
    })
}

pub(crate) fn key_is_down(vk: i32) -> bool {
    unsafe { GetKeyState(vk) < 0 }
}

fn apply_message(io: &mut Io, msg: &WindowMessage) {
    if let Some((button, down)) = mouse_button(msg) {
        io.add_mouse_button_event(button, down);
        return;
    }
    match msg.msg {
        WM_MOUSEMOVE => {
            io.add_mouse_pos_event([loword(msg.lparam) as f32, hiword(msg.lparam) as f32]);
        }
        WM_MOUSELEAVE => io.add_mouse_pos_event([-f32::MAX, -f32::MAX]),
        WM_MOUSEWHEEL => io.add_mouse_wheel_event([0.0, wheel_delta(msg.wparam)]),
        WM_MOUSEHWHEEL => io.add_mouse_wheel_event([-wheel_delta(msg.wparam), 0.0]),
        WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP => {
            let down = matches!(msg.msg, WM_KEYDOWN | WM_SYSKEYDOWN);
            io.add_key_event(Key::ModCtrl, key_is_down(0x11));
            io.add_key_event(Key::ModShift, key_is_down(0x10));
            io.add_key_event(Key::ModAlt, key_is_down(0x12));
            io.add_key_event(Key::ModSuper, key_is_down(0x5B) || key_is_down(0x5C));
            if let Some(key) = virtual_key_to_imgui(msg.wparam as u32) {
                io.add_key_event(key, down);
            }
        }
        // UTF-16 units; imgui pairs surrogates itself.
        WM_CHAR => unsafe { sys::ImGuiIO_AddInputCharacterUTF16(sys::igGetIO(), msg.wparam as u16) },
        WM_SETFOCUS => unsafe { sys::ImGuiIO_AddFocusEvent(sys::igGetIO(), true) },
        WM_KILLFOCUS => unsafe { sys::ImGuiIO_AddFocusEvent(sys::igGetIO(), false) },
        _ => {}
    }
}

const DIGITS: [Key; 10] = [
    Key::Alpha0, Key::Alpha1, Key::Alpha2, Key::Alpha3, Key::Alpha4,
    Key::Alpha5, Key::Alpha6, Key::Alpha7, Key::Alpha8, Key::Alpha9,
];

const LETTERS: [Key; 26] = [
    Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H, Key::I,
    Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P, Key::Q, Key::R,
    Key::S, Key::T, Key::U, Key::V, Key::W, Key::X, Key::Y, Key::Z,
];

const FUNCTION_KEYS: [Key; 12] = [
    Key::F1, Key::F2, Key::F3, Key::F4, Key::F5, Key::F6,
    Key::F7, Key::F8, Key::F9, Key::F10, Key::F11, Key::F12,
];

const KEYPAD: [Key; 10] = [
    Key::Keypad0, Key::Keypad1, Key::Keypad2, Key::Keypad3, Key::Keypad4,
    Key::Keypad5, Key::Keypad6, Key::Keypad7, Key::Keypad8, Key::Keypad9,
];

/// Win32 virtual-key code to imgui key.
pub(crate) fn virtual_key_to_imgui(vk: u32) -> Option<Key> {
    Some(match vk {
        0x08 => Key::Backspace,
        0x09 => Key::Tab,
        0x0D => Key::Enter,
        0x10 | 0xA0 => Key::LeftShift,
        0xA1 => Key::RightShift,
        0x11 | 0xA2 => Key::LeftCtrl,
        0xA3 => Key::RightCtrl,
        0x12 | 0xA4 => Key::LeftAlt,
        0xA5 => Key::RightAlt,
        0x5B => Key::LeftSuper,
        0x5C => Key::RightSuper,
        0x13 => Key::Pause,
        0x14 => Key::CapsLock,
        0x1B => Key::Escape,
        0x20 => Key::Space,
        0x21 => Key::PageUp,
        0x22 => Key::PageDown,
        0x23 => Key::End,
        0x24 => Key::Home,
        0x25 => Key::LeftArrow,
        0x26 => Key::UpArrow,
        0x27 => Key::RightArrow,
        0x28 => Key::DownArrow,
        0x2C => Key::PrintScreen,
        0x2D => Key::Insert,
        0x2E => Key::Delete,
        0x30..=0x39 => DIGITS[(vk - 0x30) as usize],
        0x41..=0x5A => LETTERS[(vk - 0x41) as usize],
        0x60..=0x69 => KEYPAD[(vk - 0x60) as usize],
        0x6A => Key::KeypadMultiply,
        0x6B => Key::KeypadAdd,
        0x6D => Key::KeypadSubtract,
        0x6E => Key::KeypadDecimal,
        0x6F => Key::KeypadDivide,
        0x70..=0x7B => FUNCTION_KEYS[(vk - 0x70) as usize],
        0x90 => Key::NumLock,
        0x91 => Key::ScrollLock,
        0xBA => Key::Semicolon,
        0xBB => Key::Equal,
        0xBC => Key::Comma,
        0xBD => Key::Minus,
        0xBE => Key::Period,
        0xBF => Key::Slash,
        0xC0 => Key::GraveAccent,
        0xDB => Key::LeftBracket,
        0xDC => Key::Backslash,
        0xDD => Key::RightBracket,
        0xDE => Key::Apostrophe,
        _ => return None,
    })
}

fn set_os_cursor(cursor: CursorShape) {
    let id = match cursor {
        CursorShape::Hidden => {
            unsafe { SetCursor(HCURSOR::default()) };
            return;
        }
        CursorShape::Arrow => IDC_ARROW,
        CursorShape::TextInput => IDC_IBEAM,
        CursorShape::ResizeAll => IDC_SIZEALL,
        CursorShape::ResizeNS => IDC_SIZENS,
        CursorShape::ResizeEW => IDC_SIZEWE,
        CursorShape::ResizeNESW => IDC_SIZENESW,
        CursorShape::ResizeNWSE => IDC_SIZENWSE,
        CursorShape::Hand => IDC_HAND,
        CursorShape::NotAllowed => IDC_NO,
    };
    unsafe {
        if let Ok(handle) = LoadCursorW(None, id) {
            SetCursor(handle);
        }
    }
}
