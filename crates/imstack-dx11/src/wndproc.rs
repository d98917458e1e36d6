//! Subclass of the host window procedure.
//!
//! Messages are routed through the overlay first; whatever it does not
//! consume reaches the host's original procedure untouched.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicIsize, Ordering};

use tracing::{debug, error};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{CallWindowProcW, DefWindowProcW, GWLP_WNDPROC, WNDPROC};

use imstack_core::message::WM_SETCURSOR;
use imstack_core::{Dispatch, WindowMessage};

use crate::{hooks, Dx11Error};

/// Hit-test code of the client area, low word of `WM_SETCURSOR`'s lparam.
const HTCLIENT: isize = 1;

static ORIGINAL: AtomicIsize = AtomicIsize::new(0);
static WINDOW: AtomicIsize = AtomicIsize::new(0);

#[cfg(target_pointer_width = "64")]
unsafe fn set_window_proc(hwnd: HWND, proc_: isize) -> isize {
    windows::Win32::UI::WindowsAndMessaging::SetWindowLongPtrW(hwnd, GWLP_WNDPROC, proc_)
}

#[cfg(target_pointer_width = "32")]
unsafe fn set_window_proc(hwnd: HWND, proc_: isize) -> isize {
    windows::Win32::UI::WindowsAndMessaging::SetWindowLongW(hwnd, GWLP_WNDPROC, proc_ as i32) as isize
}

/// Put [`wnd_proc`] in front of `hwnd`'s procedure. A second call for the
/// same window is a no-op.
///
/// # Safety
///
/// `hwnd` must be a live window owned by this process.
pub(crate) unsafe fn install(hwnd: HWND) -> Result<(), Dx11Error> {
    if WINDOW.load(Ordering::Acquire) == hwnd.0 as isize {
        return Ok(());
    }
    let previous = set_window_proc(hwnd, wnd_proc as usize as isize);
    if previous == 0 {
        return Err(windows::core::Error::from_win32().into());
    }
    ORIGINAL.store(previous, Ordering::Release);
    WINDOW.store(hwnd.0 as isize, Ordering::Release);
    debug!("window procedure of {hwnd:?} subclassed");
    Ok(())
}

/// Hand the window back to its original procedure.
pub(crate) fn uninstall() {
    let window = WINDOW.swap(0, Ordering::AcqRel);
    let original = ORIGINAL.load(Ordering::Acquire);
    if window == 0 || original == 0 {
        return;
    }
    unsafe { set_window_proc(HWND(window as *mut _), original) };
    debug!("window procedure restored");
}

fn original_proc() -> WNDPROC {
    match ORIGINAL.load(Ordering::Acquire) {
        0 => None,
        raw => unsafe { std::mem::transmute::<isize, WNDPROC>(raw) },
    }
}

/// What to do with `msg`, or `None` to forward it.
fn route(msg: &WindowMessage) -> Option<LRESULT> {
    let runtime = hooks::runtime()?;
    let overlay = &runtime.overlay;
    if msg.msg == WM_SETCURSOR
        && msg.lparam & 0xFFFF == HTCLIENT
        && overlay.is_visible()
        && overlay.gate().capture_mouse
    {
        // The overlay owns the cursor shape while it holds the mouse.
        return Some(LRESULT(1));
    }
    match overlay.handle_message(msg) {
        Dispatch::Consume => Some(LRESULT(0)),
        Dispatch::PassThrough => None,
    }
}

unsafe extern "system" fn wnd_proc(hwnd: HWND, umsg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    let msg = WindowMessage::new(umsg, wparam.0, lparam.0);
    match catch_unwind(AssertUnwindSafe(|| route(&msg))) {
        Ok(Some(result)) => return result,
        Ok(None) => {}
        Err(_) => error!("window procedure hook panicked on message {umsg:#x}"),
    }
    let original = original_proc();
    if original.is_some() {
        CallWindowProcW(original, hwnd, umsg, wparam, lparam)
    } else {
        DefWindowProcW(hwnd, umsg, wparam, lparam)
    }
}
