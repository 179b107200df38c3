//! Pointer and keyboard input.
//!
//! On Windows input is simulated with `SendInput`, which games reading raw
//! input accept. Positions are absolute virtual-desktop pixels so clicks land
//! on any monitor.

use std::sync::Arc;

/// Simulated user input. Methods report whether the input was delivered.
pub trait InputController: Send + Sync {
    /// Moves the pointer to the point and clicks the left button.
    fn click(&self, x: i32, y: i32) -> bool;
    fn move_to(&self, x: i32, y: i32) -> bool;
    /// Presses and releases a virtual key code.
    fn press_key(&self, key: u16) -> bool;
    /// Center of the primary screen.
    fn screen_center(&self) -> (i32, i32);
}

/// The input backend for the current platform.
pub fn platform_input() -> Arc<dyn InputController> {
    #[cfg(windows)]
    {
        Arc::new(SendInputController::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedInputController)
    }
}

#[cfg(windows)]
pub use windows_input::SendInputController;

#[cfg(windows)]
mod windows_input {
    use std::time::Duration;

    use tracing::{debug, warn};
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
        KEYEVENTF_KEYUP, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
        MOUSEEVENTF_MOVE, MOUSEEVENTF_VIRTUALDESK, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetSystemMetrics, SM_CXSCREEN, SM_CXVIRTUALSCREEN, SM_CYSCREEN, SM_CYVIRTUALSCREEN,
        SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN,
    };

    use super::InputController;

    #[derive(Debug, Default, Clone, Copy)]
    pub struct SendInputController;

    impl SendInputController {
        pub fn new() -> Self {
            Self
        }

        /// Maps a virtual-desktop pixel to the 0-65535 range `MOUSEEVENTF_ABSOLUTE` expects.
        fn normalize(x: i32, y: i32) -> (i32, i32) {
            let (vx, vy, vw, vh) = unsafe {
                (
                    GetSystemMetrics(SM_XVIRTUALSCREEN),
                    GetSystemMetrics(SM_YVIRTUALSCREEN),
                    GetSystemMetrics(SM_CXVIRTUALSCREEN).max(2),
                    GetSystemMetrics(SM_CYVIRTUALSCREEN).max(2),
                )
            };
            let nx = ((x - vx) as i64 * 65535 / (vw - 1) as i64) as i32;
            let ny = ((y - vy) as i64 * 65535 / (vh - 1) as i64) as i32;
            (nx, ny)
        }

        fn send_mouse(x: i32, y: i32, flags: MOUSE_EVENT_FLAGS) -> bool {
            let (dx, dy) = Self::normalize(x, y);
            let input = INPUT {
                r#type: INPUT_MOUSE,
                Anonymous: INPUT_0 {
                    mi: MOUSEINPUT {
                        dx,
                        dy,
                        dwFlags: flags
                            | MOUSEEVENTF_MOVE
                            | MOUSEEVENTF_ABSOLUTE
                            | MOUSEEVENTF_VIRTUALDESK,
                        ..Default::default()
                    },
                },
            };
            let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
            if sent != 1 {
                warn!("SendInput delivered {} of 1 mouse events", sent);
            }
            sent == 1
        }

        fn send_key(key: u16, flags: KEYBD_EVENT_FLAGS) -> bool {
            let input = INPUT {
                r#type: INPUT_KEYBOARD,
                Anonymous: INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(key),
                        dwFlags: flags,
                        ..Default::default()
                    },
                },
            };
            unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) == 1 }
        }
    }

    impl InputController for SendInputController {
        fn click(&self, x: i32, y: i32) -> bool {
            debug!("Click at ({}, {})", x, y);
            if !Self::send_mouse(x, y, MOUSE_EVENT_FLAGS(0)) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
            if !Self::send_mouse(x, y, MOUSEEVENTF_LEFTDOWN) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
            Self::send_mouse(x, y, MOUSEEVENTF_LEFTUP)
        }

        fn move_to(&self, x: i32, y: i32) -> bool {
            Self::send_mouse(x, y, MOUSE_EVENT_FLAGS(0))
        }

        fn press_key(&self, key: u16) -> bool {
            let down = Self::send_key(key, KEYBD_EVENT_FLAGS(0));
            std::thread::sleep(Duration::from_millis(30));
            let up = Self::send_key(key, KEYEVENTF_KEYUP);
            down && up
        }

        fn screen_center(&self) -> (i32, i32) {
            unsafe { (GetSystemMetrics(SM_CXSCREEN) / 2, GetSystemMetrics(SM_CYSCREEN) / 2) }
        }
    }
}

/// Backend for platforms without input simulation. Every call fails.
#[cfg(not(windows))]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedInputController;

#[cfg(not(windows))]
impl InputController for UnsupportedInputController {
    fn click(&self, x: i32, y: i32) -> bool {
        tracing::warn!("Input simulation is not supported on this platform (click at {}, {})", x, y);
        false
    }

    fn move_to(&self, _x: i32, _y: i32) -> bool {
        false
    }

    fn press_key(&self, _key: u16) -> bool {
        false
    }

    fn screen_center(&self) -> (i32, i32) {
        (0, 0)
    }
}
