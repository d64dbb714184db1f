use anyhow::{Result, anyhow};
use tracing::error;
use windows::Win32::UI::WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW};

use super::WindowManager;

#[tracing::instrument]
pub fn get_active_title() -> Result<String> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut text: [u16; 4096] = [0; 4096];
    let len = unsafe { GetWindowTextW(window, &mut text) };
    Ok(String::from_utf16_lossy(&text[..len.max(0) as usize]))
}

#[derive(Default)]
pub struct WindowsWindowManager {}

impl WindowsWindowManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl WindowManager for WindowsWindowManager {
    fn get_active_window_title(&mut self) -> Result<String> {
        get_active_title().inspect_err(|e| error!("Failed to get active window {e:?}"))
    }
}
