//! Contains logic for reading the foreground window in different environments.
//! [GenericWindowManager] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use anyhow::Result;

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    /// Title of the focused window. For example 'bash in hello' or 'Vibing in YouTube - Chrome'
    fn get_active_window_title(&mut self) -> Result<String>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No window manager was compiled in, enable the `x11` or `win` feature"
                ))
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_title(&mut self) -> Result<String> {
        self.inner.get_active_window_title()
    }
}

/// Used when no backend could be started. Every lookup fails, so samples get an empty title.
pub struct NoWindowManager;

impl WindowManager for NoWindowManager {
    fn get_active_window_title(&mut self) -> Result<String> {
        Err(anyhow::anyhow!("No window manager available"))
    }
}
