//! Winbar .. window-tracking engine for a taskbar widget: debounces raw OS window events,
//! filters out shell/system windows, keeps a registry of tracked windows with resolved
//! icons, and emits minimal change-sets for a bar renderer to apply.

pub mod config;
pub mod exclusions;
pub mod icons;
pub mod taskbar;
pub mod winsys;

#[cfg (windows)]
pub mod win_apis;

pub use crate::winsys::Hwnd;
