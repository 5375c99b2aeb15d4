//! Platform-specific primitives. Only Linux is supported today; the module
//! boundary exists so a future backend doesn't have to touch call sites.

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::*;
