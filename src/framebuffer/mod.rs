//! # Framebuffer
//!
//! - `framebuffer`: `FramebufferWriter`, an embedded-graphics draw target
//!   over the boot framebuffer
//! - `color`: the VGA text palette
//! - `console`: `TextScreen`, a character grid with wrap and clear

pub mod color;
pub mod console;
pub mod framebuffer;
