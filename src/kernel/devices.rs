//! Console devices behind the syscall handlers: framebuffer text screen
//! mirrored to COM1, PS/2 keyboard input, the PIT tick counter.
//!
//! Input never waits here; an empty ring parks the `getc` caller instead.

use core::sync::atomic::Ordering;

use super::TICKS;
use crate::drivers::ps2_keyboard::{dequeue_scancode, Decoder};
use crate::framebuffer::color::Color;
use crate::framebuffer::console::TextScreen;
use crate::framebuffer::framebuffer::FramebufferWriter;
use crate::serial;
use crate::syscalls::Devices;

pub struct KernelDevices {
    /// Absent when the bootloader found no framebuffer.
    screen: Option<TextScreen<FramebufferWriter>>,
    decoder: Decoder,
}

impl KernelDevices {
    pub fn new(screen: Option<TextScreen<FramebufferWriter>>) -> Self {
        Self {
            screen,
            decoder: Decoder::new(),
        }
    }
}

impl Devices for KernelDevices {
    fn put_char(&mut self, byte: u8) {
        if let Some(screen) = self.screen.as_mut() {
            screen.write_byte(byte);
        }
        serial::write_byte(byte);
    }

    fn get_char(&mut self) -> Option<u8> {
        while let Some(scancode) = dequeue_scancode() {
            if let Some(byte) = self.decoder.feed(scancode) {
                return Some(byte);
            }
        }
        None
    }

    fn set_text_color(&mut self, fg: u8, bg: u8) {
        if let Some(screen) = self.screen.as_mut() {
            screen.set_color(Color::vga(fg), Color::vga(bg));
        }
    }

    fn clear_screen(&mut self) {
        if let Some(screen) = self.screen.as_mut() {
            screen.clear();
        }
    }

    fn tick_count(&self) -> u64 {
        TICKS.load(Ordering::Relaxed)
    }
}
