//! # PS/2 Keyboard
//!
//! ```text
//! IRQ1 ──▶ port 0x60 ──▶ ScancodeRing ──▶ Decoder ──▶ getc byte
//! ```
//!
//! The IRQ handler only pushes raw set-1 scancodes. Decoding happens on the
//! reading side, which tracks shift, ctrl and caps lock and turns make codes
//! into ASCII. Ctrl+letter yields the matching control code (Ctrl+C is 3).

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const RING_SIZE: usize = 256;

/// Single-producer single-consumer byte ring. A full ring drops new bytes.
pub struct ScancodeRing {
    slots: [AtomicU8; RING_SIZE],
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl ScancodeRing {
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const EMPTY: AtomicU8 = AtomicU8::new(0);
        Self {
            slots: [EMPTY; RING_SIZE],
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, byte: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % RING_SIZE;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        self.slots[head].store(byte, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let byte = self.slots[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % RING_SIZE, Ordering::Release);
        Some(byte)
    }
}

impl Default for ScancodeRing {
    fn default() -> Self {
        Self::new()
    }
}

static SCANCODES: ScancodeRing = ScancodeRing::new();

/// Called from the IRQ1 handler.
pub fn enqueue_scancode(scancode: u8) {
    SCANCODES.push(scancode);
}

pub fn dequeue_scancode() -> Option<u8> {
    SCANCODES.pop()
}

const EXTENDED: u8 = 0xE0;
const RELEASE: u8 = 0x80;
const LSHIFT: u8 = 0x2A;
const RSHIFT: u8 = 0x36;
const CTRL: u8 = 0x1D;
const CAPS_LOCK: u8 = 0x3A;

/// Set-1 make codes 0x00..0x3A, unshifted.
const PLAIN: &[u8; 0x3A] = b"\0\x1b1234567890-=\x08\tqwertyuiop[]\n\0asdfghjkl;'`\0\\zxcvbnm,./\0*\0 ";
/// Same with shift held.
const SHIFTED: &[u8; 0x3A] = b"\0\x1b!@#$%^&*()_+\x08\tQWERTYUIOP{}\n\0ASDFGHJKL:\"~\0|ZXCVBNM<>?\0*\0 ";

#[derive(Debug, Default)]
pub struct Decoder {
    extended: bool,
    shift: bool,
    ctrl: bool,
    caps_lock: bool,
}

impl Decoder {
    pub const fn new() -> Self {
        Self {
            extended: false,
            shift: false,
            ctrl: false,
            caps_lock: false,
        }
    }

    /// Feed one scancode; returns a byte once a printable key is pressed.
    pub fn feed(&mut self, scancode: u8) -> Option<u8> {
        if scancode == EXTENDED {
            self.extended = true;
            return None;
        }
        let released = scancode & RELEASE != 0;
        let code = scancode & !RELEASE;

        if core::mem::take(&mut self.extended) {
            // right ctrl shares the code; arrows and the rest are ignored
            if code == CTRL {
                self.ctrl = !released;
            }
            return None;
        }

        match code {
            LSHIFT | RSHIFT => self.shift = !released,
            CTRL => self.ctrl = !released,
            CAPS_LOCK if !released => self.caps_lock = !self.caps_lock,
            _ if released => {}
            _ => return self.translate(code),
        }
        None
    }

    fn translate(&self, code: u8) -> Option<u8> {
        let plain = *PLAIN.get(usize::from(code))?;
        if plain == 0 {
            return None;
        }
        if self.ctrl && plain.is_ascii_lowercase() {
            return Some(plain - b'a' + 1);
        }
        let upper = self.shift ^ (self.caps_lock && plain.is_ascii_lowercase());
        Some(if upper { SHIFTED[usize::from(code)] } else { plain })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(codes: &[u8]) -> Vec<u8> {
        let mut decoder = Decoder::new();
        codes.iter().filter_map(|&c| decoder.feed(c)).collect()
    }

    #[test]
    fn plain_keys() {
        // h, i, release i, enter
        assert_eq!(typed(&[0x23, 0x17, 0x97, 0x1C]), b"hi\n");
    }

    #[test]
    fn shift_applies_while_held() {
        // shift down, 1, a, shift up, a
        assert_eq!(typed(&[0x2A, 0x02, 0x1E, 0xAA, 0x1E]), b"!Aa");
    }

    #[test]
    fn caps_lock_only_touches_letters() {
        assert_eq!(typed(&[0x3A, 0xBA, 0x1E, 0x02]), b"A1");
        // shift cancels caps for letters
        assert_eq!(typed(&[0x3A, 0x2A, 0x1E]), b"a");
    }

    #[test]
    fn ctrl_letters_are_control_codes() {
        assert_eq!(typed(&[0x1D, 0x2E, 0x9D, 0x2E]), b"\x03c");
    }

    #[test]
    fn extended_keys_are_dropped() {
        // up arrow press and release, then x
        assert_eq!(typed(&[0xE0, 0x48, 0xE0, 0xC8, 0x2D]), b"x");
    }

    #[test]
    fn ring_is_fifo_and_bounded() {
        let ring = ScancodeRing::new();
        assert_eq!(ring.pop(), None);
        for i in 0..RING_SIZE - 1 {
            assert!(ring.push(i as u8));
        }
        assert!(!ring.push(0xff));
        assert_eq!(ring.pop(), Some(0));
        assert_eq!(ring.pop(), Some(1));
    }
}
