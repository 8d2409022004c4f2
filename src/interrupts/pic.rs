//! # Legacy interrupt routing
//!
//! The two 8259 PICs are remapped past the CPU exceptions and the PIT is
//! reprogrammed to [`TIMER_HZ`](crate::config::TIMER_HZ).
//!
//! | IRQ | Vector | Device   |
//! |-----|--------|----------|
//! | 0   | 32     | PIT      |
//! | 1   | 33     | Keyboard |

use pic8259::ChainedPics;
use spin::Mutex;

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Keyboard = PIC_1_OFFSET + 1,
}

impl InterruptIndex {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

const PIT_BASE_HZ: u32 = 1_193_182;

/// Divisor for PIT channel 0 at `hz`, clamped to what the 16-bit counter holds.
pub fn pit_divisor(hz: u32) -> u16 {
    (PIT_BASE_HZ / hz.max(1)).clamp(1, u32::from(u16::MAX)) as u16
}

/// Remap and unmask the PICs, then start the PIT in rate-generator mode.
#[cfg(target_os = "none")]
pub fn init(hz: u32) {
    use x86_64::instructions::port::Port;

    let divisor = pit_divisor(hz);
    unsafe {
        PICS.lock().initialize();
        // timer and keyboard only
        PICS.lock().write_masks(0b1111_1100, 0b1111_1111);

        Port::<u8>::new(0x43).write(0x34);
        let mut data = Port::<u8>::new(0x40);
        data.write((divisor & 0xff) as u8);
        data.write((divisor >> 8) as u8);
    }
}

/// Acknowledge `irq` at the PIC.
#[cfg(target_os = "none")]
pub fn end_of_interrupt(irq: InterruptIndex) {
    unsafe { PICS.lock().notify_end_of_interrupt(irq.as_u8()) };
}
