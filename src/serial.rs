//! Serial console (COM1) used for kernel logging.

use spin::{Lazy, Mutex};
use uart_16550::SerialPort;

pub static SERIAL: Lazy<Mutex<SerialPort>> = Lazy::new(|| {
    let mut port = unsafe { SerialPort::new(0x3F8) };
    port.init();
    Mutex::new(port)
});

pub fn init() {
    Lazy::force(&SERIAL);
}

/// Raw byte out, used by the console mirror.
#[cfg(not(test))]
pub fn write_byte(byte: u8) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        SERIAL.lock().send(byte);
    });
}

#[cfg(test)]
pub fn write_byte(_byte: u8) {}

#[doc(hidden)]
#[cfg(not(test))]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;
    // The timer IRQ logs too; holding the lock with interrupts on would deadlock.
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = SERIAL.lock().write_fmt(args);
    });
}

#[doc(hidden)]
#[cfg(test)]
pub fn _print(args: core::fmt::Arguments) {
    std::print!("{}", args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
