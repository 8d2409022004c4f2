//! CPU tables and interrupt plumbing.

pub mod gdt;
pub mod pic;

#[cfg(target_os = "none")]
pub mod idt;
#[cfg(target_os = "none")]
pub mod trap;

/// GDT and TSS, IDT, then the PICs and PIT. Interrupts stay disabled.
#[cfg(target_os = "none")]
pub fn init() {
    gdt::init();
    idt::init_idt();
    pic::init(crate::config::TIMER_HZ);
}
