//! # taskos
//!
//! Process/task subsystem of a small single-CPU x86_64 teaching kernel.
//!
//! ## Layout
//!
//! | Module        | Role                                                   |
//! |---------------|--------------------------------------------------------|
//! | `task`        | task table, trap frame, lifecycle, round-robin picker  |
//! | `interrupts`  | GDT/TSS, IDT, PIC, trap-entry stubs                    |
//! | `syscalls`    | syscall numbers, dispatcher, handlers                  |
//! | `memory`      | address-space provisioner, frame allocator, layout     |
//! | `drivers`     | PS/2 keyboard input                                    |
//! | `framebuffer` | text screen on the boot framebuffer                    |
//! | `kernel`      | boot sequence and the trap glue (bare metal only)      |
//! | `user`        | the shared ring-3 program image (bare metal only)      |
//!
//! Everything that does not touch hardware builds on the host too, so
//! `cargo test --lib` exercises the table, lifecycle and dispatcher against
//! an in-memory provisioner.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_os = "none", feature(abi_x86_interrupt))]

pub mod config;
pub mod drivers;
pub mod framebuffer;
pub mod interrupts;
pub mod memory;
pub mod serial;
pub mod syscalls;
pub mod task;

#[cfg(target_os = "none")]
pub mod kernel;
#[cfg(target_os = "none")]
pub mod user;

/// Park the CPU forever.
pub fn hlt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}
