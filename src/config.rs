//! Compile-time kernel configuration.
//!
//! Task table geometry, scheduling quantum and the user address-space layout
//! are fixed at build time. Change them here and rebuild.

/// Capacity of the task table. Task ids are slot indices, so valid ids are
/// `0..NR_TASKS`.
pub const NR_TASKS: usize = 10;

/// Ticks a task may run before the timer asks for a reschedule.
pub const TIME_QUANT: i32 = 100;

pub const PAGE_SIZE: u64 = 4096;

/// Exclusive top of every task's user stack.
pub const USER_STACK_TOP: u64 = 0xeebf_e000;

/// The user stack occupies `[USER_STACK_TOP - USER_STACK_SIZE, USER_STACK_TOP)`.
pub const USER_STACK_SIZE: u64 = 10 * PAGE_SIZE;

/// Virtual base of the shared user program image in every task.
pub const USER_IMAGE_BASE: u64 = 0x0080_0000;

/// Software interrupt vector for system calls (gate DPL 3).
pub const SYSCALL_VECTOR: u8 = 0x30;

/// Size of the boot kernel stack that the TSS hands to traps from ring 3.
pub const KERNEL_TRAP_STACK_SIZE: usize = 16 * 4096;

/// PIT interrupt rate. One tick is the unit of `sleep` and of the quantum.
pub const TIMER_HZ: u32 = 100;
