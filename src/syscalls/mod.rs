//! # System calls
//!
//! User code raises vector `0x30` with the number in `rax` and up to five
//! arguments in `rdx, rcx, rbx, rdi, rsi`. The trap glue hands the frame to
//! [`handle_syscall`], which dispatches and writes the 32-bit result back.

pub mod dispatcher;
pub mod handlers;
pub mod numbers;
#[cfg(test)]
pub mod testing;

use dispatcher::{dispatch_syscall, SyscallContext, SyscallError};

use crate::memory::Provisioner;
use crate::task::{TaskManager, TrapFrame};

/// Console, screen and clock as seen by the handlers.
pub trait Devices {
    fn put_char(&mut self, byte: u8);

    /// Next decoded character, or `None` if nothing has been typed.
    fn get_char(&mut self) -> Option<u8>;

    /// VGA palette indices, 0..16.
    fn set_text_color(&mut self, fg: u8, bg: u8);

    fn clear_screen(&mut self);

    fn tick_count(&self) -> u64;
}

/// Length of `int 0x30`, the distance `rip` is wound back to replay a call.
pub const SYSCALL_INSN_LEN: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// The result is in `rax`.
    Completed,
    /// The call could not finish yet. `rip` points at the `int` again and the
    /// caller has yielded, so it retries when next scheduled.
    Blocked,
}

/// Run the call described by `tf` on behalf of the current task.
///
/// The frame is saved into the caller's control block first (fork copies it
/// from there). The result lands in `tf.rax` and, if the caller is still
/// alive, in its saved frame too.
pub fn handle_syscall<P: Provisioner, D: Devices>(
    tf: &mut TrapFrame,
    tasks: &mut TaskManager<P>,
    devices: &mut D,
) -> SyscallOutcome {
    tasks.save_trap_frame(tf);
    let ctx = SyscallContext::from_trap_frame(tf);
    let code = match dispatch_syscall(&ctx, tasks, devices) {
        Ok(value) => value,
        Err(SyscallError::WouldBlock) => {
            tf.rip -= SYSCALL_INSN_LEN;
            tasks.save_trap_frame(tf);
            tasks.yield_now();
            return SyscallOutcome::Blocked;
        }
        Err(err) => err.as_errno(),
    };
    tf.set_return_value(code);
    tasks.set_return_value(code);
    SyscallOutcome::Completed
}
