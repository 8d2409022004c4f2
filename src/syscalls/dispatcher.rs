use core::fmt;

use crate::memory::Provisioner;
use crate::println;
use crate::syscalls::handlers;
use crate::syscalls::numbers::SyscallNumber;
use crate::syscalls::Devices;
use crate::task::{TaskManager, TrapFrame};

/// System call result type. User code sees the value (or errno) as a
/// sign-extended 32-bit integer in `rax`.
pub type SyscallResult = Result<i32, SyscallError>;

/// System call errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// The operation was understood but could not be carried out.
    Failed,
    /// A user buffer is not readable.
    BadAddress,
    /// No such syscall number.
    Unsupported,
    /// Input is not ready yet. Never reaches user code: the call is
    /// replayed once the task runs again.
    WouldBlock,
}

impl SyscallError {
    pub fn as_errno(self) -> i32 {
        match self {
            Self::Failed => -1,
            Self::BadAddress => -14,  // EFAULT
            Self::Unsupported => -38, // ENOSYS
            Self::WouldBlock => -11,  // EAGAIN
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "failed"),
            Self::BadAddress => write!(f, "bad user address"),
            Self::Unsupported => write!(f, "unsupported syscall"),
            Self::WouldBlock => write!(f, "would block"),
        }
    }
}

/// System call context - number and arguments pulled from the trap frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallContext {
    pub syscall_num: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
    pub arg4: u64,
    pub arg5: u64,
}

impl SyscallContext {
    /// | Register | Meaning        |
    /// |----------|----------------|
    /// | `rax`    | syscall number |
    /// | `rdx`    | arg1           |
    /// | `rcx`    | arg2           |
    /// | `rbx`    | arg3           |
    /// | `rdi`    | arg4           |
    /// | `rsi`    | arg5           |
    pub fn from_trap_frame(tf: &TrapFrame) -> Self {
        Self {
            syscall_num: tf.regs.rax,
            arg1: tf.regs.rdx,
            arg2: tf.regs.rcx,
            arg3: tf.regs.rbx,
            arg4: tf.regs.rdi,
            arg5: tf.regs.rsi,
        }
    }
}

/// Route one call to its handler.
pub fn dispatch_syscall<P: Provisioner, D: Devices>(
    ctx: &SyscallContext,
    tasks: &mut TaskManager<P>,
    devices: &mut D,
) -> SyscallResult {
    match SyscallNumber::from(ctx.syscall_num) {
        SyscallNumber::Puts => handlers::io::sys_puts(tasks, devices, ctx.arg1, ctx.arg2),
        SyscallNumber::Getc => handlers::io::sys_getc(devices),
        SyscallNumber::GetPid => handlers::process::sys_getpid(tasks),
        SyscallNumber::Fork => handlers::process::sys_fork(tasks),
        SyscallNumber::Kill => handlers::process::sys_kill(tasks, ctx.arg1),
        SyscallNumber::Sleep => handlers::time::sys_sleep(tasks, ctx.arg1),
        SyscallNumber::GetNumFreePage => handlers::memory::sys_get_num_free_page(tasks),
        SyscallNumber::GetNumUsedPage => handlers::memory::sys_get_num_used_page(tasks),
        SyscallNumber::GetTicks => handlers::time::sys_get_ticks(devices),
        SyscallNumber::SetTextColor => {
            handlers::io::sys_settextcolor(devices, ctx.arg1, ctx.arg2)
        }
        SyscallNumber::Cls => handlers::io::sys_cls(devices),
        SyscallNumber::Test => handlers::process::sys_test(),
        SyscallNumber::Unknown => {
            println!("[syscall] unsupported number {}", ctx.syscall_num);
            Err(SyscallError::Unsupported)
        }
    }
}
