//! # Time System Call Handlers
//!
//! Time is counted in timer ticks (`TIMER_HZ` per second).

use crate::memory::Provisioner;
use crate::syscalls::dispatcher::SyscallResult;
use crate::syscalls::Devices;
use crate::task::TaskManager;

/// Suspend the caller. Longer requests are clamped to `i32::MAX` ticks.
///
/// Halts the kernel if there is no running task to put to sleep.
pub fn sys_sleep<P: Provisioner>(tasks: &mut TaskManager<P>, ticks: u64) -> SyscallResult {
    let ticks = i32::try_from(ticks).unwrap_or(i32::MAX);
    if let Err(violation) = tasks.sleep(ticks) {
        panic!("{}", violation);
    }
    Ok(0)
}

/// Ticks since boot, low 32 bits.
pub fn sys_get_ticks<D: Devices>(devices: &D) -> SyscallResult {
    Ok(devices.tick_count() as u32 as i32)
}
