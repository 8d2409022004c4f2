//! # Console System Call Handlers
//!
//! `puts` copies the user buffer through the provisioner (never through the
//! raw pointer) and writes it byte by byte. Reads never cross a page
//! boundary, so a fault stops output exactly at the first unreadable byte.

use x86_64::VirtAddr;

use crate::config::PAGE_SIZE;
use crate::memory::Provisioner;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::Devices;
use crate::task::TaskManager;

const CHUNK: usize = 64;

/// Write `len` bytes starting at user address `addr`.
pub fn sys_puts<P: Provisioner, D: Devices>(
    tasks: &TaskManager<P>,
    devices: &mut D,
    addr: u64,
    len: u64,
) -> SyscallResult {
    let space = tasks.current_space().ok_or(SyscallError::Failed)?;
    let mut buf = [0u8; CHUNK];
    let mut done = 0u64;
    while done < len {
        let at = addr.checked_add(done).ok_or(SyscallError::BadAddress)?;
        let at = VirtAddr::try_new(at).map_err(|_| SyscallError::BadAddress)?;
        let to_page_end = PAGE_SIZE - at.as_u64() % PAGE_SIZE;
        let n = (len - done).min(to_page_end).min(CHUNK as u64) as usize;

        tasks
            .provisioner()
            .read_user(space, at, &mut buf[..n])
            .map_err(|_| SyscallError::BadAddress)?;
        for &byte in &buf[..n] {
            devices.put_char(byte);
        }
        done += n as u64;
    }
    Ok(0)
}

/// Next typed character. With nothing typed yet the call is parked and
/// replayed later (see [`handle_syscall`](crate::syscalls::handle_syscall)).
pub fn sys_getc<D: Devices>(devices: &mut D) -> SyscallResult {
    devices
        .get_char()
        .map(i32::from)
        .ok_or(SyscallError::WouldBlock)
}

/// Foreground and background as VGA palette indices (low four bits).
pub fn sys_settextcolor<D: Devices>(devices: &mut D, fg: u64, bg: u64) -> SyscallResult {
    devices.set_text_color((fg & 0xf) as u8, (bg & 0xf) as u8);
    Ok(0)
}

pub fn sys_cls<D: Devices>(devices: &mut D) -> SyscallResult {
    devices.clear_screen();
    Ok(0)
}
