//! # Kernel glue
//!
//! Owns the single [`Kernel`] instance and routes traps into it.
//!
//! | Vector | Path                                                   |
//! |--------|--------------------------------------------------------|
//! | 32     | tick counter, sleeper/quantum accounting, preemption   |
//! | 0x30   | [`handle_syscall`], then a switch if one was requested |
//!
//! Both vectors enter through interrupt gates, so the lock is taken with
//! interrupts off and never held across a halt. A `getc` with no key typed
//! winds the caller back onto its `int` and yields; if nothing else can run
//! the CPU halts once, lock released, before the call is replayed.

pub mod devices;
pub mod init;

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;
use x86_64::instructions::interrupts;

use crate::config::SYSCALL_VECTOR;
use crate::interrupts::pic::{end_of_interrupt, InterruptIndex};
use crate::memory::paging::PageTableProvisioner;
use crate::syscalls::{handle_syscall, SyscallOutcome};
use crate::task::{RoundRobin, TaskId, TaskManager, TrapFrame};

pub use devices::KernelDevices;
pub use init::boot;

pub struct Kernel {
    pub tasks: TaskManager<PageTableProvisioner>,
    pub scheduler: RoundRobin,
    pub devices: KernelDevices,
}

pub static KERNEL: Mutex<Option<Kernel>> = Mutex::new(None);

/// Timer interrupts since boot.
pub static TICKS: AtomicU64 = AtomicU64::new(0);

/// Entered from `trap_common` with the frame it built on the trap stack.
/// Whatever `tf` holds on return is what `iretq` resumes.
#[no_mangle]
pub extern "C" fn trap_dispatch(tf: &mut TrapFrame) {
    match tf.vector {
        v if v == u64::from(InterruptIndex::Timer.as_u8()) => on_timer(tf),
        v if v == u64::from(SYSCALL_VECTOR) => on_syscall(tf),
        v => panic!("unexpected trap vector {:#x}", v),
    }
}

fn on_timer(tf: &mut TrapFrame) {
    TICKS.fetch_add(1, Ordering::Relaxed);
    end_of_interrupt(InterruptIndex::Timer);

    let preempt = match KERNEL.try_lock() {
        Some(mut guard) => match guard.as_mut() {
            Some(kernel) => {
                kernel.tasks.timer_tick();
                // kernel-mode ticks come from the idle loop, which picks
                // the next task itself
                if tf.from_user() && kernel.tasks.take_reschedule() {
                    kernel.tasks.save_trap_frame(tf);
                    true
                } else {
                    false
                }
            }
            None => false,
        },
        None => false,
    };

    if preempt {
        reschedule(tf);
    }
}

fn on_syscall(tf: &mut TrapFrame) {
    let (outcome, caller, switch) = {
        let mut guard = KERNEL.lock();
        let Some(kernel) = guard.as_mut() else {
            panic!("system call before boot finished");
        };
        let outcome = handle_syscall(tf, &mut kernel.tasks, &mut kernel.devices);
        (outcome, kernel.tasks.current(), kernel.tasks.take_reschedule())
    };

    if !switch {
        return;
    }
    let next = reschedule(tf);
    if outcome == SyscallOutcome::Blocked && next == caller {
        // only the waiting task is runnable: sleep until a key or a tick
        interrupts::enable_and_hlt();
        interrupts::disable();
    }
}

/// Load the next runnable task into `tf`, halting until one exists.
fn reschedule(tf: &mut TrapFrame) -> Option<TaskId> {
    loop {
        {
            let mut guard = KERNEL.lock();
            if let Some(kernel) = guard.as_mut() {
                if let Some(next) = kernel.tasks.switch_to_next(&mut kernel.scheduler) {
                    *tf = next;
                    return kernel.tasks.current();
                }
            }
        }
        interrupts::enable_and_hlt();
        interrupts::disable();
    }
}
