//! Trap entry and exit.
//!
//! The timer and the syscall gate share one path: push a dummy error code
//! and the vector, then every general register and `es`/`ds`, switch to
//! kernel data segments and call the dispatcher with a pointer to the
//! resulting [`TrapFrame`]. On return the (possibly replaced) frame is
//! popped back and `iretq` resumes whatever it describes.

use core::arch::global_asm;

use crate::config::SYSCALL_VECTOR;
use crate::interrupts::gdt::KERNEL_DATA_SELECTOR;
use crate::interrupts::pic::InterruptIndex;
use crate::task::TrapFrame;

global_asm!(
    ".global trap_timer",
    "trap_timer:",
    "    push 0",
    "    push {timer}",
    "    jmp trap_common",
    "",
    ".global trap_syscall",
    "trap_syscall:",
    "    push 0",
    "    push {syscall}",
    "    jmp trap_common",
    "",
    "trap_common:",
    "    push rax",
    "    push rbx",
    "    push rcx",
    "    push rdx",
    "    push rsi",
    "    push rdi",
    "    push rbp",
    "    push r8",
    "    push r9",
    "    push r10",
    "    push r11",
    "    push r12",
    "    push r13",
    "    push r14",
    "    push r15",
    "    mov rax, es",
    "    push rax",
    "    mov rax, ds",
    "    push rax",
    "    mov ax, {kdata}",
    "    mov ds, ax",
    "    mov es, ax",
    "    mov rdi, rsp",
    "    cld",
    "    call {dispatch}",
    "",
    ".global trap_restore",
    "trap_restore:",
    "    pop rax",
    "    mov ds, ax",
    "    pop rax",
    "    mov es, ax",
    "    pop r15",
    "    pop r14",
    "    pop r13",
    "    pop r12",
    "    pop r11",
    "    pop r10",
    "    pop r9",
    "    pop r8",
    "    pop rbp",
    "    pop rdi",
    "    pop rsi",
    "    pop rdx",
    "    pop rcx",
    "    pop rbx",
    "    pop rax",
    "    add rsp, 16",
    "    iretq",
    timer = const InterruptIndex::Timer as u8,
    syscall = const SYSCALL_VECTOR,
    kdata = const KERNEL_DATA_SELECTOR.0,
    dispatch = sym crate::kernel::trap_dispatch,
);

extern "C" {
    pub fn trap_timer();
    pub fn trap_syscall();
    fn trap_restore();
}

/// Drop to ring 3 by restoring `frame` as if returning from a trap.
///
/// # Safety
/// `frame` must describe a user context whose address space is active, and
/// must stay valid until `iretq` has consumed it.
pub unsafe fn enter_user(frame: &TrapFrame) -> ! {
    unsafe {
        core::arch::asm!(
            "mov rsp, {frame}",
            "jmp {restore}",
            frame = in(reg) frame as *const TrapFrame,
            restore = sym trap_restore,
            options(noreturn),
        )
    }
}
