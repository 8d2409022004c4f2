//! The user program.
//!
//! Assembled into the kernel image in its own `.user_image` section as four
//! page-aligned regions. Every task maps the same frames at
//! `USER_IMAGE_BASE`, keeping the regions' offsets from the image start, so
//! the code only uses RIP-relative addressing.
//!
//! It checks the dispatcher with the self-test call, prints a banner and
//! forks. The parent prints a heartbeat every 100 ticks; the child
//! announces itself, sleeps, looks up its own id and kills itself.

use core::arch::global_asm;
use core::ptr::addr_of;

use x86_64::VirtAddr;

use crate::config::{SYSCALL_VECTOR, USER_IMAGE_BASE};
use crate::memory::{ProgramImage, ProgramRegion, RegionKind};
use crate::syscalls::numbers::{SyscallNumber, SYS_TEST_MAGIC};

global_asm!(
    ".pushsection .user_image, \"awx\", @progbits",
    ".balign 4096",
    ".global __user_image_start",
    "__user_image_start:",
    ".global __user_text_start",
    "__user_text_start:",
    ".global user_entry",
    "user_entry:",
    "    mov rax, {test}",
    "    int {vector}",
    "    cmp eax, {magic}",
    "    jne user_broken",
    "    lea rdx, [rip + user_banner]",
    "    lea rcx, [rip + user_banner_end]",
    "    sub rcx, rdx",
    "    mov rax, {puts}",
    "    int {vector}",
    "    mov rax, {fork}",
    "    int {vector}",
    "    test eax, eax",
    "    jz user_child",
    "    js user_broken",
    "user_parent_loop:",
    "    lock inc qword ptr [rip + user_heartbeats]",
    "    lea rdx, [rip + user_parent_msg]",
    "    lea rcx, [rip + user_parent_msg_end]",
    "    sub rcx, rdx",
    "    mov rax, {puts}",
    "    int {vector}",
    "    mov rdx, 100",
    "    mov rax, {sleep}",
    "    int {vector}",
    "    jmp user_parent_loop",
    "user_child:",
    "    lea rdx, [rip + user_child_msg]",
    "    lea rcx, [rip + user_child_msg_end]",
    "    sub rcx, rdx",
    "    mov rax, {puts}",
    "    int {vector}",
    "    mov rdx, 50",
    "    mov rax, {sleep}",
    "    int {vector}",
    "    mov rax, {getpid}",
    "    int {vector}",
    "    mov [rip + user_child_pid], rax",
    "    mov rdx, rax",
    "    mov rax, {kill}",
    "    int {vector}",
    "user_broken:",
    "    lea rdx, [rip + user_broken_msg]",
    "    lea rcx, [rip + user_broken_msg_end]",
    "    sub rcx, rdx",
    "    mov rax, {puts}",
    "    int {vector}",
    "user_spin:",
    "    pause",
    "    jmp user_spin",
    ".global __user_text_end",
    "__user_text_end:",
    "",
    ".balign 4096",
    ".global __user_rodata_start",
    "__user_rodata_start:",
    "user_banner: .ascii \"[user] hello from ring 3\\n\"",
    "user_banner_end:",
    "user_parent_msg: .ascii \"[user] parent tick\\n\"",
    "user_parent_msg_end:",
    "user_child_msg: .ascii \"[user] child running\\n\"",
    "user_child_msg_end:",
    "user_broken_msg: .ascii \"[user] unexpected syscall result\\n\"",
    "user_broken_msg_end:",
    ".global __user_rodata_end",
    "__user_rodata_end:",
    "",
    ".balign 4096",
    ".global __user_data_start",
    "__user_data_start:",
    "user_heartbeats: .quad 0",
    ".global __user_data_end",
    "__user_data_end:",
    "",
    ".balign 4096",
    ".global __user_bss_start",
    "__user_bss_start:",
    "user_child_pid: .zero 8",
    ".global __user_bss_end",
    "__user_bss_end:",
    ".balign 4096",
    ".popsection",
    vector = const SYSCALL_VECTOR,
    test = const SyscallNumber::Test as u64,
    magic = const SYS_TEST_MAGIC,
    puts = const SyscallNumber::Puts as u64,
    fork = const SyscallNumber::Fork as u64,
    sleep = const SyscallNumber::Sleep as u64,
    getpid = const SyscallNumber::GetPid as u64,
    kill = const SyscallNumber::Kill as u64,
);

extern "C" {
    static __user_image_start: u8;
    static __user_text_start: u8;
    static __user_text_end: u8;
    static __user_rodata_start: u8;
    static __user_rodata_end: u8;
    static __user_data_start: u8;
    static __user_data_end: u8;
    static __user_bss_start: u8;
    static __user_bss_end: u8;
    fn user_entry();
}

/// Where the linked image lives and where tasks see it.
pub fn program_image() -> ProgramImage {
    let (base, bounds) = unsafe {
        (
            addr_of!(__user_image_start) as u64,
            [
                (addr_of!(__user_text_start), addr_of!(__user_text_end)),
                (addr_of!(__user_rodata_start), addr_of!(__user_rodata_end)),
                (addr_of!(__user_data_start), addr_of!(__user_data_end)),
                (addr_of!(__user_bss_start), addr_of!(__user_bss_end)),
            ],
        )
    };
    let user = |kernel: u64| VirtAddr::new(USER_IMAGE_BASE + (kernel - base));
    let kinds = [
        RegionKind::Text,
        RegionKind::ReadOnlyData,
        RegionKind::Data,
        RegionKind::Bss,
    ];
    let regions = core::array::from_fn(|i| {
        let (start, end) = (bounds[i].0 as u64, bounds[i].1 as u64);
        ProgramRegion {
            kind: kinds[i],
            start: user(start),
            source: VirtAddr::new(start),
            size: end - start,
        }
    });
    ProgramImage {
        regions,
        entry: user(user_entry as usize as u64),
    }
}
