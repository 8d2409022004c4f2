//! # Segmentation
//!
//! One GDT and one TSS for the whole system, built once at boot. The TSS only
//! supplies stacks: `RSP0` for traps out of ring 3 and an IST slot for double
//! faults. Per-task registers live in the trap frame.
//!
//! | Index | Selector | Segment        |
//! |-------|----------|----------------|
//! | 0     | `0x00`   | null           |
//! | 1     | `0x08`   | kernel code    |
//! | 2     | `0x10`   | kernel data    |
//! | 3     | `0x1b`   | user code      |
//! | 4     | `0x23`   | user data      |
//! | 5-6   | `0x28`   | TSS            |

use spin::Lazy;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::{PrivilegeLevel, VirtAddr};

use crate::config::KERNEL_TRAP_STACK_SIZE;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring0);

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 4;

#[repr(align(16))]
struct Stack<const N: usize>([u8; N]);

static mut TRAP_STACK: Stack<KERNEL_TRAP_STACK_SIZE> = Stack([0; KERNEL_TRAP_STACK_SIZE]);
static mut DOUBLE_FAULT_STACK: Stack<DOUBLE_FAULT_STACK_SIZE> = Stack([0; DOUBLE_FAULT_STACK_SIZE]);

fn stack_top<const N: usize>(stack: *const Stack<N>) -> VirtAddr {
    VirtAddr::from_ptr(stack) + N as u64
}

static TSS: Lazy<TaskStateSegment> = Lazy::new(|| {
    let mut tss = TaskStateSegment::new();
    tss.privilege_stack_table[0] = stack_top(core::ptr::addr_of!(TRAP_STACK));
    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] =
        stack_top(core::ptr::addr_of!(DOUBLE_FAULT_STACK));
    tss
});

struct Selectors {
    kernel_code: SegmentSelector,
    kernel_data: SegmentSelector,
    user_code: SegmentSelector,
    user_data: SegmentSelector,
    tss: SegmentSelector,
}

static GDT: Lazy<(GlobalDescriptorTable, Selectors)> = Lazy::new(|| {
    let mut gdt = GlobalDescriptorTable::new();
    let kernel_code = gdt.append(Descriptor::kernel_code_segment());
    let kernel_data = gdt.append(Descriptor::kernel_data_segment());
    let user_code = gdt.append(Descriptor::user_code_segment());
    let user_data = gdt.append(Descriptor::user_data_segment());
    let tss = gdt.append(Descriptor::tss_segment(&TSS));
    (
        gdt,
        Selectors {
            kernel_code,
            kernel_data,
            user_code,
            user_data,
            tss,
        },
    )
});

/// Load the GDT, reload the segment registers, clear LDTR and load TR.
#[cfg(target_os = "none")]
pub fn init() {
    use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};

    let (gdt, selectors) = &*GDT;
    gdt.load();
    unsafe {
        CS::set_reg(selectors.kernel_code);
        DS::set_reg(selectors.kernel_data);
        ES::set_reg(selectors.kernel_data);
        SS::set_reg(selectors.kernel_data);
        // no LDT
        core::arch::asm!("lldt {0:x}", in(reg) 0u16, options(nostack, preserves_flags));
        x86_64::instructions::tables::load_tss(selectors.tss);
    }
}
