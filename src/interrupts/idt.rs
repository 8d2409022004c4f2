//! # Interrupt Descriptor Table
//!
//! | Vector | Handler                | Notes                          |
//! |--------|------------------------|--------------------------------|
//! | #BP    | log and continue       |                                |
//! | #DE    | panic                  |                                |
//! | #UD    | panic                  |                                |
//! | #GP    | panic with error code  |                                |
//! | #PF    | panic with CR2         |                                |
//! | #DF    | panic                  | own IST stack                  |
//! | 32     | `trap_timer`           | trap frame path                |
//! | 33     | keyboard               | fills the scancode ring        |
//! | 0x30   | `trap_syscall`         | DPL 3, callable from user mode |

use spin::Lazy;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};
use x86_64::{PrivilegeLevel, VirtAddr};

use super::gdt::DOUBLE_FAULT_IST_INDEX;
use super::pic::{end_of_interrupt, InterruptIndex};
use super::trap::{trap_syscall, trap_timer};
use crate::config::SYSCALL_VECTOR;
use crate::drivers::ps2_keyboard;
use crate::println;

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    idt.breakpoint.set_handler_fn(breakpoint_handler);
    idt.divide_error.set_handler_fn(divide_error_handler);
    idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
    idt.general_protection_fault
        .set_handler_fn(general_protection_fault_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);
    unsafe {
        idt.double_fault
            .set_handler_fn(double_fault_handler)
            .set_stack_index(DOUBLE_FAULT_IST_INDEX);

        idt[InterruptIndex::Timer.as_u8()]
            .set_handler_addr(VirtAddr::new(trap_timer as usize as u64));
        idt[SYSCALL_VECTOR]
            .set_handler_addr(VirtAddr::new(trap_syscall as usize as u64))
            .set_privilege_level(PrivilegeLevel::Ring3);
    }
    idt[InterruptIndex::Keyboard.as_u8()].set_handler_fn(keyboard_interrupt_handler);

    idt
});

pub fn init_idt() {
    IDT.load();
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: DIVIDE BY ZERO\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    panic!("EXCEPTION: INVALID OPCODE\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "EXCEPTION: GENERAL PROTECTION FAULT (error code: {:#x})\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    panic!(
        "EXCEPTION: PAGE FAULT at {:?} ({:?})\n{:#?}",
        Cr2::read(),
        error_code,
        stack_frame
    );
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT ({})\n{:#?}", error_code, stack_frame);
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let scancode: u8 = unsafe { Port::new(0x60).read() };
    ps2_keyboard::enqueue_scancode(scancode);
    end_of_interrupt(InterruptIndex::Keyboard);
}
