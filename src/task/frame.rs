//! Saved user context.
//!
//! The layout is shared with the trap-entry stubs: they push the hardware
//! frame, a vector and error code, the fifteen general registers and the
//! data segment registers, in that order, then hand `rsp` over as a
//! `&mut TrapFrame`. Field order here is the reverse of the push order.

use crate::interrupts::gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};

/// RFLAGS with IF set and the reserved bit 1.
const USER_RFLAGS: u64 = 0x202;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub ds: u64,
    pub es: u64,
    pub regs: Registers,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// Zeroed registers, user selectors, interrupts enabled.
    pub fn new_user(rip: u64, rsp: u64) -> Self {
        let data = u64::from(USER_DATA_SELECTOR.0);
        Self {
            ds: data,
            es: data,
            ss: data,
            cs: u64::from(USER_CODE_SELECTOR.0),
            rflags: USER_RFLAGS,
            rip,
            rsp,
            ..Self::default()
        }
    }

    /// Syscall results are 32-bit; user code reads `rax` sign-extended.
    pub fn set_return_value(&mut self, value: i32) {
        self.regs.rax = i64::from(value) as u64;
    }

    pub fn return_value(&self) -> i32 {
        self.regs.rax as u32 as i32
    }

    /// Whether the interrupted code ran in ring 3.
    pub fn from_user(&self) -> bool {
        self.cs & 0b11 == 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_push_order() {
        use core::mem::{offset_of, size_of};
        assert_eq!(size_of::<Registers>(), 15 * 8);
        assert_eq!(offset_of!(TrapFrame, regs), 16);
        assert_eq!(offset_of!(TrapFrame, vector), 17 * 8);
        assert_eq!(offset_of!(TrapFrame, rip), 19 * 8);
        assert_eq!(size_of::<TrapFrame>(), 24 * 8);
    }

    #[test]
    fn user_frame_is_ring3() {
        let tf = TrapFrame::new_user(0x80_0000, 0xeebf_e000);
        assert_eq!(tf.cs, 0x1b);
        assert_eq!(tf.ss, 0x23);
        assert_eq!(tf.ds, 0x23);
        assert!(tf.from_user());
        assert_eq!(tf.regs, Registers::default());
    }

    #[test]
    fn negative_results_sign_extend() {
        let mut tf = TrapFrame::default();
        tf.set_return_value(-38);
        assert_eq!(tf.regs.rax, u64::MAX - 37);
        assert_eq!(tf.return_value(), -38);
    }
}
