//! # Memory
//!
//! The task subsystem never touches page tables itself. Everything it needs
//! from the memory side goes through [`Provisioner`]:
//!
//! - fresh address spaces pre-populated with the kernel's shared mappings
//! - single pages for user stacks, mapped and unmapped one at a time
//! - teardown of a space's page tables and of its root
//! - the shared user program regions (same frames in every task)
//! - page statistics for the memory syscalls
//!
//! ## Implementations
//!
//! | Type                           | Where                         |
//! |--------------------------------|-------------------------------|
//! | `paging::PageTableProvisioner` | x86_64 4-level tables         |
//! | `testing::FakeProvisioner`     | host tests, in-memory frames  |

pub mod frame;
pub mod paging;
#[cfg(test)]
pub mod testing;

use core::fmt;

use x86_64::structures::paging::{
    mapper::MapToError, page::PageRange, Page, PageTableFlags, PhysFrame, Size4KiB,
};
use x86_64::VirtAddr;

use crate::config::{PAGE_SIZE, USER_STACK_SIZE, USER_STACK_TOP};

/// Owning handle to the root table of one address space.
///
/// Deliberately neither `Clone` nor `Copy`: a space belongs to exactly one
/// task and goes back to the provisioner by value.
#[derive(Debug, PartialEq, Eq)]
pub struct AddressSpace {
    root: PhysFrame<Size4KiB>,
}

impl AddressSpace {
    /// Wrap a freshly allocated root frame. Only provisioners mint these.
    pub fn from_root(root: PhysFrame<Size4KiB>) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PhysFrame<Size4KiB> {
        self.root
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Text,
    ReadOnlyData,
    Data,
    Bss,
}

/// One piece of the shared user program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramRegion {
    pub kind: RegionKind,
    /// Where the region appears in every task.
    pub start: VirtAddr,
    /// Where the kernel sees the backing bytes.
    pub source: VirtAddr,
    pub size: u64,
}

impl ProgramRegion {
    pub fn flags(&self) -> PageTableFlags {
        let flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
        match self.kind {
            RegionKind::Text | RegionKind::ReadOnlyData => flags,
            RegionKind::Data | RegionKind::Bss => flags | PageTableFlags::WRITABLE,
        }
    }

    /// User pages covered by the region (empty for a zero-sized region).
    pub fn pages(&self) -> PageRange<Size4KiB> {
        let first = Page::containing_address(self.start);
        if self.size == 0 {
            return Page::range(first, first);
        }
        let last = Page::containing_address(self.start + (self.size - 1));
        Page::range(first, last + 1)
    }
}

/// The one program every task runs: four regions plus the entry point.
#[derive(Debug, Clone, Copy)]
pub struct ProgramImage {
    pub regions: [ProgramRegion; 4],
    pub entry: VirtAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// No physical frame left (for the page or for a page table).
    OutOfFrames,
    /// The page already had a mapping.
    AlreadyMapped,
    /// Nothing user-visible is mapped at this address.
    NotMapped(VirtAddr),
    /// A huge page sits where a page table was expected.
    HugePage,
}

impl From<MapToError<Size4KiB>> for MemoryError {
    fn from(err: MapToError<Size4KiB>) -> Self {
        match err {
            MapToError::FrameAllocationFailed => MemoryError::OutOfFrames,
            MapToError::ParentEntryHugePage => MemoryError::HugePage,
            MapToError::PageAlreadyMapped(_) => MemoryError::AlreadyMapped,
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfFrames => write!(f, "out of physical frames"),
            MemoryError::AlreadyMapped => write!(f, "page already mapped"),
            MemoryError::NotMapped(addr) => write!(f, "{:#x} not mapped", addr.as_u64()),
            MemoryError::HugePage => write!(f, "huge page in the way"),
        }
    }
}

/// Permission for user stack pages.
pub const USER_STACK_FLAGS: PageTableFlags = PageTableFlags::PRESENT
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER_ACCESSIBLE);

/// Pages of the user stack, lowest first.
pub fn user_stack_pages() -> PageRange<Size4KiB> {
    let bottom = VirtAddr::new(USER_STACK_TOP - USER_STACK_SIZE);
    let top = VirtAddr::new(USER_STACK_TOP);
    Page::range(Page::containing_address(bottom), Page::containing_address(top))
}

/// Number of pages in the user stack.
pub const USER_STACK_PAGES: usize = (USER_STACK_SIZE / PAGE_SIZE) as usize;

/// What the task subsystem consumes from the memory side.
///
/// Address spaces are owning handles; every method that only inspects or
/// edits a space borrows it, and `free_address_space` takes it back.
pub trait Provisioner {
    /// A new root table carrying the kernel's shared mappings.
    fn new_address_space(&mut self) -> Option<AddressSpace>;

    /// A zeroed physical page.
    fn alloc_page(&mut self) -> Option<PhysFrame>;

    /// Give back a page that never got mapped.
    fn free_page(&mut self, frame: PhysFrame);

    fn map_page(
        &mut self,
        space: &AddressSpace,
        frame: PhysFrame,
        page: Page,
        flags: PageTableFlags,
    ) -> Result<(), MemoryError>;

    /// Remove the mapping and release the frame behind it. No-op if unmapped.
    fn unmap_page(&mut self, space: &AddressSpace, page: Page);

    /// Release every user-half page table. Leaf frames still mapped (the
    /// shared program image) are left alone.
    fn unmap_page_tables(&mut self, space: &AddressSpace);

    /// Release the root itself. The space must not be active.
    fn free_address_space(&mut self, space: AddressSpace);

    fn lookup_page(&self, space: &AddressSpace, page: Page) -> Option<PhysFrame>;

    /// Map one shared program region (same frames for every space).
    fn map_program_region(
        &mut self,
        space: &AddressSpace,
        region: &ProgramRegion,
    ) -> Result<(), MemoryError>;

    /// Copy a whole page through the kernel's view of physical memory.
    fn copy_frame(&mut self, src: PhysFrame, dst: PhysFrame);

    /// Read user-visible bytes of `space` starting at `addr`.
    fn read_user(
        &self,
        space: &AddressSpace,
        addr: VirtAddr,
        buf: &mut [u8],
    ) -> Result<(), MemoryError>;

    /// Load `space` as the live mapping.
    fn activate(&mut self, space: &AddressSpace);

    /// Load the kernel's own mapping.
    fn activate_kernel(&mut self);

    fn free_page_count(&self) -> usize;

    fn used_page_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_stack_covers_whole_region() {
        let pages: Vec<_> = user_stack_pages().collect();
        assert_eq!(pages.len(), USER_STACK_PAGES);
        assert_eq!(
            pages[0].start_address().as_u64(),
            USER_STACK_TOP - USER_STACK_SIZE
        );
        assert_eq!(
            pages[USER_STACK_PAGES - 1].start_address().as_u64() + PAGE_SIZE,
            USER_STACK_TOP
        );
    }

    #[test]
    fn region_pages_round_outward() {
        let region = ProgramRegion {
            kind: RegionKind::Data,
            start: VirtAddr::new(0x80_0010),
            source: VirtAddr::new(0),
            size: PAGE_SIZE,
        };
        assert_eq!(region.pages().count(), 2);
        assert!(region.flags().contains(PageTableFlags::WRITABLE));

        let empty = ProgramRegion { size: 0, ..region };
        assert_eq!(empty.pages().count(), 0);
    }

    #[test]
    fn text_is_not_writable() {
        let region = ProgramRegion {
            kind: RegionKind::Text,
            start: VirtAddr::new(0x80_0000),
            source: VirtAddr::new(0),
            size: 1,
        };
        assert!(!region.flags().contains(PageTableFlags::WRITABLE));
        assert!(region.flags().contains(PageTableFlags::USER_ACCESSIBLE));
    }
}
