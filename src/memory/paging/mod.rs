//! # Paging
//!
//! [`PageTableProvisioner`] backs the task subsystem with real 4-level
//! tables. All physical memory is reachable at `phys_offset` (the bootloader
//! maps it there), so tables are edited through `OffsetPageTable` without
//! switching CR3.
//!
//! Every space starts as a copy of the kernel root's upper half
//! (L4 entries 256..512). The lower half belongs to the task; tearing a space
//! down frees the lower-half tables but never the kernel's.

use x86_64::registers::control::{Cr3, Cr3Flags};
use x86_64::structures::paging::{
    mapper::{MapperFlush, TranslateResult},
    FrameAllocator, FrameDeallocator, Mapper, OffsetPageTable, Page, PageTable, PageTableFlags,
    PhysFrame, Size4KiB, Translate,
};
use x86_64::VirtAddr;

use super::frame::RegionFrameAllocator;
use super::{AddressSpace, MemoryError, ProgramRegion, Provisioner};
use crate::config::PAGE_SIZE;

const USER_HALF: core::ops::Range<usize> = 0..256;
const KERNEL_HALF: core::ops::Range<usize> = 256..512;

const TABLE_FLAGS: PageTableFlags = PageTableFlags::PRESENT
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER_ACCESSIBLE);

pub struct PageTableProvisioner {
    frames: RegionFrameAllocator,
    phys_offset: VirtAddr,
    kernel_root: PhysFrame,
    /// Root currently in CR3.
    active: PhysFrame,
}

impl PageTableProvisioner {
    /// Take over the frame allocator; the live CR3 becomes the kernel root.
    ///
    /// # Safety
    /// `phys_offset` must map all of physical memory.
    pub unsafe fn new(frames: RegionFrameAllocator, phys_offset: VirtAddr) -> Self {
        let (kernel_root, _) = Cr3::read();
        Self {
            frames,
            phys_offset,
            kernel_root,
            active: kernel_root,
        }
    }

    fn table(&self, frame: PhysFrame) -> &'static mut PageTable {
        let virt = self.phys_offset + frame.start_address().as_u64();
        unsafe { &mut *virt.as_mut_ptr::<PageTable>() }
    }

    fn mapper(&self, root: PhysFrame) -> OffsetPageTable<'static> {
        unsafe { OffsetPageTable::new(self.table(root), self.phys_offset) }
    }

    fn flush(&self, space: &AddressSpace, flush: MapperFlush<Size4KiB>) {
        if space.root() == self.active {
            flush.flush();
        } else {
            flush.ignore();
        }
    }

    fn release(&mut self, frame: PhysFrame) {
        unsafe { self.frames.deallocate_frame(frame) };
    }
}

impl Provisioner for PageTableProvisioner {
    fn new_address_space(&mut self) -> Option<AddressSpace> {
        let root = self.alloc_page()?;
        let kernel = self.table(self.kernel_root);
        let table = self.table(root);
        for i in KERNEL_HALF {
            table[i] = kernel[i].clone();
        }
        Some(AddressSpace::from_root(root))
    }

    fn alloc_page(&mut self) -> Option<PhysFrame> {
        let frame = self.frames.allocate_frame()?;
        let virt = self.phys_offset + frame.start_address().as_u64();
        unsafe { core::ptr::write_bytes(virt.as_mut_ptr::<u8>(), 0, PAGE_SIZE as usize) };
        Some(frame)
    }

    fn free_page(&mut self, frame: PhysFrame) {
        self.release(frame);
    }

    fn map_page(
        &mut self,
        space: &AddressSpace,
        frame: PhysFrame,
        page: Page,
        flags: PageTableFlags,
    ) -> Result<(), MemoryError> {
        let mut mapper = self.mapper(space.root());
        let flush = unsafe {
            mapper.map_to_with_table_flags(page, frame, flags, TABLE_FLAGS, &mut self.frames)?
        };
        self.flush(space, flush);
        Ok(())
    }

    fn unmap_page(&mut self, space: &AddressSpace, page: Page) {
        let mut mapper = self.mapper(space.root());
        if let Ok((frame, flush)) = mapper.unmap(page) {
            self.flush(space, flush);
            self.release(frame);
        }
    }

    fn unmap_page_tables(&mut self, space: &AddressSpace) {
        let l4 = self.table(space.root());
        for i in USER_HALF {
            let Ok(l3_frame) = l4[i].frame() else { continue };
            let l3 = self.table(l3_frame);
            for l3_entry in l3.iter() {
                let Ok(l2_frame) = l3_entry.frame() else { continue };
                let l2 = self.table(l2_frame);
                for l2_entry in l2.iter() {
                    if let Ok(l1_frame) = l2_entry.frame() {
                        self.release(l1_frame);
                    }
                }
                self.release(l2_frame);
            }
            self.release(l3_frame);
            l4[i].set_unused();
        }
        if space.root() == self.active {
            x86_64::instructions::tlb::flush_all();
        }
    }

    fn free_address_space(&mut self, space: AddressSpace) {
        self.release(space.root());
    }

    fn lookup_page(&self, space: &AddressSpace, page: Page) -> Option<PhysFrame> {
        self.mapper(space.root()).translate_page(page).ok()
    }

    fn map_program_region(
        &mut self,
        space: &AddressSpace,
        region: &ProgramRegion,
    ) -> Result<(), MemoryError> {
        let kernel = self.mapper(self.kernel_root);
        let source = Page::<Size4KiB>::containing_address(region.source);
        for (i, page) in region.pages().enumerate() {
            let src = (source + i as u64).start_address();
            let phys = kernel.translate_addr(src).ok_or(MemoryError::NotMapped(src))?;
            let frame = PhysFrame::containing_address(phys);
            self.map_page(space, frame, page, region.flags())?;
        }
        Ok(())
    }

    fn copy_frame(&mut self, src: PhysFrame, dst: PhysFrame) {
        let from = self.phys_offset + src.start_address().as_u64();
        let to = self.phys_offset + dst.start_address().as_u64();
        unsafe {
            core::ptr::copy_nonoverlapping(
                from.as_ptr::<u8>(),
                to.as_mut_ptr::<u8>(),
                PAGE_SIZE as usize,
            )
        };
    }

    fn read_user(
        &self,
        space: &AddressSpace,
        addr: VirtAddr,
        buf: &mut [u8],
    ) -> Result<(), MemoryError> {
        let mapper = self.mapper(space.root());
        let mut done = 0;
        while done < buf.len() {
            let at = addr
                .as_u64()
                .checked_add(done as u64)
                .and_then(|a| VirtAddr::try_new(a).ok())
                .ok_or(MemoryError::NotMapped(addr))?;
            let (frame, offset) = match mapper.translate(at) {
                TranslateResult::Mapped { frame, offset, flags }
                    if flags.contains(PageTableFlags::USER_ACCESSIBLE) =>
                {
                    (frame, offset)
                }
                _ => return Err(MemoryError::NotMapped(at)),
            };
            let in_page = (frame.size() - offset) as usize;
            let n = in_page.min(buf.len() - done);
            let from = self.phys_offset + frame.start_address().as_u64() + offset;
            unsafe {
                core::ptr::copy_nonoverlapping(from.as_ptr::<u8>(), buf[done..].as_mut_ptr(), n)
            };
            done += n;
        }
        Ok(())
    }

    fn activate(&mut self, space: &AddressSpace) {
        if self.active != space.root() {
            unsafe { Cr3::write(space.root(), Cr3Flags::empty()) };
            self.active = space.root();
        }
    }

    fn activate_kernel(&mut self) {
        if self.active != self.kernel_root {
            unsafe { Cr3::write(self.kernel_root, Cr3Flags::empty()) };
            self.active = self.kernel_root;
        }
    }

    fn free_page_count(&self) -> usize {
        self.frames.free_count()
    }

    fn used_page_count(&self) -> usize {
        self.frames.used_count()
    }
}
