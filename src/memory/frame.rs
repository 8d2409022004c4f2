//! Physical frame allocator.
//!
//! Walks the usable regions of the bootloader memory map front to back and
//! keeps returned frames on an intrusive free list (the link lives in the
//! first eight bytes of the free frame, reached through the physical memory
//! offset mapping). Freed frames are reused before the walk moves on.

use bootloader_api::info::{MemoryRegion, MemoryRegionKind};
use x86_64::structures::paging::{FrameAllocator, FrameDeallocator, PhysFrame, Size4KiB};
use x86_64::{PhysAddr, VirtAddr};

use crate::config::PAGE_SIZE;
use crate::println;

const MAX_REGIONS: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Span {
    start: u64,
    end: u64,
}

pub struct RegionFrameAllocator {
    spans: [Span; MAX_REGIONS],
    span_count: usize,
    span: usize,
    next: u64,
    free_list: Option<PhysFrame>,
    phys_offset: VirtAddr,
    total: usize,
    used: usize,
}

impl RegionFrameAllocator {
    /// # Safety
    /// `phys_offset` must be the offset at which the bootloader mapped all of
    /// physical memory, and every `Usable` region must really be unused.
    pub unsafe fn new(regions: &[MemoryRegion], phys_offset: VirtAddr) -> Self {
        let mut spans = [Span { start: 0, end: 0 }; MAX_REGIONS];
        let mut span_count = 0;
        let mut total = 0;

        for region in regions.iter().filter(|r| r.kind == MemoryRegionKind::Usable) {
            if span_count == MAX_REGIONS {
                break;
            }
            let start = (region.start + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
            let end = region.end & !(PAGE_SIZE - 1);
            // frame 0 doubles as a null link, never hand it out
            let start = start.max(PAGE_SIZE);
            if end <= start {
                continue;
            }
            spans[span_count] = Span { start, end };
            span_count += 1;
            total += ((end - start) / PAGE_SIZE) as usize;
        }

        Self {
            spans,
            span_count,
            span: 0,
            next: spans[0].start,
            free_list: None,
            phys_offset,
            total,
            used: 0,
        }
    }

    pub fn free_count(&self) -> usize {
        self.total - self.used
    }

    pub fn used_count(&self) -> usize {
        self.used
    }

    fn link_of(&self, frame: PhysFrame) -> *mut u64 {
        (self.phys_offset + frame.start_address().as_u64()).as_mut_ptr()
    }

    fn bump(&mut self) -> Option<PhysFrame> {
        while self.span < self.span_count {
            let span = self.spans[self.span];
            if self.next < span.end {
                let frame = PhysFrame::containing_address(PhysAddr::new(self.next));
                self.next += PAGE_SIZE;
                return Some(frame);
            }
            self.span += 1;
            if self.span < self.span_count {
                self.next = self.spans[self.span].start;
            }
        }
        None
    }
}

unsafe impl FrameAllocator<Size4KiB> for RegionFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        let frame = match self.free_list.take() {
            Some(head) => {
                let next = unsafe { self.link_of(head).read() };
                if next != 0 {
                    self.free_list = Some(PhysFrame::containing_address(PhysAddr::new(next)));
                }
                head
            }
            None => self.bump()?,
        };
        self.used += 1;
        Some(frame)
    }
}

impl FrameDeallocator<Size4KiB> for RegionFrameAllocator {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) {
        let next = self.free_list.map_or(0, |f| f.start_address().as_u64());
        unsafe { self.link_of(frame).write(next) };
        self.free_list = Some(frame);
        self.used -= 1;
    }
}

/// Dump the bootloader memory map to the log.
pub fn log_memory_map(regions: &[MemoryRegion]) {
    let mut usable = 0u64;
    let mut reserved = 0u64;
    println!("[boot] memory map:");
    for region in regions {
        let size = region.end - region.start;
        let kind = match region.kind {
            MemoryRegionKind::Usable => "usable",
            MemoryRegionKind::Bootloader => "bootloader",
            MemoryRegionKind::UnknownBios(_) => "bios",
            MemoryRegionKind::UnknownUefi(_) => "uefi",
            _ => "reserved",
        };
        if region.kind == MemoryRegionKind::Usable {
            usable += size;
        } else {
            reserved += size;
        }
        println!(
            "[boot]   {:#018x} - {:#018x} ({:>8} KB) {}",
            region.start,
            region.end,
            size / 1024,
            kind
        );
    }
    println!(
        "[boot] usable {} MB, reserved {} MB",
        usable / (1024 * 1024),
        reserved / (1024 * 1024)
    );
}
