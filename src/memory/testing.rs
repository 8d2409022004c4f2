//! In-memory [`Provisioner`] for host tests.
//!
//! Frames are plain numbers handed out from a fixed pool with byte contents
//! kept on the side. Each space is a sorted map of page to frame. Page
//! tables are simulated as one frame per touched 2 MiB window, so the frame
//! accounting matches the shape of the real allocator: a stack costs its ten
//! pages plus one table, the program image adds one more.
//!
//! Failures can be injected to drive the rollback paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use x86_64::structures::paging::{Page, PageTableFlags, PhysFrame};
use x86_64::{PhysAddr, VirtAddr};

use super::{AddressSpace, MemoryError, ProgramImage, ProgramRegion, Provisioner, RegionKind};
use crate::config::{PAGE_SIZE, USER_IMAGE_BASE};

const POOL_BASE: u64 = 0x10_0000;
const IMAGE_FRAME_BASE: u64 = 0x4000_0000;
const TABLE_SPAN: u64 = 2 * 1024 * 1024;

#[derive(Default)]
struct Space {
    pages: BTreeMap<Page, (PhysFrame, PageTableFlags)>,
    tables: BTreeMap<u64, PhysFrame>,
}

#[derive(Default)]
pub struct FakeProvisioner {
    free: Vec<PhysFrame>,
    total: usize,
    spaces: HashMap<PhysFrame, Space>,
    bytes: HashMap<PhysFrame, Vec<u8>>,
    active: Option<PhysFrame>,
    /// Every CR3 load, `None` for the kernel root.
    pub activations: Vec<Option<PhysFrame>>,
    /// Succeed this many more frame allocations, then fail.
    pub fail_alloc_after: Option<usize>,
    /// Fail mapping this page.
    pub fail_map_at: Option<Page>,
}

fn frame_at(addr: u64) -> PhysFrame {
    PhysFrame::containing_address(PhysAddr::new(addr))
}

impl FakeProvisioner {
    pub fn with_frames(count: usize) -> Self {
        // popped from the back, so lowest addresses go out first
        let free = (0..count as u64)
            .rev()
            .map(|i| frame_at(POOL_BASE + i * PAGE_SIZE))
            .collect();
        Self {
            free,
            total: count,
            ..Self::default()
        }
    }

    /// A four-region image at the usual base, backed by frames outside the
    /// pool. Region sizes are one page each except bss, which is empty.
    pub fn image() -> ProgramImage {
        let region = |kind, index: u64, size| ProgramRegion {
            kind,
            start: VirtAddr::new(USER_IMAGE_BASE + index * PAGE_SIZE),
            source: VirtAddr::new(IMAGE_FRAME_BASE + index * PAGE_SIZE),
            size,
        };
        ProgramImage {
            regions: [
                region(RegionKind::Text, 0, PAGE_SIZE),
                region(RegionKind::ReadOnlyData, 1, PAGE_SIZE),
                region(RegionKind::Data, 2, PAGE_SIZE),
                region(RegionKind::Bss, 3, 0),
            ],
            entry: VirtAddr::new(USER_IMAGE_BASE),
        }
    }

    fn take_frame(&mut self) -> Option<PhysFrame> {
        match self.fail_alloc_after {
            Some(0) => return None,
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        let frame = self.free.pop()?;
        self.bytes.insert(frame, vec![0; PAGE_SIZE as usize]);
        Some(frame)
    }

    fn give_back(&mut self, frame: PhysFrame) {
        if frame.start_address().as_u64() >= IMAGE_FRAME_BASE {
            return;
        }
        assert!(!self.free.contains(&frame), "double free of {:?}", frame);
        self.bytes.remove(&frame);
        self.free.push(frame);
    }

    fn space(&self, space: &AddressSpace) -> &Space {
        self.spaces.get(&space.root()).expect("unknown address space")
    }

    /// Write into the space rooted at `root` as if its task had stored it.
    pub fn write_user(&mut self, root: PhysFrame, addr: VirtAddr, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let at = addr + i as u64;
            let page = Page::containing_address(at);
            let (frame, _) = self.spaces[&root].pages[&page];
            let offset = (at - page.start_address()) as usize;
            self.bytes.entry(frame).or_insert_with(|| vec![0; PAGE_SIZE as usize])[offset] = *byte;
        }
    }

    pub fn frame_bytes(&self, frame: PhysFrame) -> &[u8] {
        &self.bytes[&frame]
    }

    pub fn mapped_pages(&self, space: &AddressSpace) -> Vec<Page> {
        self.space(space).pages.keys().copied().collect()
    }

    pub fn flags_of(&self, space: &AddressSpace, page: Page) -> Option<PageTableFlags> {
        self.space(space).pages.get(&page).map(|&(_, flags)| flags)
    }

    pub fn live_spaces(&self) -> usize {
        self.spaces.len()
    }

    /// Root in CR3, `None` for the kernel.
    pub fn active(&self) -> Option<PhysFrame> {
        self.active
    }

    pub fn table_count(&self, space: &AddressSpace) -> usize {
        self.space(space).tables.len()
    }
}

impl Provisioner for FakeProvisioner {
    fn new_address_space(&mut self) -> Option<AddressSpace> {
        let root = self.take_frame()?;
        self.spaces.insert(root, Space::default());
        Some(AddressSpace::from_root(root))
    }

    fn alloc_page(&mut self) -> Option<PhysFrame> {
        self.take_frame()
    }

    fn free_page(&mut self, frame: PhysFrame) {
        self.give_back(frame);
    }

    fn map_page(
        &mut self,
        space: &AddressSpace,
        frame: PhysFrame,
        page: Page,
        flags: PageTableFlags,
    ) -> Result<(), MemoryError> {
        if self.fail_map_at == Some(page) {
            return Err(MemoryError::OutOfFrames);
        }
        if self.space(space).pages.contains_key(&page) {
            return Err(MemoryError::AlreadyMapped);
        }
        let window = page.start_address().as_u64() / TABLE_SPAN;
        if !self.space(space).tables.contains_key(&window) {
            let table = self.take_frame().ok_or(MemoryError::OutOfFrames)?;
            self.spaces
                .get_mut(&space.root())
                .expect("unknown address space")
                .tables
                .insert(window, table);
        }
        self.spaces
            .get_mut(&space.root())
            .expect("unknown address space")
            .pages
            .insert(page, (frame, flags));
        Ok(())
    }

    fn unmap_page(&mut self, space: &AddressSpace, page: Page) {
        let removed = self
            .spaces
            .get_mut(&space.root())
            .expect("unknown address space")
            .pages
            .remove(&page);
        if let Some((frame, _)) = removed {
            self.give_back(frame);
        }
    }

    fn unmap_page_tables(&mut self, space: &AddressSpace) {
        let tables = std::mem::take(
            &mut self
                .spaces
                .get_mut(&space.root())
                .expect("unknown address space")
                .tables,
        );
        for table in tables.into_values() {
            self.give_back(table);
        }
        // leaf entries go with their tables
        if let Some(s) = self.spaces.get_mut(&space.root()) {
            s.pages.clear();
        }
    }

    fn free_address_space(&mut self, space: AddressSpace) {
        assert_ne!(self.active, Some(space.root()), "freeing the active space");
        let left = self.spaces.remove(&space.root()).expect("unknown address space");
        assert!(left.tables.is_empty(), "page tables still attached");
        self.give_back(space.root());
    }

    fn lookup_page(&self, space: &AddressSpace, page: Page) -> Option<PhysFrame> {
        self.space(space).pages.get(&page).map(|&(frame, _)| frame)
    }

    fn map_program_region(
        &mut self,
        space: &AddressSpace,
        region: &ProgramRegion,
    ) -> Result<(), MemoryError> {
        for (i, page) in region.pages().enumerate() {
            let frame = frame_at(region.source.as_u64() + i as u64 * PAGE_SIZE);
            self.map_page(space, frame, page, region.flags())?;
        }
        Ok(())
    }

    fn copy_frame(&mut self, src: PhysFrame, dst: PhysFrame) {
        let data = self.bytes[&src].clone();
        self.bytes.insert(dst, data);
    }

    fn read_user(
        &self,
        space: &AddressSpace,
        addr: VirtAddr,
        buf: &mut [u8],
    ) -> Result<(), MemoryError> {
        let pages = &self.space(space).pages;
        for (i, slot) in buf.iter_mut().enumerate() {
            let at = addr
                .as_u64()
                .checked_add(i as u64)
                .and_then(|a| VirtAddr::try_new(a).ok())
                .ok_or(MemoryError::NotMapped(addr))?;
            let page = Page::containing_address(at);
            match pages.get(&page) {
                Some(&(frame, flags)) if flags.contains(PageTableFlags::USER_ACCESSIBLE) => {
                    let offset = (at - page.start_address()) as usize;
                    *slot = self.bytes.get(&frame).map_or(0, |b| b[offset]);
                }
                _ => return Err(MemoryError::NotMapped(at)),
            }
        }
        Ok(())
    }

    fn activate(&mut self, space: &AddressSpace) {
        self.active = Some(space.root());
        self.activations.push(Some(space.root()));
    }

    fn activate_kernel(&mut self) {
        self.active = None;
        self.activations.push(None);
    }

    fn free_page_count(&self) -> usize {
        self.free.len()
    }

    fn used_page_count(&self) -> usize {
        self.total - self.free.len()
    }
}

impl FakeProvisioner {
    /// Frames currently handed out, for leak checks.
    pub fn outstanding(&self) -> BTreeSet<u64> {
        let free: BTreeSet<_> = self.free.iter().map(|f| f.start_address().as_u64()).collect();
        (0..self.total as u64)
            .map(|i| POOL_BASE + i * PAGE_SIZE)
            .filter(|a| !free.contains(a))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{user_stack_pages, USER_STACK_FLAGS};

    #[test]
    fn tables_cost_one_frame_per_window() {
        let mut fake = FakeProvisioner::with_frames(32);
        let space = fake.new_address_space().unwrap();
        for page in user_stack_pages() {
            let frame = fake.alloc_page().unwrap();
            fake.map_page(&space, frame, page, USER_STACK_FLAGS).unwrap();
        }
        assert_eq!(fake.table_count(&space), 1);
        assert_eq!(fake.used_page_count(), 12);

        for page in user_stack_pages() {
            fake.unmap_page(&space, page);
        }
        fake.unmap_page_tables(&space);
        fake.free_address_space(space);
        assert_eq!(fake.used_page_count(), 0);
        assert!(fake.outstanding().is_empty());
    }

    #[test]
    fn image_frames_are_not_pool_frames() {
        let mut fake = FakeProvisioner::with_frames(8);
        let space = fake.new_address_space().unwrap();
        for region in FakeProvisioner::image().regions.iter() {
            fake.map_program_region(&space, region).unwrap();
        }
        // root + one table; the three image pages are outside the pool
        assert_eq!(fake.used_page_count(), 2);
        assert_eq!(fake.mapped_pages(&space).len(), 3);
    }

    #[test]
    fn read_user_rejects_unmapped_bytes() {
        let mut fake = FakeProvisioner::with_frames(8);
        let space = fake.new_address_space().unwrap();
        let page = Page::containing_address(VirtAddr::new(0x40_0000));
        let frame = fake.alloc_page().unwrap();
        fake.map_page(&space, frame, page, USER_STACK_FLAGS).unwrap();
        fake.write_user(space.root(), VirtAddr::new(0x40_0ffe), b"hi");

        let mut buf = [0u8; 2];
        fake.read_user(&space, VirtAddr::new(0x40_0ffe), &mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        let mut buf = [0u8; 3];
        assert_eq!(
            fake.read_user(&space, VirtAddr::new(0x40_0ffe), &mut buf),
            Err(MemoryError::NotMapped(VirtAddr::new(0x40_1000)))
        );
    }

    #[test]
    fn injected_allocation_failure() {
        let mut fake = FakeProvisioner::with_frames(8);
        fake.fail_alloc_after = Some(1);
        assert!(fake.alloc_page().is_some());
        assert!(fake.alloc_page().is_none());
    }
}
