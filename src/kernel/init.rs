//! Boot sequence: bring the machine up in order, hand it to the first task.

use bootloader_api::BootInfo;
use x86_64::VirtAddr;

use super::{Kernel, KernelDevices, KERNEL};
use crate::framebuffer::console::TextScreen;
use crate::framebuffer::framebuffer::FramebufferWriter;
use crate::interrupts::trap::enter_user;
use crate::memory::frame::{log_memory_map, RegionFrameAllocator};
use crate::memory::paging::PageTableProvisioner;
use crate::task::{RoundRobin, TaskManager};
use crate::{println, serial, user};

pub fn boot(boot_info: &'static mut BootInfo) -> ! {
    serial::init();
    println!("[boot] taskos starting");

    if let Err(e) = init_phase("interrupts", || {
        crate::interrupts::init();
        Ok(())
    }) {
        panic!("[boot] {}", e);
    }

    let Some(phys_offset) = boot_info.physical_memory_offset.into_option() else {
        panic!("[boot] bootloader did not map physical memory");
    };
    let phys_offset = VirtAddr::new(phys_offset);
    log_memory_map(&boot_info.memory_regions);
    let frames = unsafe { RegionFrameAllocator::new(&boot_info.memory_regions, phys_offset) };
    println!("[boot] {} free frames", frames.free_count());
    let provisioner = unsafe { PageTableProvisioner::new(frames, phys_offset) };

    let screen = boot_info
        .framebuffer
        .as_mut()
        .map(|fb| TextScreen::new(FramebufferWriter::new(fb)));
    if screen.is_none() {
        println!("[boot] no framebuffer, console output goes to serial only");
    }

    let mut tasks = TaskManager::new(provisioner, user::program_image());
    let first = match tasks.spawn_first() {
        Ok(id) => id,
        Err(e) => panic!("[boot] could not start the first task: {}", e),
    };
    let frame = tasks.task(first).trap_frame;

    *KERNEL.lock() = Some(Kernel {
        tasks,
        scheduler: RoundRobin,
        devices: KernelDevices::new(screen),
    });

    println!("[boot] entering task {}", first);
    unsafe { enter_user(&frame) }
}

fn init_phase(name: &'static str, init_fn: fn() -> Result<(), &'static str>) -> Result<(), &'static str> {
    println!("[boot] {}...", name);
    match init_fn() {
        Ok(()) => {
            println!("[boot] {} ready", name);
            Ok(())
        }
        Err(e) => {
            println!("[boot] {} failed: {}", name, e);
            Err(e)
        }
    }
}
