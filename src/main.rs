#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
extern crate rlibc;

#[cfg(target_os = "none")]
mod bare_metal {
    use bootloader_api::config::{BootloaderConfig, Mapping};
    use bootloader_api::{entry_point, BootInfo};
    use core::panic::PanicInfo;

    use taskos::{hlt_loop, kernel, println};

    pub static BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.mappings.physical_memory = Some(Mapping::Dynamic);
        // keep everything the bootloader maps in the kernel half
        config.mappings.dynamic_range_start = Some(0xFFFF_8000_0000_0000);
        config.kernel_stack_size = 64 * 1024;
        config
    };

    entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

    fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
        kernel::boot(boot_info)
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        x86_64::instructions::interrupts::disable();
        println!("PANIC: {} | {:?}", info.message(), info.location());
        hlt_loop()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    eprintln!("kernel: build for x86_64-unknown-none and boot with a bootloader image");
}
