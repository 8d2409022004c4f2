use crate::memory::Provisioner;
use crate::syscalls::dispatcher::SyscallResult;
use crate::task::TaskManager;

fn clamp(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

pub fn sys_get_num_free_page<P: Provisioner>(tasks: &TaskManager<P>) -> SyscallResult {
    Ok(clamp(tasks.provisioner().free_page_count()))
}

pub fn sys_get_num_used_page<P: Provisioner>(tasks: &TaskManager<P>) -> SyscallResult {
    Ok(clamp(tasks.provisioner().used_page_count()))
}
