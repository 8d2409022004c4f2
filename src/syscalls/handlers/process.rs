use crate::memory::Provisioner;
use crate::println;
use crate::syscalls::dispatcher::{SyscallError, SyscallResult};
use crate::syscalls::numbers::SYS_TEST_MAGIC;
use crate::task::{TaskId, TaskManager};

/// Id of the calling task
pub fn sys_getpid<P: Provisioner>(tasks: &TaskManager<P>) -> SyscallResult {
    tasks
        .current()
        .map(TaskId::as_i32)
        .ok_or(SyscallError::Failed)
}

/// Child id to the parent; the child itself sees 0 through its copied frame.
pub fn sys_fork<P: Provisioner>(tasks: &mut TaskManager<P>) -> SyscallResult {
    match tasks.fork() {
        Ok(child) => Ok(child.as_i32()),
        Err(err) => {
            println!("[task] fork failed: {}", err);
            Err(SyscallError::Failed)
        }
    }
}

/// Always 0, also for ids that name nothing.
pub fn sys_kill<P: Provisioner>(tasks: &mut TaskManager<P>, id: u64) -> SyscallResult {
    if let Some(id) = TaskId::from_raw(id as i64) {
        tasks.kill(id);
    }
    Ok(0)
}

pub fn sys_test() -> SyscallResult {
    Ok(SYS_TEST_MAGIC)
}
