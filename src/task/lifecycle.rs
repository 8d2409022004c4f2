//! # Lifecycle
//!
//! [`TaskManager`] owns the table, the provisioner and the identity of the
//! current task. Every operation that acts "on behalf of" a task reads that
//! identity from here; nothing else in the kernel remembers who is running.
//!
//! Building an address space is all-or-nothing: if any page, table or copy
//! step fails, everything acquired for the new space is released before the
//! error comes back and the slot stays free.
//!
//! Switching is done by the caller. Operations that give up the CPU (sleep,
//! kill, quantum expiry) only raise a reschedule request; the trap glue
//! checks it on the way out and calls [`TaskManager::switch_to_next`].

use super::{
    InvariantViolation, Scheduler, Task, TaskError, TaskId, TaskState, TaskTable, TrapFrame,
};
use crate::config::{TIME_QUANT, USER_STACK_TOP};
use crate::memory::{
    user_stack_pages, AddressSpace, MemoryError, ProgramImage, Provisioner, USER_STACK_FLAGS,
};
use crate::println;

pub struct TaskManager<P: Provisioner> {
    table: TaskTable,
    current: Option<TaskId>,
    provisioner: P,
    image: ProgramImage,
    need_resched: bool,
}

impl<P: Provisioner> TaskManager<P> {
    pub fn new(provisioner: P, image: ProgramImage) -> Self {
        Self {
            table: TaskTable::new(),
            current: None,
            provisioner,
            image,
            need_resched: false,
        }
    }

    pub fn table(&self) -> &TaskTable {
        &self.table
    }

    pub fn task(&self, id: TaskId) -> &Task {
        self.table.get(id)
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn provisioner(&self) -> &P {
        &self.provisioner
    }

    pub fn provisioner_mut(&mut self) -> &mut P {
        &mut self.provisioner
    }

    /// Address space of the current task, if it still has one.
    pub fn current_space(&self) -> Option<&AddressSpace> {
        let id = self.current?;
        self.table.get(id).address_space.as_ref()
    }

    /// New task with a fresh space and user stack, parented to the current
    /// task. Its frame starts at `rip = 0`; callers that want it to run set
    /// the entry point.
    pub fn create(&mut self) -> Result<TaskId, TaskError> {
        let id = self.create_with(
            |this, space| this.map_stack(space),
            TrapFrame::new_user(0, USER_STACK_TOP),
        )?;
        println!("[task] create {} (parent {})", id, self.table.get(id).parent_id);
        Ok(id)
    }

    /// Boot-time: the first task, already running the program entry.
    pub fn spawn_first(&mut self) -> Result<TaskId, TaskError> {
        let entry = self.image.entry.as_u64();
        let id = self.create_with(
            |this, space| {
                this.map_stack(space)?;
                this.map_image(space)
            },
            TrapFrame::new_user(entry, USER_STACK_TOP),
        )?;

        let task = self.table.get_mut(id);
        task.state = TaskState::Running;
        if let Some(space) = task.address_space.as_ref() {
            self.provisioner.activate(space);
        }
        self.current = Some(id);
        println!("[task] spawn {} at {:#x}", id, entry);
        Ok(id)
    }

    /// Duplicate the current task. The child gets a byte copy of the user
    /// stack, the shared program image and the parent's saved frame with
    /// `rax = 0`, so it resumes at the same instruction seeing 0.
    pub fn fork(&mut self) -> Result<TaskId, TaskError> {
        let parent = self.current.ok_or(TaskError::NoCurrentTask)?;
        if !self.table.get(parent).state.is_alive() {
            return Err(TaskError::NoCurrentTask);
        }
        let mut frame = self.table.get(parent).trap_frame;
        frame.set_return_value(0);

        let id = self.create_with(
            |this, space| {
                this.map_stack(space)?;
                this.copy_stack(parent, space)?;
                this.map_image(space)
            },
            frame,
        )?;
        println!("[task] fork {} -> {}", parent, id);
        Ok(id)
    }

    /// Put the running task to sleep for `ticks` timer ticks.
    pub fn sleep(&mut self, ticks: i32) -> Result<(), InvariantViolation> {
        let id = self
            .current
            .filter(|&id| self.table.get(id).state == TaskState::Running)
            .ok_or(InvariantViolation::SleepWithoutRunningTask)?;
        let task = self.table.get_mut(id);
        task.state = TaskState::Sleeping;
        task.remind_ticks = ticks.max(0);
        self.need_resched = true;
        Ok(())
    }

    /// Stop a task and release its memory. Ids outside the table, id 0 and
    /// slots that are already free or stopped are left alone.
    pub fn kill(&mut self, id: TaskId) {
        if id.index() == 0 || !self.table.get(id).state.is_alive() {
            return;
        }
        self.table.get_mut(id).state = TaskState::Stopped;
        self.free(id);
        self.need_resched = true;
        println!("[task] kill {}", id);
    }

    fn free(&mut self, id: TaskId) {
        // never tear down the live mapping
        self.provisioner.activate_kernel();
        if let Some(space) = self.table.get_mut(id).address_space.take() {
            self.release(space);
        }
    }

    /// Timer bookkeeping: sleepers count down and wake at zero, the running
    /// task burns quantum and asks to be switched out when it is gone.
    pub fn timer_tick(&mut self) {
        for task in self.table.iter_mut() {
            match task.state {
                TaskState::Sleeping => {
                    task.remind_ticks = (task.remind_ticks - 1).max(0);
                    if task.remind_ticks == 0 {
                        task.state = TaskState::Runnable;
                    }
                }
                TaskState::Running => {
                    task.remind_ticks = (task.remind_ticks - 1).max(0);
                    if task.remind_ticks == 0 {
                        self.need_resched = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// Give up the CPU without changing state; the caller stays runnable.
    pub fn yield_now(&mut self) {
        self.need_resched = true;
    }

    /// Consume a pending reschedule request.
    pub fn take_reschedule(&mut self) -> bool {
        core::mem::take(&mut self.need_resched)
    }

    /// Hand the CPU to whatever `scheduler` picks. Returns the frame to
    /// resume, with the picked task's space already active, or `None` when
    /// no task can run.
    pub fn switch_to_next<S: Scheduler>(&mut self, scheduler: &mut S) -> Option<TrapFrame> {
        self.need_resched = false;
        let next = scheduler.pick_next(&self.table, self.current)?;

        if let Some(prev) = self.current.filter(|&prev| prev != next) {
            let prev_task = self.table.get_mut(prev);
            if prev_task.state == TaskState::Running {
                prev_task.state = TaskState::Runnable;
            }
            println!("[sched] {} -> {}", prev, next);
        }

        let task = self.table.get_mut(next);
        task.state = TaskState::Running;
        task.remind_ticks = TIME_QUANT;
        if let Some(space) = task.address_space.as_ref() {
            self.provisioner.activate(space);
        }
        self.current = Some(next);
        Some(task.trap_frame)
    }

    /// Record the frame the current task trapped with.
    pub fn save_trap_frame(&mut self, frame: &TrapFrame) {
        if let Some(task) = self.current_alive_mut() {
            task.trap_frame = *frame;
        }
    }

    /// Store a syscall result in the current task's saved frame.
    pub fn set_return_value(&mut self, value: i32) {
        if let Some(task) = self.current_alive_mut() {
            task.trap_frame.set_return_value(value);
        }
    }

    fn current_alive_mut(&mut self) -> Option<&mut Task> {
        let id = self.current?;
        let task = self.table.get_mut(id);
        task.state.is_alive().then_some(task)
    }

    /// Claim the first free slot, build its space with `fill` and install
    /// `frame`. Nothing is written to the table unless every step succeeds.
    fn create_with<F>(&mut self, fill: F, frame: TrapFrame) -> Result<TaskId, TaskError>
    where
        F: FnOnce(&mut Self, &AddressSpace) -> Result<(), TaskError>,
    {
        let id = self.table.find_free_slot().ok_or(TaskError::TableFull)?;
        let space = self.staged(fill)?;
        self.install(id, space, frame);
        Ok(id)
    }

    fn install(&mut self, id: TaskId, space: AddressSpace, frame: TrapFrame) {
        // a stopped current task has no children
        let parent_id = self
            .current
            .filter(|&cur| self.table.get(cur).state.is_alive())
            .map_or(-1, TaskId::as_i32);
        let task = self.table.get_mut(id);
        task.task_id = id;
        task.parent_id = parent_id;
        task.state = TaskState::Runnable;
        task.remind_ticks = TIME_QUANT;
        task.address_space = Some(space);
        task.trap_frame = frame;
    }

    /// Allocate a space and run `fill` on it; on failure the space and
    /// everything `fill` managed to map is released again.
    fn staged<F>(&mut self, fill: F) -> Result<AddressSpace, TaskError>
    where
        F: FnOnce(&mut Self, &AddressSpace) -> Result<(), TaskError>,
    {
        let space = self
            .provisioner
            .new_address_space()
            .ok_or(TaskError::AddressSpaceExhausted)?;
        match fill(self, &space) {
            Ok(()) => Ok(space),
            Err(err) => {
                println!("[task] rolled back: {}", err);
                self.release(space);
                Err(err)
            }
        }
    }

    fn release(&mut self, space: AddressSpace) {
        for page in user_stack_pages() {
            self.provisioner.unmap_page(&space, page);
        }
        self.provisioner.unmap_page_tables(&space);
        self.provisioner.free_address_space(space);
    }

    fn map_stack(&mut self, space: &AddressSpace) -> Result<(), TaskError> {
        for page in user_stack_pages() {
            let frame = self
                .provisioner
                .alloc_page()
                .ok_or(MemoryError::OutOfFrames)?;
            if let Err(err) = self.provisioner.map_page(space, frame, page, USER_STACK_FLAGS) {
                self.provisioner.free_page(frame);
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn copy_stack(&mut self, parent: TaskId, child: &AddressSpace) -> Result<(), TaskError> {
        let parent_space = self
            .table
            .get(parent)
            .address_space
            .as_ref()
            .ok_or(TaskError::NoCurrentTask)?;
        for page in user_stack_pages() {
            let missing = MemoryError::NotMapped(page.start_address());
            let src = self.provisioner.lookup_page(parent_space, page).ok_or(missing)?;
            let dst = self.provisioner.lookup_page(child, page).ok_or(missing)?;
            self.provisioner.copy_frame(src, dst);
        }
        Ok(())
    }

    fn map_image(&mut self, space: &AddressSpace) -> Result<(), TaskError> {
        for region in self.image.regions.iter() {
            self.provisioner.map_program_region(space, region)?;
        }
        Ok(())
    }
}
