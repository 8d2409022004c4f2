//! # Tasks
//!
//! Fixed-capacity table of user tasks. A task's id is its slot index, so
//! lookup is a plain array access and id reuse falls out of the slot scan.
//!
//! ## States
//!
//! | From               | To        | Trigger                  |
//! |--------------------|-----------|--------------------------|
//! | Free / Stopped     | Runnable  | `create`, `fork`         |
//! | Runnable           | Running   | picked by the scheduler  |
//! | Running            | Runnable  | quantum used up          |
//! | Running            | Sleeping  | `sleep`                  |
//! | Sleeping           | Runnable  | sleep countdown hits 0   |
//! | Running / Sleeping | Stopped   | `kill`                   |
//!
//! Stopped slots hold nothing and are reused by the next creation scan.

mod frame;
pub mod lifecycle;
pub mod scheduler;

use core::fmt;

pub use frame::{Registers, TrapFrame};
pub use lifecycle::TaskManager;
pub use scheduler::{RoundRobin, Scheduler};

use crate::config::NR_TASKS;
use crate::memory::{AddressSpace, MemoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub const fn new(index: usize) -> Option<Self> {
        if index < NR_TASKS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Id from a syscall argument; anything outside the table is `None`.
    pub fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw).ok().and_then(Self::new)
    }

    pub const fn index(self) -> usize {
        self.0
    }

    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Free,
    Runnable,
    Running,
    Sleeping,
    Stopped,
}

impl TaskState {
    /// Holds an address space and may run again.
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Runnable | Self::Running | Self::Sleeping)
    }
}

/// Task control block.
#[derive(Debug)]
pub struct Task {
    pub task_id: TaskId,
    /// `-1` for the first task.
    pub parent_id: i32,
    pub state: TaskState,
    /// Quantum left while running, sleep left while sleeping.
    pub remind_ticks: i32,
    pub address_space: Option<AddressSpace>,
    pub trap_frame: TrapFrame,
}

impl Task {
    fn vacant(task_id: TaskId) -> Self {
        Self {
            task_id,
            parent_id: -1,
            state: TaskState::Free,
            remind_ticks: 0,
            address_space: None,
            trap_frame: TrapFrame::default(),
        }
    }
}

pub struct TaskTable {
    slots: [Task; NR_TASKS],
}

impl TaskTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| Task::vacant(TaskId(i))),
        }
    }

    pub fn get(&self, id: TaskId) -> &Task {
        &self.slots[id.0]
    }

    pub fn get_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.slots[id.0]
    }

    /// Lowest slot that is Free or Stopped.
    pub fn find_free_slot(&self) -> Option<TaskId> {
        self.slots
            .iter()
            .find(|t| matches!(t.state, TaskState::Free | TaskState::Stopped))
            .map(|t| t.task_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.slots.iter_mut()
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// Every slot is taken.
    TableFull,
    /// No frame for a new root table.
    AddressSpaceExhausted,
    /// The operation acts on behalf of a task and there is none.
    NoCurrentTask,
    Memory(MemoryError),
}

impl From<MemoryError> for TaskError {
    fn from(err: MemoryError) -> Self {
        TaskError::Memory(err)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::TableFull => write!(f, "task table full"),
            TaskError::AddressSpaceExhausted => write!(f, "no memory for an address space"),
            TaskError::NoCurrentTask => write!(f, "no current task"),
            TaskError::Memory(err) => write!(f, "{}", err),
        }
    }
}

/// A caller broke the lifecycle contract. Not a return value: the dispatcher
/// halts with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    SleepWithoutRunningTask,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::SleepWithoutRunningTask => {
                write!(f, "sleep requested with no running task")
            }
        }
    }
}
