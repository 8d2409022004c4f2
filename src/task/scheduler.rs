//! Task selection.

use super::{TaskId, TaskState, TaskTable};
use crate::config::NR_TASKS;

pub trait Scheduler {
    /// Task to run next, or `None` when nothing can run. A still-running
    /// `current` is a valid answer.
    fn pick_next(&mut self, table: &TaskTable, current: Option<TaskId>) -> Option<TaskId>;
}

/// Scan forward from the slot after `current`, wrapping around; the current
/// task is considered last.
#[derive(Debug, Default)]
pub struct RoundRobin;

impl Scheduler for RoundRobin {
    fn pick_next(&mut self, table: &TaskTable, current: Option<TaskId>) -> Option<TaskId> {
        let start = current.map_or(0, |id| id.index() + 1);
        (0..NR_TASKS)
            .map(|offset| (start + offset) % NR_TASKS)
            .filter_map(TaskId::new)
            .find(|&id| {
                let state = table.get(id).state;
                state == TaskState::Runnable || (Some(id) == current && state == TaskState::Running)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: usize) -> TaskId {
        TaskId::new(i).unwrap()
    }

    fn table_with(states: &[(usize, TaskState)]) -> TaskTable {
        let mut table = TaskTable::new();
        for &(i, state) in states {
            table.get_mut(id(i)).state = state;
        }
        table
    }

    #[test]
    fn picks_the_next_runnable_after_current() {
        let table = table_with(&[
            (0, TaskState::Running),
            (1, TaskState::Sleeping),
            (2, TaskState::Runnable),
            (5, TaskState::Runnable),
        ]);
        assert_eq!(RoundRobin.pick_next(&table, Some(id(0))), Some(id(2)));
        assert_eq!(RoundRobin.pick_next(&table, Some(id(2))), Some(id(5)));
    }

    #[test]
    fn wraps_around() {
        let table = table_with(&[(1, TaskState::Runnable), (8, TaskState::Running)]);
        assert_eq!(RoundRobin.pick_next(&table, Some(id(8))), Some(id(1)));
    }

    #[test]
    fn keeps_current_when_alone() {
        let table = table_with(&[(3, TaskState::Running), (4, TaskState::Sleeping)]);
        assert_eq!(RoundRobin.pick_next(&table, Some(id(3))), Some(id(3)));
    }

    #[test]
    fn nothing_runnable() {
        let table = table_with(&[(0, TaskState::Sleeping), (1, TaskState::Stopped)]);
        assert_eq!(RoundRobin.pick_next(&table, Some(id(0))), None);
        assert_eq!(RoundRobin.pick_next(&table, None), None);
    }

    #[test]
    fn no_current_starts_at_zero() {
        let table = table_with(&[(2, TaskState::Runnable), (6, TaskState::Runnable)]);
        assert_eq!(RoundRobin.pick_next(&table, None), Some(id(2)));
    }
}
