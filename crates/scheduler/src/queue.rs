//! Indexed min-heap of pending tasks.
//!
//! `std::collections::BinaryHeap` cannot remove an arbitrary element, and
//! deactivation needs exactly that. The queue stores task ids and writes each
//! task's current position back into the task record on every move, so a
//! task can be struck from the middle of the heap in O(log n).

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::task::{Task, TaskId};

#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: Vec<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Id of the earliest task without removing it.
    pub fn peek(&self) -> Option<TaskId> {
        self.heap.first().copied()
    }

    /// Insert a task. A task that already has a position is left alone.
    pub fn push(&mut self, tasks: &mut HashMap<TaskId, Task>, id: TaskId) {
        let Some(task) = tasks.get_mut(&id) else {
            return;
        };
        if task.index().is_some() {
            return;
        }
        let pos = self.heap.len();
        task.set_index(Some(pos));
        self.heap.push(id);
        self.up(tasks, pos);
    }

    /// Remove and return the earliest task.
    pub fn pop(&mut self, tasks: &mut HashMap<TaskId, Task>) -> Option<TaskId> {
        if self.heap.is_empty() {
            return None;
        }
        self.remove(tasks, 0)
    }

    /// Remove the task at heap position `index`.
    pub fn remove(&mut self, tasks: &mut HashMap<TaskId, Task>, index: usize) -> Option<TaskId> {
        if index >= self.heap.len() {
            return None;
        }
        let last = self.heap.len() - 1;
        if index != last {
            self.swap(tasks, index, last);
        }
        let id = self.heap.pop()?;
        if let Some(task) = tasks.get_mut(&id) {
            task.set_index(None);
        }
        if index != last && !self.down(tasks, index) {
            self.up(tasks, index);
        }
        Some(id)
    }

    /// Restore heap order after the task at `index` changed its schedule.
    pub fn fix(&mut self, tasks: &mut HashMap<TaskId, Task>, index: usize) {
        if index < self.heap.len() && !self.down(tasks, index) {
            self.up(tasks, index);
        }
    }

    fn key(tasks: &HashMap<TaskId, Task>, id: TaskId) -> (DateTime<Utc>, u64) {
        let scheduled = tasks
            .get(&id)
            .map(Task::scheduled)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (scheduled, id.seq())
    }

    fn less(&self, tasks: &HashMap<TaskId, Task>, i: usize, j: usize) -> bool {
        Self::key(tasks, self.heap[i]).cmp(&Self::key(tasks, self.heap[j])) == Ordering::Less
    }

    fn swap(&mut self, tasks: &mut HashMap<TaskId, Task>, i: usize, j: usize) {
        self.heap.swap(i, j);
        for pos in [i, j] {
            if let Some(task) = tasks.get_mut(&self.heap[pos]) {
                task.set_index(Some(pos));
            }
        }
    }

    fn up(&mut self, tasks: &mut HashMap<TaskId, Task>, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(tasks, pos, parent) {
                break;
            }
            self.swap(tasks, pos, parent);
            pos = parent;
        }
    }

    /// Sift down from `start`. Returns true if the element moved.
    fn down(&mut self, tasks: &mut HashMap<TaskId, Task>, start: usize) -> bool {
        let n = self.heap.len();
        let mut pos = start;
        loop {
            let left = 2 * pos + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            if left + 1 < n && self.less(tasks, left + 1, left) {
                child = left + 1;
            }
            if !self.less(tasks, child, pos) {
                break;
            }
            self.swap(tasks, pos, child);
            pos = child;
        }
        pos > start
    }
}
