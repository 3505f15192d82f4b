//! Cooperative tick scheduler.
//!
//! A fixed table of tasks advanced once per tick of a single timer. There is
//! no priority beyond table position: tasks due on the same tick run in array
//! order, and each one delays the ones after it.

use super::task::Task;

pub struct Scheduler<C, const N: usize> {
    tasks: [Task<C>; N],
    ticks: u32,
}

impl<C, const N: usize> Scheduler<C, N> {
    pub const fn new(tasks: [Task<C>; N]) -> Self {
        Self { tasks, ticks: 0 }
    }

    /// Advance one tick and run every task that is due. Returns how many fired.
    pub fn tick(&mut self, context: &mut C) -> usize {
        self.ticks = self.ticks.wrapping_add(1);
        let now = self.ticks;

        let mut fired = 0;
        for task in self.tasks.iter_mut() {
            if task.is_due(now) {
                task.fire(now, context);
                fired += 1;
            }
        }
        fired
    }

    /// Ticks since startup or the last [`reset`](Self::reset).
    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Restart the time base; every task waits for its offset again.
    pub fn reset(&mut self) {
        self.ticks = 0;
        for task in self.tasks.iter_mut() {
            task.rewind();
        }
    }

    pub fn tasks(&self) -> &[Task<C>] {
        &self.tasks
    }
}
