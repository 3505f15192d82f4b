/// Work run by a task when it fires; receives the scheduler's context.
pub type TaskAction<C> = fn(&mut C);

/// One periodic duty in the tick table.
pub struct Task<C> {
    action: TaskAction<C>,
    /// Tick of the first firing.
    offset: u32,
    period: u32,
    last_fire: u32,
}

impl<C> Task<C> {
    pub const fn new(action: TaskAction<C>, offset: u32, period: u32) -> Self {
        Self {
            action,
            offset,
            period,
            last_fire: 0,
        }
    }

    /// Due on its offset tick, then whenever `period` ticks have passed since
    /// the last firing.
    #[inline]
    pub fn is_due(&self, tick: u32) -> bool {
        tick == self.offset || (tick > self.offset && tick.wrapping_sub(self.last_fire) >= self.period)
    }

    pub(crate) fn fire(&mut self, tick: u32, context: &mut C) {
        self.last_fire = tick;
        (self.action)(context);
    }

    pub(crate) fn rewind(&mut self) {
        self.last_fire = 0;
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn last_fire(&self) -> u32 {
        self.last_fire
    }
}
