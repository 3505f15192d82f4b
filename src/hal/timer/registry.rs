use super::TimerId;

/// Exclusive ownership of one timer unit.
///
/// Only [`TimerRegistry::register`] creates handles and the type is neither
/// `Copy` nor `Clone`, so holding one proves nobody else drives the unit.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a handle leaks the timer unit until reset"]
pub struct TimerHandle {
    id: TimerId,
}

impl TimerHandle {
    #[inline]
    pub fn id(&self) -> TimerId {
        self.id
    }
}

/// One availability flag per physical unit.
pub struct TimerRegistry {
    available: [bool; 3],
}

impl TimerRegistry {
    pub const fn new() -> Self {
        Self {
            available: [true; 3],
        }
    }

    /// Claim `id`. Returns `None` while another handle owns it. Touches no
    /// hardware.
    pub fn register(&mut self, id: TimerId) -> Option<TimerHandle> {
        let slot = &mut self.available[id.index()];
        if !*slot {
            return None;
        }
        *slot = false;
        Some(TimerHandle { id })
    }

    /// Give the unit back. The hardware keeps whatever state it was left in;
    /// stop it first.
    pub fn unregister(&mut self, handle: TimerHandle) {
        self.available[handle.id.index()] = true;
    }

    #[inline]
    pub fn is_available(&self, id: TimerId) -> bool {
        self.available[id.index()]
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
