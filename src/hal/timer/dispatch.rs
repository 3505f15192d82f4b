//! Interrupt side of the timer driver.
//!
//! The nine timer vectors do nothing but post a [`TimerEvent`]. The state
//! machine runs in the foreground in [`TimerManager::dispatch`], where it can
//! use the manager without sharing it with interrupt context.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use super::driver::TimerManager;
use super::unit::{TOIE, TOV};
use super::{Channel, TimerId, TimerMode, TimerState};
use crate::hal::regs::RegisterBus;

pub const EVENT_QUEUE_DEPTH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Overflow,
    CompareA,
    CompareB,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerEvent {
    pub timer: TimerId,
    pub kind: EventKind,
}

impl TimerEvent {
    pub const fn new(timer: TimerId, kind: EventKind) -> Self {
        Self { timer, kind }
    }
}

struct Pending {
    events: Deque<TimerEvent, EVENT_QUEUE_DEPTH>,
    dropped: u16,
}

/// Bounded single-producer (ISR) / single-consumer (foreground) event queue.
pub struct EventQueue {
    inner: Mutex<RefCell<Pending>>,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Pending {
                events: Deque::new(),
                dropped: 0,
            })),
        }
    }

    /// Returns `false` and counts the loss when the queue is full.
    pub fn post(&self, event: TimerEvent) -> bool {
        critical_section::with(|cs| {
            let mut pending = self.inner.borrow_ref_mut(cs);
            if pending.events.push_back(event).is_err() {
                pending.dropped = pending.dropped.saturating_add(1);
                return false;
            }
            true
        })
    }

    pub fn pop(&self) -> Option<TimerEvent> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).events.pop_front())
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).events.is_empty())
    }

    /// Remove every queued event for `timer`, keeping the order of the rest.
    /// Returns how many were removed.
    pub fn purge(&self, timer: TimerId) -> u16 {
        critical_section::with(|cs| {
            let mut pending = self.inner.borrow_ref_mut(cs);
            let mut purged = 0;
            for _ in 0..pending.events.len() {
                if let Some(event) = pending.events.pop_front() {
                    if event.timer == timer {
                        purged += 1;
                    } else {
                        // Room for it was just freed
                        let _ = pending.events.push_back(event);
                    }
                }
            }
            purged
        })
    }

    /// Events lost to a full queue since startup.
    pub fn dropped(&self) -> u16 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).dropped)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue fed by the interrupt vectors.
pub static EVENTS: EventQueue = EventQueue::new();

/// Application hooks run by the dispatcher. Both default to doing nothing.
pub trait TimerCallbacks {
    fn period_elapsed(&mut self, _timer: TimerId) {}

    fn compare_match(&mut self, _timer: TimerId, _channel: Channel) {}
}

impl TimerCallbacks for () {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u32,
    /// Events for a unit that was not owned, not busy, or not configured for
    /// the channel that fired.
    pub spurious: u16,
}

impl DispatchStats {
    pub const fn new() -> Self {
        Self {
            delivered: 0,
            spurious: 0,
        }
    }
}

impl<B: RegisterBus> TimerManager<B> {
    /// Apply one event. Returns whether a callback ran.
    pub fn dispatch<C: TimerCallbacks + ?Sized>(&mut self, event: TimerEvent, callbacks: &mut C) -> bool {
        let id = event.timer;
        let i = id.index();

        if self.registry.is_available(id) || self.slots[i].state != TimerState::Busy {
            return self.discard();
        }

        match (event.kind, self.slots[i].config.mode) {
            (EventKind::Overflow, TimerMode::Autoreload) => {
                self.slots[i].state = TimerState::Timeout;
                callbacks.period_elapsed(id);
                self.slots[i].state = TimerState::Busy;
            }
            (EventKind::Overflow, TimerMode::OneShot) => {
                self.slots[i].state = TimerState::Timeout;
                callbacks.period_elapsed(id);
                let unit = id.unit();
                self.modify(unit.timsk, |r| r & !TOIE);
                self.halt(id, TOV);
            }
            (EventKind::CompareA, TimerMode::Ctc { channel: Channel::A, .. }) => {
                self.compare(id, Channel::A, callbacks);
            }
            (EventKind::CompareB, TimerMode::Ctc { channel: Channel::B, .. }) => {
                self.compare(id, Channel::B, callbacks);
            }
            _ => return self.discard(),
        }

        self.stats.delivered = self.stats.delivered.wrapping_add(1);
        true
    }

    /// Drain the manager's event queue, returning the number of events taken
    /// from it.
    pub fn dispatch_pending<C: TimerCallbacks + ?Sized>(&mut self, callbacks: &mut C) -> usize {
        let events = self.events;
        let mut taken = 0;
        while let Some(event) = events.pop() {
            self.dispatch(event, callbacks);
            taken += 1;
        }
        taken
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    fn compare<C: TimerCallbacks + ?Sized>(&mut self, id: TimerId, channel: Channel, callbacks: &mut C) {
        let i = id.index();
        self.slots[i].state = TimerState::Match;
        callbacks.compare_match(id, channel);
        self.slots[i].state = TimerState::Busy;
    }

    fn discard(&mut self) -> bool {
        self.stats.spurious = self.stats.spurious.saturating_add(1);
        false
    }
}

#[cfg(target_arch = "avr")]
mod vectors {
    use super::{EventKind, TimerEvent, EVENTS};
    use crate::hal::timer::TimerId;

    macro_rules! timer_vectors {
        ($timer:expr, $ovf:ident, $compa:ident, $compb:ident) => {
            #[avr_device::interrupt(atmega328p)]
            fn $ovf() {
                EVENTS.post(TimerEvent::new($timer, EventKind::Overflow));
            }

            #[avr_device::interrupt(atmega328p)]
            fn $compa() {
                EVENTS.post(TimerEvent::new($timer, EventKind::CompareA));
            }

            #[avr_device::interrupt(atmega328p)]
            fn $compb() {
                EVENTS.post(TimerEvent::new($timer, EventKind::CompareB));
            }
        };
    }

    timer_vectors!(TimerId::Timer0, TIMER0_OVF, TIMER0_COMPA, TIMER0_COMPB);
    timer_vectors!(TimerId::Timer1, TIMER1_OVF, TIMER1_COMPA, TIMER1_COMPB);
    timer_vectors!(TimerId::Timer2, TIMER2_OVF, TIMER2_COMPA, TIMER2_COMPB);
}
