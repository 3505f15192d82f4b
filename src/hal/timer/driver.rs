use super::dispatch::{DispatchStats, EventQueue, EVENTS};
use super::registry::{TimerHandle, TimerRegistry};
use super::unit::{TimerUnit, COMA_SHIFT, COMB_SHIFT, CS_MASK, OCFA, OCFB, OCIEA, OCIEB, TOIE, TOV};
use super::{Channel, TimerConfig, TimerError, TimerId, TimerMode, TimerState};
use crate::hal::irq::IrqPolicy;
use crate::hal::regs::{Reg, RegisterBus};

pub(super) struct Slot {
    pub(super) config: TimerConfig,
    /// CSx2:0 bits resolved at init.
    pub(super) clock_bits: u8,
    pub(super) state: TimerState,
}

impl Slot {
    const fn idle(timer: TimerId) -> Self {
        Self {
            config: TimerConfig::idle(timer),
            clock_bits: 0,
            state: TimerState::Ready,
        }
    }
}

/// Owner of the three timer units and their register surface.
pub struct TimerManager<B> {
    pub(super) bus: B,
    pub(super) registry: TimerRegistry,
    pub(super) slots: [Slot; 3],
    pub(super) policy: IrqPolicy,
    pub(super) stats: DispatchStats,
    pub(super) events: &'static EventQueue,
}

impl<B: RegisterBus> TimerManager<B> {
    /// Manager fed by the interrupt vectors through [`EVENTS`].
    pub fn new(bus: B, policy: IrqPolicy) -> Self {
        Self::with_queue(bus, policy, &EVENTS)
    }

    /// Manager draining `events` instead of the vectors' queue.
    pub fn with_queue(bus: B, policy: IrqPolicy, events: &'static EventQueue) -> Self {
        Self {
            bus,
            registry: TimerRegistry::new(),
            slots: [
                Slot::idle(TimerId::Timer0),
                Slot::idle(TimerId::Timer1),
                Slot::idle(TimerId::Timer2),
            ],
            policy,
            stats: DispatchStats::new(),
            events,
        }
    }

    pub fn events(&self) -> &'static EventQueue {
        self.events
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn policy(&self) -> IrqPolicy {
        self.policy
    }

    pub fn is_available(&self, id: TimerId) -> bool {
        self.registry.is_available(id)
    }

    pub fn config(&self, handle: &TimerHandle) -> TimerConfig {
        self.slots[handle.id().index()].config
    }

    /// Last state recorded by the driver or the dispatcher, without looking at
    /// the hardware flags.
    pub fn recorded_state(&self, handle: &TimerHandle) -> TimerState {
        self.slots[handle.id().index()].state
    }

    /// Claim a unit for overflow-driven use (autoreload or one-shot).
    pub fn initialize(&mut self, config: TimerConfig) -> Result<TimerHandle, TimerError> {
        if config.mode.channel().is_some() {
            return Err(TimerError::InvalidMode);
        }
        self.configure(config)
    }

    /// Claim a unit for clear-on-compare-match use on the configured channel.
    pub fn ctc_initialize(&mut self, config: TimerConfig) -> Result<TimerHandle, TimerError> {
        let (channel, output) = match config.mode {
            TimerMode::Ctc { channel, output } => (channel, output),
            TimerMode::Autoreload | TimerMode::OneShot => return Err(TimerError::InvalidMode),
        };

        let handle = self.configure(config)?;
        let unit = config.timer.unit();
        let (wgm_a, wgm_b) = unit.ctc_wgm;
        let com = match channel {
            Channel::A => (output as u8) << COMA_SHIFT,
            Channel::B => (output as u8) << COMB_SHIFT,
        };

        self.modify(unit.tccra, |r| r | wgm_a | com);
        self.modify(unit.tccrb, |r| r | wgm_b);
        self.load_compare(unit, channel, config.preset);

        Ok(handle)
    }

    /// Release a unit. Does not stop it. Events still queued for the unit are
    /// dropped so a later owner never sees them.
    pub fn deinitialize(&mut self, handle: TimerHandle) {
        let id = handle.id();
        self.registry.unregister(handle);
        self.slots[id.index()] = Slot::idle(id);
        self.purge(id);
    }

    pub fn start(&mut self, handle: &TimerHandle) {
        let i = handle.id().index();
        let unit = handle.id().unit();
        unit.tcnt.write(&mut self.bus, self.slots[i].config.preset);
        self.enable_clock(i, unit);
    }

    pub fn stop(&mut self, handle: &TimerHandle) {
        self.halt(handle.id(), TOV);
    }

    pub fn start_with_interrupt(&mut self, handle: &TimerHandle) {
        let unit = handle.id().unit();
        self.bus.write(unit.tifr, TOV);
        self.modify(unit.timsk, |r| r | TOIE);
        self.start(handle);
    }

    pub fn stop_with_interrupt(&mut self, handle: &TimerHandle) {
        let unit = handle.id().unit();
        self.modify(unit.timsk, |r| r & !TOIE);
        self.stop(handle);
    }

    /// Poll the unit's event flags.
    ///
    /// A pending flag is cleared as it is reported, so two calls after one
    /// event report it once. A one-shot unit is stopped before its overflow is
    /// reported.
    pub fn state(&mut self, handle: &TimerHandle) -> TimerState {
        let id = handle.id();
        let i = id.index();
        let unit = id.unit();
        let flags = self.bus.read(unit.tifr);

        match self.slots[i].config.mode {
            TimerMode::Ctc { channel, .. } => {
                let flag = channel.flag();
                if flags & flag != 0 {
                    self.bus.write(unit.tifr, flag);
                    return TimerState::Match;
                }
            }
            TimerMode::OneShot => {
                if flags & TOV != 0 {
                    self.halt(id, TOV);
                    return TimerState::Timeout;
                }
            }
            TimerMode::Autoreload => {
                if flags & TOV != 0 {
                    self.bus.write(unit.tifr, TOV);
                    return TimerState::Timeout;
                }
            }
        }

        self.slots[i].state
    }

    /// Zero the counter, load the compare register and start counting.
    pub fn ctc_start(&mut self, handle: &TimerHandle) {
        let i = handle.id().index();
        let unit = handle.id().unit();
        let config = self.slots[i].config;

        unit.tcnt.write(&mut self.bus, 0);
        if let Some(channel) = config.mode.channel() {
            self.load_compare(unit, channel, config.preset);
        }
        self.enable_clock(i, unit);
    }

    pub fn ctc_stop(&mut self, handle: &TimerHandle) {
        let flag = self.channel_of(handle).flag();
        self.halt(handle.id(), flag);
    }

    pub fn ctc_start_with_interrupt(&mut self, handle: &TimerHandle) {
        let unit = handle.id().unit();
        let channel = self.channel_of(handle);
        self.bus.write(unit.tifr, channel.flag());
        self.modify(unit.timsk, |r| r | channel.interrupt());
        self.ctc_start(handle);
    }

    pub fn ctc_stop_with_interrupt(&mut self, handle: &TimerHandle) {
        let unit = handle.id().unit();
        let mask = self.channel_of(handle).interrupt();
        self.modify(unit.timsk, |r| r & !mask);
        self.ctc_stop(handle);
    }

    /// Mask every timer interrupt and remove every clock source, owned or not.
    /// Ownership is left as it is.
    pub fn stop_all(&mut self) {
        for id in TimerId::ALL {
            let unit = id.unit();
            self.modify(unit.timsk, |r| r & !(TOIE | OCIEA | OCIEB));
            self.halt(id, TOV | OCFA | OCFB);
        }
    }

    /// Whether the unit's clock-select bits are non-zero.
    pub fn is_counting(&self, id: TimerId) -> bool {
        self.bus.read(id.unit().tccrb) & CS_MASK != 0
    }

    pub fn counter(&self, handle: &TimerHandle) -> u16 {
        handle.id().unit().tcnt.read(&self.bus)
    }

    /// Compare register of the handle's channel.
    pub fn compare_value(&self, handle: &TimerHandle) -> u16 {
        let unit = handle.id().unit();
        match self.channel_of(handle) {
            Channel::A => unit.ocra.read(&self.bus),
            Channel::B => unit.ocrb.read(&self.bus),
        }
    }

    fn configure(&mut self, config: TimerConfig) -> Result<TimerHandle, TimerError> {
        let unit = config.timer.unit();
        let clock_bits = unit
            .clock_bits(config.clock)
            .ok_or(TimerError::InvalidClockSource)?;
        if config.preset > unit.max_value() {
            return Err(TimerError::PresetOutOfRange);
        }

        let handle = self
            .registry
            .register(config.timer)
            .ok_or(TimerError::AlreadyOwned)?;

        self.bus.write(unit.tccra, 0);
        self.bus.write(unit.tccrb, 0);
        self.slots[config.timer.index()] = Slot {
            config,
            clock_bits,
            state: TimerState::Ready,
        };

        Ok(handle)
    }

    fn enable_clock(&mut self, i: usize, unit: &TimerUnit) {
        let bits = self.slots[i].clock_bits;
        self.modify(unit.tccrb, |r| (r & !CS_MASK) | bits);
        self.slots[i].state = TimerState::Busy;
    }

    /// Remove the clock source, clear `flag` by writing it back and discard
    /// the unit's queued events.
    pub(super) fn halt(&mut self, id: TimerId, flag: u8) {
        let unit = id.unit();
        self.modify(unit.tccrb, |r| r & !CS_MASK);
        self.bus.write(unit.tifr, flag);
        self.slots[id.index()].state = TimerState::Ready;
        self.purge(id);
    }

    fn purge(&mut self, id: TimerId) {
        let purged = self.events.purge(id);
        self.stats.spurious = self.stats.spurious.saturating_add(purged);
    }

    pub(super) fn modify(&mut self, reg: Reg, f: impl FnOnce(u8) -> u8) {
        let bus = &mut self.bus;
        self.policy.run(|| bus.modify(reg, f));
    }

    fn load_compare(&mut self, unit: &TimerUnit, channel: Channel, value: u16) {
        match channel {
            Channel::A => unit.ocra.write(&mut self.bus, value),
            Channel::B => {
                // OCRxA is TOP in CTC mode; give channel B a defined period
                unit.ocra.write(&mut self.bus, value);
                unit.ocrb.write(&mut self.bus, value);
            }
        }
    }

    fn channel_of(&self, handle: &TimerHandle) -> Channel {
        self.slots[handle.id().index()]
            .config
            .mode
            .channel()
            .unwrap_or(Channel::A)
    }
}
