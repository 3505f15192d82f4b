//! Timer/counter resource manager for the three ATmega328P timer units.
//!
//! A unit is claimed with [`TimerManager::initialize`] or
//! [`TimerManager::ctc_initialize`], which hand out the only [`TimerHandle`] for
//! it. Interrupt vectors post [`TimerEvent`]s into a bounded queue and the
//! foreground applies them with [`TimerManager::dispatch_pending`].

mod dispatch;
mod driver;
mod registry;
pub mod unit;

pub use dispatch::{DispatchStats, EventKind, EventQueue, TimerCallbacks, TimerEvent, EVENTS};
pub use driver::TimerManager;
pub use registry::{TimerHandle, TimerRegistry};
pub use unit::{CounterWidth, TimerUnit};

use crate::hal::gpio::Port;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerId {
    Timer0 = 0,
    Timer1 = 1,
    Timer2 = 2,
}

impl TimerId {
    pub const ALL: [TimerId; 3] = [TimerId::Timer0, TimerId::Timer1, TimerId::Timer2];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn unit(self) -> &'static TimerUnit {
        match self {
            TimerId::Timer0 => &unit::TIMER0,
            TimerId::Timer1 => &unit::TIMER1,
            TimerId::Timer2 => &unit::TIMER2,
        }
    }

    /// Whether the unit's clock-select table has an encoding for `clock`.
    pub const fn supports(self, clock: ClockSource) -> bool {
        self.unit().clock_bits(clock).is_some()
    }

    pub const fn max_value(self) -> u16 {
        self.unit().max_value()
    }

    /// Pin driven by the compare output of `channel` (OCnA / OCnB), as a
    /// `(port, mask)` pair for the GPIO driver.
    pub const fn output_pin(self, channel: Channel) -> (Port, u8) {
        match (self, channel) {
            (TimerId::Timer0, Channel::A) => (Port::D, 1 << 6),
            (TimerId::Timer0, Channel::B) => (Port::D, 1 << 5),
            (TimerId::Timer1, Channel::A) => (Port::B, 1 << 1),
            (TimerId::Timer1, Channel::B) => (Port::B, 1 << 2),
            (TimerId::Timer2, Channel::A) => (Port::B, 1 << 3),
            (TimerId::Timer2, Channel::B) => (Port::D, 1 << 3),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    Div1,
    Div8,
    /// Timer2 only
    Div32,
    Div64,
    /// Timer2 only
    Div128,
    Div256,
    Div1024,
    /// Tn pin, Timer0 and Timer1 only
    ExternalFalling,
    ExternalRising,
}

impl ClockSource {
    pub const fn divisor(self) -> Option<u16> {
        match self {
            ClockSource::Div1 => Some(1),
            ClockSource::Div8 => Some(8),
            ClockSource::Div32 => Some(32),
            ClockSource::Div64 => Some(64),
            ClockSource::Div128 => Some(128),
            ClockSource::Div256 => Some(256),
            ClockSource::Div1024 => Some(1024),
            ClockSource::ExternalFalling | ClockSource::ExternalRising => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    #[inline]
    pub(crate) const fn flag(self) -> u8 {
        match self {
            Channel::A => unit::OCFA,
            Channel::B => unit::OCFB,
        }
    }

    #[inline]
    pub(crate) const fn interrupt(self) -> u8 {
        match self {
            Channel::A => unit::OCIEA,
            Channel::B => unit::OCIEB,
        }
    }
}

/// What the OCnx pin does on a compare match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputAction {
    None = 0b00,
    Toggle = 0b01,
    Clear = 0b10,
    Set = 0b11,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerMode {
    /// Free-running; keeps counting after every overflow.
    Autoreload,
    /// Stops itself after the first overflow.
    OneShot,
    /// Clear timer on compare match, reporting on one channel.
    Ctc { channel: Channel, output: OutputAction },
}

impl TimerMode {
    pub const fn channel(self) -> Option<Channel> {
        match self {
            TimerMode::Ctc { channel, .. } => Some(channel),
            TimerMode::Autoreload | TimerMode::OneShot => None,
        }
    }
}

/// Caller-supplied configuration, copied into the unit's slot at init.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerConfig {
    pub timer: TimerId,
    pub clock: ClockSource,
    pub mode: TimerMode,
    /// Counter preset (base modes) or compare value (CTC).
    pub preset: u16,
}

impl TimerConfig {
    /// Placeholder held by a slot nobody owns.
    pub(crate) const fn idle(timer: TimerId) -> Self {
        Self {
            timer,
            clock: ClockSource::Div1,
            mode: TimerMode::Autoreload,
            preset: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    /// Configured, not counting.
    Ready,
    /// Counting and waiting for an event.
    Busy,
    /// Overflow observed.
    Timeout,
    /// Compare match observed.
    Match,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerError {
    /// The unit is already owned by another handle.
    AlreadyOwned,
    /// The unit cannot be clocked from the requested source.
    InvalidClockSource,
    /// The preset does not fit the unit's counter width, or the requested
    /// period cannot be produced.
    PresetOutOfRange,
    /// Base init with a CTC mode, or CTC init with a base mode.
    InvalidMode,
}

impl TimerError {
    pub const fn as_str(self) -> &'static str {
        match self {
            TimerError::AlreadyOwned => "timer already owned",
            TimerError::InvalidClockSource => "invalid clock source for unit",
            TimerError::PresetOutOfRange => "preset out of range",
            TimerError::InvalidMode => "invalid mode for init",
        }
    }
}

impl ufmt::uDisplay for TimerError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}

/// Compare value giving a CTC period of `period_us` (the counter clears at
/// N + 1 counts).
pub const fn compare_value_for(
    timer: TimerId,
    f_cpu_hz: u32,
    clock: ClockSource,
    period_us: u32,
) -> Result<u16, TimerError> {
    match counts_for(timer, f_cpu_hz, clock, period_us) {
        Ok(counts) => {
            if counts == 0 || counts - 1 > timer.max_value() as u64 {
                Err(TimerError::PresetOutOfRange)
            } else {
                Ok((counts - 1) as u16)
            }
        }
        Err(e) => Err(e),
    }
}

/// Counter preset giving an overflow `period_us` after a start in base mode.
pub const fn preset_for_period(
    timer: TimerId,
    f_cpu_hz: u32,
    clock: ClockSource,
    period_us: u32,
) -> Result<u16, TimerError> {
    let span = timer.max_value() as u64 + 1;
    match counts_for(timer, f_cpu_hz, clock, period_us) {
        Ok(counts) => {
            if counts == 0 || counts > span {
                Err(TimerError::PresetOutOfRange)
            } else {
                Ok((span - counts) as u16)
            }
        }
        Err(e) => Err(e),
    }
}

const fn counts_for(
    timer: TimerId,
    f_cpu_hz: u32,
    clock: ClockSource,
    period_us: u32,
) -> Result<u64, TimerError> {
    if !timer.supports(clock) {
        return Err(TimerError::InvalidClockSource);
    }
    match clock.divisor() {
        Some(div) => Ok(f_cpu_hz as u64 * period_us as u64 / (div as u64 * 1_000_000)),
        None => Err(TimerError::InvalidClockSource),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_millisecond_tick_at_16mhz() {
        assert_eq!(
            compare_value_for(TimerId::Timer0, 16_000_000, ClockSource::Div64, 1_000),
            Ok(249)
        );
    }

    #[test]
    fn period_too_long_for_8bit_unit() {
        assert_eq!(
            compare_value_for(TimerId::Timer2, 16_000_000, ClockSource::Div32, 1_000),
            Err(TimerError::PresetOutOfRange)
        );
        assert_eq!(
            compare_value_for(TimerId::Timer1, 16_000_000, ClockSource::Div8, 1_000),
            Ok(1999)
        );
        assert_eq!(
            compare_value_for(TimerId::Timer1, 16_000_000, ClockSource::Div32, 1_000),
            Err(TimerError::InvalidClockSource)
        );
    }

    #[test]
    fn overflow_preset_for_two_milliseconds() {
        assert_eq!(
            preset_for_period(TimerId::Timer0, 16_000_000, ClockSource::Div256, 2_000),
            Ok(131)
        );
    }

    #[test]
    fn external_clock_has_no_period() {
        assert_eq!(
            compare_value_for(TimerId::Timer1, 16_000_000, ClockSource::ExternalRising, 10),
            Err(TimerError::InvalidClockSource)
        );
    }

    #[test]
    fn output_pins_follow_datasheet() {
        assert_eq!(TimerId::Timer1.output_pin(Channel::A), (Port::B, 1 << 1));
        assert_eq!(TimerId::Timer2.output_pin(Channel::B), (Port::D, 1 << 3));
    }

    #[test]
    fn unit_queries_read_the_descriptor() {
        const CLOCKS: [ClockSource; 9] = [
            ClockSource::Div1,
            ClockSource::Div8,
            ClockSource::Div32,
            ClockSource::Div64,
            ClockSource::Div128,
            ClockSource::Div256,
            ClockSource::Div1024,
            ClockSource::ExternalFalling,
            ClockSource::ExternalRising,
        ];
        for id in TimerId::ALL {
            let unit = id.unit();
            assert_eq!(unit.id, id);
            assert_eq!(id.max_value(), unit.max_value());
            for clock in CLOCKS {
                assert_eq!(id.supports(clock), unit.clock_bits(clock).is_some());
            }
        }
        assert_eq!(TimerId::Timer1.max_value(), 0xFFFF);
        assert!(!TimerId::Timer2.supports(ClockSource::ExternalRising));
        assert!(!TimerId::Timer0.supports(ClockSource::Div128));
    }
}
