//! Configuration constants for the ATmega328P firmware

use crate::hal::adc::AdcPrescaler;
use crate::hal::clock::{self, ClockPrescaler};
use crate::hal::irq::IrqPolicy;
use crate::hal::timer::{compare_value_for, Channel, ClockSource, OutputAction, TimerConfig, TimerId, TimerMode};
use crate::logger::Level;

/// Crystal frequency in Hz
pub const F_CLK_HZ: u32 = 16_000_000;

/// Division applied at boot. With the CKDIV8 fuse programmed the core starts at
/// F_CLK / 8 and the firmware keeps it there.
#[cfg(feature = "clkdiv8")]
pub const CLOCK_PRESCALER: ClockPrescaler = ClockPrescaler::Div8;
#[cfg(not(feature = "clkdiv8"))]
pub const CLOCK_PRESCALER: ClockPrescaler = ClockPrescaler::Div1;

/// CPU frequency in Hz
pub const F_CPU_HZ: u32 = clock::cpu_frequency(F_CLK_HZ, CLOCK_PRESCALER);

/// UART baud rate
pub const UART_BAUD: u32 = 9600;

/// Every driver wraps its read-modify-write sequences in a critical section.
pub const IRQ_POLICY: IrqPolicy = IrqPolicy::Masked;

/// Scheduler tick period in microseconds
pub const TICK_US: u32 = 1_000;

const TICK_CLOCK: ClockSource = ClockSource::Div64;

/// Timer0 in CTC mode on channel A, one compare match per tick.
pub const TICK_TIMER: TimerConfig = TimerConfig {
    timer: TimerId::Timer0,
    clock: TICK_CLOCK,
    mode: TimerMode::Ctc {
        channel: Channel::A,
        output: OutputAction::None,
    },
    preset: match compare_value_for(TimerId::Timer0, F_CPU_HZ, TICK_CLOCK, TICK_US) {
        Ok(value) => value,
        Err(_) => panic!("tick period does not fit Timer0"),
    },
};

#[cfg(feature = "debug")]
pub const LOG_LEVEL: Level = Level::Debug;
#[cfg(not(feature = "debug"))]
pub const LOG_LEVEL: Level = Level::Info;

/// ADC reference voltage in millivolts, until the supply is measured
pub const ADC_VREF_MV: u32 = 5000;

/// 16 MHz / 128 = 125 kHz ADC clock; 2 MHz / 16 keeps it in range under CKDIV8
#[cfg(feature = "clkdiv8")]
pub const ADC_PRESCALER: AdcPrescaler = AdcPrescaler::Div16;
#[cfg(not(feature = "clkdiv8"))]
pub const ADC_PRESCALER: AdcPrescaler = AdcPrescaler::Div128;

/// ADC0..2 carry the cell taps
pub const ADC_DIGITAL_DISABLE: u8 = 0b0000_0111;

/// Task timing as (offset, period) in ticks
pub const HEARTBEAT: (u32, u32) = (500, 500);
pub const SAMPLE: (u32, u32) = (10, 100);
pub const REPORT: (u32, u32) = (1000, 1000);
pub const BUTTON: (u32, u32) = (5, 10);

/// Power-down requests made before giving up
pub const SHUTDOWN_ATTEMPTS: u8 = 50;

/// Minimum ticks between two event-loss warnings.
pub const EVENT_WARN_INTERVAL: u32 = 1_000;
