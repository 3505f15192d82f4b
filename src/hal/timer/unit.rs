//! Per-unit register descriptors for the three ATmega328P timers.
//!
//! Each unit is described once, including the width of its counter and compare
//! registers, so the driver never branches on the unit identity at an access
//! site.

use super::{ClockSource, TimerId};
use crate::hal::regs::{Reg, RegisterBus};

/// TIFRx bits, identical on all three units.
pub const TOV: u8 = 1 << 0;
pub const OCFA: u8 = 1 << 1;
pub const OCFB: u8 = 1 << 2;

/// TIMSKx bits.
pub const TOIE: u8 = 1 << 0;
pub const OCIEA: u8 = 1 << 1;
pub const OCIEB: u8 = 1 << 2;

/// CSx2:0 in TCCRxB.
pub const CS_MASK: u8 = 0x07;

/// COMxA1:0 and COMxB1:0 in TCCRxA.
pub const COMA_SHIFT: u8 = 6;
pub const COMB_SHIFT: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterWidth {
    Bits8,
    Bits16,
}

/// Counter or compare register, narrow or split into a low/high pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WideReg {
    Narrow(Reg),
    Wide { low: Reg, high: Reg },
}

impl WideReg {
    /// 16-bit writes go high byte first through the shared TEMP latch, so the
    /// pair is always written with interrupts masked.
    pub fn write<B: RegisterBus>(self, bus: &mut B, value: u16) {
        match self {
            WideReg::Narrow(reg) => bus.write(reg, value as u8),
            WideReg::Wide { low, high } => critical_section::with(|_| {
                bus.write(high, (value >> 8) as u8);
                bus.write(low, value as u8);
            }),
        }
    }

    /// 16-bit reads go low byte first.
    pub fn read<B: RegisterBus>(self, bus: &B) -> u16 {
        match self {
            WideReg::Narrow(reg) => bus.read(reg) as u16,
            WideReg::Wide { low, high } => critical_section::with(|_| {
                let lo = bus.read(low) as u16;
                let hi = bus.read(high) as u16;
                (hi << 8) | lo
            }),
        }
    }
}

/// Which clock-select table the unit decodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockMap {
    /// Timer0 and Timer1: ÷1, ÷8, ÷64, ÷256, ÷1024 and the Tn pin edges.
    Synchronous,
    /// Timer2: adds ÷32 and ÷128, no external edge input.
    Asynchronous,
}

#[derive(Debug)]
pub struct TimerUnit {
    pub id: TimerId,
    pub tccra: Reg,
    pub tccrb: Reg,
    pub tifr: Reg,
    pub timsk: Reg,
    pub tcnt: WideReg,
    pub ocra: WideReg,
    pub ocrb: WideReg,
    pub width: CounterWidth,
    /// WGM bits selecting CTC with OCRxA as TOP, as (TCCRxA, TCCRxB) masks.
    pub ctc_wgm: (u8, u8),
    pub clocks: ClockMap,
}

impl TimerUnit {
    pub const fn max_value(&self) -> u16 {
        match self.width {
            CounterWidth::Bits8 => 0xFF,
            CounterWidth::Bits16 => 0xFFFF,
        }
    }

    /// CSx2:0 encoding for `clock`, or `None` when the unit cannot be clocked
    /// from that source.
    pub const fn clock_bits(&self, clock: ClockSource) -> Option<u8> {
        match self.clocks {
            ClockMap::Synchronous => match clock {
                ClockSource::Div1 => Some(0b001),
                ClockSource::Div8 => Some(0b010),
                ClockSource::Div64 => Some(0b011),
                ClockSource::Div256 => Some(0b100),
                ClockSource::Div1024 => Some(0b101),
                ClockSource::ExternalFalling => Some(0b110),
                ClockSource::ExternalRising => Some(0b111),
                ClockSource::Div32 | ClockSource::Div128 => None,
            },
            ClockMap::Asynchronous => match clock {
                ClockSource::Div1 => Some(0b001),
                ClockSource::Div8 => Some(0b010),
                ClockSource::Div32 => Some(0b011),
                ClockSource::Div64 => Some(0b100),
                ClockSource::Div128 => Some(0b101),
                ClockSource::Div256 => Some(0b110),
                ClockSource::Div1024 => Some(0b111),
                ClockSource::ExternalFalling | ClockSource::ExternalRising => None,
            },
        }
    }
}

pub const TIMER0: TimerUnit = TimerUnit {
    id: TimerId::Timer0,
    tccra: Reg(0x44),
    tccrb: Reg(0x45),
    tifr: Reg(0x35),
    timsk: Reg(0x6E),
    tcnt: WideReg::Narrow(Reg(0x46)),
    ocra: WideReg::Narrow(Reg(0x47)),
    ocrb: WideReg::Narrow(Reg(0x48)),
    width: CounterWidth::Bits8,
    ctc_wgm: (1 << 1, 0),
    clocks: ClockMap::Synchronous,
};

pub const TIMER1: TimerUnit = TimerUnit {
    id: TimerId::Timer1,
    tccra: Reg(0x80),
    tccrb: Reg(0x81),
    tifr: Reg(0x36),
    timsk: Reg(0x6F),
    tcnt: WideReg::Wide { low: Reg(0x84), high: Reg(0x85) },
    ocra: WideReg::Wide { low: Reg(0x88), high: Reg(0x89) },
    ocrb: WideReg::Wide { low: Reg(0x8A), high: Reg(0x8B) },
    width: CounterWidth::Bits16,
    // WGM12 lives in TCCR1B; WGM11 in TCCR1A would select phase-correct PWM
    ctc_wgm: (0, 1 << 3),
    clocks: ClockMap::Synchronous,
};

pub const TIMER2: TimerUnit = TimerUnit {
    id: TimerId::Timer2,
    tccra: Reg(0xB0),
    tccrb: Reg(0xB1),
    tifr: Reg(0x37),
    timsk: Reg(0x70),
    tcnt: WideReg::Narrow(Reg(0xB2)),
    ocra: WideReg::Narrow(Reg(0xB3)),
    ocrb: WideReg::Narrow(Reg(0xB4)),
    width: CounterWidth::Bits8,
    ctc_wgm: (1 << 1, 0),
    clocks: ClockMap::Asynchronous,
};
