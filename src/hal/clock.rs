//! System clock prescaler.

use crate::hal::regs::{Reg, RegisterBus};

pub(crate) const CLKPR: Reg = Reg(0x61);
const CLKPCE: u8 = 1 << 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ClockPrescaler {
    Div1 = 0,
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div32 = 5,
    Div64 = 6,
    Div128 = 7,
    Div256 = 8,
}

impl ClockPrescaler {
    pub const fn divisor(self) -> u32 {
        1 << self as u32
    }
}

/// Change the system clock division factor.
///
/// The new value must land within four cycles of setting CLKPCE, so the
/// sequence always runs with interrupts masked.
pub fn set_prescaler<B: RegisterBus>(bus: &mut B, prescaler: ClockPrescaler) {
    critical_section::with(|_| {
        bus.write(CLKPR, CLKPCE);
        bus.write(CLKPR, prescaler as u8);
    });
}

pub fn prescaler<B: RegisterBus>(bus: &B) -> u8 {
    bus.read(CLKPR) & 0x0F
}

/// CPU clock after dividing the oscillator frequency.
pub const fn cpu_frequency(f_clk_hz: u32, prescaler: ClockPrescaler) -> u32 {
    f_clk_hz / prescaler.divisor()
}
