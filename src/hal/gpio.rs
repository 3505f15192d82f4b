use core::convert::Infallible;

use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin, ToggleableOutputPin};

use crate::hal::irq::IrqPolicy;
use crate::hal::regs::{Reg, RegisterBus};

const EICRA: Reg = Reg(0x69);
const EIMSK: Reg = Reg(0x3D);
const EIFR: Reg = Reg(0x3C);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    B,
    C,
    D,
}

impl Port {
    /// PINx: reads the pad level; writing 1 toggles the output latch.
    pub const fn pin(self) -> Reg {
        match self {
            Port::B => Reg(0x23),
            Port::C => Reg(0x26),
            Port::D => Reg(0x29),
        }
    }

    pub const fn ddr(self) -> Reg {
        Reg(self.pin().0 + 1)
    }

    pub const fn port(self) -> Reg {
        Reg(self.pin().0 + 2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input,
    InputPullUp,
    OutputLow,
    OutputHigh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExternalInterrupt {
    /// PD2
    Int0,
    /// PD3
    Int1,
}

impl ExternalInterrupt {
    const fn index(self) -> u8 {
        match self {
            ExternalInterrupt::Int0 => 0,
            ExternalInterrupt::Int1 => 1,
        }
    }
}

/// ISCn1:0 sense control.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Edge {
    LowLevel = 0b00,
    Change = 0b01,
    Falling = 0b10,
    Rising = 0b11,
}

/// Port-level access by `(port, mask)`.
pub struct Gpio<B> {
    bus: B,
    policy: IrqPolicy,
}

impl<B: RegisterBus> Gpio<B> {
    pub fn new(bus: B, policy: IrqPolicy) -> Self {
        Self { bus, policy }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn configure(&mut self, port: Port, mask: u8, mode: PinMode) {
        let bus = &mut self.bus;
        self.policy.run(|| match mode {
            PinMode::Input => {
                bus.clear_bits(port.ddr(), mask);
                bus.clear_bits(port.port(), mask);
            }
            PinMode::InputPullUp => {
                bus.clear_bits(port.ddr(), mask);
                bus.set_bits(port.port(), mask);
            }
            // Latch the level before the driver turns on
            PinMode::OutputLow => {
                bus.clear_bits(port.port(), mask);
                bus.set_bits(port.ddr(), mask);
            }
            PinMode::OutputHigh => {
                bus.set_bits(port.port(), mask);
                bus.set_bits(port.ddr(), mask);
            }
        });
    }

    /// Pad levels of the pins in `mask`.
    pub fn read(&self, port: Port, mask: u8) -> u8 {
        self.bus.read(port.pin()) & mask
    }

    pub fn write(&mut self, port: Port, mask: u8, high: bool) {
        let bus = &mut self.bus;
        self.policy.run(|| {
            if high {
                bus.set_bits(port.port(), mask);
            } else {
                bus.clear_bits(port.port(), mask);
            }
        });
    }

    /// Single write to PINx; no read-modify-write needed.
    pub fn toggle(&mut self, port: Port, mask: u8) {
        self.bus.write(port.pin(), mask);
    }

    /// Select the sense edge for INTn, drop any stale request and unmask it.
    pub fn listen(&mut self, int: ExternalInterrupt, edge: Edge) {
        let shift = int.index() * 2;
        let bit = 1 << int.index();
        let bus = &mut self.bus;
        self.policy.run(|| {
            bus.modify(EICRA, |r| (r & !(0b11 << shift)) | ((edge as u8) << shift));
            bus.write(EIFR, bit);
            bus.set_bits(EIMSK, bit);
        });
    }

    pub fn unlisten(&mut self, int: ExternalInterrupt) {
        let bus = &mut self.bus;
        self.policy.run(|| bus.clear_bits(EIMSK, 1 << int.index()));
    }
}

/// One pin with its own bus handle, usable wherever an `embedded-hal` pin is
/// expected.
pub struct GpioPin<B> {
    bus: B,
    port: Port,
    mask: u8,
    policy: IrqPolicy,
}

impl<B: RegisterBus> GpioPin<B> {
    pub fn new(bus: B, port: Port, bit: u8, mode: PinMode, policy: IrqPolicy) -> Self {
        let mut gpio = Gpio::new(bus, policy);
        let mask = 1 << bit;
        gpio.configure(port, mask, mode);
        Self {
            bus: gpio.bus,
            port,
            mask,
            policy,
        }
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn mask(&self) -> u8 {
        self.mask
    }
}

impl<B: RegisterBus> OutputPin for GpioPin<B> {
    type Error = Infallible;

    fn set_high(&mut self) -> Result<(), Infallible> {
        let (bus, reg, mask) = (&mut self.bus, self.port.port(), self.mask);
        self.policy.run(|| bus.set_bits(reg, mask));
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Infallible> {
        let (bus, reg, mask) = (&mut self.bus, self.port.port(), self.mask);
        self.policy.run(|| bus.clear_bits(reg, mask));
        Ok(())
    }
}

impl<B: RegisterBus> StatefulOutputPin for GpioPin<B> {
    fn is_set_high(&self) -> Result<bool, Infallible> {
        Ok(self.bus.read(self.port.port()) & self.mask != 0)
    }

    fn is_set_low(&self) -> Result<bool, Infallible> {
        Ok(self.bus.read(self.port.port()) & self.mask == 0)
    }
}

impl<B: RegisterBus> ToggleableOutputPin for GpioPin<B> {
    type Error = Infallible;

    fn toggle(&mut self) -> Result<(), Infallible> {
        self.bus.write(self.port.pin(), self.mask);
        Ok(())
    }
}

impl<B: RegisterBus> InputPin for GpioPin<B> {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.bus.read(self.port.pin()) & self.mask != 0)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(self.bus.read(self.port.pin()) & self.mask == 0)
    }
}

/// Arduino Nano wiring used by the firmware.
pub mod board {
    use super::Port;

    /// On-board LED, D13
    pub const LED: (Port, u8) = (Port::B, 5);
    /// Power latch enable, D8; held high while the pack is allowed to supply
    pub const POWER_LATCH: (Port, u8) = (Port::B, 0);
    /// Panic input, D2 / INT0, active low
    pub const PANIC: (Port, u8) = (Port::D, 2);
    /// Calibration button, D4, active low
    pub const CALIBRATE: (Port, u8) = (Port::D, 4);
}
