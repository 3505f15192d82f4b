//! Byte-addressed register access for the ATmega328P data space.
//!
//! Every driver in this crate talks to its peripheral through a [`RegisterBus`]
//! instead of dereferencing raw pointers at the call site. On the MCU the bus is
//! [`VolatileBus`]; host tests use [`SimBus`](crate::hal::sim::SimBus).

/// Data-space address of an 8-bit I/O register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reg(pub u16);

impl Reg {
    #[inline]
    pub const fn addr(self) -> u16 {
        self.0
    }
}

pub trait RegisterBus {
    fn read(&self, reg: Reg) -> u8;
    fn write(&mut self, reg: Reg, value: u8);

    /// Read-modify-write. Not atomic on its own; callers wrap it in the
    /// [`IrqPolicy`](crate::hal::irq::IrqPolicy) that owns the register.
    #[inline]
    fn modify<F: FnOnce(u8) -> u8>(&mut self, reg: Reg, f: F) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    #[inline]
    fn set_bits(&mut self, reg: Reg, mask: u8) {
        self.modify(reg, |r| r | mask);
    }

    #[inline]
    fn clear_bits(&mut self, reg: Reg, mask: u8) {
        self.modify(reg, |r| r & !mask);
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    #[inline]
    fn read(&self, reg: Reg) -> u8 {
        (**self).read(reg)
    }

    #[inline]
    fn write(&mut self, reg: Reg, value: u8) {
        (**self).write(reg, value)
    }
}

/// Direct volatile access to the memory-mapped I/O space.
#[cfg(target_arch = "avr")]
#[derive(Clone, Copy)]
pub struct VolatileBus {
    _private: (),
}

#[cfg(target_arch = "avr")]
impl VolatileBus {
    /// # Safety
    ///
    /// Each peripheral's registers must be driven by one owner at a time. The
    /// firmware hands one copy to each driver at boot and never aliases a
    /// peripheral between two of them.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "avr")]
impl RegisterBus for VolatileBus {
    #[inline(always)]
    fn read(&self, reg: Reg) -> u8 {
        unsafe { core::ptr::read_volatile(reg.addr() as *const u8) }
    }

    #[inline(always)]
    fn write(&mut self, reg: Reg, value: u8) {
        unsafe { core::ptr::write_volatile(reg.addr() as *mut u8, value) }
    }
}
