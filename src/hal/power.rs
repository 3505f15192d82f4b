use crate::hal::regs::{Reg, RegisterBus};

pub(crate) const SMCR: Reg = Reg(0x53);
const SE: u8 = 1 << 0;
const SM_MASK: u8 = 0b0000_1110;

/// SM2:0 field of SMCR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepMode {
    Idle = 0,
    AdcNoiseReduction = 1,
    PowerDown = 2,
    PowerSave = 3,
    Standby = 6,
    ExtendedStandby = 7,
}

pub struct Power<B> {
    bus: B,
}

impl<B: RegisterBus> Power<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn set_sleep_mode(&mut self, mode: SleepMode) {
        self.bus.modify(SMCR, |r| (r & !SM_MASK) | ((mode as u8) << 1));
    }

    pub fn sleep_mode(&self) -> u8 {
        (self.bus.read(SMCR) & SM_MASK) >> 1
    }

    /// Sleep in idle mode unless `pending` reports work.
    ///
    /// The check and the sleep happen with interrupts masked; `sei` takes effect
    /// after the following instruction, so an ISR that posts work right before
    /// the sleep still wakes the CPU. Returns whether the CPU slept.
    pub fn idle_until(&mut self, pending: impl Fn() -> bool) -> bool {
        self.set_sleep_mode(SleepMode::Idle);
        self.sleep_unless(pending)
    }

    /// Deepest sleep; only an external interrupt or reset wakes the CPU.
    pub fn enter_power_down(&mut self) {
        self.set_sleep_mode(SleepMode::PowerDown);
        self.sleep_unless(|| false);
    }

    #[cfg(target_arch = "avr")]
    fn sleep_unless(&mut self, pending: impl Fn() -> bool) -> bool {
        avr_device::interrupt::disable();
        if pending() {
            // SAFETY: restores the enabled state the foreground runs with
            unsafe { avr_device::interrupt::enable() };
            return false;
        }
        self.bus.set_bits(SMCR, SE);
        // SAFETY: `sei; sleep` is the documented race-free sleep sequence
        unsafe { core::arch::asm!("sei", "sleep") };
        self.bus.clear_bits(SMCR, SE);
        true
    }

    #[cfg(not(target_arch = "avr"))]
    fn sleep_unless(&mut self, pending: impl Fn() -> bool) -> bool {
        if pending() {
            return false;
        }
        self.bus.set_bits(SMCR, SE);
        self.bus.clear_bits(SMCR, SE);
        true
    }
}
