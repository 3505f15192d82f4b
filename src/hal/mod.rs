pub mod adc;
pub mod clock;
pub mod gpio;
pub mod irq;
pub mod power;
pub mod regs;
pub mod sim;
pub mod timer;
pub mod uart;

pub use adc::{Adc, AdcChannel, AdcError, VoltageSource};
pub use gpio::{board, Gpio, GpioPin, Port};
pub use irq::IrqPolicy;
pub use regs::{Reg, RegisterBus};
pub use timer::{TimerError, TimerId, TimerManager};
pub use uart::{BufferedUsart, TxBuffer, Usart};

#[cfg(target_arch = "avr")]
pub use regs::VolatileBus;
