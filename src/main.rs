#![cfg_attr(target_arch = "avr", no_std)]
#![cfg_attr(target_arch = "avr", no_main)]
#![cfg_attr(target_arch = "avr", feature(abi_avr_interrupt))]

// The firmware only runs on the MCU; host builds exercise the library tests.
#[cfg(not(target_arch = "avr"))]
fn main() {}

#[cfg(target_arch = "avr")]
use panic_halt as _;

#[cfg(target_arch = "avr")]
use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(target_arch = "avr")]
use atmega328p_firmware::{
    application::{shutdown, App, LatchPowerDown, Monitor},
    config,
    drivers::Button,
    hal::{
        adc::{Adc, AdcReference},
        clock,
        gpio::{board, Edge, ExternalInterrupt, Gpio, GpioPin, PinMode},
        power::Power,
        timer::{TimerManager, EVENTS},
        uart::{BufferedUsart, Usart, TX},
        VolatileBus,
    },
    info,
    logger::Logger,
    warn,
};

/// Set by the panic input; never cleared.
#[cfg(target_arch = "avr")]
static PANIC: AtomicBool = AtomicBool::new(false);

#[cfg(target_arch = "avr")]
#[avr_device::interrupt(atmega328p)]
fn INT0() {
    PANIC.store(true, Ordering::Relaxed);
}

#[cfg(target_arch = "avr")]
#[avr_device::entry]
fn main() -> ! {
    // SAFETY: every driver below gets its own copy and only touches its own
    // peripheral's registers
    let bus = unsafe { VolatileBus::new() };

    let mut boot = bus;
    clock::set_prescaler(&mut boot, config::CLOCK_PRESCALER);

    let usart = Usart::new(bus, config::F_CPU_HZ, config::UART_BAUD);
    let mut logger = Logger::new(BufferedUsart::new(usart, &TX), config::LOG_LEVEL);
    info!(logger, "boot", "ATmega328P battery monitor v{}", env!("CARGO_PKG_VERSION"));

    let mut gpio = Gpio::new(bus, config::IRQ_POLICY);
    let (panic_port, panic_bit) = board::PANIC;
    gpio.configure(panic_port, 1 << panic_bit, PinMode::InputPullUp);
    gpio.listen(ExternalInterrupt::Int0, Edge::Falling);

    let (port, bit) = board::LED;
    let led = GpioPin::new(bus, port, bit, PinMode::OutputLow, config::IRQ_POLICY);
    let (port, bit) = board::POWER_LATCH;
    let mut latch = LatchPowerDown::new(GpioPin::new(bus, port, bit, PinMode::OutputHigh, config::IRQ_POLICY));
    let (port, bit) = board::CALIBRATE;
    let button = Button::new(GpioPin::new(bus, port, bit, PinMode::InputPullUp, config::IRQ_POLICY));

    let mut adc = Adc::new(bus, AdcReference::Avcc, config::ADC_PRESCALER, config::ADC_VREF_MV);
    adc.disable_digital_inputs(config::ADC_DIGITAL_DISABLE);
    match adc.measure_avcc_mv() {
        Ok(mv) => info!(logger, "adc", "supply {} mV", mv),
        Err(e) => warn!(logger, "adc", "{}, assuming {} mV", e, config::ADC_VREF_MV),
    }

    let mut power = Power::new(bus);
    let mut timers = TimerManager::new(bus, config::IRQ_POLICY);

    #[cfg(feature = "selftest")]
    {
        use atmega328p_firmware::testing::{CompareRoundTripTest, OneShotTest, OwnershipTest, TestRunner};

        let mut runner = TestRunner::new();
        runner.run_suite(
            &mut logger,
            &mut timers,
            "timers",
            &[&OwnershipTest, &CompareRoundTripTest, &OneShotTest],
        );
    }

    let mut app = App::new(Monitor::new(led, adc, button, logger), config::TICK_TIMER.timer);

    let tick = match timers.ctc_initialize(config::TICK_TIMER) {
        Ok(handle) => handle,
        Err(e) => {
            let m = app.monitor();
            m.diagnostics.report_error(&mut m.logger, e.into(), 0);
            m.logger.writer().flush();
            loop {
                power.enter_power_down();
            }
        }
    };
    timers.ctc_start_with_interrupt(&tick);
    info!(app.monitor().logger, "boot", "tick every {} us", config::TICK_US);

    // SAFETY: all shared state is set up; ISRs only post to EVENTS or PANIC or
    // drain TX
    unsafe { avr_device::interrupt::enable() };

    loop {
        timers.dispatch_pending(&mut app);

        let now = app.ticks();
        let m = app.monitor();
        m.diagnostics.check_events(&mut m.logger, timers.stats(), EVENTS.dropped(), now);

        if PANIC.load(Ordering::Relaxed) {
            avr_device::interrupt::disable();
            let now = app.ticks();
            let m = app.monitor();
            if let Err(e) = shutdown(&mut timers, &mut latch, &mut m.logger, config::SHUTDOWN_ATTEMPTS) {
                m.diagnostics.report_error(&mut m.logger, e, now);
            }
            m.logger.writer().flush();
            // Only reached if the supply is still up
            loop {
                power.enter_power_down();
            }
        }

        power.idle_until(|| !EVENTS.is_empty() || PANIC.load(Ordering::Relaxed));
    }
}
