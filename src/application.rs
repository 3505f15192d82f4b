//! Battery-monitor application.
//!
//! Four cooperative tasks share one [`Monitor`] context and are driven by
//! compare matches of the tick timer. A panic request takes the
//! [`shutdown`] path instead.

use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin, ToggleableOutputPin};
use ufmt::uWrite;

use crate::config;
use crate::diagnostics::{Diagnostics, ErrorCode};
use crate::drivers::{Button, ButtonEvent};
use crate::hal::adc::{AdcChannel, VoltageSource};
use crate::hal::regs::RegisterBus;
use crate::hal::timer::{Channel, TimerCallbacks, TimerId, TimerManager};
use crate::logger::Logger;
use crate::rtos::{Scheduler, Task};

/// Cells sampled by the monitor, in report order.
pub const CHANNELS: [AdcChannel; 3] = [AdcChannel::Adc0, AdcChannel::Adc1, AdcChannel::Adc2];

pub struct Monitor<L, V, P, W> {
    pub led: L,
    pub adc: V,
    pub button: Button<P>,
    pub logger: Logger<W>,
    pub diagnostics: Diagnostics,
    sums: [u32; CHANNELS.len()],
    samples: u16,
    /// Tick being served; stamps reported errors.
    now: u32,
    reset_requested: bool,
}

impl<L, V, P, W> Monitor<L, V, P, W>
where
    L: ToggleableOutputPin,
    V: VoltageSource,
    P: InputPin,
    W: uWrite,
{
    pub fn new(led: L, adc: V, button: Button<P>, logger: Logger<W>) -> Self {
        Self {
            led,
            adc,
            button,
            logger,
            diagnostics: Diagnostics::new(),
            sums: [0; CHANNELS.len()],
            samples: 0,
            now: 0,
            reset_requested: false,
        }
    }

    /// Sum of every reading since the last report, per channel.
    pub fn sums(&self) -> &[u32] {
        &self.sums
    }

    pub fn samples(&self) -> u16 {
        self.samples
    }

    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    fn heartbeat(&mut self) {
        if self.led.toggle().is_err() {
            self.diagnostics.report_error(&mut self.logger, ErrorCode::Pin, self.now);
        }
    }

    /// One reading per channel. A failed read drops the whole sample.
    fn sample(&mut self) {
        let mut readings = [0u16; CHANNELS.len()];
        for (reading, channel) in readings.iter_mut().zip(CHANNELS) {
            match self.adc.millivolts(channel) {
                Ok(mv) => *reading = mv,
                Err(e) => {
                    self.diagnostics.report_error(&mut self.logger, e.into(), self.now);
                    return;
                }
            }
        }

        for (sum, mv) in self.sums.iter_mut().zip(readings) {
            *sum += mv as u32;
        }
        self.samples = self.samples.saturating_add(1);
    }

    fn report(&mut self) {
        if self.samples == 0 {
            crate::warn!(self.logger, "monitor", "no samples");
            return;
        }

        let n = self.samples as u32;
        let [v1, v2, v3] = self.sums.map(|sum| sum / n);
        crate::info!(self.logger, "monitor", "v1:{} mV ; v2:{} mV ; v3:{} mV", v1, v2, v3);

        self.sums = [0; CHANNELS.len()];
        self.samples = 0;
    }

    fn poll_button(&mut self) {
        if self.button.poll() == Some(ButtonEvent::Pressed) {
            crate::info!(self.logger, "monitor", "calibrate: restarting schedule");
            self.reset_requested = true;
        }
    }
}

fn heartbeat<L: ToggleableOutputPin, V: VoltageSource, P: InputPin, W: uWrite>(m: &mut Monitor<L, V, P, W>) {
    m.heartbeat();
}

fn sample<L: ToggleableOutputPin, V: VoltageSource, P: InputPin, W: uWrite>(m: &mut Monitor<L, V, P, W>) {
    m.sample();
}

fn report<L: ToggleableOutputPin, V: VoltageSource, P: InputPin, W: uWrite>(m: &mut Monitor<L, V, P, W>) {
    m.report();
}

fn poll_button<L: ToggleableOutputPin, V: VoltageSource, P: InputPin, W: uWrite>(m: &mut Monitor<L, V, P, W>) {
    m.poll_button();
}

pub const TASK_COUNT: usize = 4;

/// The scheduler and its context, fed by tick-timer compare matches.
pub struct App<L, V, P, W> {
    scheduler: Scheduler<Monitor<L, V, P, W>, TASK_COUNT>,
    monitor: Monitor<L, V, P, W>,
    tick_timer: TimerId,
}

impl<L, V, P, W> App<L, V, P, W>
where
    L: ToggleableOutputPin,
    V: VoltageSource,
    P: InputPin,
    W: uWrite,
{
    pub fn new(monitor: Monitor<L, V, P, W>, tick_timer: TimerId) -> Self {
        let tasks = [
            Task::new(heartbeat::<L, V, P, W>, config::HEARTBEAT.0, config::HEARTBEAT.1),
            Task::new(sample::<L, V, P, W>, config::SAMPLE.0, config::SAMPLE.1),
            Task::new(report::<L, V, P, W>, config::REPORT.0, config::REPORT.1),
            Task::new(poll_button::<L, V, P, W>, config::BUTTON.0, config::BUTTON.1),
        ];
        Self {
            scheduler: Scheduler::new(tasks),
            monitor,
            tick_timer,
        }
    }

    pub fn monitor(&mut self) -> &mut Monitor<L, V, P, W> {
        &mut self.monitor
    }

    pub fn ticks(&self) -> u32 {
        self.scheduler.ticks()
    }

    fn tick(&mut self) {
        self.monitor.now = self.scheduler.ticks().wrapping_add(1);
        self.scheduler.tick(&mut self.monitor);

        if self.monitor.reset_requested {
            self.monitor.reset_requested = false;
            self.scheduler.reset();
        }
    }
}

impl<L, V, P, W> TimerCallbacks for App<L, V, P, W>
where
    L: ToggleableOutputPin,
    V: VoltageSource,
    P: InputPin,
    W: uWrite,
{
    fn compare_match(&mut self, timer: TimerId, _channel: Channel) {
        if timer == self.tick_timer {
            self.tick();
        }
    }
}

/// Something that can cut the board's supply.
pub trait PowerDown {
    /// Ask for power down. Returns whether it is confirmed.
    fn request_power_down(&mut self) -> bool;
}

/// Supply held on by a latch pin; releasing the pin drops the supply.
pub struct LatchPowerDown<P> {
    latch: P,
}

impl<P: OutputPin + StatefulOutputPin> LatchPowerDown<P> {
    pub fn new(latch: P) -> Self {
        Self { latch }
    }

    pub fn release(self) -> P {
        self.latch
    }
}

impl<P: OutputPin + StatefulOutputPin> PowerDown for LatchPowerDown<P> {
    fn request_power_down(&mut self) -> bool {
        if self.latch.set_low().is_err() {
            return false;
        }
        self.latch.is_set_low().unwrap_or(false)
    }
}

/// Stop every timer, then keep asking for power down until it is confirmed
/// or `attempts` run out. Returns the attempt that succeeded.
pub fn shutdown<B, D, W>(
    timers: &mut TimerManager<B>,
    power: &mut D,
    logger: &mut Logger<W>,
    attempts: u8,
) -> Result<u8, ErrorCode>
where
    B: RegisterBus,
    D: PowerDown,
    W: uWrite,
{
    timers.stop_all();
    crate::warn!(*logger, "power", "panic: timers stopped, powering down");

    for attempt in 1..=attempts {
        if power.request_power_down() {
            crate::info!(*logger, "power", "power down after {} attempt(s)", attempt);
            return Ok(attempt);
        }
    }

    crate::error!(*logger, "power", "power down not confirmed");
    Err(ErrorCode::ShutdownFailed)
}
