//! On-target self tests, printed through the console logger.

use ufmt::uWrite;

use crate::hal::regs::RegisterBus;
use crate::hal::timer::{ClockSource, OutputAction, TimerConfig, TimerId, TimerManager, TimerMode, TimerState};
use crate::logger::Logger;

pub trait TestCase<B: RegisterBus> {
    fn run(&self, timers: &mut TimerManager<B>) -> TestResult;
    fn name(&self) -> &'static str;
}

#[derive(Debug, PartialEq, Eq)]
pub enum TestResult {
    Pass,
    Fail(TestError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum TestError {
    AssertionFailed(&'static str),
    Timeout,
    HardwareFault,
}

impl ufmt::uDisplay for TestError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        match self {
            TestError::AssertionFailed(what) => ufmt::uwrite!(f, "assertion failed: {}", *what),
            TestError::Timeout => f.write_str("timeout"),
            TestError::HardwareFault => f.write_str("hardware fault"),
        }
    }
}

pub struct TestRunner {
    total_tests: u16,
    passed_tests: u16,
    current_suite: &'static str,
}

impl TestRunner {
    pub const fn new() -> Self {
        Self {
            total_tests: 0,
            passed_tests: 0,
            current_suite: "",
        }
    }

    pub fn run_suite<B: RegisterBus, W: uWrite>(
        &mut self,
        logger: &mut Logger<W>,
        timers: &mut TimerManager<B>,
        name: &'static str,
        tests: &[&dyn TestCase<B>],
    ) {
        self.current_suite = name;
        let out = logger.writer();
        ufmt::uwrite!(out, "\r\n=== Test Suite: {} ===\r\n", name).ok();

        for test in tests {
            self.total_tests += 1;
            let out = logger.writer();
            ufmt::uwrite!(out, "Running {}: ", test.name()).ok();

            match test.run(timers) {
                TestResult::Pass => {
                    self.passed_tests += 1;
                    out.write_str("PASS\r\n").ok();
                }
                TestResult::Fail(err) => {
                    ufmt::uwrite!(out, "FAIL - {}\r\n", err).ok();
                }
            }
        }

        self.print_summary(logger);
    }

    pub fn passed(&self) -> u16 {
        self.passed_tests
    }

    pub fn total(&self) -> u16 {
        self.total_tests
    }

    fn print_summary<W: uWrite>(&mut self, logger: &mut Logger<W>) {
        let percent = if self.total_tests == 0 {
            0
        } else {
            (self.passed_tests as u32 * 100) / self.total_tests as u32
        };
        let out = logger.writer();
        ufmt::uwrite!(out, "\r\nTest Summary for {}:\r\n", self.current_suite).ok();
        ufmt::uwrite!(
            out,
            "Passed: {}/{} ({}%)\r\n",
            self.passed_tests,
            self.total_tests,
            percent
        )
        .ok();
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return $crate::testing::TestResult::Fail($crate::testing::TestError::AssertionFailed(concat!(
                stringify!($left),
                " == ",
                stringify!($right)
            )));
        }
    };
}

/// Poll `$cond` up to `$polls` times before failing with a timeout.
#[macro_export]
macro_rules! check_timeout {
    ($cond:expr, $polls:expr) => {
        let mut remaining: u32 = $polls;
        while !$cond {
            if remaining == 0 {
                return $crate::testing::TestResult::Fail($crate::testing::TestError::Timeout);
            }
            remaining -= 1;
        }
    };
}

/// A unit cannot be claimed twice, and is free again after release.
pub struct OwnershipTest;

impl<B: RegisterBus> TestCase<B> for OwnershipTest {
    fn name(&self) -> &'static str {
        "Timer ownership"
    }

    fn run(&self, timers: &mut TimerManager<B>) -> TestResult {
        let config = TimerConfig {
            timer: TimerId::Timer2,
            clock: ClockSource::Div1024,
            mode: TimerMode::Autoreload,
            preset: 0,
        };
        let handle = match timers.initialize(config) {
            Ok(h) => h,
            Err(_) => return TestResult::Fail(TestError::HardwareFault),
        };

        let second = timers.initialize(config).map(|h| timers.deinitialize(h));
        check_eq!(second, Err(crate::hal::timer::TimerError::AlreadyOwned));

        timers.deinitialize(handle);
        check_eq!(timers.is_available(TimerId::Timer2), true);
        TestResult::Pass
    }
}

/// The 16-bit compare register reads back what CTC init wrote.
pub struct CompareRoundTripTest;

impl<B: RegisterBus> TestCase<B> for CompareRoundTripTest {
    fn name(&self) -> &'static str {
        "CTC compare round trip"
    }

    fn run(&self, timers: &mut TimerManager<B>) -> TestResult {
        let handle = match timers.ctc_initialize(TimerConfig {
            timer: TimerId::Timer1,
            clock: ClockSource::Div64,
            mode: TimerMode::Ctc {
                channel: crate::hal::timer::Channel::A,
                output: OutputAction::None,
            },
            preset: 251,
        }) {
            Ok(h) => h,
            Err(_) => return TestResult::Fail(TestError::HardwareFault),
        };

        let value = timers.compare_value(&handle);
        timers.deinitialize(handle);
        check_eq!(value, 251);
        TestResult::Pass
    }
}

/// A one-shot unit overflows once and stops its own clock.
pub struct OneShotTest;

impl<B: RegisterBus> TestCase<B> for OneShotTest {
    fn name(&self) -> &'static str {
        "One-shot stop"
    }

    fn run(&self, timers: &mut TimerManager<B>) -> TestResult {
        let handle = match timers.initialize(TimerConfig {
            timer: TimerId::Timer2,
            clock: ClockSource::Div8,
            mode: TimerMode::OneShot,
            preset: 0xF0,
        }) {
            Ok(h) => h,
            Err(_) => return TestResult::Fail(TestError::HardwareFault),
        };
        timers.start(&handle);

        let outcome = (|| {
            check_timeout!(timers.state(&handle) == TimerState::Timeout, 10_000);
            check_eq!(timers.is_counting(TimerId::Timer2), false);
            TestResult::Pass
        })();

        timers.stop(&handle);
        timers.deinitialize(handle);
        outcome
    }
}
