//! Error bookkeeping and event-loss monitoring.

use ufmt::uWrite;

use crate::config;
use crate::hal::adc::AdcError;
use crate::hal::timer::{DispatchStats, TimerError};
use crate::logger::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Timer(TimerError),
    Adc(AdcError),
    /// An output pin rejected a write.
    Pin,
    /// Power latch still asserted after every shutdown attempt.
    ShutdownFailed,
}

impl ufmt::uDisplay for ErrorCode {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        match self {
            ErrorCode::Timer(e) => ufmt::uwrite!(f, "{}", e),
            ErrorCode::Adc(e) => ufmt::uwrite!(f, "{}", e),
            ErrorCode::Pin => f.write_str("pin write failed"),
            ErrorCode::ShutdownFailed => f.write_str("shutdown failed"),
        }
    }
}

impl From<TimerError> for ErrorCode {
    fn from(e: TimerError) -> Self {
        ErrorCode::Timer(e)
    }
}

impl From<AdcError> for ErrorCode {
    fn from(e: AdcError) -> Self {
        ErrorCode::Adc(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub code: ErrorCode,
    /// Scheduler tick at which it was reported.
    pub timestamp: u32,
}

pub struct Diagnostics {
    last_error: Option<Error>,
    error_count: u16,
    seen_spurious: u16,
    seen_dropped: u16,
    /// Tick of the last event-loss warning.
    warned_at: Option<u32>,
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            last_error: None,
            error_count: 0,
            seen_spurious: 0,
            seen_dropped: 0,
            warned_at: None,
        }
    }

    pub fn report_error<W: uWrite>(&mut self, logger: &mut Logger<W>, code: ErrorCode, timestamp: u32) {
        self.last_error = Some(Error { code, timestamp });
        self.error_count = self.error_count.saturating_add(1);
        crate::error!(*logger, "diag", "{} at tick {}", code, timestamp);
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    pub fn error_count(&self) -> u16 {
        self.error_count
    }

    /// Log any growth in the spurious-event or dropped-event counters since
    /// the last warning, at most once per [`config::EVENT_WARN_INTERVAL`]
    /// ticks. Returns whether a warning was written.
    pub fn check_events<W: uWrite>(
        &mut self,
        logger: &mut Logger<W>,
        stats: DispatchStats,
        dropped: u16,
        now: u32,
    ) -> bool {
        let spurious_grew = stats.spurious != self.seen_spurious;
        let dropped_grew = dropped != self.seen_dropped;
        if !spurious_grew && !dropped_grew {
            return false;
        }
        if let Some(at) = self.warned_at {
            // The tick counter restarts on a schedule reset
            if now >= at && now - at < config::EVENT_WARN_INTERVAL {
                return false;
            }
        }

        if spurious_grew {
            crate::warn!(*logger, "diag", "spurious timer events: {}", stats.spurious);
            self.seen_spurious = stats.spurious;
        }
        if dropped_grew {
            crate::warn!(*logger, "diag", "timer events dropped: {}", dropped);
            self.seen_dropped = dropped;
        }
        self.warned_at = Some(now);
        true
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
