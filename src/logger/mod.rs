//! Serial console logging.
//!
//! Lines look like `[INF] timer: started` and are written through any
//! [`ufmt::uWrite`] sink. Records below the logger's level are dropped before
//! any formatting happens.

use ufmt::uWrite;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    pub const fn tag(self) -> &'static str {
        match self {
            Level::Error => "[ERR] ",
            Level::Warn => "[WRN] ",
            Level::Info => "[INF] ",
            Level::Debug => "[DBG] ",
        }
    }
}

pub struct Logger<W> {
    writer: W,
    level: Level,
}

impl<W: uWrite> Logger<W> {
    pub const fn new(writer: W, level: Level) -> Self {
        Self { writer, level }
    }

    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    /// Start a record; the caller writes the message and then calls [`end`](Self::end).
    pub fn begin(&mut self, level: Level, target: &str) -> Result<(), W::Error> {
        self.writer.write_str(level.tag())?;
        self.writer.write_str(target)?;
        self.writer.write_str(": ")
    }

    pub fn end(&mut self) -> Result<(), W::Error> {
        self.writer.write_str("\r\n")
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// `0x` followed by two upper-case hex digits.
    pub fn write_hex(&mut self, value: u8) -> Result<(), W::Error> {
        const HEX: [u8; 16] = *b"0123456789ABCDEF";
        let digits = [b'0', b'x', HEX[(value >> 4) as usize], HEX[(value & 0x0F) as usize]];
        // ASCII only
        match core::str::from_utf8(&digits) {
            Ok(s) => self.writer.write_str(s),
            Err(_) => Ok(()),
        }
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($logger:expr, $level:expr, $target:expr, $($arg:tt)+) => {{
        let logger = &mut $logger;
        if logger.enabled($level) {
            let _ = logger.begin($level, $target);
            let _ = ::ufmt::uwrite!(logger.writer(), $($arg)+);
            let _ = logger.end();
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $target:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::logger::Level::Error, $target, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $target:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::logger::Level::Warn, $target, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $target:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::logger::Level::Info, $target, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $target:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::logger::Level::Debug, $target, $($arg)+)
    };
}

/// In-memory sink for host tests.
#[cfg(test)]
pub(crate) mod capture {
    use core::convert::Infallible;

    #[derive(Default)]
    pub struct Capture(pub String);

    impl ufmt::uWrite for Capture {
        type Error = Infallible;

        fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
            self.0.push_str(s);
            Ok(())
        }
    }
}
