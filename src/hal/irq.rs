//! Interrupt masking discipline for state shared with ISRs.

/// How read-modify-write sequences on registers that an interrupt may also
/// touch are protected. Applied uniformly by every driver that holds one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqPolicy {
    /// Global interrupts are masked for the duration of the sequence.
    Masked,
    /// No masking. Only valid when no ISR touches the same registers, or when
    /// the caller already runs with interrupts disabled.
    Unmasked,
}

impl IrqPolicy {
    #[inline]
    pub fn run<R>(self, f: impl FnOnce() -> R) -> R {
        match self {
            IrqPolicy::Masked => critical_section::with(|_| f()),
            IrqPolicy::Unmasked => f(),
        }
    }
}

impl Default for IrqPolicy {
    fn default() -> Self {
        IrqPolicy::Masked
    }
}
