//! Simulated register file for running driver logic off-target.
//!
//! Flag registers follow the write-one-to-clear convention, self-clearing bits
//! (ADSC) read back as zero right after they are written, and writes to a
//! captured register (UDR0) are recorded in order.

use heapless::Vec;

use crate::hal::regs::{Reg, RegisterBus};

const MEMORY_SIZE: usize = 0x100;
const MAX_SPECIAL: usize = 8;
const CAPTURE_DEPTH: usize = 256;

/// TIFR0, TIFR1, TIFR2, PCIFR, EIFR
pub const FLAG_REGISTERS: [Reg; 5] = [Reg(0x35), Reg(0x36), Reg(0x37), Reg(0x3B), Reg(0x3C)];

pub struct SimBus {
    memory: [u8; MEMORY_SIZE],
    write_one_to_clear: Vec<Reg, MAX_SPECIAL>,
    self_clearing: Vec<(Reg, u8), MAX_SPECIAL>,
    captured: Option<Reg>,
    capture: Vec<u8, CAPTURE_DEPTH>,
}

impl SimBus {
    /// Register file with the ATmega328P interrupt flag registers marked
    /// write-one-to-clear.
    pub fn new() -> Self {
        let mut bus = Self::blank();
        for reg in FLAG_REGISTERS {
            bus.mark_write_one_to_clear(reg);
        }
        bus
    }

    pub fn blank() -> Self {
        Self {
            memory: [0; MEMORY_SIZE],
            write_one_to_clear: Vec::new(),
            self_clearing: Vec::new(),
            captured: None,
            capture: Vec::new(),
        }
    }

    pub fn mark_write_one_to_clear(&mut self, reg: Reg) {
        let _ = self.write_one_to_clear.push(reg);
    }

    /// Bits in `mask` complete instantly: they read back as zero after a write.
    pub fn mark_self_clearing(&mut self, reg: Reg, mask: u8) {
        let _ = self.self_clearing.push((reg, mask));
    }

    /// Record every byte written to `reg`.
    pub fn capture_writes(&mut self, reg: Reg) {
        self.captured = Some(reg);
        self.capture.clear();
    }

    pub fn captured(&self) -> &[u8] {
        &self.capture
    }

    /// Hardware side: latch event flags without going through the W1C path.
    pub fn raise(&mut self, reg: Reg, mask: u8) {
        self.memory[Self::index(reg)] |= mask;
    }

    /// Hardware side: overwrite a register, bypassing every write convention.
    pub fn poke(&mut self, reg: Reg, value: u8) {
        self.memory[Self::index(reg)] = value;
    }

    pub fn peek(&self, reg: Reg) -> u8 {
        self.memory[Self::index(reg)]
    }

    fn index(reg: Reg) -> usize {
        reg.addr() as usize % MEMORY_SIZE
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimBus {
    fn read(&self, reg: Reg) -> u8 {
        self.peek(reg)
    }

    fn write(&mut self, reg: Reg, value: u8) {
        if self.captured == Some(reg) {
            let _ = self.capture.push(value);
        }

        let slot = &mut self.memory[Self::index(reg)];
        if self.write_one_to_clear.contains(&reg) {
            *slot &= !value;
            return;
        }

        let settled = self
            .self_clearing
            .iter()
            .filter(|(r, _)| *r == reg)
            .fold(value, |v, (_, mask)| v & !mask);
        *slot = settled;
    }
}
