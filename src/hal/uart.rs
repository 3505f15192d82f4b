//! USART0 console: a polled driver plus an interrupt-fed transmit buffer.

use core::cell::RefCell;
use core::convert::Infallible;

use critical_section::Mutex;
use embedded_hal::serial;
use heapless::Deque;

use crate::hal::regs::{Reg, RegisterBus};

const UCSR0A: Reg = Reg(0xC0);
const UCSR0B: Reg = Reg(0xC1);
const UCSR0C: Reg = Reg(0xC2);
const UBRR0L: Reg = Reg(0xC4);
const UBRR0H: Reg = Reg(0xC5);
pub(crate) const UDR0: Reg = Reg(0xC6);

const RXC0: u8 = 1 << 7;
pub(crate) const UDRE0: u8 = 1 << 5;
const U2X0: u8 = 1 << 1;
const RXEN0: u8 = 1 << 4;
const TXEN0: u8 = 1 << 3;
const UDRIE0: u8 = 1 << 5;
/// UCSZ01:0 = 8 data bits; no parity, one stop bit
const FRAME_8N1: u8 = 0b0000_0110;

/// Baud divisor in double-speed mode, rounded to nearest.
pub const fn ubrr_for(f_cpu_hz: u32, baud: u32) -> u16 {
    ((f_cpu_hz + 4 * baud) / (8 * baud) - 1) as u16
}

/// Polled USART0. Bytes go out as soon as the data register is empty; nothing
/// is buffered.
pub struct Usart<B> {
    bus: B,
}

impl<B: RegisterBus> Usart<B> {
    pub fn new(mut bus: B, f_cpu_hz: u32, baud: u32) -> Self {
        let ubrr = ubrr_for(f_cpu_hz, baud);
        bus.write(UBRR0H, (ubrr >> 8) as u8);
        bus.write(UBRR0L, ubrr as u8);
        bus.write(UCSR0A, U2X0);
        bus.write(UCSR0C, FRAME_8N1);
        bus.write(UCSR0B, RXEN0 | TXEN0);
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn write_byte(&mut self, byte: u8) {
        // Infallible; the only failure is WouldBlock
        let _ = nb::block!(serial::Write::write(self, byte));
    }

    pub fn read_byte(&mut self) -> Option<u8> {
        serial::Read::read(self).ok()
    }
}

impl<B: RegisterBus> serial::Write<u8> for Usart<B> {
    type Error = Infallible;

    fn write(&mut self, word: u8) -> nb::Result<(), Infallible> {
        if self.bus.read(UCSR0A) & UDRE0 == 0 {
            return Err(nb::Error::WouldBlock);
        }
        self.bus.write(UDR0, word);
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Infallible> {
        if self.bus.read(UCSR0A) & UDRE0 == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(())
    }
}

impl<B: RegisterBus> serial::Read<u8> for Usart<B> {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        if self.bus.read(UCSR0A) & RXC0 == 0 {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.bus.read(UDR0))
    }
}

impl<B: RegisterBus> ufmt::uWrite for Usart<B> {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// Bytes waiting for the data-register-empty interrupt.
pub const TX_BUFFER_LEN: usize = 128;

/// Transmit bytes queued by the foreground and drained by `USART_UDRE`.
pub struct TxBuffer {
    bytes: Mutex<RefCell<Deque<u8, TX_BUFFER_LEN>>>,
}

impl TxBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.bytes.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.bytes.borrow_ref(cs).is_empty())
    }
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer drained by the USART0 data-register-empty vector.
pub static TX: TxBuffer = TxBuffer::new();

/// Hand the next queued byte to UDR0, or mask the data-register-empty
/// interrupt once `tx` is drained. Returns whether a byte went out.
///
/// UDR0 must be empty.
pub fn service_tx<B: RegisterBus>(bus: &mut B, tx: &TxBuffer) -> bool {
    critical_section::with(|cs| match tx.bytes.borrow_ref_mut(cs).pop_front() {
        Some(byte) => {
            bus.write(UDR0, byte);
            true
        }
        None => {
            bus.modify(UCSR0B, |r| r & !UDRIE0);
            false
        }
    })
}

/// Console writer that never waits on the line while the buffer has room.
///
/// Bytes are queued and the data-register-empty interrupt sends them. When the
/// buffer is full the writer moves bytes out by polling, so nothing is lost
/// even with interrupts disabled.
pub struct BufferedUsart<'a, B> {
    usart: Usart<B>,
    tx: &'a TxBuffer,
}

impl<'a, B: RegisterBus> BufferedUsart<'a, B> {
    pub fn new(usart: Usart<B>, tx: &'a TxBuffer) -> Self {
        Self { usart, tx }
    }

    pub fn usart(&self) -> &Usart<B> {
        &self.usart
    }

    pub fn usart_mut(&mut self) -> &mut Usart<B> {
        &mut self.usart
    }

    pub fn write_byte(&mut self, byte: u8) {
        loop {
            let bus = &mut self.usart.bus;
            let queued = critical_section::with(|cs| {
                if self.tx.bytes.borrow_ref_mut(cs).push_back(byte).is_err() {
                    return false;
                }
                bus.modify(UCSR0B, |r| r | UDRIE0);
                true
            });
            if queued {
                return;
            }
            self.send_one();
        }
    }

    /// Wait until every queued byte has been handed to the hardware.
    pub fn flush(&mut self) {
        while !self.tx.is_empty() {
            self.send_one();
        }
    }

    fn send_one(&mut self) {
        while self.usart.bus.read(UCSR0A) & UDRE0 == 0 {}
        let bus = &mut self.usart.bus;
        let tx = self.tx;
        critical_section::with(|_| {
            // The vector may have refilled UDR0 since the poll
            if bus.read(UCSR0A) & UDRE0 != 0 {
                service_tx(bus, tx);
            }
        });
    }
}

impl<'a, B: RegisterBus> ufmt::uWrite for BufferedUsart<'a, B> {
    type Error = Infallible;

    fn write_str(&mut self, s: &str) -> Result<(), Infallible> {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
        Ok(())
    }
}

#[cfg(target_arch = "avr")]
#[avr_device::interrupt(atmega328p)]
fn USART_UDRE() {
    // SAFETY: only UCSR0B and UDR0 are touched, and the vector runs masked
    let mut bus = unsafe { crate::hal::regs::VolatileBus::new() };
    service_tx(&mut bus, &TX);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimBus;

    #[test]
    fn divisor_for_9600_baud() {
        assert_eq!(ubrr_for(16_000_000, 9600), 207);
        assert_eq!(ubrr_for(2_000_000, 9600), 25);
    }

    #[test]
    fn init_programs_8n1_double_speed() {
        let usart = Usart::new(SimBus::new(), 16_000_000, 9600);
        assert_eq!(usart.bus().peek(UBRR0L), 207);
        assert_eq!(usart.bus().peek(UBRR0H), 0);
        assert_eq!(usart.bus().peek(UCSR0A), U2X0);
        assert_eq!(usart.bus().peek(UCSR0C), FRAME_8N1);
        assert_eq!(usart.bus().peek(UCSR0B), RXEN0 | TXEN0);
    }

    #[test]
    fn write_blocks_until_data_register_empty() {
        let mut usart = Usart::new(SimBus::new(), 16_000_000, 9600);
        assert_eq!(serial::Write::write(&mut usart, b'x'), Err(nb::Error::WouldBlock));

        usart.bus_mut().raise(UCSR0A, UDRE0);
        usart.bus_mut().capture_writes(UDR0);
        ufmt::uwrite!(&mut usart, "v={}", 42u16).unwrap();
        assert_eq!(usart.bus().captured(), b"v=42");
    }

    #[test]
    fn read_returns_received_byte() {
        let mut usart = Usart::new(SimBus::new(), 16_000_000, 9600);
        assert_eq!(usart.read_byte(), None);

        usart.bus_mut().raise(UCSR0A, RXC0);
        usart.bus_mut().poke(UDR0, b'k');
        assert_eq!(usart.read_byte(), Some(b'k'));
    }

    fn buffered() -> (SimBus, TxBuffer) {
        (SimBus::new(), TxBuffer::new())
    }

    #[test]
    fn buffered_write_queues_and_unmasks_udre() {
        let (bus, tx) = buffered();
        let mut out = BufferedUsart::new(Usart::new(bus, 16_000_000, 9600), &tx);
        out.usart_mut().bus_mut().capture_writes(UDR0);

        ufmt::uwrite!(&mut out, "ok").unwrap();
        assert_eq!(tx.len(), 2);
        assert!(out.usart().bus().captured().is_empty());
        assert_eq!(out.usart().bus().peek(UCSR0B) & UDRIE0, UDRIE0);

        assert!(service_tx(out.usart_mut().bus_mut(), &tx));
        assert!(service_tx(out.usart_mut().bus_mut(), &tx));
        assert!(!service_tx(out.usart_mut().bus_mut(), &tx));

        assert_eq!(out.usart().bus().captured(), b"ok");
        assert_eq!(out.usart().bus().peek(UCSR0B) & UDRIE0, 0);
    }

    #[test]
    fn full_buffer_falls_back_to_polling() {
        let (bus, tx) = buffered();
        let mut out = BufferedUsart::new(Usart::new(bus, 16_000_000, 9600), &tx);
        out.usart_mut().bus_mut().raise(UCSR0A, UDRE0);
        out.usart_mut().bus_mut().capture_writes(UDR0);

        for i in 0..TX_BUFFER_LEN + 2 {
            out.write_byte(b'a' + (i % 26) as u8);
        }
        assert_eq!(tx.len(), TX_BUFFER_LEN);
        assert_eq!(out.usart().bus().captured(), b"ab");

        out.flush();
        assert!(tx.is_empty());
        let sent = out.usart().bus().captured();
        assert_eq!(sent.len(), TX_BUFFER_LEN + 2);
        assert!(sent.iter().enumerate().all(|(i, b)| *b == b'a' + (i % 26) as u8));
    }
}
