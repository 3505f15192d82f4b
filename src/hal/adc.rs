use crate::hal::regs::{Reg, RegisterBus};

pub(crate) const ADCL: Reg = Reg(0x78);
pub(crate) const ADCH: Reg = Reg(0x79);
pub(crate) const ADCSRA: Reg = Reg(0x7A);
const ADCSRB: Reg = Reg(0x7B);
pub(crate) const ADMUX: Reg = Reg(0x7C);
const DIDR0: Reg = Reg(0x7E);

const ADEN: u8 = 1 << 7;
pub(crate) const ADSC: u8 = 1 << 6;
const MUX_MASK: u8 = 0x0F;
const REFS_MASK: u8 = 0xC0;

/// Full-scale count of a 10-bit conversion.
pub const FULL_SCALE: u32 = 1024;
/// Nominal internal bandgap.
pub const BANDGAP_MV: u32 = 1100;

/// Polling budget for one conversion; a conversion at ADC clock / 128 takes
/// 25 ADC cycles at most, far below this.
const POLL_LIMIT: u16 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcChannel {
    Adc0 = 0,
    Adc1 = 1,
    Adc2 = 2,
    Adc3 = 3,
    Adc4 = 4,
    Adc5 = 5,
    Adc6 = 6,
    Adc7 = 7,
    Temperature = 8,
    Bandgap = 14,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcReference {
    Aref = 0x00,
    Avcc = 0x40,
    Internal1V1 = 0xC0,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcPrescaler {
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div32 = 5,
    Div64 = 6,
    Div128 = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdcError {
    /// ADSC never cleared.
    Timeout,
    /// Bandgap read as zero; the supply cannot be derived from it.
    ZeroReading,
    /// Bandgap reading so low the derived supply does not fit in millivolts.
    SupplyOutOfRange,
}

impl ufmt::uDisplay for AdcError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        match self {
            AdcError::Timeout => f.write_str("adc timeout"),
            AdcError::ZeroReading => f.write_str("adc zero reading"),
            AdcError::SupplyOutOfRange => f.write_str("adc supply out of range"),
        }
    }
}

/// Anything that can report a channel voltage in millivolts.
pub trait VoltageSource {
    fn millivolts(&mut self, channel: AdcChannel) -> Result<u16, AdcError>;
}

/// Single-conversion, polled ADC.
pub struct Adc<B> {
    bus: B,
    vref_mv: u32,
}

impl<B: RegisterBus> Adc<B> {
    pub fn new(mut bus: B, reference: AdcReference, prescaler: AdcPrescaler, vref_mv: u32) -> Self {
        bus.write(ADMUX, reference as u8);
        bus.write(ADCSRB, 0);
        bus.write(ADCSRA, ADEN | prescaler as u8);
        Self { bus, vref_mv }
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn set_reference(&mut self, reference: AdcReference) {
        self.bus.modify(ADMUX, |r| (r & !REFS_MASK) | reference as u8);
    }

    /// Turn off the digital input buffers of ADC0..5 selected by `mask`.
    pub fn disable_digital_inputs(&mut self, mask: u8) {
        self.bus.set_bits(DIDR0, mask & 0x3F);
    }

    pub fn read_channel(&mut self, channel: AdcChannel) -> Result<u16, AdcError> {
        self.bus.modify(ADMUX, |r| (r & !MUX_MASK) | channel as u8);
        self.bus.set_bits(ADCSRA, ADSC);

        let mut polls = 0;
        while self.bus.read(ADCSRA) & ADSC != 0 {
            polls += 1;
            if polls >= POLL_LIMIT {
                return Err(AdcError::Timeout);
            }
        }

        // ADCL first; it locks ADCH until read
        let low = self.bus.read(ADCL) as u16;
        let high = self.bus.read(ADCH) as u16;
        Ok(((high & 0x03) << 8) | low)
    }

    pub fn read_millivolts(&mut self, channel: AdcChannel) -> Result<u16, AdcError> {
        let raw = self.read_channel(channel)? as u32;
        Ok((raw * self.vref_mv / FULL_SCALE) as u16)
    }

    /// Supply voltage measured against the bandgap with AVCC as reference.
    /// The result replaces the configured reference voltage.
    pub fn measure_avcc_mv(&mut self) -> Result<u16, AdcError> {
        self.set_reference(AdcReference::Avcc);
        let raw = self.read_channel(AdcChannel::Bandgap)? as u32;
        if raw == 0 {
            return Err(AdcError::ZeroReading);
        }
        let mv = u16::try_from(BANDGAP_MV * FULL_SCALE / raw).map_err(|_| AdcError::SupplyOutOfRange)?;
        self.vref_mv = mv as u32;
        Ok(mv)
    }
}

impl<B: RegisterBus> VoltageSource for Adc<B> {
    fn millivolts(&mut self, channel: AdcChannel) -> Result<u16, AdcError> {
        self.read_millivolts(channel)
    }
}
