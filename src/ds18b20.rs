//! Implementation for the DS18B20 temperature sensor.

use embedded_hal::{
    blocking::delay::DelayUs,
    digital::v2::{InputPin, OutputPin},
};

use crate::{
    onewire::{crc::check_crc8, Address, Error, OneWire, Result},
    thermometer::Temperature,
};

pub const FAMILY_CODE: u8 = 0x28;

pub const CONVERT_T: u8 = 0x44;
pub const READ_SCRATCHPAD: u8 = 0xBE;
pub const WRITE_SCRATCHPAD: u8 = 0x4E;
pub const COPY_SCRATCHPAD: u8 = 0x48;

/// EEPROM write time after [`COPY_SCRATCHPAD`], in milliseconds
const COPY_TIME_MS: u32 = 10;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ds18b20 {
    addr: Address,
}

impl Ds18b20 {
    #[inline]
    pub const fn new(addr: Address) -> Self {
        Self { addr }
    }

    /// Like [`Ds18b20::new`], but rejects addresses of other device families
    pub fn checked<E>(addr: Address) -> Result<Self, E> {
        if addr.family_code() == FAMILY_CODE {
            Ok(Self::new(addr))
        } else {
            Err(Error::FamilyCodeMismatch)
        }
    }

    #[inline]
    pub const fn address(&self) -> Address {
        self.addr
    }

    fn read_scratchpad<P, E>(
        &self,
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<[u8; 9], E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        wire.send_command(Some(&self.addr), READ_SCRATCHPAD, delay)?;

        let mut buf = [0u8; 9];
        wire.read_bytes(&mut buf, delay)?;

        check_crc8(&buf)?;

        Ok(buf)
    }

    fn write_scratchpad<P, E>(
        &mut self,
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
        data: [u8; 3],
    ) -> Result<(), E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        wire.send_command(Some(&self.addr), WRITE_SCRATCHPAD, delay)?;
        wire.write_bytes(&data, delay)?;
        wire.reset(delay)?;
        Ok(())
    }

    /// Stores the alarm and configuration registers in EEPROM
    fn copy_scratchpad<P, E>(
        &mut self,
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        wire.send_command(Some(&self.addr), COPY_SCRATCHPAD, delay)?;
        delay.delay_us(COPY_TIME_MS * 1000);
        Ok(())
    }

    /// Retrieves the resolution of the sensor
    pub fn resolution<P, E>(
        &self,
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<Resolution, E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        let buf = self.read_scratchpad(wire, delay)?;
        Resolution::from_config_register(buf[4]).ok_or(Error::UnexpectedResponse)
    }

    /// Sets the resolution of the sensor and keeps it across power cycles
    pub fn set_resolution<P, E>(
        &mut self,
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
        res: Resolution,
    ) -> Result<(), E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        let mut buf = self.read_scratchpad(wire, delay)?;
        if Resolution::from_config_register(buf[4]) == Some(res) {
            return Ok(());
        }

        buf[4] = res.to_config_register();
        self.write_scratchpad(wire, delay, [buf[2], buf[3], buf[4]])?;
        self.copy_scratchpad(wire, delay)
    }

    /// Starts a temperature conversion on every sensor of the bus at once
    ///
    /// Call [`Ds18b20::read_data`] on each sensor after the conversion time of the slowest one.
    pub fn start_simultaneous_measurement<P, E>(
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        wire.send_command(None, CONVERT_T, delay)
    }

    /// Reads the temperature data from the sensor
    pub fn read_data<P, E>(
        &self,
        wire: &mut OneWire<P>,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<Temperature, E>
    where
        P: InputPin<Error = E> + OutputPin<Error = E>,
    {
        let buf = self.read_scratchpad(wire, delay)?;
        decode_scratchpad(&buf).ok_or(Error::UnexpectedResponse)
    }
}

/// Decodes the temperature registers of a (CRC checked) scratchpad
///
/// Bits below the configured resolution are undefined and get masked off.
fn decode_scratchpad(buf: &[u8; 9]) -> Option<Temperature> {
    let mut lsb = buf[0];
    match Resolution::from_config_register(buf[4])? {
        Resolution::Bits9 => lsb &= 0b1111_1000,
        Resolution::Bits10 => lsb &= 0b1111_1100,
        Resolution::Bits11 => lsb &= 0b1111_1110,
        Resolution::Bits12 => {}
    }

    let value = i16::from_le_bytes([lsb, buf[1]]);
    Some(Temperature::from_bits(i32::from(value)))
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    Bits9,
    Bits10,
    Bits11,
    Bits12,
}

impl Resolution {
    fn from_config_register(reg: u8) -> Option<Resolution> {
        match reg {
            0b0001_1111 => Some(Resolution::Bits9),
            0b0011_1111 => Some(Resolution::Bits10),
            0b0101_1111 => Some(Resolution::Bits11),
            0b0111_1111 => Some(Resolution::Bits12),
            _ => None,
        }
    }

    pub fn to_config_register(self) -> u8 {
        match self {
            Resolution::Bits9 => 0b0001_1111,
            Resolution::Bits10 => 0b0011_1111,
            Resolution::Bits11 => 0b0101_1111,
            Resolution::Bits12 => 0b0111_1111,
        }
    }

    /// Resolution for a bit count, clamped to the 9..=12 range the sensor supports
    pub fn from_bits(bits: u8) -> Resolution {
        match bits {
            0..=9 => Resolution::Bits9,
            10 => Resolution::Bits10,
            11 => Resolution::Bits11,
            _ => Resolution::Bits12,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Resolution::Bits9 => 9,
            Resolution::Bits10 => 10,
            Resolution::Bits11 => 11,
            Resolution::Bits12 => 12,
        }
    }

    /// Returns the minimum conversion time in milliseconds
    pub fn conversion_time(self) -> u16 {
        match self {
            Resolution::Bits9 => 94,
            Resolution::Bits10 => 188,
            Resolution::Bits11 => 375,
            Resolution::Bits12 => 750,
        }
    }
}
