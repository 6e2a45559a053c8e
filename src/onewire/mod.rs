//! Bit-banged 1-Wire bus master.

mod address;
pub mod commands;
pub mod crc;
mod error;

use embedded_hal::{
    blocking::delay::DelayUs,
    digital::v2::{InputPin, OutputPin},
};

pub use self::{address::Address, error::*};

/// 1-Wire master driving an open-drain pin.
///
/// The pin must read back the bus level while released (set high), which is how open-drain outputs
/// behave with the external pull-up.
pub struct OneWire<P> {
    pin: P,
}

impl<P, E> OneWire<P>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
{
    pub fn new(pin: P) -> Self {
        Self { pin }
    }

    pub fn release(self) -> P {
        self.pin
    }

    /// Perform a reset initialization sequence
    ///
    /// Fails with [`Error::UnexpectedResponse`] when no device answers with a presence pulse.
    pub fn reset(&mut self, delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        // Wait for the bus to be pulled high by the pull-up resistor
        let mut retries = 125;
        while self.pin.is_low()? {
            if retries == 0 {
                return Err(Error::BusNotHigh);
            }
            retries -= 1;
            delay.delay_us(2);
        }

        // Pull the bus low for 480us
        self.pin.set_low()?;
        delay.delay_us(480);

        // Release the bus
        self.pin.set_high()?;
        delay.delay_us(70);

        // Read the bus
        let is_low = self.pin.is_low()?;
        delay.delay_us(410);

        if is_low {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse)
        }
    }

    /// Write a single bit to the bus
    pub fn write_bit(&mut self, bit: bool, delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        if bit {
            // Pull the bus low for 10us
            self.pin.set_low()?;
            delay.delay_us(10);

            // Release the bus
            self.pin.set_high()?;

            // Wait for the end of the timeslot
            delay.delay_us(55);
        } else {
            // Pull the bus low for 65us
            self.pin.set_low()?;
            delay.delay_us(65);

            // Release the bus
            self.pin.set_high()?;

            // Wait for the end of the timeslot
            delay.delay_us(5);
        }

        Ok(())
    }

    /// Read a single bit from the bus
    pub fn read_bit(&mut self, delay: &mut impl DelayUs<u32>) -> Result<bool, E> {
        // The sample window is a few microseconds wide, an interrupt here would miss it
        let ret = cortex_m::interrupt::free(|_| {
            self.pin.set_low()?;
            delay.delay_us(1);

            self.pin.set_high()?;

            // Give devices time to drive the bus
            delay.delay_us(1);

            self.pin.is_high()
        })?;

        // Wait for the end of the timeslot
        delay.delay_us(53);

        Ok(ret)
    }

    /// Write a single byte to the bus, LSB first
    pub fn write_byte(&mut self, byte: u8, delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        for i in 0..8 {
            self.write_bit((byte >> i) & 1 == 1, delay)?;
        }
        Ok(())
    }

    /// Write multiple bytes to the bus
    pub fn write_bytes(&mut self, bytes: &[u8], delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        for byte in bytes {
            self.write_byte(*byte, delay)?;
        }
        Ok(())
    }

    /// Read a single byte from the bus, LSB first
    pub fn read_byte(&mut self, delay: &mut impl DelayUs<u32>) -> Result<u8, E> {
        let mut ret = 0;
        for i in 0..8 {
            if self.read_bit(delay)? {
                ret |= 1 << i;
            }
        }
        Ok(ret)
    }

    /// Read multiple bytes from the bus
    pub fn read_bytes(&mut self, bytes: &mut [u8], delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        for byte in bytes {
            *byte = self.read_byte(delay)?;
        }
        Ok(())
    }

    /// Do a ROM select
    pub fn select_address(
        &mut self,
        device: &Address,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), E> {
        self.write_byte(commands::MATCH_ROM, delay)?;
        self.write_bytes(&device.to_bytes(), delay)
    }

    /// Do a ROM skip
    pub fn skip_address(&mut self, delay: &mut impl DelayUs<u32>) -> Result<(), E> {
        self.write_byte(commands::SKIP_ROM, delay)
    }

    /// Get iterator over all devices on the bus
    pub fn devices<'a, 'd, D: DelayUs<u32>>(
        &'a mut self,
        delay: &'d mut D,
    ) -> DeviceSearch<'a, 'd, P, D> {
        DeviceSearch {
            wire: self,
            last_discrepancy: 0,
            last_device_flag: false,
            rom_no: [0; 8],
            delay,
        }
    }

    /// Send a command to the bus
    ///
    /// Does the following sequence:
    /// 1. Reset the bus
    /// 2. Select the given address, or skip if None
    /// 3. Write the command byte
    pub fn send_command(
        &mut self,
        address: Option<&Address>,
        command: u8,
        delay: &mut impl DelayUs<u32>,
    ) -> Result<(), E> {
        self.reset(delay)?;
        if let Some(address) = address {
            self.select_address(address, delay)?;
        } else {
            self.skip_address(delay)?;
        }
        self.write_byte(command, delay)?;
        Ok(())
    }
}

/// ROM search over every device on the bus (Maxim application note 187).
pub struct DeviceSearch<'a, 'd, P, D> {
    wire: &'a mut OneWire<P>,
    last_discrepancy: u8,
    last_device_flag: bool,
    rom_no: [u8; 8],
    delay: &'d mut D,
}

impl<P, E, D> DeviceSearch<'_, '_, P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u32>,
{
    pub fn search(&mut self) -> Result<Option<Address>, E> {
        if self.last_device_flag {
            return Ok(None);
        }

        // An empty bus has nobody to answer the reset pulse
        match self.wire.reset(&mut *self.delay) {
            Ok(()) => {}
            Err(Error::UnexpectedResponse) => return Ok(None),
            Err(e) => return Err(e),
        }
        self.wire.write_byte(commands::SEARCH_NORMAL, &mut *self.delay)?;

        let mut id_bit_number = 1u8;
        let mut last_zero = 0u8;
        let mut rom_byte_number = 0usize;
        let mut rom_byte_mask = 1u8;

        while rom_byte_number < 8 {
            let id_bit = self.wire.read_bit(&mut *self.delay)?;
            let cmp_id_bit = self.wire.read_bit(&mut *self.delay)?;

            // No devices left in this branch
            if id_bit && cmp_id_bit {
                break;
            }

            let search_direction = if id_bit != cmp_id_bit {
                // All remaining devices agree on this bit
                id_bit
            } else {
                // Discrepancy: before the last one repeat the previous choice, at it take 1,
                // after it take 0
                let sd = if id_bit_number < self.last_discrepancy {
                    (self.rom_no[rom_byte_number] & rom_byte_mask) > 0
                } else {
                    id_bit_number == self.last_discrepancy
                };

                if !sd {
                    last_zero = id_bit_number;
                }

                sd
            };

            if search_direction {
                self.rom_no[rom_byte_number] |= rom_byte_mask;
            } else {
                self.rom_no[rom_byte_number] &= !rom_byte_mask;
            }

            self.wire.write_bit(search_direction, &mut *self.delay)?;

            id_bit_number += 1;
            rom_byte_mask <<= 1;

            if rom_byte_mask == 0 {
                rom_byte_number += 1;
                rom_byte_mask = 1;
            }
        }

        if id_bit_number < 65 || self.rom_no[0] == 0 {
            self.last_discrepancy = 0;
            self.last_device_flag = true;
            return Ok(None);
        }

        crc::check_crc8(&self.rom_no)?;

        self.last_discrepancy = last_zero;
        if self.last_discrepancy == 0 {
            self.last_device_flag = true;
        }

        Ok(Some(Address::from_bytes(self.rom_no)))
    }
}

impl<P, E, D> Iterator for DeviceSearch<'_, '_, P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u32>,
{
    type Item = Result<Address, E>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.search();
        if result.is_err() {
            // Don't keep retrying a broken search
            self.last_device_flag = true;
        }
        result.transpose()
    }
}
