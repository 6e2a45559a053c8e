use embedded_hal::{
    blocking::delay::DelayUs,
    digital::v2::{InputPin, OutputPin},
};
use heapless::Vec;

use crate::{
    ds18b20::{self, Ds18b20, Resolution},
    onewire::{Address, OneWire, Result},
    thermometer::{Temperature, TemperatureBus},
};

/// DS18B20 sensors sharing one 1-Wire bus
pub struct Ds18b20Bus<P, D> {
    ow: OneWire<P>,
    delay: D,
}

impl<P, E, D> Ds18b20Bus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u32>,
{
    pub const fn new(ow: OneWire<P>, delay: D) -> Self {
        Self { ow, delay }
    }

    pub fn wire(&self) -> &OneWire<P> {
        &self.ow
    }
    pub fn wire_mut(&mut self) -> &mut OneWire<P> {
        &mut self.ow
    }

    pub fn release(self) -> (OneWire<P>, D) {
        (self.ow, self.delay)
    }
}

impl<P, E, D> TemperatureBus for Ds18b20Bus<P, D>
where
    P: InputPin<Error = E> + OutputPin<Error = E>,
    D: DelayUs<u32>,
{
    type PinError = E;

    fn convert_all(&mut self, resolution: Resolution) -> Result<(), Self::PinError> {
        // Start conversion of all thermometers simultaneously
        Ds18b20::start_simultaneous_measurement(&mut self.ow, &mut self.delay)?;

        // Wait for conversion to complete
        let wait = resolution.conversion_time();
        self.delay.delay_us(u32::from(wait) * 1000);

        Ok(())
    }

    fn read_temperature(&mut self, address: Address) -> Result<Temperature, Self::PinError> {
        Ds18b20::new(address).read_data(&mut self.ow, &mut self.delay)
    }

    fn resolution(&mut self, address: Address) -> Result<Resolution, Self::PinError> {
        Ds18b20::new(address).resolution(&mut self.ow, &mut self.delay)
    }

    fn set_resolution(
        &mut self,
        address: Address,
        resolution: Resolution,
    ) -> Result<(), Self::PinError> {
        Ds18b20::checked(address)?.set_resolution(&mut self.ow, &mut self.delay, resolution)
    }

    fn search<const N: usize>(&mut self) -> Result<Vec<Address, N>, Self::PinError> {
        let mut addrs = Vec::new();

        for addr in self.ow.devices(&mut self.delay) {
            let addr = addr?;
            if addr.family_code() != ds18b20::FAMILY_CODE {
                debug!("Skipping non-thermometer device: {}", addr);
                continue;
            }
            if addrs.push(addr).is_err() {
                warn!("More than {=usize} thermometers on the bus", N);
                break;
            }
        }

        Ok(addrs)
    }
}
