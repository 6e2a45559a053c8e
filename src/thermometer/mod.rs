//! Temperature sensor interface

pub mod ds18b20;

use fixed::types::I28F4;
use heapless::Vec;

use crate::{
    ds18b20::Resolution,
    onewire::{Address, Result},
};

/// U28F4 is a fixed point number with 4 fractional bits and 28 integer bits.
/// This gives us a precision of 0.0625 degrees Celsius & a range of (-2^28, 2^28 - 0.0625).
pub type Temperature = I28F4;

/// A bus of individually addressed temperature sensors.
///
/// Every operation blocks until the bus transaction has finished.
pub trait TemperatureBus {
    type PinError;

    /// Starts a conversion on every sensor at once and waits long enough for sensors running at
    /// `resolution` to finish it
    fn convert_all(&mut self, resolution: Resolution) -> Result<(), Self::PinError>;

    /// Reads the result of the last conversion of one sensor in degrees Celsius
    fn read_temperature(&mut self, address: Address) -> Result<Temperature, Self::PinError>;

    /// Reads the resolution currently configured in a sensor
    fn resolution(&mut self, address: Address) -> Result<Resolution, Self::PinError>;

    /// Configures the resolution of a sensor
    fn set_resolution(
        &mut self,
        address: Address,
        resolution: Resolution,
    ) -> Result<(), Self::PinError>;

    /// Collects the addresses of up to `N` temperature sensors present on the bus
    fn search<const N: usize>(&mut self) -> Result<Vec<Address, N>, Self::PinError>;
}

/// Fake temperature bus for testing
#[cfg(any(test, feature = "fake"))]
pub mod fake {
    use core::convert::Infallible;

    use heapless::Vec;

    use crate::{
        ds18b20::Resolution,
        onewire::{Address, Error, Result},
        thermometer::{Temperature, TemperatureBus},
    };

    /// Most sensors a [`FakeBus`] can hold
    pub const CAPACITY: usize = 8;

    #[derive(Debug, Clone, Copy)]
    struct FakeSensor {
        address: Address,
        temp: Temperature,
        resolution: Resolution,
        responding: bool,
    }

    /// A bus whose sensors, readings and failures are set by the test
    #[derive(Debug, Default)]
    pub struct FakeBus {
        sensors: Vec<FakeSensor, CAPACITY>,
        conversions: usize,
        conversion_fails: bool,
        last_wait: Option<Resolution>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Connects a sensor reading `celsius`, configured for 12 bits
        pub fn attach(&mut self, address: Address, celsius: f32) {
            let sensor = FakeSensor {
                address,
                temp: Temperature::saturating_from_num(celsius),
                resolution: Resolution::Bits12,
                responding: true,
            };
            if self.sensors.push(sensor).is_err() {
                panic!("fake bus full");
            }
        }

        /// Disconnects a sensor, it no longer shows up in searches nor answers reads
        pub fn detach(&mut self, address: Address) {
            self.sensors.retain(|s| s.address != address);
        }

        pub fn set_temperature(&mut self, address: Address, celsius: f32) {
            if let Some(sensor) = self.sensor_mut(address) {
                sensor.temp = Temperature::saturating_from_num(celsius);
            }
        }

        /// Makes a sensor stay on the bus but fail its CRC on every read
        pub fn set_responding(&mut self, address: Address, responding: bool) {
            if let Some(sensor) = self.sensor_mut(address) {
                sensor.responding = responding;
            }
        }

        /// Makes every conversion request fail
        pub fn set_conversion_fails(&mut self, fails: bool) {
            self.conversion_fails = fails;
        }

        /// Number of conversions started so far
        pub fn conversions(&self) -> usize {
            self.conversions
        }

        /// Resolution the last conversion waited for
        pub fn last_wait(&self) -> Option<Resolution> {
            self.last_wait
        }

        pub fn sensor_resolution(&self, address: Address) -> Option<Resolution> {
            self.sensors
                .iter()
                .find(|s| s.address == address)
                .map(|s| s.resolution)
        }

        fn sensor_mut(&mut self, address: Address) -> Option<&mut FakeSensor> {
            self.sensors.iter_mut().find(|s| s.address == address)
        }

        fn responding(&mut self, address: Address) -> Result<&mut FakeSensor, Infallible> {
            match self.sensor_mut(address) {
                Some(sensor) if sensor.responding => Ok(sensor),
                Some(_) => Err(Error::CrcMismatch),
                None => Err(Error::UnexpectedResponse),
            }
        }
    }

    impl TemperatureBus for FakeBus {
        type PinError = Infallible;

        fn convert_all(&mut self, resolution: Resolution) -> Result<(), Self::PinError> {
            if self.conversion_fails {
                return Err(Error::BusNotHigh);
            }
            self.conversions += 1;
            self.last_wait = Some(resolution);
            Ok(())
        }

        fn read_temperature(&mut self, address: Address) -> Result<Temperature, Self::PinError> {
            self.responding(address).map(|s| s.temp)
        }

        fn resolution(&mut self, address: Address) -> Result<Resolution, Self::PinError> {
            self.responding(address).map(|s| s.resolution)
        }

        fn set_resolution(
            &mut self,
            address: Address,
            resolution: Resolution,
        ) -> Result<(), Self::PinError> {
            self.responding(address).map(|s| s.resolution = resolution)
        }

        fn search<const N: usize>(&mut self) -> Result<Vec<Address, N>, Self::PinError> {
            Ok(self.sensors.iter().take(N).map(|s| s.address).collect())
        }
    }
}
