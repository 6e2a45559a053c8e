//! Circulation pump relay driver.

use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};

/// Relay switching the circulation pump. High energizes the coil.
pub trait Relay: StatefulOutputPin {}

/// A relay driven directly by a GPIO pin.
pub struct PinRelay<PIN: StatefulOutputPin> {
    pin: PIN,
}

impl<PIN: StatefulOutputPin> PinRelay<PIN> {
    pub fn new(pin: PIN) -> Self {
        Self { pin }
    }

    pub fn release(self) -> PIN {
        self.pin
    }
}

impl<PIN: StatefulOutputPin> OutputPin for PinRelay<PIN> {
    type Error = PIN::Error;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pin.set_low()
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.pin.set_high()
    }
}

impl<PIN: StatefulOutputPin> StatefulOutputPin for PinRelay<PIN> {
    fn is_set_high(&self) -> Result<bool, Self::Error> {
        self.pin.is_set_high()
    }

    fn is_set_low(&self) -> Result<bool, Self::Error> {
        self.pin.is_set_low()
    }
}

impl<PIN: StatefulOutputPin> Relay for PinRelay<PIN> {}

/// Output pin that remembers its level, standing in for a GPIO in tests
#[cfg(any(test, feature = "fake"))]
pub mod fake {
    use core::convert::Infallible;

    use embedded_hal::digital::v2::{OutputPin, StatefulOutputPin};

    #[derive(Debug, Default)]
    pub struct FakePin {
        high: bool,
        writes: usize,
    }

    impl FakePin {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn is_high(&self) -> bool {
            self.high
        }

        /// Number of times the level was driven
        pub fn writes(&self) -> usize {
            self.writes
        }
    }

    impl OutputPin for FakePin {
        type Error = Infallible;

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    impl StatefulOutputPin for FakePin {
        fn is_set_high(&self) -> Result<bool, Self::Error> {
            Ok(self.high)
        }

        fn is_set_low(&self) -> Result<bool, Self::Error> {
            Ok(!self.high)
        }
    }

    impl super::Relay for FakePin {}
}

#[cfg(test)]
mod tests {
    use super::{fake::FakePin, *};

    fn drive<R: Relay>(relay: &mut R, on: bool) {
        let _ = if on { relay.set_high() } else { relay.set_low() };
    }

    #[test]
    fn fake_pin_is_a_relay() {
        let mut pin = FakePin::new();
        drive(&mut pin, true);
        assert!(pin.is_high());
        assert_eq!(pin.writes(), 1);
    }

    #[test]
    fn pin_relay_forwards_levels() {
        let mut relay = PinRelay::new(FakePin::new());
        drive(&mut relay, true);
        assert_eq!(relay.is_set_high(), Ok(true));
        drive(&mut relay, false);
        assert_eq!(relay.is_set_low(), Ok(true));

        let pin = relay.release();
        assert!(!pin.is_high());
        assert_eq!(pin.writes(), 2);
    }
}
