use core::fmt;

/// A 64-bit address of a device. These are globally unique, and used to single out a single device
/// on a potentially crowded bus
///
/// The all-zero address is never issued to a real device and marks a probe that has no sensor
/// assigned yet.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Address(pub u64);

static_assertions::assert_eq_size!(Address, [u8; 8]);

impl Address {
    /// Placeholder for a probe without a sensor
    pub const UNASSIGNED: Self = Self(0);

    /// Builds an address from the ROM bytes in bus order (family code first, CRC last)
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// ROM bytes in bus order
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub const fn family_code(self) -> u8 {
        self.0.to_le_bytes()[0]
    }

    pub const fn is_unassigned(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:016X?}", self.0)
    }
}

/// Dash separated hex bytes in bus order, e.g. `28-ff-64-1e-f-0-0-34`.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        for (i, byte) in self.to_bytes().iter().enumerate() {
            if i != 0 {
                f.write_str("-")?;
            }
            write!(f, "{byte:x}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=u64:016X}", self.0);
    }
}
