//! Controller switching the circulation pump [`Relay`](crate::relay::Relay) on the temperature
//! difference between the solar battery and the boiler.

use crate::registry::Health;

mod hysteresis;
mod thermal;

pub use self::{
    hysteresis::{decide, Decision},
    thermal::ThermalController,
};

/// Lowest configurable switch-on difference in degrees Celsius
pub const DELTA_MIN: f32 = 3.0;
/// Highest configurable switch-on difference in degrees Celsius
pub const DELTA_MAX: f32 = 10.0;
pub const DEFAULT_DELTA: f32 = 5.0;
/// Distance between the switch-on and switch-off differences
pub const HYSTERESIS_GAP: f32 = 2.0;

/// What a bound probe measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Solar collector
    Battery,
    /// Storage tank
    Boiler,
    /// Pipe exit, monitored only
    Exit,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Battery, Role::Boiler, Role::Exit];

    /// Role for its position in [`Role::ALL`]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Role::Battery),
            1 => Some(Role::Boiler),
            2 => Some(Role::Exit),
            _ => None,
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Role::Battery => 0,
            Role::Boiler => 1,
            Role::Exit => 2,
        }
    }
}

/// Aggregate controller state, reported with the codes of [`Status::code`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Disabled = 1,
    BatteryFault = 2,
    BoilerFault = 3,
    ExitFault = 4,
}

impl Status {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn is_fault(self) -> bool {
        matches!(
            self,
            Status::BatteryFault | Status::BoilerFault | Status::ExitFault
        )
    }
}

/// Whether a role can be used for the decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoleStatus {
    Ok,
    /// No probe bound to the role
    Unassigned,
    /// The bound index no longer exists, e.g. after a deletion
    StaleIndex,
    SensorFault(Health),
}

impl RoleStatus {
    pub const fn is_ok(self) -> bool {
        matches!(self, RoleStatus::Ok)
    }
}

/// User settings of the controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    pub enabled: bool,
    /// Pump state while the battery or boiler role is faulty
    pub fail_safe_on_fault: bool,
    /// Energize the relay to stop the pump
    pub relay_inverted: bool,
    /// Switch-on difference in degrees Celsius, within [`DELTA_MIN`]..=[`DELTA_MAX`]
    pub hysteresis_delta: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_safe_on_fault: true,
            relay_inverted: true,
            hysteresis_delta: DEFAULT_DELTA,
        }
    }
}

/// Clamps a switch-on difference to the configurable range. NaN falls back to the default.
pub fn clamp_delta(delta: f32) -> f32 {
    if delta.is_nan() {
        DEFAULT_DELTA
    } else {
        delta.clamp(DELTA_MIN, DELTA_MAX)
    }
}
