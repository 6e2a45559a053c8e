//! Solar thermal circulation pump control.
//!
//! DS18B20 probes on a 1-Wire bus are read periodically by a [`registry::SensorRegistry`], and a
//! [`controller::ThermalController`] switches the pump relay on the battery to boiler temperature
//! difference. [`system::SolarSystem`] ties both together for the firmware.

#![cfg_attr(not(test), no_std)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::cast_precision_loss
)]

#[macro_use]
mod fmt;

pub mod controller;
pub mod ds18b20;
pub mod onewire;
pub mod registry;
pub mod relay;
pub mod settings;
pub mod system;
pub mod thermometer;

/// Millisecond timestamp used for acquisition scheduling
pub type Instant = fugit::Instant<u64, 1, 1000>;
/// Millisecond duration matching [`Instant`]
pub type Duration = fugit::Duration<u64, 1, 1000>;
