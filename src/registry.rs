//! Configured temperature probes, their periodic acquisition and bus discovery.
//!
//! Every index taking operation is a no-op on an out of range index and reports it through its
//! return value (`false` or `None`), callers are expected to check.

use core::fmt;

use heapless::{String, Vec};

use crate::{
    ds18b20::Resolution,
    onewire::Address,
    thermometer::TemperatureBus,
    Duration, Instant,
};

/// Default capacity of a [`SensorRegistry`]
pub const MAX_PROBES: usize = 8;

/// Longest probe name, in characters
pub const NAME_LEN: usize = 2;
pub const DEFAULT_PROBE_NAME: &str = "DS";
pub const DEFAULT_RESOLUTION: Resolution = Resolution::Bits12;

/// Corrections are clamped to +/- this many degrees
pub const CORRECTION_LIMIT: f32 = 20.0;

pub const DEFAULT_READ_INTERVAL_SECS: u8 = 5;
pub const MAX_READ_INTERVAL_SECS: u8 = 100;

/// Value a DS18B20 reports after power-on when no conversion has completed.
///
/// Other sensor families have other reset values.
pub const STUCK_AT_RAIL_C: f32 = 85.0;

/// Raw readings below this are failed reads
pub const READ_ERROR_C: f32 = -100.0;

/// Raw value recorded when the bus transaction itself failed
pub const DISCONNECTED_C: f32 = -127.0;

/// Short user label of a probe: at most [`NAME_LEN`] printable ASCII characters
#[derive(Clone, PartialEq, Eq)]
pub struct ProbeName(String<NAME_LEN>);

impl ProbeName {
    pub fn new(name: &str) -> Option<Self> {
        if name.is_empty() || !name.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
            return None;
        }

        let mut s = String::new();
        s.push_str(name).ok()?;
        Some(Self(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for ProbeName {
    fn default() -> Self {
        let mut s = String::new();
        // DEFAULT_PROBE_NAME is shorter than NAME_LEN
        let _ = s.push_str(DEFAULT_PROBE_NAME);
        Self(s)
    }
}

impl fmt::Debug for ProbeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for ProbeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProbeName {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "{=str}", self.as_str());
    }
}

/// Outcome of the last acquisition of a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Health {
    Ok,
    /// The bus read failed or returned an impossible value
    ReadError,
    /// The sensor returned its power-on value
    StuckAtRail,
    /// Not read yet, or no address assigned
    #[default]
    Unspecified,
}

impl Health {
    /// Classifies a raw (uncorrected) reading in degrees Celsius
    pub fn classify(raw: f32) -> Self {
        if raw < READ_ERROR_C {
            Health::ReadError
        } else if raw == STUCK_AT_RAIL_C {
            Health::StuckAtRail
        } else {
            Health::Ok
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Health::Ok)
    }
}

/// One configured temperature sensor
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TemperatureProbe {
    name: ProbeName,
    address: Address,
    resolution: Resolution,
    correction: f32,
    temperature: f32,
    health: Health,
}

impl Default for TemperatureProbe {
    fn default() -> Self {
        Self {
            name: ProbeName::default(),
            address: Address::UNASSIGNED,
            resolution: DEFAULT_RESOLUTION,
            correction: 0.0,
            temperature: 0.0,
            health: Health::Unspecified,
        }
    }
}

impl TemperatureProbe {
    pub fn name(&self) -> &ProbeName {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Calibration offset in degrees Celsius
    pub fn correction(&self) -> f32 {
        self.correction
    }

    /// Last reading in degrees Celsius.
    ///
    /// Corrected only when [`TemperatureProbe::health`] is [`Health::Ok`], otherwise the raw value
    /// of the failed read.
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn health(&self) -> Health {
        self.health
    }

    /// Records a raw reading. A faulty reading keeps its raw value so the correction can't move
    /// it off a fault boundary.
    fn record(&mut self, raw: f32) {
        self.health = Health::classify(raw);
        self.temperature = if self.health.is_ok() {
            raw + self.correction
        } else {
            raw
        };
    }
}

/// A sensor found by [`SensorRegistry::scan_bus`]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanEntry {
    pub address: Address,
    /// Uncorrected reading, `None` if the sensor didn't answer
    pub temperature: Option<f32>,
}

/// Anything carrying a bus address
pub trait Addressed {
    fn address(&self) -> Address;
}

impl Addressed for Address {
    fn address(&self) -> Address {
        *self
    }
}

impl Addressed for TemperatureProbe {
    fn address(&self) -> Address {
        self.address
    }
}

impl Addressed for ScanEntry {
    fn address(&self) -> Address {
        self.address
    }
}

/// Position of the first item with `address`
pub fn find_index_by_address<T: Addressed>(items: &[T], address: Address) -> Option<usize> {
    items.iter().position(|item| item.address() == address)
}

/// Read-only view of probe readings, indexed like the registry
pub trait ProbeSource {
    fn probe_count(&self) -> usize;

    /// `None` for an out of range index
    fn probe_health(&self, index: usize) -> Option<Health>;

    /// `None` for an out of range index
    fn probe_temperature(&self, index: usize) -> Option<f32>;
}

impl ProbeSource for [TemperatureProbe] {
    fn probe_count(&self) -> usize {
        self.len()
    }

    fn probe_health(&self, index: usize) -> Option<Health> {
        self.get(index).map(TemperatureProbe::health)
    }

    fn probe_temperature(&self, index: usize) -> Option<f32> {
        self.get(index).map(TemperatureProbe::temperature)
    }
}

/// Owns the configured probes and the bus they sit on.
///
/// Probes live in a fixed capacity list of `N` entries. Deleting a probe shifts the ones after it
/// down by one; anything holding probe indices has to be told (see
/// [`crate::controller::ThermalController::on_probe_deleted`]).
pub struct SensorRegistry<B, const N: usize = MAX_PROBES> {
    bus: B,
    probes: Vec<TemperatureProbe, N>,
    read_interval: Duration,
    last_refresh: Option<Instant>,
}

impl<B: TemperatureBus, const N: usize> SensorRegistry<B, N> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            probes: Vec::new(),
            read_interval: Duration::secs(u64::from(DEFAULT_READ_INTERVAL_SECS)),
            last_refresh: None,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.probes.is_full()
    }

    /// Most probes the registry can hold
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn probes(&self) -> &[TemperatureProbe] {
        &self.probes
    }

    pub fn probe(&self, index: usize) -> Option<&TemperatureProbe> {
        self.probes.get(index)
    }

    /// Appends an unassigned probe with default settings.
    ///
    /// Returns `false` when the registry is full.
    pub fn add_probe(&mut self) -> bool {
        if self.probes.push(TemperatureProbe::default()).is_err() {
            warn!("Probe limit of {=usize} reached", N);
            return false;
        }

        info!("Added probe {=usize}", self.probes.len() - 1);
        true
    }

    /// Removes a probe, the probes after it move down one index.
    pub fn delete_probe(&mut self, index: usize) -> bool {
        if index >= self.probes.len() {
            return false;
        }

        let probe = self.probes.remove(index);
        info!("Deleted probe {=usize} ({})", index, probe.name);
        true
    }

    /// Renames a probe. Names that are empty, too long or not printable are rejected.
    pub fn set_probe_name(&mut self, index: usize, name: &str) -> bool {
        let Some(probe) = self.probes.get_mut(index) else {
            return false;
        };
        let Some(name) = ProbeName::new(name) else {
            warn!("Rejected name for probe {=usize}", index);
            return false;
        };

        probe.name = name;
        true
    }

    /// Binds a probe to a sensor and pushes the probe's resolution to it.
    ///
    /// The all-zero address is rejected, use [`SensorRegistry::clear_probe_address`] to unbind.
    pub fn set_probe_address(&mut self, index: usize, address: Address) -> bool {
        if address.is_unassigned() {
            warn!("Ignoring empty address for probe {=usize}", index);
            return false;
        }
        let Some(probe) = self.probes.get_mut(index) else {
            return false;
        };

        info!("Probe {=usize} bound to {}", index, address);
        probe.address = address;
        probe.health = Health::Unspecified;

        let resolution = probe.resolution;
        apply_resolution(&mut self.bus, probe, resolution);
        true
    }

    /// Unbinds a probe from its sensor. It reports [`Health::Unspecified`] until bound again.
    pub fn clear_probe_address(&mut self, index: usize) -> bool {
        let Some(probe) = self.probes.get_mut(index) else {
            return false;
        };

        info!("Probe {=usize} unbound", index);
        probe.address = Address::UNASSIGNED;
        probe.health = Health::Unspecified;
        true
    }

    /// Sets the resolution of a probe, clamped to 9..=12 bits.
    ///
    /// A bound probe gets the resolution written to its sensor and keeps whatever the sensor
    /// reports back. An unbound probe stores it until it gets an address.
    pub fn set_probe_resolution(&mut self, index: usize, bits: u8) -> bool {
        let Some(probe) = self.probes.get_mut(index) else {
            return false;
        };

        apply_resolution(&mut self.bus, probe, Resolution::from_bits(bits));
        true
    }

    /// Reloads the resolution of a bound probe from its sensor.
    ///
    /// Returns the resolution now stored, `None` for an invalid index.
    pub fn sync_probe_resolution(&mut self, index: usize) -> Option<Resolution> {
        let probe = self.probes.get_mut(index)?;

        if !probe.address.is_unassigned() {
            match self.bus.resolution(probe.address) {
                Ok(resolution) => probe.resolution = resolution,
                Err(e) => error!(
                    "Failed to read resolution of {}: {=str}",
                    probe.address,
                    e.as_str()
                ),
            }
        }

        Some(probe.resolution)
    }

    /// Sets the calibration offset, clamped to +/- [`CORRECTION_LIMIT`]
    pub fn set_probe_correction(&mut self, index: usize, correction: f32) -> bool {
        let Some(probe) = self.probes.get_mut(index) else {
            return false;
        };

        probe.correction = if correction.is_nan() {
            0.0
        } else {
            correction.clamp(-CORRECTION_LIMIT, CORRECTION_LIMIT)
        };
        true
    }

    pub fn find_probe_index_by_address(&self, address: Address) -> Option<usize> {
        find_index_by_address(&self.probes, address)
    }

    pub fn read_interval(&self) -> Duration {
        self.read_interval
    }

    /// Sets the acquisition interval in seconds, clamped to [`MAX_READ_INTERVAL_SECS`]. Zero turns
    /// periodic acquisition off.
    pub fn set_read_interval(&mut self, secs: u8) {
        let secs = secs.min(MAX_READ_INTERVAL_SECS);
        self.read_interval = Duration::secs(u64::from(secs));
        info!("Read interval set to {=u8}s", secs);
    }

    /// Runs [`SensorRegistry::refresh_all`] if the read interval has elapsed since the last run.
    ///
    /// The first poll always refreshes. Returns whether a refresh ran.
    #[cfg_attr(feature = "sizing", inline(never))]
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.read_interval.ticks() == 0 {
            return false;
        }

        let due = match self.last_refresh {
            None => true,
            // A clock that went backwards counts as elapsed
            Some(last) => now
                .checked_duration_since(last)
                .map_or(true, |elapsed| elapsed >= self.read_interval),
        };
        if !due {
            return false;
        }

        self.last_refresh = Some(now);
        self.refresh_all();
        true
    }

    /// Converts and reads every bound probe, then classifies the readings.
    ///
    /// Blocks for the conversion time of the highest resolution in use.
    #[cfg_attr(feature = "sizing", inline(never))]
    pub fn refresh_all(&mut self) {
        let wait = self
            .probes
            .iter()
            .filter(|p| !p.address.is_unassigned())
            .map(|p| p.resolution)
            .max();

        let converted = match wait {
            None => false,
            Some(resolution) => match self.bus.convert_all(resolution) {
                Ok(()) => true,
                Err(e) => {
                    error!("Temperature conversion failed: {=str}", e.as_str());
                    false
                }
            },
        };

        for (index, probe) in self.probes.iter_mut().enumerate() {
            if probe.address.is_unassigned() {
                probe.health = Health::Unspecified;
                continue;
            }

            let raw = if converted {
                match self.bus.read_temperature(probe.address) {
                    Ok(temp) => temp.to_num::<f32>(),
                    Err(e) => {
                        error!("Failed to read {}: {=str}", probe.address, e.as_str());
                        DISCONNECTED_C
                    }
                }
            } else {
                DISCONNECTED_C
            };

            probe.record(raw);

            if probe.health.is_ok() {
                debug!(
                    "Probe {=usize} ({}): {=f32}",
                    index, probe.name, probe.temperature
                );
            } else {
                warn!(
                    "Probe {=usize} ({}) faulty: {} (raw {=f32})",
                    index, probe.name, probe.health, raw
                );
            }
        }
    }

    /// Lists every thermometer on the bus with its current reading, configured or not.
    ///
    /// An empty bus gives an empty list. At most `M` sensors are reported.
    pub fn scan_bus<const M: usize>(&mut self) -> Vec<ScanEntry, M> {
        let addresses = match self.bus.search::<M>() {
            Ok(addresses) => addresses,
            Err(e) => {
                error!("Bus search failed: {=str}", e.as_str());
                return Vec::new();
            }
        };
        info!("Found {=usize} sensors on the bus", addresses.len());

        if addresses.is_empty() {
            return Vec::new();
        }

        let converted = match self.bus.convert_all(Resolution::Bits12) {
            Ok(()) => true,
            Err(e) => {
                error!("Temperature conversion failed: {=str}", e.as_str());
                false
            }
        };

        addresses
            .iter()
            .map(|&address| ScanEntry {
                address,
                temperature: if converted {
                    self.bus
                        .read_temperature(address)
                        .ok()
                        .map(|t| t.to_num::<f32>())
                } else {
                    None
                },
            })
            .collect()
    }
}

impl<B, const N: usize> ProbeSource for SensorRegistry<B, N> {
    fn probe_count(&self) -> usize {
        self.probes.len()
    }

    fn probe_health(&self, index: usize) -> Option<Health> {
        self.probes.as_slice().probe_health(index)
    }

    fn probe_temperature(&self, index: usize) -> Option<f32> {
        self.probes.as_slice().probe_temperature(index)
    }
}

/// Writes `requested` to a bound probe's sensor and stores what the sensor reports back.
fn apply_resolution<B: TemperatureBus>(
    bus: &mut B,
    probe: &mut TemperatureProbe,
    requested: Resolution,
) {
    if probe.address.is_unassigned() {
        probe.resolution = requested;
        return;
    }

    if let Err(e) = bus.set_resolution(probe.address, requested) {
        error!(
            "Failed to set resolution of {}: {=str}",
            probe.address,
            e.as_str()
        );
        probe.resolution = requested;
        return;
    }

    probe.resolution = match bus.resolution(probe.address) {
        Ok(applied) => applied,
        Err(e) => {
            error!(
                "Failed to read back resolution of {}: {=str}",
                probe.address,
                e.as_str()
            );
            requested
        }
    };
}
