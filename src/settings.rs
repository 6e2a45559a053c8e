//! Snapshot of every user setting of a [`SolarSystem`].
//!
//! Storage is up to the caller. Applying goes through the regular setters in dependency order:
//! probes first, then the roles that index them, then the controller flags.

use heapless::Vec;

use crate::{
    controller::{ControllerConfig, Role},
    ds18b20::Resolution,
    onewire::Address,
    registry::{ProbeName, MAX_PROBES, MAX_READ_INTERVAL_SECS},
    relay::Relay,
    system::SolarSystem,
    thermometer::TemperatureBus,
};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProbeSettings {
    pub name: ProbeName,
    pub address: Address,
    pub resolution: Resolution,
    pub correction: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings<const N: usize = MAX_PROBES> {
    pub read_interval_secs: u8,
    pub probes: Vec<ProbeSettings, N>,
    /// Probe index per role, ordered like [`Role::ALL`]
    pub roles: [Option<usize>; 3],
    pub controller: ControllerConfig,
}

impl<const N: usize> Settings<N> {
    pub fn capture<B: TemperatureBus, R: Relay>(system: &SolarSystem<B, R, N>) -> Self {
        let registry = system.registry();

        let mut probes = Vec::new();
        for probe in registry.probes() {
            // Never more probes than N
            let _ = probes.push(ProbeSettings {
                name: probe.name().clone(),
                address: probe.address(),
                resolution: probe.resolution(),
                correction: probe.correction(),
            });
        }

        Self {
            read_interval_secs: u8::try_from(registry.read_interval().to_secs())
                .unwrap_or(MAX_READ_INTERVAL_SECS),
            probes,
            roles: Role::ALL.map(|role| system.controller().role(role)),
            controller: *system.controller().config(),
        }
    }

    /// Replaces the configuration of `system` with this snapshot
    pub fn apply<B: TemperatureBus, R: Relay>(&self, system: &mut SolarSystem<B, R, N>) {
        info!("Applying settings for {=usize} probes", self.probes.len());

        system
            .registry_mut()
            .set_read_interval(self.read_interval_secs);

        while !system.registry().is_empty() {
            system.delete_probe(system.registry().len() - 1);
        }

        for (index, probe) in self.probes.iter().enumerate() {
            let registry = system.registry_mut();
            if !registry.add_probe() {
                break;
            }

            registry.set_probe_name(index, probe.name.as_str());
            // Stored first so binding the address pushes it to the sensor
            registry.set_probe_resolution(index, probe.resolution.bits());
            if !probe.address.is_unassigned() {
                registry.set_probe_address(index, probe.address);
            }
            registry.set_probe_correction(index, probe.correction);
        }

        for role in Role::ALL {
            system.set_role(role, self.roles[role.index()]);
        }

        let config = &self.controller;
        system.set_enabled(config.enabled);
        system.set_fail_safe_on_fault(config.fail_safe_on_fault);
        system.set_relay_inverted(config.relay_inverted);
        system.set_hysteresis_delta(config.hysteresis_delta);
    }
}
