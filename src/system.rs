//! The solar loop: a sensor registry and the pump controller reading from it.

use crate::{
    controller::{Role, RoleStatus, Status, ThermalController},
    onewire::Address,
    registry::{SensorRegistry, MAX_PROBES},
    relay::Relay,
    thermometer::TemperatureBus,
    Instant,
};

/// Owns the registry and the controller, and keeps the controller's role bindings in step with
/// registry changes that move or remove probes.
pub struct SolarSystem<B, R, const N: usize = MAX_PROBES> {
    registry: SensorRegistry<B, N>,
    controller: ThermalController<R>,
}

impl<B: TemperatureBus, R: Relay, const N: usize> SolarSystem<B, R, N> {
    pub fn new(registry: SensorRegistry<B, N>, controller: ThermalController<R>) -> Self {
        Self {
            registry,
            controller,
        }
    }

    pub fn registry(&self) -> &SensorRegistry<B, N> {
        &self.registry
    }

    /// Direct registry access. Deleting probes through it leaves stale roles behind, which the
    /// controller reports as faults; use [`SolarSystem::delete_probe`] instead.
    pub fn registry_mut(&mut self) -> &mut SensorRegistry<B, N> {
        &mut self.registry
    }

    pub fn controller(&self) -> &ThermalController<R> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ThermalController<R> {
        &mut self.controller
    }

    pub fn release(self) -> (SensorRegistry<B, N>, ThermalController<R>) {
        (self.registry, self.controller)
    }

    /// One pass of the control loop: acquire when due, then decide and drive the pump.
    #[cfg_attr(feature = "sizing", inline(never))]
    pub fn poll(&mut self, now: Instant) -> Status {
        self.registry.poll(now);
        self.controller.tick(&self.registry)
    }

    /// Acquires immediately regardless of the read interval, then ticks
    pub fn refresh(&mut self) -> Status {
        self.registry.refresh_all();
        self.controller.tick(&self.registry)
    }

    pub fn tick(&mut self) -> Status {
        self.controller.tick(&self.registry)
    }

    /// Deletes a probe and moves role bindings along with the probes that shifted down
    pub fn delete_probe(&mut self, index: usize) -> bool {
        if !self.registry.delete_probe(index) {
            return false;
        }

        self.controller.on_probe_deleted(index);
        self.controller.tick(&self.registry);
        true
    }

    pub fn set_probe_address(&mut self, index: usize, address: Address) -> bool {
        self.registry.set_probe_address(index, address)
    }

    /// Unbinds a probe and re-evaluates, so a role on it faults right away
    pub fn clear_probe_address(&mut self, index: usize) -> bool {
        if !self.registry.clear_probe_address(index) {
            return false;
        }

        self.controller.tick(&self.registry);
        true
    }

    pub fn set_role(&mut self, role: Role, index: Option<usize>) {
        self.controller.set_role(role, index, &self.registry);
    }

    pub fn role_status(&self, role: Role) -> RoleStatus {
        self.controller.role_status(role, &self.registry)
    }

    pub fn temperature(&self, role: Role) -> f32 {
        self.controller.temperature(role, &self.registry)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.controller.set_enabled(enabled, &self.registry);
    }

    pub fn set_fail_safe_on_fault(&mut self, on: bool) {
        self.controller.set_fail_safe_on_fault(on, &self.registry);
    }

    pub fn set_relay_inverted(&mut self, inverted: bool) {
        self.controller.set_relay_inverted(inverted);
    }

    pub fn set_hysteresis_delta(&mut self, delta: f32) {
        self.controller.set_hysteresis_delta(delta, &self.registry);
    }

    pub fn set_relay_flag(&mut self, on: bool) {
        self.controller.set_relay_flag(on);
    }

    /// Binds a registry probe to every thermometer found on the bus that no probe uses yet.
    ///
    /// Returns how many probes were added.
    pub fn adopt_discovered(&mut self) -> usize {
        let found = self.registry.scan_bus::<N>();
        let mut added = 0;

        for entry in &found {
            if self.registry.find_probe_index_by_address(entry.address).is_some() {
                continue;
            }
            if !self.registry.add_probe() {
                break;
            }

            let index = self.registry.len() - 1;
            if self.registry.set_probe_address(index, entry.address) {
                added += 1;
            } else {
                self.registry.delete_probe(index);
            }
        }

        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::ControllerConfig,
        registry::{find_index_by_address, Health},
        relay::fake::FakePin,
        thermometer::fake::FakeBus,
    };

    const A: Address = Address(0x34_00_00_0F_1E_64_FF_28);
    const B: Address = Address(0x05_00_00_0F_83_FB_60_28);
    const C: Address = Address(0x9E_3C_E1_E3_80_3B_3A_28);

    fn system(sensors: &[(Address, f32)]) -> SolarSystem<FakeBus, FakePin, 4> {
        let mut bus = FakeBus::new();
        for &(address, celsius) in sensors {
            bus.attach(address, celsius);
        }

        let controller = ThermalController::with_config(
            FakePin::new(),
            ControllerConfig {
                relay_inverted: false,
                ..ControllerConfig::default()
            },
        );
        SolarSystem::new(SensorRegistry::new(bus), controller)
    }

    fn bind(sys: &mut SolarSystem<FakeBus, FakePin, 4>, address: Address) -> usize {
        assert!(sys.registry_mut().add_probe());
        let index = sys.registry().len() - 1;
        assert!(sys.set_probe_address(index, address));
        index
    }

    #[test]
    fn pump_follows_temperature_difference() {
        let mut sys = system(&[(A, 30.0), (B, 24.0)]);
        let battery = bind(&mut sys, A);
        let boiler = bind(&mut sys, B);
        sys.set_role(Role::Battery, Some(battery));
        sys.set_role(Role::Boiler, Some(boiler));
        sys.set_hysteresis_delta(5.0);

        sys.poll(Instant::from_ticks(0));
        assert!(sys.controller().relay_flag());
        assert!(sys.controller().relay().is_high());

        // Inside the dead band
        sys.registry_mut().bus_mut().set_temperature(A, 28.0);
        sys.poll(Instant::from_ticks(5_000));
        assert_eq!(sys.temperature(Role::Battery), 28.0);
        assert!(sys.controller().relay_flag());

        sys.registry_mut().bus_mut().set_temperature(A, 25.0);
        sys.poll(Instant::from_ticks(10_000));
        assert!(!sys.controller().relay_flag());
        assert!(!sys.controller().relay().is_high());
    }

    #[test]
    fn lower_threshold_is_inclusive() {
        let mut sys = system(&[(A, 30.0), (B, 24.0)]);
        let battery = bind(&mut sys, A);
        let boiler = bind(&mut sys, B);
        sys.set_role(Role::Battery, Some(battery));
        sys.set_role(Role::Boiler, Some(boiler));

        sys.refresh();
        assert!(sys.controller().relay_flag());

        sys.registry_mut().bus_mut().set_temperature(A, 27.0);
        sys.refresh();
        assert!(!sys.controller().relay_flag());
    }

    #[test]
    fn poll_ticks_between_acquisitions() {
        let mut sys = system(&[(A, 30.0), (B, 24.0)]);
        bind(&mut sys, A);
        bind(&mut sys, B);

        sys.poll(Instant::from_ticks(0));
        sys.poll(Instant::from_ticks(1_000));
        sys.poll(Instant::from_ticks(2_000));
        assert_eq!(sys.registry().bus().conversions(), 1);
    }

    #[test]
    fn cleared_boiler_address_faults_to_fail_safe() {
        let mut sys = system(&[(A, 30.0), (B, 24.0), (C, 20.0)]);
        let battery = bind(&mut sys, A);
        let boiler = bind(&mut sys, B);
        let exit = bind(&mut sys, C);
        sys.set_role(Role::Battery, Some(battery));
        sys.set_role(Role::Boiler, Some(boiler));
        sys.set_role(Role::Exit, Some(exit));
        sys.set_fail_safe_on_fault(false);
        sys.registry_mut().bus_mut().set_temperature(A, 40.0);

        assert_eq!(sys.refresh(), Status::Ok);
        assert!(sys.controller().relay_flag());

        assert!(sys.clear_probe_address(boiler));
        assert_eq!(
            sys.role_status(Role::Boiler),
            RoleStatus::SensorFault(Health::Unspecified)
        );
        assert_eq!(sys.controller().status(), Status::BoilerFault);
        assert!(!sys.controller().relay_flag());

        sys.set_fail_safe_on_fault(true);
        assert_eq!(sys.refresh(), Status::BoilerFault);
        assert!(sys.controller().relay_flag());
    }

    #[test]
    fn stuck_sensor_faults_its_role() {
        let mut sys = system(&[(A, 85.0), (B, 24.0)]);
        let battery = bind(&mut sys, A);
        let boiler = bind(&mut sys, B);
        sys.registry_mut().set_probe_correction(battery, -3.0);
        sys.set_role(Role::Battery, Some(battery));
        sys.set_role(Role::Boiler, Some(boiler));

        assert_eq!(sys.refresh(), Status::BatteryFault);
        assert_eq!(sys.registry().probe(battery).unwrap().temperature(), 85.0);
        assert_eq!(sys.temperature(Role::Battery), 0.0);
    }

    #[test]
    fn delete_probe_keeps_roles_on_their_probes() {
        let mut sys = system(&[(A, 30.0), (B, 24.0), (C, 20.0)]);
        bind(&mut sys, C);
        let battery = bind(&mut sys, A);
        let boiler = bind(&mut sys, B);
        sys.set_role(Role::Battery, Some(battery));
        sys.set_role(Role::Boiler, Some(boiler));
        sys.set_role(Role::Exit, Some(0));
        sys.refresh();

        assert!(sys.delete_probe(0));
        assert_eq!(sys.controller().role(Role::Battery), Some(0));
        assert_eq!(sys.controller().role(Role::Boiler), Some(1));
        assert_eq!(sys.controller().role(Role::Exit), None);
        assert_eq!(sys.temperature(Role::Battery), 30.0);
        assert_eq!(sys.controller().status(), Status::ExitFault);

        assert!(!sys.delete_probe(7));
    }

    #[test]
    fn raw_registry_delete_leaves_detectable_stale_role() {
        let mut sys = system(&[(A, 30.0), (B, 24.0)]);
        let battery = bind(&mut sys, A);
        let boiler = bind(&mut sys, B);
        sys.set_role(Role::Battery, Some(battery));
        sys.set_role(Role::Boiler, Some(boiler));
        sys.refresh();

        assert!(sys.registry_mut().delete_probe(0));
        assert_eq!(sys.tick(), Status::BoilerFault);
        assert_eq!(sys.role_status(Role::Boiler), RoleStatus::StaleIndex);
    }

    #[test]
    fn scanned_address_finds_configured_probe() {
        let mut sys = system(&[(A, 30.0), (B, 24.0), (C, 20.0)]);
        sys.registry_mut().add_probe();
        sys.registry_mut().add_probe();

        let found = sys.registry_mut().scan_bus::<4>();
        assert_eq!(found.len(), 3);
        let pick = found[find_index_by_address(&found, B).unwrap()].address;
        assert!(sys.set_probe_address(1, pick));

        let again = sys.registry_mut().scan_bus::<4>();
        let address = again[find_index_by_address(&again, B).unwrap()].address;
        assert_eq!(sys.registry().find_probe_index_by_address(address), Some(1));
    }

    #[test]
    fn adopts_only_new_sensors() {
        let mut sys = system(&[(A, 30.0), (B, 24.0), (C, 20.0)]);
        bind(&mut sys, B);

        assert_eq!(sys.adopt_discovered(), 2);
        assert_eq!(sys.registry().len(), 3);
        assert_eq!(sys.registry().find_probe_index_by_address(A), Some(1));
        assert_eq!(sys.registry().find_probe_index_by_address(C), Some(2));

        assert_eq!(sys.adopt_discovered(), 0);
    }
}
