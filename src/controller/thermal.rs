use super::{clamp_delta, decide, ControllerConfig, Decision, Role, RoleStatus, Status};
use crate::{registry::ProbeSource, relay::Relay};

/// Hysteresis controller for the circulation pump.
///
/// Roles are bound to probe indices of a [`ProbeSource`], which every call that evaluates the
/// decision receives by reference.
pub struct ThermalController<R> {
    relay: R,
    config: ControllerConfig,
    roles: [Option<usize>; 3],
    relay_flag: bool,
    status: Status,
}

impl<R: Relay> ThermalController<R> {
    /// Controller with default settings and no roles bound.
    pub fn new(relay: R) -> Self {
        Self::with_config(relay, ControllerConfig::default())
    }

    /// With no roles bound an enabled controller starts in [`Status::BatteryFault`], with the pump
    /// in its fail-safe state.
    pub fn with_config(relay: R, mut config: ControllerConfig) -> Self {
        config.hysteresis_delta = clamp_delta(config.hysteresis_delta);

        let (status, relay_flag) = if config.enabled {
            (Status::BatteryFault, config.fail_safe_on_fault)
        } else {
            (Status::Disabled, false)
        };

        let mut this = Self {
            relay,
            config,
            roles: [None; 3],
            relay_flag,
            status,
        };
        this.apply();
        this
    }

    pub fn release(self) -> R {
        self.relay
    }

    pub fn relay(&self) -> &R {
        &self.relay
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Status computed by the last tick
    pub fn status(&self) -> Status {
        self.status
    }

    /// Logical pump state, before inversion
    pub fn relay_flag(&self) -> bool {
        self.relay_flag
    }

    /// Runs one control decision and drives the relay.
    ///
    /// The relay is written on every tick, even when the decision holds the previous state.
    #[cfg_attr(feature = "sizing", inline(never))]
    pub fn tick<P: ProbeSource + ?Sized>(&mut self, probes: &P) -> Status {
        trace!("tick");

        self.status = if !self.config.enabled {
            self.relay_flag = false;
            Status::Disabled
        } else if !self.role_status(Role::Battery, probes).is_ok() {
            self.relay_flag = self.config.fail_safe_on_fault;
            Status::BatteryFault
        } else if !self.role_status(Role::Boiler, probes).is_ok() {
            self.relay_flag = self.config.fail_safe_on_fault;
            Status::BoilerFault
        } else {
            let delta =
                self.temperature(Role::Battery, probes) - self.temperature(Role::Boiler, probes);
            match decide(delta, self.config.hysteresis_delta) {
                Decision::On => self.relay_flag = true,
                Decision::Off => self.relay_flag = false,
                Decision::Hold => {}
            }
            debug!("Delta {=f32}, pump {=bool}", delta, self.relay_flag);

            // The exit probe is informational only
            if self.role_status(Role::Exit, probes).is_ok() {
                Status::Ok
            } else {
                Status::ExitFault
            }
        };

        if self.status.is_fault() {
            warn!("Controller fault: {}", self.status);
        }

        self.apply();
        self.status
    }

    /// Overrides the pump until the next tick
    pub fn set_relay_flag(&mut self, on: bool) {
        self.relay_flag = on;
        self.apply();
    }

    pub fn set_enabled<P: ProbeSource + ?Sized>(&mut self, enabled: bool, probes: &P) {
        info!("Controller enabled: {=bool}", enabled);
        self.config.enabled = enabled;
        self.tick(probes);
    }

    pub fn set_fail_safe_on_fault<P: ProbeSource + ?Sized>(&mut self, on: bool, probes: &P) {
        info!("Fail-safe pump state: {=bool}", on);
        self.config.fail_safe_on_fault = on;
        self.tick(probes);
    }

    pub fn set_relay_inverted(&mut self, inverted: bool) {
        info!("Relay inverted: {=bool}", inverted);
        self.config.relay_inverted = inverted;
        self.apply();
    }

    /// Sets the switch-on difference, clamped to [`super::DELTA_MIN`]..=[`super::DELTA_MAX`]
    pub fn set_hysteresis_delta<P: ProbeSource + ?Sized>(&mut self, delta: f32, probes: &P) {
        self.config.hysteresis_delta = clamp_delta(delta);
        info!("Hysteresis delta: {=f32}", self.config.hysteresis_delta);
        self.tick(probes);
    }

    /// Binds a role to a probe index, or unbinds it with `None`.
    ///
    /// Indices past the last probe are clamped to it; with no probes the role is unbound.
    pub fn set_role<P: ProbeSource + ?Sized>(
        &mut self,
        role: Role,
        index: Option<usize>,
        probes: &P,
    ) {
        let count = probes.probe_count();
        let index = index.and_then(|i| count.checked_sub(1).map(|last| i.min(last)));

        info!("Role {} bound to {}", role, index);
        self.roles[role.index()] = index;
        self.tick(probes);
    }

    pub fn set_battery_sensor<P: ProbeSource + ?Sized>(
        &mut self,
        index: Option<usize>,
        probes: &P,
    ) {
        self.set_role(Role::Battery, index, probes);
    }

    pub fn set_boiler_sensor<P: ProbeSource + ?Sized>(
        &mut self,
        index: Option<usize>,
        probes: &P,
    ) {
        self.set_role(Role::Boiler, index, probes);
    }

    pub fn set_exit_sensor<P: ProbeSource + ?Sized>(&mut self, index: Option<usize>, probes: &P) {
        self.set_role(Role::Exit, index, probes);
    }

    /// Probe index bound to a role
    pub fn role(&self, role: Role) -> Option<usize> {
        self.roles[role.index()]
    }

    pub fn role_status<P: ProbeSource + ?Sized>(&self, role: Role, probes: &P) -> RoleStatus {
        let Some(index) = self.role(role) else {
            return RoleStatus::Unassigned;
        };

        match probes.probe_health(index) {
            None => RoleStatus::StaleIndex,
            Some(health) if health.is_ok() => RoleStatus::Ok,
            Some(health) => RoleStatus::SensorFault(health),
        }
    }

    /// Temperature of the probe bound to a role, 0 when the role is not [`RoleStatus::Ok`]
    pub fn temperature<P: ProbeSource + ?Sized>(&self, role: Role, probes: &P) -> f32 {
        match self.role(role) {
            Some(index) if self.role_status(role, probes).is_ok() => {
                probes.probe_temperature(index).unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }

    pub fn battery_temperature<P: ProbeSource + ?Sized>(&self, probes: &P) -> f32 {
        self.temperature(Role::Battery, probes)
    }

    pub fn boiler_temperature<P: ProbeSource + ?Sized>(&self, probes: &P) -> f32 {
        self.temperature(Role::Boiler, probes)
    }

    pub fn exit_temperature<P: ProbeSource + ?Sized>(&self, probes: &P) -> f32 {
        self.temperature(Role::Exit, probes)
    }

    /// Keeps role bindings pointing at the same probes after the probe at `deleted` was removed
    /// and the ones after it shifted down. A role bound to the deleted probe is unbound.
    pub fn on_probe_deleted(&mut self, deleted: usize) {
        for (slot, role) in self.roles.iter_mut().zip(Role::ALL) {
            *slot = match *slot {
                Some(i) if i == deleted => {
                    info!("Role {} unbound, its probe was deleted", role);
                    None
                }
                Some(i) if i > deleted => Some(i - 1),
                other => other,
            };
        }
    }

    /// Drives the relay from the logical pump state
    fn apply(&mut self) {
        let energize = self.relay_flag ^ self.config.relay_inverted;
        let res = if energize {
            self.relay.set_high()
        } else {
            self.relay.set_low()
        };

        if res.is_err() {
            error!("Failed to drive relay");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::{DELTA_MAX, DELTA_MIN},
        registry::Health,
        relay::fake::FakePin,
    };

    /// Readings indexed like a registry
    struct Readings<'a>(&'a [(Health, f32)]);

    impl ProbeSource for Readings<'_> {
        fn probe_count(&self) -> usize {
            self.0.len()
        }

        fn probe_health(&self, index: usize) -> Option<Health> {
            self.0.get(index).map(|r| r.0)
        }

        fn probe_temperature(&self, index: usize) -> Option<f32> {
            self.0.get(index).map(|r| r.1)
        }
    }

    fn not_inverted() -> ThermalController<FakePin> {
        ThermalController::with_config(
            FakePin::new(),
            ControllerConfig {
                relay_inverted: false,
                ..ControllerConfig::default()
            },
        )
    }

    fn bound(ctrl: &mut ThermalController<FakePin>, probes: &Readings<'_>) {
        ctrl.set_battery_sensor(Some(0), probes);
        ctrl.set_boiler_sensor(Some(1), probes);
        ctrl.set_exit_sensor(Some(2), probes);
    }

    #[test]
    fn starts_faulted_with_fail_safe_pump() {
        let ctrl = ThermalController::new(FakePin::new());
        assert_eq!(ctrl.status(), Status::BatteryFault);
        assert!(ctrl.relay_flag());
        // Inverted by default: on releases the relay
        assert!(!ctrl.relay().is_high());

        let ctrl = ThermalController::with_config(
            FakePin::new(),
            ControllerConfig {
                fail_safe_on_fault: false,
                ..ControllerConfig::default()
            },
        );
        assert!(!ctrl.relay_flag());
        assert!(ctrl.relay().is_high());
    }

    #[test]
    fn starts_disabled_with_pump_off() {
        let ctrl = ThermalController::with_config(
            FakePin::new(),
            ControllerConfig {
                enabled: false,
                ..ControllerConfig::default()
            },
        );
        assert_eq!(ctrl.status(), Status::Disabled);
        assert!(!ctrl.relay_flag());
    }

    #[test]
    fn on_at_or_above_threshold() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 29.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);

        assert_eq!(ctrl.tick(&probes), Status::Ok);
        assert!(ctrl.relay_flag());
        assert!(ctrl.relay().is_high());
    }

    #[test]
    fn off_at_or_below_lower_threshold() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 27.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);
        ctrl.set_relay_flag(true);

        ctrl.tick(&probes);
        assert!(!ctrl.relay_flag());
        assert!(!ctrl.relay().is_high());
    }

    #[test]
    fn dead_band_holds_either_state() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 28.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);

        ctrl.set_relay_flag(true);
        ctrl.tick(&probes);
        assert!(ctrl.relay_flag());

        ctrl.set_relay_flag(false);
        ctrl.tick(&probes);
        assert!(!ctrl.relay_flag());
    }

    #[test]
    fn tick_writes_relay_even_when_holding() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 28.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);

        let before = ctrl.relay().writes();
        ctrl.tick(&probes);
        ctrl.tick(&probes);
        assert_eq!(ctrl.relay().writes(), before + 2);
    }

    #[test]
    fn disabled_forces_off() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 40.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);
        assert!(ctrl.relay_flag());

        ctrl.set_enabled(false, &probes);
        assert_eq!(ctrl.status(), Status::Disabled);
        assert!(!ctrl.relay_flag());
        assert!(!ctrl.relay().is_high());

        ctrl.set_relay_flag(true);
        assert_eq!(ctrl.tick(&probes), Status::Disabled);
        assert!(!ctrl.relay_flag());
    }

    #[test]
    fn inversion_flips_only_the_pin() {
        let mut ctrl = ThermalController::new(FakePin::new());
        let probes = Readings(&[(Health::Ok, 40.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);
        assert!(ctrl.relay_flag());
        assert!(!ctrl.relay().is_high());

        ctrl.set_relay_inverted(false);
        assert!(ctrl.relay_flag());
        assert!(ctrl.relay().is_high());

        ctrl.set_enabled(false, &probes);
        ctrl.set_relay_inverted(true);
        assert!(!ctrl.relay_flag());
        assert!(ctrl.relay().is_high());
    }

    #[test]
    fn battery_fault_wins_over_boiler_fault() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::ReadError, -127.0), (Health::StuckAtRail, 85.0)]);
        ctrl.set_battery_sensor(Some(0), &probes);
        ctrl.set_boiler_sensor(Some(1), &probes);

        assert_eq!(ctrl.tick(&probes), Status::BatteryFault);
        assert_eq!(
            ctrl.role_status(Role::Battery, &probes),
            RoleStatus::SensorFault(Health::ReadError)
        );
        assert_eq!(
            ctrl.role_status(Role::Boiler, &probes),
            RoleStatus::SensorFault(Health::StuckAtRail)
        );
    }

    #[test]
    fn fault_follows_fail_safe_setting() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 20.0), (Health::Unspecified, 0.0)]);
        ctrl.set_battery_sensor(Some(0), &probes);
        ctrl.set_boiler_sensor(Some(1), &probes);

        assert_eq!(ctrl.status(), Status::BoilerFault);
        assert!(ctrl.relay_flag());

        ctrl.set_fail_safe_on_fault(false, &probes);
        assert_eq!(ctrl.status(), Status::BoilerFault);
        assert!(!ctrl.relay_flag());
        assert!(!ctrl.relay().is_high());
    }

    #[test]
    fn unassigned_roles_are_faults() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 20.0)]);

        assert_eq!(ctrl.tick(&probes), Status::BatteryFault);
        assert_eq!(ctrl.role_status(Role::Battery, &probes), RoleStatus::Unassigned);
        assert_eq!(ctrl.battery_temperature(&probes), 0.0);
    }

    #[test]
    fn exit_fault_does_not_gate_decision() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 30.0), (Health::Ok, 24.0)]);
        ctrl.set_battery_sensor(Some(0), &probes);
        ctrl.set_boiler_sensor(Some(1), &probes);

        assert_eq!(ctrl.status(), Status::ExitFault);
        assert!(ctrl.relay_flag());
        assert_eq!(ctrl.exit_temperature(&probes), 0.0);
    }

    #[test]
    fn role_index_is_clamped_to_probe_count() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 30.0), (Health::Ok, 24.0)]);

        ctrl.set_exit_sensor(Some(9), &probes);
        assert_eq!(ctrl.role(Role::Exit), Some(1));

        ctrl.set_exit_sensor(None, &probes);
        assert_eq!(ctrl.role(Role::Exit), None);

        ctrl.set_exit_sensor(Some(0), &Readings(&[]));
        assert_eq!(ctrl.role(Role::Exit), None);
    }

    #[test]
    fn stale_index_is_a_fault() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 30.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);
        assert_eq!(ctrl.status(), Status::Ok);

        // Probe 0 deleted without notifying the controller
        let shrunk = Readings(&[(Health::Ok, 24.0), (Health::Ok, 20.0)]);
        assert_eq!(ctrl.tick(&shrunk), Status::ExitFault);
        assert_eq!(ctrl.role_status(Role::Exit, &shrunk), RoleStatus::StaleIndex);
        assert_eq!(ctrl.exit_temperature(&shrunk), 0.0);
    }

    #[test]
    fn deletion_notice_shifts_roles() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[
            (Health::Ok, 30.0),
            (Health::Ok, 24.0),
            (Health::Ok, 20.0),
            (Health::Ok, 22.0),
        ]);
        ctrl.set_battery_sensor(Some(0), &probes);
        ctrl.set_boiler_sensor(Some(2), &probes);
        ctrl.set_exit_sensor(Some(3), &probes);

        ctrl.on_probe_deleted(1);
        assert_eq!(ctrl.role(Role::Battery), Some(0));
        assert_eq!(ctrl.role(Role::Boiler), Some(1));
        assert_eq!(ctrl.role(Role::Exit), Some(2));

        ctrl.on_probe_deleted(0);
        assert_eq!(ctrl.role(Role::Battery), None);
        assert_eq!(ctrl.role(Role::Boiler), Some(0));
    }

    #[test]
    fn delta_setter_clamps_and_reevaluates() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 31.0), (Health::Ok, 24.0), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);
        assert!(ctrl.relay_flag());

        ctrl.set_hysteresis_delta(50.0, &probes);
        assert_eq!(ctrl.config().hysteresis_delta, DELTA_MAX);
        // 7 <= 10 - 2
        assert!(!ctrl.relay_flag());

        ctrl.set_hysteresis_delta(0.0, &probes);
        assert_eq!(ctrl.config().hysteresis_delta, DELTA_MIN);
        assert!(ctrl.relay_flag());
    }

    #[test]
    fn temperatures_of_healthy_roles() {
        let mut ctrl = not_inverted();
        let probes = Readings(&[(Health::Ok, 30.5), (Health::Ok, 24.25), (Health::Ok, 20.0)]);
        bound(&mut ctrl, &probes);

        assert_eq!(ctrl.battery_temperature(&probes), 30.5);
        assert_eq!(ctrl.boiler_temperature(&probes), 24.25);
        assert_eq!(ctrl.exit_temperature(&probes), 20.0);
    }
}
