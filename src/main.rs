#![no_std]
#![no_main]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::wildcard_imports)]

use defmt_rtt as _;
use panic_probe as _;

/// Period of the control loop in milliseconds. Acquisition runs on the registry's own interval.
const CONTROL_PERIOD_MS: u64 = 1_000;

#[rtic::app(device = stm32f0xx_hal::pac, dispatchers = [USART1, TIM14])]
mod app {
    use defmt::*;
    use rtic_monotonics::{
        stm32::{Tim2 as Mono, *},
        Monotonic,
    };
    use solar_thermal::{
        controller::{Role, Status, ThermalController},
        onewire::OneWire,
        registry::SensorRegistry,
        relay::PinRelay,
        system::SolarSystem,
        thermometer::ds18b20::Ds18b20Bus,
        Instant,
    };
    use stm32f0xx_hal::{
        delay::Delay,
        gpio::{OpenDrain, Output, Pin, PushPull},
        pac::IWDG,
        prelude::*,
        watchdog::Watchdog,
    };

    use crate::CONTROL_PERIOD_MS;

    type Bus = Ds18b20Bus<Pin<Output<OpenDrain>>, Delay>;
    type Pump = PinRelay<Pin<Output<PushPull>>>;

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        system: SolarSystem<Bus, Pump>,
    }

    #[init]
    fn init(mut cx: init::Context) -> (Shared, Local) {
        // Set system clock to 24 MHz
        let mut rcc = cx
            .device
            .RCC
            .configure()
            .hsi48()
            .sysclk(24.mhz())
            .pclk(24.mhz())
            .hclk(24.mhz())
            .freeze(&mut cx.device.FLASH);

        trace!("sysclk: {}", rcc.clocks.sysclk().0);

        // Enable tim2 monotonic
        let token = rtic_monotonics::create_stm32_tim2_monotonic_token!();
        Mono::start(24_000_000, token);

        // Setup systick delay for 1-Wire timing
        let delay = Delay::new(cx.core.SYST, &rcc);

        // Setup GPIO
        let gpioa = cx.device.GPIOA.split(&mut rcc);
        let gpiob = cx.device.GPIOB.split(&mut rcc);

        let _ = watchdog::spawn(cx.device.IWDG);

        // Setup pump relay
        let pump = PinRelay::new(gpiob.pb4.into_push_pull_output(&cx.cs).downgrade());

        // Setup 1-Wire bus
        let mut pa12 = gpioa.pa12.into_open_drain_output(&cx.cs);
        unwrap!(pa12.set_high());
        let wire = OneWire::new(pa12.downgrade());

        let mut system = SolarSystem::new(
            SensorRegistry::new(Ds18b20Bus::new(wire, delay)),
            ThermalController::new(pump),
        );

        // Bind every thermometer found, in bus order: battery, boiler, exit
        let found = system.adopt_discovered();
        info!("Found {=usize} thermometers", found);
        for (role, index) in Role::ALL.into_iter().zip(0..system.registry().len()) {
            system.set_role(role, Some(index));
        }

        let _ = control_loop::spawn();

        (Shared {}, Local { system })
    }

    #[idle]
    fn idle(_: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }

    #[task(priority = 2)]
    async fn watchdog(_: watchdog::Context, wdg: IWDG) {
        let mut wdg = Watchdog::new(wdg);
        wdg.start(1.hz());

        loop {
            wdg.feed();
            Mono::delay(100.millis()).await;
        }
    }

    #[task(priority = 1, local = [system, last: Status = Status::Ok])]
    async fn control_loop(cx: control_loop::Context) {
        let system = cx.local.system;
        let mut next = Mono::now();

        loop {
            let now = Instant::from_ticks(Mono::now().duration_since_epoch().to_millis());
            let status = system.poll(now);

            if status != *cx.local.last {
                info!("Status {} (code {=u8})", status, status.code());
                *cx.local.last = status;
            }
            debug!(
                "Battery {=f32}, boiler {=f32}, pump {=bool}",
                system.temperature(Role::Battery),
                system.temperature(Role::Boiler),
                system.controller().relay_flag()
            );

            next += CONTROL_PERIOD_MS.millis();
            Mono::delay_until(next).await;
        }
    }

    timestamp!("{=u64:us}", {
        Mono::now().duration_since_epoch().to_micros()
    });
}
