use super::HYSTERESIS_GAP;

/// Pump command for one temperature difference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Decision {
    On,
    Off,
    /// Inside the dead band, keep the pump as it is
    Hold,
}

/// Two-threshold decision on `delta`: on at or above `on_threshold`, off at or below
/// `on_threshold - HYSTERESIS_GAP`.
#[cfg_attr(feature = "sizing", inline(never))]
pub fn decide(delta: f32, on_threshold: f32) -> Decision {
    if delta >= on_threshold {
        Decision::On
    } else if delta <= on_threshold - HYSTERESIS_GAP {
        Decision::Off
    } else {
        Decision::Hold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switches_on_at_threshold() {
        assert_eq!(decide(5.0, 5.0), Decision::On);
        assert_eq!(decide(12.0, 5.0), Decision::On);
    }

    #[test]
    fn switches_off_at_lower_threshold() {
        assert_eq!(decide(3.0, 5.0), Decision::Off);
        assert_eq!(decide(-4.0, 5.0), Decision::Off);
    }

    #[test]
    fn holds_inside_dead_band() {
        assert_eq!(decide(3.0625, 5.0), Decision::Hold);
        assert_eq!(decide(4.0, 5.0), Decision::Hold);
        assert_eq!(decide(4.9375, 5.0), Decision::Hold);
    }

    #[test]
    fn nan_holds() {
        assert_eq!(decide(f32::NAN, 5.0), Decision::Hold);
    }
}
