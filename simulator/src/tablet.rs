use rand::Rng;
use serde::Serialize;

/// Percent per simulated minute gained while plugged in.
const CHARGE_RATE: f64 = 1.5;
/// Percent per simulated minute lost while unplugged.
const DRAIN_RATE: f64 = 0.8;
const UNPLUG_PROBABILITY: f64 = 0.03;
const REPLUG_PROBABILITY: f64 = 0.2;

/// Heartbeat body, shaped the way the on-device automation agent sends it
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub device_id: String,
    pub battery_level: i32,
    pub is_charging: &'static str,
}

#[derive(Debug, Clone)]
pub struct SimulatedTablet {
    pub device_id: String,
    pub device_name: String,
    battery: f64,
    plugged_in: bool,
}

impl SimulatedTablet {
    pub fn new(index: usize, rng: &mut impl Rng) -> Self {
        Self {
            device_id: format!("tablet-{}", index),
            device_name: format!("Tablet {}", index),
            battery: rng.gen_range(30.0..100.0),
            plugged_in: rng.gen_bool(0.8),
        }
    }

    pub fn battery_level(&self) -> i32 {
        self.battery.round() as i32
    }

    pub fn plugged_in(&self) -> bool {
        self.plugged_in
    }

    /// Advances the tablet by `minutes` of simulated time.
    pub fn step(&mut self, rng: &mut impl Rng, minutes: f64) {
        self.toggle_power(rng);
        self.advance(minutes);
    }

    fn toggle_power(&mut self, rng: &mut impl Rng) {
        let flip = if self.plugged_in {
            rng.gen_bool(UNPLUG_PROBABILITY)
        } else {
            rng.gen_bool(REPLUG_PROBABILITY)
        };
        if flip {
            self.plugged_in = !self.plugged_in;
        }
    }

    fn advance(&mut self, minutes: f64) {
        let delta = if self.plugged_in {
            CHARGE_RATE * minutes
        } else {
            -DRAIN_RATE * minutes
        };
        self.battery = (self.battery + delta).clamp(0.0, 100.0);
    }

    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            device_id: self.device_id.clone(),
            battery_level: self.battery_level(),
            is_charging: if self.plugged_in { "On" } else { "Off" },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tablet(battery: f64, plugged_in: bool) -> SimulatedTablet {
        SimulatedTablet {
            device_id: "tablet-0".to_string(),
            device_name: "Tablet 0".to_string(),
            battery,
            plugged_in,
        }
    }

    #[test]
    fn test_charging_caps_at_full() {
        let mut t = tablet(99.0, true);
        t.advance(10.0);
        assert_eq!(t.battery_level(), 100);
    }

    #[test]
    fn test_draining_stops_at_empty() {
        let mut t = tablet(3.0, false);
        t.advance(10.0);
        assert_eq!(t.battery_level(), 0);
    }

    #[test]
    fn test_heartbeat_uses_agent_strings() {
        let hb = tablet(42.4, true).heartbeat();
        assert_eq!(hb.battery_level, 42);
        assert_eq!(hb.is_charging, "On");

        let json = serde_json::to_value(tablet(10.0, false).heartbeat()).unwrap();
        assert_eq!(json["is_charging"], "Off");
        assert_eq!(json["device_id"], "tablet-0");
    }

    #[test]
    fn test_seeded_fleet_is_reproducible() {
        let mut a = StdRng::seed_from_u64(7);
        let mut b = StdRng::seed_from_u64(7);
        let mut ta = SimulatedTablet::new(3, &mut a);
        let mut tb = SimulatedTablet::new(3, &mut b);
        for _ in 0..100 {
            ta.step(&mut a, 1.0);
            tb.step(&mut b, 1.0);
        }
        assert_eq!(ta.battery_level(), tb.battery_level());
        assert_eq!(ta.plugged_in(), tb.plugged_in());
        assert_eq!(ta.device_id, "tablet-3");
    }
}
