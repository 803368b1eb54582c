// src/scenario.rs

use crate::config::{
    BodyConfig, NewtonianConfig, OutputConfig, PhysicalConstants, RelativisticConfig, ScenarioConfig,
};
use crate::geodesic::{schwarzschild_radius, DEFAULT_ATOL, DEFAULT_RTOL};
use clap::ValueEnum;

const M_SUN: f64 = 1.989e30;

/// Speed on an orbit of semi-major axis `a` at distance `r` (vis-viva).
pub fn vis_viva_speed(g: f64, central_mass: f64, r: f64, a: f64) -> f64 {
    (g * central_mass * (2.0 / r - 1.0 / a)).sqrt()
}

pub fn circular_speed(g: f64, central_mass: f64, r: f64) -> f64 {
    vis_viva_speed(g, central_mass, r, r)
}

/// Built-in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Mercury around the Sun for 1e9 s.
    Mercury,
    /// A 1 t satellite at geostationary radius for 1e5 s.
    EarthGeostationary,
    /// A neutron launched tangentially at 0.4c from 2 Rs of a 10 solar mass black hole.
    BlackHoleFall,
}

impl Preset {
    pub fn name(&self) -> &'static str {
        match self {
            Preset::Mercury => "mercury",
            Preset::EarthGeostationary => "earth-geostationary",
            Preset::BlackHoleFall => "black-hole-fall",
        }
    }

    pub fn scenario(&self) -> ScenarioConfig {
        let constants = PhysicalConstants::default();
        let (central_mass, test_mass, position, velocity, target_time, resolution, save_every) = match self {
            Preset::Mercury => (M_SUN, 0.33010e24, [46e9, 0.0], [0.0, 58.97e3], 1e9, 100_000_000, 1_000),
            Preset::EarthGeostationary => (5.97219e24, 1000.0, [42.164e6, 0.0], [0.0, 3097.0], 1e5, 1_000_000, 100),
            Preset::BlackHoleFall => {
                let m = 10.0 * M_SUN;
                let rs = schwarzschild_radius(m, constants.g, constants.c);
                (m, 1.675e-27, [2.0 * rs, 0.0], [0.0, -0.4 * constants.c], 3e-4, 10_000_000, 100)
            }
        };

        ScenarioConfig {
            name: self.name().to_string(),
            constants,
            central: BodyConfig {
                mass: central_mass,
                position: [0.0, 0.0],
                velocity: [0.0, 0.0],
            },
            test_body: BodyConfig {
                mass: test_mass,
                position,
                velocity,
            },
            target_time,
            newtonian: NewtonianConfig {
                dt: target_time / resolution as f64,
                save_every,
            },
            relativistic: RelativisticConfig {
                resolution,
                save_every,
                rtol: DEFAULT_RTOL,
                atol: DEFAULT_ATOL,
                speed_margin: 1e-12,
                horizon_margin: 1e-3,
            },
            output: OutputConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn presets_validate() {
        for preset in Preset::value_variants() {
            let cfg = preset.scenario();
            cfg.validate().unwrap();
            assert_eq!(cfg.name, preset.name());
        }
    }

    #[test]
    fn black_hole_fall_starts_at_two_schwarzschild_radii() {
        let cfg = Preset::BlackHoleFall.scenario();
        let rs = cfg.schwarzschild_radius();
        assert_relative_eq!(cfg.test_body.position[0], 2.0 * rs);
        assert_relative_eq!(rs, 29_539.0, max_relative = 1e-3);
        assert_relative_eq!(cfg.newtonian.dt, 3e-11, max_relative = 1e-12);
        assert_eq!(cfg.newtonian_params().num_steps(), 10_000_000);
    }

    #[test]
    fn geostationary_speed_is_close_to_circular() {
        let cfg = Preset::EarthGeostationary.scenario();
        let v = circular_speed(cfg.constants.g, cfg.central.mass, cfg.test_body.position[0]);
        assert_relative_eq!(v, 3074.7, max_relative = 1e-3);
        assert!(cfg.test_body.velocity[1] > v);
    }

    #[test]
    fn vis_viva_at_apoapsis_is_slower() {
        let (g, m, a) = (1.0, 1.0, 2.0);
        let peri = vis_viva_speed(g, m, 1.0, a);
        let apo = vis_viva_speed(g, m, 3.0, a);
        assert_relative_eq!(peri * 1.0, apo * 3.0, max_relative = 1e-12);
    }
}
