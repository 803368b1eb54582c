//! Scenario configuration loaded from YAML.
//!
//! A scenario fixes the physical constants, the central body, the test body,
//! the run length, and the sampling of each engine:
//!
//! ```yaml
//! name: black-hole-fall
//! constants:
//!   g: 6.6743e-11
//!   c: 299792458.0
//! central:
//!   mass: 1.989e31
//!   position: [0.0, 0.0]
//! test_body:
//!   mass: 1.675e-27
//!   position: [59081.0, 0.0]
//!   velocity: [0.0, -119916983.2]
//! target_time: 3.0e-4
//! newtonian:
//!   dt: 3.0e-11
//!   save_every: 100
//! relativistic:
//!   resolution: 10000000
//!   save_every: 100
//! output:
//!   dir: out
//!   buffer_capacity: 10000
//! ```
//!
//! Omitted `constants` default to CODATA values and omitted solver settings
//! default to the values used by [`GeodesicParams::new`].

use crate::body::Body;
use crate::error::ConfigError;
use crate::geodesic::{schwarzschild_radius, GeodesicParams, SchwarzschildField, DEFAULT_ATOL, DEFAULT_RTOL};
use crate::newtonian::NewtonianParams;
use crate::trajectory::DEFAULT_BUFFER_CAPACITY;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Gravitational constant and speed of light, threaded into every run.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PhysicalConstants {
    pub g: f64,
    pub c: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            g: 6.67430e-11,
            c: 299_792_458.0,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BodyConfig {
    pub mass: f64,
    pub position: [f64; 2],
    #[serde(default)]
    pub velocity: [f64; 2],
}

impl BodyConfig {
    pub fn to_body(&self) -> Body {
        Body::new(
            self.mass,
            Vector2::new(self.position[0], self.position[1]),
            Vector2::new(self.velocity[0], self.velocity[1]),
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct NewtonianConfig {
    pub dt: f64,
    #[serde(default = "default_save_every")]
    pub save_every: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct RelativisticConfig {
    pub resolution: u64,
    #[serde(default = "default_save_every")]
    pub save_every: u64,
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    #[serde(default = "default_atol")]
    pub atol: f64,
    #[serde(default = "default_speed_margin")]
    pub speed_margin: f64,
    #[serde(default = "default_horizon_margin")]
    pub horizon_margin: f64,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_newtonian_file")]
    pub newtonian_file: String,
    #[serde(default = "default_relativistic_file")]
    pub relativistic_file: String,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Run log appended after each engine run. `None` disables it.
    #[serde(default = "default_run_log")]
    pub run_log: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            newtonian_file: default_newtonian_file(),
            relativistic_file: default_relativistic_file(),
            buffer_capacity: default_buffer_capacity(),
            run_log: default_run_log(),
        }
    }
}

impl OutputConfig {
    pub fn newtonian_path(&self) -> PathBuf {
        self.dir.join(&self.newtonian_file)
    }

    pub fn relativistic_path(&self) -> PathBuf {
        self.dir.join(&self.relativistic_file)
    }

    pub fn run_log_path(&self) -> Option<PathBuf> {
        self.run_log.as_ref().map(|f| self.dir.join(f))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    #[serde(default)]
    pub constants: PhysicalConstants,
    pub central: BodyConfig,
    pub test_body: BodyConfig,
    pub target_time: f64,
    pub newtonian: NewtonianConfig,
    pub relativistic: RelativisticConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl ScenarioConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let cfg: ScenarioConfig = serde_yaml::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };
        if !(self.constants.g > 0.0 && self.constants.c > 0.0) {
            return invalid(format!("constants must be positive: {:?}", self.constants));
        }
        if !(self.central.mass > 0.0 && self.test_body.mass > 0.0) {
            return invalid("body masses must be positive".to_string());
        }
        if !(self.target_time >= 0.0) {
            return invalid(format!("target_time must be non-negative, got {}", self.target_time));
        }
        if !(self.newtonian.dt > 0.0) {
            return invalid(format!("newtonian.dt must be positive, got {}", self.newtonian.dt));
        }
        if self.newtonian.save_every == 0 || self.relativistic.save_every == 0 {
            return invalid("save_every must be at least 1".to_string());
        }
        if self.relativistic.resolution == 0 {
            return invalid("relativistic.resolution must be at least 1".to_string());
        }
        if self.central.position != [0.0, 0.0] {
            return invalid("the central body must sit at the origin for the relativistic run".to_string());
        }
        Ok(())
    }

    pub fn schwarzschild_radius(&self) -> f64 {
        schwarzschild_radius(self.central.mass, self.constants.g, self.constants.c)
    }

    pub fn newtonian_params(&self) -> NewtonianParams {
        NewtonianParams {
            target_time: self.target_time,
            dt: self.newtonian.dt,
            save_every: self.newtonian.save_every,
        }
    }

    pub fn geodesic_params(&self) -> GeodesicParams {
        let r = &self.relativistic;
        GeodesicParams {
            rtol: r.rtol,
            atol: r.atol,
            speed_margin: r.speed_margin,
            horizon_margin: r.horizon_margin,
            ..GeodesicParams::new(self.target_time, r.resolution, r.save_every)
        }
    }

    pub fn field(&self) -> SchwarzschildField {
        SchwarzschildField::new(self.test_body.mass, self.schwarzschild_radius(), self.constants.c)
    }
}

fn default_save_every() -> u64 {
    1
}

fn default_rtol() -> f64 {
    DEFAULT_RTOL
}

fn default_atol() -> f64 {
    DEFAULT_ATOL
}

fn default_speed_margin() -> f64 {
    1e-12
}

fn default_horizon_margin() -> f64 {
    1e-3
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_newtonian_file() -> String {
    "Newton.csv".to_string()
}

fn default_relativistic_file() -> String {
    "GR.csv".to_string()
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_run_log() -> Option<String> {
    Some("runs.csv".to_string())
}
