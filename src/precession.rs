//! Orbit-to-orbit drift of a relativistic trajectory.
//!
//! Each time the body crosses the positive-going `y = 0` line, the radial
//! offset `x - x0` from the launch point is recorded. For an orbit launched
//! from periapsis on the x axis the offsets trace the perihelion shift.

use crate::trajectory::RelativisticSample;
use itertools::Itertools;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Crossing {
    /// Index of the first sample at or above `y = 0`.
    pub index: usize,
    pub time: f64,
    /// `x - x0` at that sample.
    pub shift: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrecessionReport {
    pub x0: f64,
    pub crossings: Vec<Crossing>,
    /// Shift of the last crossing averaged over the number of crossings.
    pub mean_shift_per_orbit: Option<f64>,
}

/// Crossings where the previous sample has `y < 0` and the current `y >= 0`.
pub fn upward_crossings(samples: &[RelativisticSample], x0: f64) -> Vec<Crossing> {
    samples
        .iter()
        .enumerate()
        .tuple_windows()
        .filter(|((_, prev), (_, cur))| prev.y < 0.0 && cur.y >= 0.0)
        .map(|(_, (index, cur))| Crossing {
            index,
            time: cur.time,
            shift: cur.x - x0,
        })
        .collect()
}

/// `x0` defaults to the first sample's x coordinate.
pub fn analyze(samples: &[RelativisticSample], x0: Option<f64>) -> Option<PrecessionReport> {
    let x0 = x0.or_else(|| samples.first().map(|s| s.x))?;
    let crossings = upward_crossings(samples, x0);
    let mean_shift_per_orbit = crossings.last().map(|c| c.shift / crossings.len() as f64);
    Some(PrecessionReport {
        x0,
        crossings,
        mean_shift_per_orbit,
    })
}
