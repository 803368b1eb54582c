//! Fixed-step two-body integrator under a pairwise central force.
//!
//! Stepping is semi-implicit Euler (Euler-Cromer): each body's velocity is
//! kicked by the current force first, and the *updated* velocity then drifts
//! its position. The method is first order and has no error control, so
//! accuracy is governed by `dt` alone.

use crate::body::Body;
use crate::error::NewtonianError;
use crate::trajectory::{NewtonianSample, SampleSink};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use nalgebra::Vector2;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::time::Instant;

/// Relative energy drifts whose first crossing is recorded in the summary.
pub const ENERGY_THRESHOLDS: [f64; 5] = [1e-6, 1e-4, 1e-2, 0.1, 1.0];

/// A central force between two point masses.
pub trait ForceLaw: Send + Sync {
    /// Force exerted on the first body by the second. `delta` points from
    /// the first body to the second and `dist_sq = delta · delta > 0`.
    fn force(&self, m_first: f64, m_second: f64, delta: &Vector2<f64>, dist_sq: f64) -> Vector2<f64>;

    fn potential_energy(&self, m_first: f64, m_second: f64, dist: f64) -> f64;

    fn name(&self) -> String;
}

/// Newtonian gravity, `F = G m1 m2 / d²` along the separation.
#[derive(Debug, Clone, Copy)]
pub struct InverseSquare {
    pub g: f64,
}

impl InverseSquare {
    pub fn new(g: f64) -> Self {
        Self { g }
    }
}

impl ForceLaw for InverseSquare {
    fn force(&self, m_first: f64, m_second: f64, delta: &Vector2<f64>, dist_sq: f64) -> Vector2<f64> {
        let magnitude = self.g * m_first * m_second / dist_sq;
        magnitude * (delta / dist_sq.sqrt())
    }

    fn potential_energy(&self, m_first: f64, m_second: f64, dist: f64) -> f64 {
        -self.g * m_first * m_second / dist
    }

    fn name(&self) -> String {
        "InverseSquare".to_string()
    }
}

/// Forces acting on the pair during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceSample {
    pub on_first: Vector2<f64>,
    pub on_second: Vector2<f64>,
}

/// Evaluate the pair force. The reaction is built by negation so the two
/// vectors are exact opposites. Returns `None` when the bodies coincide.
pub fn pair_forces<F: ForceLaw>(law: &F, first: &Body, second: &Body) -> Option<ForceSample> {
    let delta = second.position - first.position;
    let dist_sq = delta.dot(&delta);
    if dist_sq == 0.0 {
        return None;
    }
    let on_first = law.force(first.mass, second.mass, &delta, dist_sq);
    Some(ForceSample {
        on_first,
        on_second: -on_first,
    })
}

pub fn total_energy<F: ForceLaw>(law: &F, first: &Body, second: &Body) -> f64 {
    let dist = (second.position - first.position).norm();
    first.kinetic_energy() + second.kinetic_energy() + law.potential_energy(first.mass, second.mass, dist)
}

#[derive(Debug, Clone, Copy)]
pub struct NewtonianParams {
    pub target_time: f64,
    pub dt: f64,
    pub save_every: u64,
}

impl NewtonianParams {
    /// Steps needed to reach `target_time`. A quotient within 1e-9 of an
    /// integer counts as that integer so `1e9 / 10.0` is not rounded up.
    pub fn num_steps(&self) -> u64 {
        let ratio = self.target_time / self.dt;
        let nearest = ratio.round();
        if (ratio - nearest).abs() <= 1e-9 * nearest.max(1.0) {
            nearest as u64
        } else {
            ratio.ceil() as u64
        }
    }

    fn validate(&self) -> Result<(), NewtonianError> {
        if !(self.dt > 0.0 && self.dt.is_finite()) {
            return Err(NewtonianError::InvalidParameter(format!("dt must be positive, got {}", self.dt)));
        }
        if !(self.target_time >= 0.0 && self.target_time.is_finite()) {
            return Err(NewtonianError::InvalidParameter(format!(
                "target_time must be non-negative, got {}",
                self.target_time
            )));
        }
        if self.save_every == 0 {
            return Err(NewtonianError::InvalidParameter("save_every must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewtonianSummary {
    pub force_law: String,
    pub steps: u64,
    pub samples: u64,
    pub final_time: f64,
    pub bodies: [Body; 2],
    pub initial_energy: f64,
    pub final_energy: f64,
    pub max_relative_drift: f64,
    /// For each threshold, the fraction of the run at which the relative
    /// energy drift first exceeded it.
    pub energy_thresholds: BTreeMap<OrderedFloat<f64>, Option<f64>>,
    pub elapsed_secs: f64,
}

struct EnergyMonitor {
    initial: f64,
    last: f64,
    max_drift: f64,
    exceeded: BTreeMap<OrderedFloat<f64>, Option<f64>>,
}

impl EnergyMonitor {
    fn new(initial: f64) -> Self {
        Self {
            initial,
            last: initial,
            max_drift: 0.0,
            exceeded: ENERGY_THRESHOLDS.iter().map(|&t| (OrderedFloat(t), None)).collect(),
        }
    }

    fn record(&mut self, energy: f64, fraction: f64) {
        self.last = energy;
        let drift = if self.initial != 0.0 {
            ((energy - self.initial) / self.initial).abs()
        } else {
            energy.abs()
        };
        self.max_drift = self.max_drift.max(drift);
        for (threshold, hit) in self.exceeded.iter_mut() {
            if hit.is_none() && drift > threshold.into_inner() {
                *hit = Some(fraction);
            }
        }
    }
}

pub struct NewtonianEngine<F: ForceLaw> {
    params: NewtonianParams,
    force_law: F,
    show_progress: bool,
}

impl<F: ForceLaw> NewtonianEngine<F> {
    pub fn new(params: NewtonianParams, force_law: F) -> Self {
        Self {
            params,
            force_law,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn params(&self) -> &NewtonianParams {
        &self.params
    }

    pub fn force_law(&self) -> &F {
        &self.force_law
    }

    /// Run to `target_time`, emitting every `save_every`-th step into `sink`.
    /// The sink is finished on every exit path, including a collision.
    pub fn run<S: SampleSink<NewtonianSample>>(
        &self,
        body1: Body,
        body2: Body,
        sink: &mut S,
    ) -> Result<NewtonianSummary, NewtonianError> {
        let result = self.integrate(body1, body2, sink);
        let finished = sink.finish();
        let summary = result?;
        finished?;
        Ok(summary)
    }

    fn integrate<S: SampleSink<NewtonianSample>>(
        &self,
        body1: Body,
        body2: Body,
        sink: &mut S,
    ) -> Result<NewtonianSummary, NewtonianError> {
        self.params.validate()?;
        for (i, b) in [&body1, &body2].iter().enumerate() {
            if !(b.mass > 0.0) {
                return Err(NewtonianError::InvalidParameter(format!(
                    "mass of body {} must be positive, got {}",
                    i + 1,
                    b.mass
                )));
            }
        }

        let start = Instant::now();
        let h = self.params.dt;
        let num_steps = self.params.num_steps();
        let save_every = self.params.save_every;
        let mut bodies = [body1, body2];

        info!(
            "newtonian run: {} steps of {:e} s, saving every {} ({})",
            num_steps,
            h,
            save_every,
            self.force_law.name()
        );

        let pb = if self.show_progress {
            let pb = ProgressBar::new(num_steps);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(format!("Newtonian ({})", self.force_law.name()));
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut monitor = EnergyMonitor::new(total_energy(&self.force_law, &bodies[0], &bodies[1]));
        let mut sim_time = 0.0;
        let mut samples = 0u64;

        for step in 1..=num_steps {
            let forces = match pair_forces(&self.force_law, &bodies[0], &bodies[1]) {
                Some(f) => f,
                None => {
                    pb.abandon();
                    warn!("collision at step {} (t = {:e} s)", step, sim_time);
                    return Err(NewtonianError::Collision { step, time: sim_time });
                }
            };

            for (body, force) in bodies.iter_mut().zip([forces.on_first, forces.on_second]) {
                body.velocity += (force / body.mass) * h;
                body.position += body.velocity * h;
            }
            sim_time += h;

            if step % save_every == 0 {
                sink.append(NewtonianSample {
                    time: sim_time,
                    x1: bodies[0].position.x,
                    y1: bodies[0].position.y,
                    x2: bodies[1].position.x,
                    y2: bodies[1].position.y,
                })?;
                samples += 1;
                let energy = total_energy(&self.force_law, &bodies[0], &bodies[1]);
                monitor.record(energy, step as f64 / num_steps as f64);
            }

            if step % 4096 == 0 {
                pb.set_position(step);
            }
        }
        pb.finish();

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            "newtonian run finished: {} samples, max relative energy drift {:.3e}, {:.2} s",
            samples, monitor.max_drift, elapsed_secs
        );

        Ok(NewtonianSummary {
            force_law: self.force_law.name(),
            steps: num_steps,
            samples,
            final_time: sim_time,
            bodies,
            initial_energy: monitor.initial,
            final_energy: monitor.last,
            max_relative_drift: monitor.max_drift,
            energy_thresholds: monitor.exceeded,
            elapsed_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::NullSink;
    use approx::assert_relative_eq;

    fn earth_moon() -> (Body, Body) {
        (
            Body::new(5.972e24, Vector2::new(-1.5e8, 0.0), Vector2::zeros()),
            Body::new(7.348e22, Vector2::new(1.5e8, 0.0), Vector2::new(0.0, 1000.0)),
        )
    }

    fn params(target_time: f64, dt: f64, save_every: u64) -> NewtonianParams {
        NewtonianParams {
            target_time,
            dt,
            save_every,
        }
    }

    #[test]
    fn reaction_is_exact_negation() {
        let law = InverseSquare::new(6.6743e-11);
        let a = Body::new(3.3e23, Vector2::new(4.6e10, -1.7e9), Vector2::zeros());
        let b = Body::new(1.989e30, Vector2::new(-3.1e7, 2.2e6), Vector2::zeros());
        let f = pair_forces(&law, &a, &b).unwrap();
        assert_eq!(f.on_first.x.to_bits(), (-f.on_second.x).to_bits());
        assert_eq!(f.on_first.y.to_bits(), (-f.on_second.y).to_bits());
    }

    #[test]
    fn force_points_toward_the_other_body() {
        let law = InverseSquare::new(1.0);
        let a = Body::new(2.0, Vector2::zeros(), Vector2::zeros());
        let b = Body::new(3.0, Vector2::new(2.0, 0.0), Vector2::zeros());
        let f = pair_forces(&law, &a, &b).unwrap();
        assert_relative_eq!(f.on_first.x, 1.5);
        assert_eq!(f.on_first.y, 0.0);
    }

    #[test]
    fn coincident_bodies_have_no_force() {
        let law = InverseSquare::new(1.0);
        let a = Body::new(1.0, Vector2::new(1.0, 1.0), Vector2::zeros());
        assert!(pair_forces(&law, &a, &a).is_none());
    }

    #[test]
    fn step_count_tolerates_rounding() {
        assert_eq!(params(1e9, 10.0, 1).num_steps(), 100_000_000);
        assert_eq!(params(3e-4, 3e-4 / 1e7, 1).num_steps(), 10_000_000);
        assert_eq!(params(1.0, 0.3, 1).num_steps(), 4);
        assert_eq!(params(0.0, 0.1, 1).num_steps(), 0);
    }

    #[test]
    fn velocity_is_updated_before_position() {
        let law = InverseSquare::new(1.0);
        let a = Body::new(1.0, Vector2::zeros(), Vector2::zeros());
        let b = Body::new(1.0, Vector2::new(1.0, 0.0), Vector2::zeros());
        let engine = NewtonianEngine::new(params(0.5, 0.5, 1), law);
        let summary = engine.run(a, b, &mut NullSink).unwrap();

        // kick: v = 1 * 0.5, drift uses the new velocity: x = 0.5 * 0.5
        assert_relative_eq!(summary.bodies[0].velocity.x, 0.5);
        assert_relative_eq!(summary.bodies[0].position.x, 0.25);
        assert_relative_eq!(summary.bodies[1].position.x, 0.75);
    }

    #[test]
    fn samples_every_save_every_steps() {
        let (a, b) = earth_moon();
        let engine = NewtonianEngine::new(params(1.0, 0.01, 7), InverseSquare::new(6.6743e-11));
        let mut sink: Vec<NewtonianSample> = Vec::new();
        let summary = engine.run(a, b, &mut sink).unwrap();

        assert_eq!(summary.steps, 100);
        assert_eq!(sink.len(), 100 / 7);
        assert_eq!(summary.samples, sink.len() as u64);
        assert_relative_eq!(sink[0].time, 0.07, epsilon = 1e-12);
        assert!(sink.windows(2).all(|w| w[1].time > w[0].time));
    }

    #[test]
    fn collision_fails_before_any_sample() {
        let a = Body::new(1.0, Vector2::new(5.0, 5.0), Vector2::zeros());
        let b = Body::new(2.0, Vector2::new(5.0, 5.0), Vector2::zeros());
        let engine = NewtonianEngine::new(params(1.0, 0.1, 1), InverseSquare::new(1.0));
        let mut sink: Vec<NewtonianSample> = Vec::new();
        let err = engine.run(a, b, &mut sink).unwrap_err();

        assert!(matches!(err, NewtonianError::Collision { step: 1, .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn rejects_bad_parameters() {
        let (a, b) = earth_moon();
        let law = InverseSquare::new(1.0);
        for p in [params(1.0, 0.0, 1), params(1.0, -1.0, 1), params(1.0, 0.1, 0), params(-1.0, 0.1, 1)] {
            let err = NewtonianEngine::new(p, law).run(a, b, &mut NullSink).unwrap_err();
            assert!(matches!(err, NewtonianError::InvalidParameter(_)));
        }
        let massless = Body::new(0.0, Vector2::zeros(), Vector2::zeros());
        let err = NewtonianEngine::new(params(1.0, 0.1, 1), law)
            .run(massless, b, &mut NullSink)
            .unwrap_err();
        assert!(matches!(err, NewtonianError::InvalidParameter(_)));
    }

    #[test]
    fn energy_thresholds_are_recorded_in_order() {
        // a violent near-radial plunge pushes the drift over every threshold
        let a = Body::new(1.0, Vector2::zeros(), Vector2::zeros());
        let b = Body::new(1e-3, Vector2::new(1.0, 0.0), Vector2::new(0.0, 0.05));
        let engine = NewtonianEngine::new(params(2.0, 0.05, 1), InverseSquare::new(1.0));
        let summary = engine.run(a, b, &mut NullSink).unwrap();

        let hits: Vec<f64> = summary.energy_thresholds.values().flatten().copied().collect();
        assert!(!hits.is_empty());
        assert!(hits.windows(2).all(|w| w[0] <= w[1]));
        assert!(summary.max_relative_drift > 1e-6);
    }
}
