//! Test-body geodesics in the Schwarzschild metric, in polar coordinates.
//!
//! The state is `(r, φ, p_r, p_φ)` and evolves under
//!
//! ```text
//! f       = 1 - Rs / r
//! dr/dt   = p_r / (m f)
//! dφ/dt   = p_φ / (m r²)
//! dp_r/dt = -m c² Rs / (2 r² f) + p_φ² / (m r³)
//! dp_φ/dt = 0
//! ```
//!
//! which is only defined outside the horizon, `r > Rs`. The integrator is
//! RKF7(8) with very tight tolerances, stopped at evenly spaced evaluation
//! times from which every `save_every`-th point is written out with its
//! Lorentz factor.

use crate::error::GeodesicError;
use crate::rkf78::{IntegrationError, OdeSystem, Rkf78, Stats, Tolerances};
use crate::trajectory::{RelativisticSample, SampleSink};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use nalgebra::Vector2;
use serde::Serialize;
use std::time::Instant;

pub const DEFAULT_RTOL: f64 = 2e-14;
pub const DEFAULT_ATOL: f64 = 1e-21;

/// Smallest solver step as a fraction of the evaluation spacing.
pub const MIN_STEP_PER_SPACING: f64 = 1e-12;
/// Smallest solver step as a fraction of the whole run, so a fine grid
/// cannot push the floor below what `f64` time can resolve.
pub const MIN_STEP_PER_SPAN: f64 = 1e-15;
/// Step attempts allowed between two evaluation times.
pub const MAX_STEPS_PER_INTERVAL: u64 = 1_000_000;

/// Event horizon radius of a mass, `2 G M / c²`.
pub fn schwarzschild_radius(mass: f64, g: f64, c: f64) -> f64 {
    2.0 * g * mass / (c * c)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodesicState {
    pub r: f64,
    pub phi: f64,
    pub p_r: f64,
    pub p_phi: f64,
}

impl GeodesicState {
    /// Polar state of a body of mass `m` at `position` moving with `velocity`.
    /// `None` at the origin, where the angle is undefined.
    pub fn from_cartesian(m: f64, position: Vector2<f64>, velocity: Vector2<f64>) -> Option<Self> {
        let r = position.norm();
        if r == 0.0 {
            return None;
        }
        let phi = position.y.atan2(position.x);
        let (sin, cos) = phi.sin_cos();
        Some(Self {
            r,
            phi,
            p_r: m * (velocity.x * cos + velocity.y * sin),
            p_phi: m * r * (-velocity.x * sin + velocity.y * cos),
        })
    }

    pub fn to_cartesian(&self, m: f64) -> (Vector2<f64>, Vector2<f64>) {
        let (sin, cos) = self.phi.sin_cos();
        let v_radial = self.p_r / m;
        let v_tangential = self.p_phi / (m * self.r);
        (
            Vector2::new(self.r * cos, self.r * sin),
            Vector2::new(v_radial * cos - v_tangential * sin, v_radial * sin + v_tangential * cos),
        )
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.r, self.phi, self.p_r, self.p_phi]
    }

    pub fn from_array(y: [f64; 4]) -> Self {
        Self {
            r: y[0],
            phi: y[1],
            p_r: y[2],
            p_phi: y[3],
        }
    }
}

/// Everything the right-hand side depends on. Immutable for a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchwarzschildField {
    pub test_mass: f64,
    pub rs: f64,
    pub c: f64,
}

impl SchwarzschildField {
    pub fn new(test_mass: f64, rs: f64, c: f64) -> Self {
        Self { test_mass, rs, c }
    }

    /// Metric coefficient `1 - Rs / r`.
    pub fn metric(&self, r: f64) -> f64 {
        1.0 - self.rs / r
    }

    /// Coordinate velocities `(dr/dt, dφ/dt)` at a state.
    pub fn coordinate_rates(&self, state: &GeodesicState) -> (f64, f64) {
        let m = self.test_mass;
        (
            state.p_r / (m * self.metric(state.r)),
            state.p_phi / (m * state.r * state.r),
        )
    }
}

impl OdeSystem<4> for SchwarzschildField {
    fn rhs(&self, _t: f64, y: &[f64; 4], dydt: &mut [f64; 4]) {
        let [r, _phi, p_r, p_phi] = *y;
        let m = self.test_mass;
        let f = self.metric(r);
        let r2 = r * r;

        dydt[0] = p_r / (m * f);
        dydt[1] = p_phi / (m * r2);
        dydt[2] = -m * self.c * self.c * self.rs / (2.0 * r2 * f) + p_phi * p_phi / (m * r2 * r);
        dydt[3] = 0.0;
    }

    fn admissible(&self, y: &[f64; 4]) -> bool {
        y[0] > self.rs
    }
}

/// Whether a state the solver stalled at is the coordinate singularity at
/// `Rs`: either within `margin` (relative) of it, or falling faster than c
/// in Schwarzschild coordinates, which only happens as `1 - Rs/r` vanishes.
pub fn approaching_horizon(field: &SchwarzschildField, state: &GeodesicState, margin: f64) -> bool {
    if state.r <= field.rs * (1.0 + margin) {
        return true;
    }
    let (dr, _) = field.coordinate_rates(state);
    !(dr.abs() < field.c)
}

/// Lorentz factor for a local speed, with the speed clipped to
/// `c (1 - margin)`. The flag reports whether clipping happened.
pub fn lorentz_factor(speed: f64, c: f64, margin: f64) -> (f64, bool) {
    let v_max = c * (1.0 - margin);
    let clamped = !(speed <= v_max);
    let v = if clamped { v_max } else { speed };
    let beta = v / c;
    (1.0 / (1.0 - beta * beta).sqrt(), clamped)
}

#[derive(Debug, Clone, Copy)]
pub struct GeodesicParams {
    pub target_time: f64,
    /// Number of evenly spaced evaluation times over `[0, target_time]`,
    /// both ends included.
    pub resolution: u64,
    pub save_every: u64,
    pub rtol: f64,
    pub atol: f64,
    /// Relative distance below c at which local speeds are clipped.
    pub speed_margin: f64,
    /// Solver failures within this relative distance of Rs end the run as a
    /// horizon crossing instead of an error.
    pub horizon_margin: f64,
}

impl GeodesicParams {
    pub fn new(target_time: f64, resolution: u64, save_every: u64) -> Self {
        Self {
            target_time,
            resolution,
            save_every,
            rtol: DEFAULT_RTOL,
            atol: DEFAULT_ATOL,
            speed_margin: 1e-12,
            horizon_margin: 1e-3,
        }
    }

    /// Evaluation time `i` of the run.
    pub fn eval_time(&self, i: u64) -> f64 {
        if self.resolution < 2 {
            return 0.0;
        }
        let last = self.resolution - 1;
        if i >= last {
            self.target_time
        } else {
            self.target_time * (i as f64 / last as f64)
        }
    }

    pub fn spacing(&self) -> f64 {
        if self.resolution > 1 {
            self.target_time / (self.resolution - 1) as f64
        } else {
            0.0
        }
    }

    /// Floor on the solver step. A failure below it close to the horizon
    /// ends the run as a horizon crossing.
    pub fn min_step(&self) -> f64 {
        (self.spacing() * MIN_STEP_PER_SPACING).max(self.target_time * MIN_STEP_PER_SPAN)
    }

    /// Number of samples a run that reaches `target_time` writes.
    pub fn expected_samples(&self) -> u64 {
        self.resolution / self.save_every
    }

    fn validate(&self) -> Result<(), GeodesicError> {
        let bad = |msg: String| -> Result<(), GeodesicError> { Err(GeodesicError::InvalidParameter(msg)) };
        if !(self.target_time >= 0.0 && self.target_time.is_finite()) {
            return bad(format!("target_time must be non-negative, got {}", self.target_time));
        }
        if self.resolution == 0 {
            return bad("resolution must be at least 1".to_string());
        }
        if self.save_every == 0 {
            return bad("save_every must be at least 1".to_string());
        }
        if !(self.rtol >= 0.0 && self.atol > 0.0) {
            return bad(format!("tolerances must be positive (rtol {}, atol {})", self.rtol, self.atol));
        }
        if !(self.speed_margin > 0.0 && self.speed_margin < 1.0) {
            return bad(format!("speed_margin must lie in (0, 1), got {}", self.speed_margin));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum Outcome {
    Completed,
    /// The solver could not continue towards the horizon. `time` and `r` are
    /// the last state it accepted, which lies past the final sample.
    HorizonReached { time: f64, r: f64 },
}

#[derive(Debug, Clone)]
pub struct GeodesicSummary {
    pub rs: f64,
    pub points_evaluated: u64,
    pub samples: u64,
    pub final_time: f64,
    pub final_state: GeodesicState,
    pub initial_p_phi: f64,
    /// Largest `|p_φ - p_φ(0)| / |p_φ(0)|` seen at any evaluation time.
    pub max_p_phi_drift: f64,
    pub clamp_count: u64,
    pub outcome: Outcome,
    pub solver_stats: Stats,
    pub elapsed_secs: f64,
}

pub struct GeodesicEngine {
    params: GeodesicParams,
    show_progress: bool,
}

impl GeodesicEngine {
    pub fn new(params: GeodesicParams) -> Self {
        Self {
            params,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn params(&self) -> &GeodesicParams {
        &self.params
    }

    /// Integrate the test body from `position`/`velocity` at t = 0. The sink
    /// is finished on every exit path.
    pub fn run<S: SampleSink<RelativisticSample>>(
        &self,
        field: &SchwarzschildField,
        position: Vector2<f64>,
        velocity: Vector2<f64>,
        sink: &mut S,
    ) -> Result<GeodesicSummary, GeodesicError> {
        let result = self.integrate(field, position, velocity, sink);
        let finished = sink.finish();
        let summary = result?;
        finished?;
        Ok(summary)
    }

    fn integrate<S: SampleSink<RelativisticSample>>(
        &self,
        field: &SchwarzschildField,
        position: Vector2<f64>,
        velocity: Vector2<f64>,
        sink: &mut S,
    ) -> Result<GeodesicSummary, GeodesicError> {
        let p = &self.params;
        p.validate()?;
        if !(field.test_mass > 0.0 && field.c > 0.0 && field.rs >= 0.0) {
            return Err(GeodesicError::InvalidParameter(format!(
                "test mass and c must be positive and Rs non-negative ({field:?})"
            )));
        }
        let state = GeodesicState::from_cartesian(field.test_mass, position, velocity).ok_or_else(|| {
            GeodesicError::InvalidParameter("initial position is at the origin".to_string())
        })?;
        if state.r <= field.rs {
            return Err(GeodesicError::InvalidParameter(format!(
                "initial radius {:e} m is inside the horizon (Rs = {:e} m)",
                state.r, field.rs
            )));
        }

        let start = Instant::now();
        let n = p.resolution;
        let spacing = p.spacing();
        let emit_limit = (n / p.save_every) * p.save_every;

        let mut solver = Rkf78::new(Tolerances::new(p.atol, p.rtol));
        solver.set_step_limits(p.min_step(), f64::INFINITY);
        solver.max_steps = MAX_STEPS_PER_INTERVAL;

        info!(
            "geodesic run: {} evaluation points over {:e} s, Rs = {:e} m, r0 = {:.3} Rs, saving every {}",
            n,
            p.target_time,
            field.rs,
            state.r / field.rs,
            p.save_every
        );

        let pb = if self.show_progress {
            let pb = ProgressBar::new(n);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message("Schwarzschild (RKF78)");
            pb
        } else {
            ProgressBar::hidden()
        };

        let initial_p_phi = state.p_phi;
        let mut y = state.to_array();
        let mut h = spacing;
        let mut t = 0.0;
        let mut max_p_phi_drift: f64 = 0.0;
        let mut clamp_count = 0u64;
        let mut samples = 0u64;
        let mut points = 0u64;
        let mut outcome = Outcome::Completed;

        for i in 0..n {
            let t_i = p.eval_time(i);
            if t_i > t {
                match solver.advance(field, t, &y, t_i, h) {
                    Ok(adv) => {
                        y = adv.y;
                        h = adv.h_next;
                    }
                    Err(e) => {
                        let (t_last, y_last) = solver.last_accepted();
                        let state = GeodesicState::from_array(y_last);
                        if matches!(e, IntegrationError::LeftDomain { .. })
                            || approaching_horizon(field, &state, p.horizon_margin)
                        {
                            warn!(
                                "geodesic reached the horizon at t = {:e} s (r = {:.9} Rs), last evaluation time {:e} s: {}",
                                t_last,
                                state.r / field.rs,
                                t,
                                e
                            );
                            outcome = Outcome::HorizonReached {
                                time: t_last,
                                r: state.r,
                            };
                            break;
                        }
                        pb.abandon();
                        return Err(GeodesicError::Integration {
                            time: t_last,
                            r: state.r,
                            source: e,
                        });
                    }
                }
                t = t_i;
            }
            points += 1;

            let drift = if initial_p_phi != 0.0 {
                ((y[3] - initial_p_phi) / initial_p_phi).abs()
            } else {
                y[3].abs()
            };
            max_p_phi_drift = max_p_phi_drift.max(drift);

            if i < emit_limit && i % p.save_every == 0 {
                let sample = self.sample_at(field, t, &y);
                if sample.clamped {
                    if clamp_count == 0 {
                        warn!("local speed clipped below c at t = {:e} s", t);
                    }
                    clamp_count += 1;
                }
                sink.append(sample)?;
                samples += 1;
            }

            if i % 4096 == 0 {
                pb.set_position(i);
            }
        }
        pb.finish();

        if clamp_count > 0 {
            warn!("{} samples had their speed clipped below c", clamp_count);
        }
        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            "geodesic run finished: {} samples, {} accepted / {} rejected steps, p_phi drift {:.3e}, {:.2} s",
            samples, solver.stats.accepted_steps, solver.stats.rejected_steps, max_p_phi_drift, elapsed_secs
        );

        Ok(GeodesicSummary {
            rs: field.rs,
            points_evaluated: points,
            samples,
            final_time: t,
            final_state: GeodesicState::from_array(y),
            initial_p_phi,
            max_p_phi_drift,
            clamp_count,
            outcome,
            solver_stats: solver.stats,
            elapsed_secs,
        })
    }

    fn sample_at(&self, field: &SchwarzschildField, t: f64, y: &[f64; 4]) -> RelativisticSample {
        let state = GeodesicState::from_array(*y);
        let (dr, dphi) = field.coordinate_rates(&state);
        let speed = (dr * dr + (state.r * dphi).powi(2)).sqrt();
        let (gamma, clamped) = lorentz_factor(speed, field.c, self.params.speed_margin);
        let (sin, cos) = state.phi.sin_cos();
        RelativisticSample {
            time: t,
            x: state.r * cos,
            y: state.r * sin,
            lorentz_factor: gamma,
            clamped,
        }
    }
}
