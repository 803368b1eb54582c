//! Runge-Kutta-Fehlberg 7(8) integrator.
//!
//! A 13-stage embedded pair (NASA TR R-287, Fehlberg 1968). The 8th order
//! solution is propagated and the 7th order companion is only used for the
//! error estimate, which reduces to `41/840 * h * (k0 + k10 - k11 - k12)`.

use thiserror::Error;

const STAGES: usize = 13;

const C: [f64; STAGES] = [
    0.0,
    2.0 / 27.0,
    1.0 / 9.0,
    1.0 / 6.0,
    5.0 / 12.0,
    1.0 / 2.0,
    5.0 / 6.0,
    1.0 / 6.0,
    2.0 / 3.0,
    1.0 / 3.0,
    1.0,
    0.0,
    1.0,
];

#[rustfmt::skip]
const A: [[f64; STAGES]; STAGES] = [
    [0.0; STAGES],
    [2.0 / 27.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 36.0, 1.0 / 12.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 24.0, 0.0, 1.0 / 8.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [5.0 / 12.0, 0.0, -25.0 / 16.0, 25.0 / 16.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 20.0, 0.0, 0.0, 1.0 / 4.0, 1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-25.0 / 108.0, 0.0, 0.0, 125.0 / 108.0, -65.0 / 27.0, 125.0 / 54.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [31.0 / 300.0, 0.0, 0.0, 0.0, 61.0 / 225.0, -2.0 / 9.0, 13.0 / 900.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [2.0, 0.0, 0.0, -53.0 / 6.0, 704.0 / 45.0, -107.0 / 9.0, 67.0 / 90.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [-91.0 / 108.0, 0.0, 0.0, 23.0 / 108.0, -976.0 / 135.0, 311.0 / 54.0, -19.0 / 60.0, 17.0 / 6.0, -1.0 / 12.0, 0.0, 0.0, 0.0, 0.0],
    [2383.0 / 4100.0, 0.0, 0.0, -341.0 / 164.0, 4496.0 / 1025.0, -301.0 / 82.0, 2133.0 / 4100.0, 45.0 / 82.0, 45.0 / 164.0, 18.0 / 41.0, 0.0, 0.0, 0.0],
    [3.0 / 205.0, 0.0, 0.0, 0.0, 0.0, -6.0 / 41.0, -3.0 / 205.0, -3.0 / 41.0, 3.0 / 41.0, 6.0 / 41.0, 0.0, 0.0, 0.0],
    [-1777.0 / 4100.0, 0.0, 0.0, -341.0 / 164.0, 4496.0 / 1025.0, -289.0 / 82.0, 2193.0 / 4100.0, 51.0 / 82.0, 33.0 / 164.0, 12.0 / 41.0, 0.0, 1.0, 0.0],
];

/// 8th order weights.
const B: [f64; STAGES] = [
    0.0,
    0.0,
    0.0,
    0.0,
    0.0,
    34.0 / 105.0,
    9.0 / 35.0,
    9.0 / 35.0,
    9.0 / 280.0,
    9.0 / 280.0,
    0.0,
    41.0 / 840.0,
    41.0 / 840.0,
];

const ERR_WEIGHT: f64 = 41.0 / 840.0;

/// A system of first order ODEs, dy/dt = f(t, y).
pub trait OdeSystem<const N: usize> {
    fn rhs(&self, t: f64, y: &[f64; N], dydt: &mut [f64; N]);

    /// Whether `y` lies inside the region where `rhs` is defined.
    /// Checked on every accepted step.
    fn admissible(&self, _y: &[f64; N]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Error)]
pub enum IntegrationError {
    #[error("step size underflow at t = {t:e} (h = {h:e})")]
    StepSizeTooSmall { t: f64, h: f64 },

    #[error("exceeded {0} steps in a single advance")]
    MaxStepsExceeded(u64),

    #[error("non-finite state at t = {t:e}")]
    NonFiniteState { t: f64 },

    #[error("state left the admissible region at t = {t:e}")]
    LeftDomain { t: f64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub fn_evals: u64,
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// Error is measured as `|err_i| / (atol + rtol * max(|y_i|, |y_new_i|))`,
/// infinity norm.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    pub atol: f64,
    pub rtol: f64,
}

impl Tolerances {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }
}

/// I-controller: `h_new = safety * h * err^(-1/8)`, clamped.
#[derive(Debug, Clone, Copy)]
pub struct StepController {
    pub safety: f64,
    pub max_factor: f64,
    pub min_factor: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
        }
    }
}

impl StepController {
    fn factor(&self, error: f64) -> f64 {
        if !error.is_finite() {
            return self.min_factor;
        }
        if error == 0.0 {
            return self.max_factor;
        }
        (self.safety * error.powf(-1.0 / 8.0)).clamp(self.min_factor, self.max_factor)
    }
}

#[derive(Debug, Clone)]
pub struct StepResult<const N: usize> {
    pub y: [f64; N],
    pub error: f64,
    pub h_next: f64,
    pub accepted: bool,
}

/// State reached by [`Rkf78::advance`], plus the step size to try next.
#[derive(Debug, Clone, Copy)]
pub struct Advance<const N: usize> {
    pub y: [f64; N],
    pub h_next: f64,
}

#[derive(Debug, Clone)]
pub struct Rkf78<const N: usize> {
    tol: Tolerances,
    controller: StepController,
    pub h_min: f64,
    pub h_max: f64,
    /// Step attempts allowed per call to `advance`.
    pub max_steps: u64,
    k: [[f64; N]; STAGES],
    last_t: f64,
    last_y: [f64; N],
    pub stats: Stats,
}

impl<const N: usize> Rkf78<N> {
    pub fn new(tol: Tolerances) -> Self {
        Self {
            tol,
            controller: StepController::default(),
            h_min: 1e-14,
            h_max: f64::INFINITY,
            max_steps: 10_000_000,
            k: [[0.0; N]; STAGES],
            last_t: 0.0,
            last_y: [0.0; N],
            stats: Stats::default(),
        }
    }

    pub fn set_step_limits(&mut self, h_min: f64, h_max: f64) {
        self.h_min = h_min;
        self.h_max = h_max;
    }

    /// One trial step of size `h` from `(t, y)`. The caller decides what to
    /// do with a rejected step.
    pub fn step<S: OdeSystem<N>>(&mut self, sys: &S, t: f64, y: &[f64; N], h: f64) -> StepResult<N> {
        self.compute_stages(sys, t, y, h);

        let mut y_new = [0.0; N];
        let mut error: f64 = 0.0;
        let mut poisoned = false;
        for n in 0..N {
            let mut sum = 0.0;
            for (i, b) in B.iter().enumerate() {
                sum += b * self.k[i][n];
            }
            y_new[n] = y[n] + h * sum;

            let err_n = ERR_WEIGHT * h * (self.k[0][n] + self.k[10][n] - self.k[11][n] - self.k[12][n]);
            let scale = self.tol.atol + self.tol.rtol * y[n].abs().max(y_new[n].abs());
            let scaled = err_n.abs() / scale;
            poisoned |= !scaled.is_finite();
            error = error.max(scaled);
        }
        if poisoned {
            error = f64::INFINITY;
        }

        let accepted = error <= 1.0;
        let h_next = (h.abs() * self.controller.factor(error)).min(self.h_max);

        self.stats.fn_evals += STAGES as u64;
        if accepted {
            self.stats.accepted_steps += 1;
        } else {
            self.stats.rejected_steps += 1;
        }

        StepResult {
            y: y_new,
            error,
            h_next,
            accepted,
        }
    }

    /// Integrate forward from `(t0, y0)` to exactly `tf`, starting with a
    /// step of `h`. Returns the state at `tf` and the controller's next
    /// step suggestion so consecutive calls can chain.
    pub fn advance<S: OdeSystem<N>>(
        &mut self,
        sys: &S,
        t0: f64,
        y0: &[f64; N],
        tf: f64,
        h: f64,
    ) -> Result<Advance<N>, IntegrationError> {
        if !(t0.is_finite() && tf.is_finite() && h.is_finite()) || h <= 0.0 || tf < t0 {
            return Err(IntegrationError::InvalidInput(format!(
                "advance requires finite t0 <= tf and h > 0 (t0 = {t0}, tf = {tf}, h = {h})"
            )));
        }

        let mut t = t0;
        let mut y = *y0;
        self.last_t = t;
        self.last_y = y;
        let mut h = h.min(self.h_max);
        let mut h_suggested = h;
        let mut attempts = 0u64;

        while t < tf {
            let remaining = tf - t;
            let last = h >= remaining;
            if !last && h < self.h_min {
                return Err(IntegrationError::StepSizeTooSmall { t, h });
            }
            let h_try = if last { remaining } else { h };

            let result = self.step(sys, t, &y, h_try);

            if result.accepted {
                if !result.y.iter().all(|v| v.is_finite()) {
                    return Err(IntegrationError::NonFiniteState { t });
                }
                if !sys.admissible(&result.y) {
                    return Err(IntegrationError::LeftDomain { t: t + h_try });
                }
                y = result.y;
                t = if last { tf } else { t + h_try };
                self.last_t = t;
                self.last_y = y;
                // a clipped final step says little about the natural step size
                if !last || result.h_next > h_suggested {
                    h_suggested = result.h_next;
                }
            }
            h = result.h_next;

            attempts += 1;
            if attempts > self.max_steps {
                return Err(IntegrationError::MaxStepsExceeded(self.max_steps));
            }
        }

        Ok(Advance {
            y,
            h_next: h_suggested,
        })
    }

    /// Time and state of the most recent accepted step, or the start of the
    /// latest `advance` if none was accepted. After a failed `advance` this
    /// is the furthest point the solver reached.
    pub fn last_accepted(&self) -> (f64, [f64; N]) {
        (self.last_t, self.last_y)
    }

    fn compute_stages<S: OdeSystem<N>>(&mut self, sys: &S, t: f64, y: &[f64; N], h: f64) {
        let mut y_stage = [0.0; N];
        sys.rhs(t, y, &mut self.k[0]);

        for i in 1..STAGES {
            for n in 0..N {
                let mut sum = 0.0;
                for j in 0..i {
                    sum += A[i][j] * self.k[j][n];
                }
                y_stage[n] = y[n] + h * sum;
            }
            sys.rhs(t + C[i] * h, &y_stage, &mut self.k[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    struct Oscillator {
        omega: f64,
    }

    impl OdeSystem<2> for Oscillator {
        fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
            dydt[0] = y[1];
            dydt[1] = -self.omega * self.omega * y[0];
        }
    }

    struct Drain;

    impl OdeSystem<1> for Drain {
        fn rhs(&self, _t: f64, _y: &[f64; 1], dydt: &mut [f64; 1]) {
            dydt[0] = -1.0;
        }

        fn admissible(&self, y: &[f64; 1]) -> bool {
            y[0] > 0.0
        }
    }

    struct BlowUp;

    impl OdeSystem<1> for BlowUp {
        fn rhs(&self, _t: f64, y: &[f64; 1], dydt: &mut [f64; 1]) {
            dydt[0] = y[0] * y[0];
        }
    }

    #[test]
    fn coefficient_rows_sum_to_nodes() {
        for i in 0..STAGES {
            let row: f64 = A[i].iter().sum();
            assert_relative_eq!(row, C[i], epsilon = 1e-14);
        }
        assert_relative_eq!(B.iter().sum::<f64>(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn oscillator_returns_after_one_period() {
        let mut solver = Rkf78::new(Tolerances::new(1e-14, 1e-13));
        let sys = Oscillator { omega: 1.0 };
        let out = solver.advance(&sys, 0.0, &[1.0, 0.0], 2.0 * PI, 0.1).unwrap();

        assert_relative_eq!(out.y[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(out.y[1], 0.0, epsilon = 1e-10);
        assert!(solver.stats.accepted_steps > 0);
    }

    #[test]
    fn chained_advances_land_on_each_target() {
        let mut solver = Rkf78::new(Tolerances::new(1e-14, 1e-13));
        let sys = Oscillator { omega: 2.0 };
        let mut y = [1.0, 0.0];
        let mut h = 0.05;
        let mut t = 0.0;
        for i in 1..=100 {
            let tf = i as f64 * 0.01;
            let out = solver.advance(&sys, t, &y, tf, h).unwrap();
            y = out.y;
            h = out.h_next;
            t = tf;
        }
        assert_relative_eq!(y[0], (2.0f64).cos(), epsilon = 1e-11);
        assert_relative_eq!(y[1], -2.0 * (2.0f64).sin(), epsilon = 1e-11);
    }

    #[test]
    fn leaving_admissible_region_is_reported() {
        let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
        let err = solver.advance(&Drain, 0.0, &[1.0], 2.0, 0.5).unwrap_err();
        assert!(matches!(err, IntegrationError::LeftDomain { .. }));
    }

    #[test]
    fn finite_time_blow_up_fails() {
        let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
        solver.max_steps = 100_000;
        assert!(solver.advance(&BlowUp, 0.0, &[1.0], 2.0, 0.01).is_err());
    }

    #[test]
    fn failed_advance_remembers_how_far_it_got() {
        let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
        solver.set_step_limits(1e-9, f64::INFINITY);
        // y = 1 / (1 - t) blows up at t = 1
        let err = solver.advance(&BlowUp, 0.0, &[1.0], 2.0, 0.01).unwrap_err();
        assert!(matches!(err, IntegrationError::StepSizeTooSmall { .. }));

        let (t, y) = solver.last_accepted();
        assert!(t > 0.99 && t < 1.0, "t = {t}");
        assert!(y[0] > 1e3);
        assert!((1.0 / y[0] - (1.0 - t)).abs() < 1e-8);
    }

    #[test]
    fn rejects_backwards_interval() {
        let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
        let err = solver.advance(&Drain, 1.0, &[1.0], 0.0, 0.1).unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidInput(_)));
    }
}
