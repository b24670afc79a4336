//! Numerical integrators for second-order systems `q'' = f(t, q)`.
//!
//! Two families share the same state layout (paired position and velocity
//! blocks) and the same right-hand side signature:
//!
//! - Fixed-step: symplectic splitting schemes driven through a resumable
//!   [`FixedStepInstance`]. Used for the coupled massive-body system, where
//!   long-horizon energy behaviour matters and the step must be reproducible.
//! - Adaptive-step: an embedded Runge-Kutta-Nyström 4(3) pair with local error
//!   control, used to flow a single trajectory to an arbitrary time.
//!
//! Neither family knows about trajectories or caching: they mutate only the
//! state they are given and their own stage buffers.

use bevy::math::DVec3;

// =============================================================================
// State
// =============================================================================

/// Positions and velocities of a set of points at one instant.
#[derive(Clone, Debug, PartialEq)]
pub struct SystemState {
    /// Time in seconds.
    pub time: f64,
    /// Positions in meters.
    pub positions: Vec<DVec3>,
    /// Velocities in m/s.
    pub velocities: Vec<DVec3>,
}

impl SystemState {
    pub fn new(time: f64, positions: Vec<DVec3>, velocities: Vec<DVec3>) -> Self {
        debug_assert_eq!(positions.len(), velocities.len());
        Self {
            time,
            positions,
            velocities,
        }
    }

    /// Number of points in the system.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn is_finite(&self) -> bool {
        self.positions.iter().all(|q| q.is_finite()) && self.velocities.iter().all(|v| v.is_finite())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("maximum step count {max_steps} reached at t = {time}")]
    MaxStepsExceeded { max_steps: u64, time: f64 },

    #[error("non-finite state or acceleration at t = {time} (singularity)")]
    Singularity { time: f64 },

    #[error("step size {step} underflowed at t = {time}")]
    StepUnderflow { time: f64, step: f64 },
}

// =============================================================================
// Fixed-step integrators
// =============================================================================

/// Fixed-step integration schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FixedStepIntegrator {
    /// Velocity Verlet (kick-drift-kick leapfrog).
    /// 2nd order, symplectic, time-reversible.
    Leapfrog,
    /// Omelyan, Mryglod & Folk (2002) position-extended Forest-Ruth-like
    /// scheme. 4th order, symplectic, time-reversible, and every force
    /// evaluation falls inside the step.
    Pefrl,
    /// Explicit Euler. 1st order and not symplectic; kept as a reference for
    /// the energy drift a non-geometric scheme exhibits.
    ExplicitEuler,
}

impl FixedStepIntegrator {
    pub fn name(&self) -> &'static str {
        match self {
            FixedStepIntegrator::Leapfrog => "Leapfrog",
            FixedStepIntegrator::Pefrl => "PEFRL",
            FixedStepIntegrator::ExplicitEuler => "ExplicitEuler",
        }
    }

    /// Stable identifier used by snapshots.
    pub fn id(&self) -> u32 {
        match self {
            FixedStepIntegrator::Leapfrog => 1,
            FixedStepIntegrator::Pefrl => 2,
            FixedStepIntegrator::ExplicitEuler => 3,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(FixedStepIntegrator::Leapfrog),
            2 => Some(FixedStepIntegrator::Pefrl),
            3 => Some(FixedStepIntegrator::ExplicitEuler),
            _ => None,
        }
    }

    /// Drift/kick coefficients of the splitting schemes.
    ///
    /// A step is `drift(d[0]) kick(k[0]) drift(d[1]) ... kick(k[n-1]) drift(d[n])`.
    fn splitting(&self) -> Option<(&'static [f64], &'static [f64])> {
        match self {
            FixedStepIntegrator::Leapfrog => Some((&LEAPFROG_DRIFTS, &LEAPFROG_KICKS)),
            FixedStepIntegrator::Pefrl => Some((&PEFRL_DRIFTS, &PEFRL_KICKS)),
            FixedStepIntegrator::ExplicitEuler => None,
        }
    }
}

const LEAPFROG_DRIFTS: [f64; 3] = [0.0, 1.0, 0.0];
const LEAPFROG_KICKS: [f64; 2] = [0.5, 0.5];

const PEFRL_XI: f64 = 0.178_617_895_844_809_1;
const PEFRL_LAMBDA: f64 = -0.212_341_831_062_605_4;
const PEFRL_CHI: f64 = -0.066_264_582_669_818_49;

const PEFRL_DRIFTS: [f64; 5] = [
    PEFRL_XI,
    PEFRL_CHI,
    1.0 - 2.0 * (PEFRL_CHI + PEFRL_XI),
    PEFRL_CHI,
    PEFRL_XI,
];
const PEFRL_KICKS: [f64; 4] = [
    0.5 * (1.0 - 2.0 * PEFRL_LAMBDA),
    PEFRL_LAMBDA,
    PEFRL_LAMBDA,
    0.5 * (1.0 - 2.0 * PEFRL_LAMBDA),
];

/// Parameters of the fixed-step integration of the massive bodies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedStepParameters {
    /// Integration scheme. Default: PEFRL.
    pub integrator: FixedStepIntegrator,
    /// Step in seconds. Default: 3600 (1 hour).
    pub step: f64,
}

impl Default for FixedStepParameters {
    fn default() -> Self {
        Self {
            integrator: FixedStepIntegrator::Pefrl,
            step: 3600.0, // 1 hour
        }
    }
}

impl FixedStepParameters {
    pub fn new(integrator: FixedStepIntegrator, step: f64) -> Self {
        Self { integrator, step }
    }
}

/// A resumable fixed-step integration session.
///
/// Created once per (right-hand side, step) configuration and advanced one
/// step at a time. The time after `n` steps is `t₀ + n·h`, so long runs do
/// not accumulate roundoff in the time coordinate and two sessions fed the
/// same inputs produce bit-identical states.
#[derive(Clone, Debug)]
pub struct FixedStepInstance {
    parameters: FixedStepParameters,
    initial_time: f64,
    steps_taken: u64,
    state: SystemState,
    /// Stage buffer for the accelerations.
    accelerations: Vec<DVec3>,
}

impl PartialEq for FixedStepInstance {
    /// Equality of the session; the stage buffer is scratch space.
    fn eq(&self, other: &Self) -> bool {
        self.parameters == other.parameters
            && self.initial_time == other.initial_time
            && self.steps_taken == other.steps_taken
            && self.state == other.state
    }
}

impl FixedStepInstance {
    pub fn new(parameters: FixedStepParameters, state: SystemState) -> Self {
        Self::resume(parameters, state.time, 0, state)
    }

    /// Resume a session that has already taken `steps_taken` steps from
    /// `initial_time`.
    pub fn resume(
        parameters: FixedStepParameters,
        initial_time: f64,
        steps_taken: u64,
        state: SystemState,
    ) -> Self {
        let accelerations = vec![DVec3::ZERO; state.len()];
        Self {
            parameters,
            initial_time,
            steps_taken,
            state,
            accelerations,
        }
    }

    pub fn parameters(&self) -> &FixedStepParameters {
        &self.parameters
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn time(&self) -> f64 {
        self.state.time
    }

    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }

    /// Time the session will be at after its next step.
    pub fn next_time(&self) -> f64 {
        self.time_after(self.steps_taken + 1)
    }

    fn time_after(&self, steps: u64) -> f64 {
        self.initial_time + steps as f64 * self.parameters.step
    }

    /// Advance by exactly one step.
    ///
    /// `rhs(t, positions, accelerations)` must overwrite `accelerations`.
    pub fn step<F>(&mut self, mut rhs: F)
    where
        F: FnMut(f64, &[DVec3], &mut [DVec3]),
    {
        let h = self.parameters.step;
        let t0 = self.state.time;

        match self.parameters.integrator.splitting() {
            Some((drifts, kicks)) => {
                let mut stage_offset = 0.0;
                for (i, &kick) in kicks.iter().enumerate() {
                    stage_offset += drifts[i];
                    self.drift(drifts[i] * h);
                    // The end of the step is `t₀ + (n+1)·h`, not `t + h`.
                    let stage_time = if stage_offset == 1.0 {
                        self.time_after(self.steps_taken + 1)
                    } else {
                        t0 + stage_offset * h
                    };
                    rhs(stage_time, &self.state.positions, &mut self.accelerations);
                    for (v, a) in self.state.velocities.iter_mut().zip(&self.accelerations) {
                        *v += *a * (kick * h);
                    }
                }
                self.drift(drifts[kicks.len()] * h);
            }
            None => {
                rhs(t0, &self.state.positions, &mut self.accelerations);
                for ((q, v), a) in self
                    .state
                    .positions
                    .iter_mut()
                    .zip(self.state.velocities.iter_mut())
                    .zip(&self.accelerations)
                {
                    *q += *v * h;
                    *v += *a * h;
                }
            }
        }

        self.steps_taken += 1;
        self.state.time = self.time_after(self.steps_taken);
    }

    #[inline]
    fn drift(&mut self, dt: f64) {
        if dt == 0.0 {
            return;
        }
        for (q, v) in self.state.positions.iter_mut().zip(&self.state.velocities) {
            *q += *v * dt;
        }
    }

    /// Step while the next step does not pass `t_final`, calling `on_step`
    /// after each step. Returns the number of steps taken.
    pub fn solve<F, S>(&mut self, t_final: f64, mut rhs: F, mut on_step: S) -> u64
    where
        F: FnMut(f64, &[DVec3], &mut [DVec3]),
        S: FnMut(&SystemState),
    {
        let mut steps = 0;
        while self.next_time() <= t_final {
            self.step(&mut rhs);
            on_step(&self.state);
            steps += 1;
        }
        steps
    }
}

// =============================================================================
// Adaptive-step integrators
// =============================================================================

/// Embedded adaptive-step integration schemes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AdaptiveStepIntegrator {
    /// Dormand, El-Mikkawy & Prince (1986) RKN 4(3), first same as last.
    DormandElMikkawyPrince1986Rkn434Fm,
}

impl AdaptiveStepIntegrator {
    /// Order of the embedded (lower order) solution; drives step control.
    pub fn lower_order(&self) -> u32 {
        match self {
            AdaptiveStepIntegrator::DormandElMikkawyPrince1986Rkn434Fm => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdaptiveStepIntegrator::DormandElMikkawyPrince1986Rkn434Fm => "DormandElMikkawyPrince1986RKN434FM",
        }
    }
}

/// Butcher tableau of the RKN 4(3) FSAL pair.
mod rkn434fm {
    pub const STAGES: usize = 4;
    pub const C: [f64; STAGES] = [0.0, 1.0 / 4.0, 7.0 / 10.0, 1.0];
    pub const A: [[f64; STAGES]; STAGES] = [
        [0.0, 0.0, 0.0, 0.0],
        [1.0 / 32.0, 0.0, 0.0, 0.0],
        [7.0 / 1000.0, 119.0 / 500.0, 0.0, 0.0],
        [1.0 / 14.0, 8.0 / 27.0, 25.0 / 189.0, 0.0],
    ];
    /// Position weights of the propagated 4th order solution.
    pub const B_HAT: [f64; STAGES] = [1.0 / 14.0, 8.0 / 27.0, 25.0 / 189.0, 0.0];
    /// Velocity weights of the propagated 4th order solution.
    pub const B_PRIME_HAT: [f64; STAGES] = [1.0 / 14.0, 32.0 / 81.0, 250.0 / 567.0, 5.0 / 54.0];
    /// Position weights of the embedded 3rd order solution.
    pub const B: [f64; STAGES] = [-7.0 / 150.0, 67.0 / 150.0, 3.0 / 20.0, -1.0 / 20.0];
    /// Velocity weights of the embedded 3rd order solution.
    pub const B_PRIME: [f64; STAGES] = [13.0 / 21.0, -20.0 / 27.0, 275.0 / 189.0, -1.0 / 3.0];
}

/// Configuration for adaptive-step flows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdaptiveStepParameters {
    /// Integration scheme.
    pub integrator: AdaptiveStepIntegrator,
    /// Maximum number of step attempts (accepted or rejected). Default: 10⁶.
    pub max_steps: u64,
    /// Tolerated local position error in meters. Default: 1 m.
    pub length_integration_tolerance: f64,
    /// Tolerated local velocity error in m/s. Default: 1 m/s.
    pub speed_integration_tolerance: f64,
}

impl Default for AdaptiveStepParameters {
    fn default() -> Self {
        Self {
            integrator: AdaptiveStepIntegrator::DormandElMikkawyPrince1986Rkn434Fm,
            max_steps: 1_000_000,
            length_integration_tolerance: 1.0,
            speed_integration_tolerance: 1.0,
        }
    }
}

impl AdaptiveStepParameters {
    /// Looser tolerances for long-range previews.
    pub fn for_prediction() -> Self {
        Self {
            max_steps: 200_000,
            length_integration_tolerance: 1.0e3, // 1 km
            speed_integration_tolerance: 1.0,
            ..Default::default()
        }
    }
}

/// Safety factor applied to the optimal step estimate.
const SAFETY_FACTOR: f64 = 0.9;
/// Bounds on the per-step change of the step size.
const MIN_STEP_RATIO: f64 = 0.2;
const MAX_STEP_RATIO: f64 = 5.0;

/// Statistics from one adaptive solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdaptiveStepStats {
    pub accepted_steps: u64,
    pub rejected_steps: u64,
}

/// An adaptive-step integration session.
#[derive(Clone, Debug)]
pub struct AdaptiveStepInstance {
    parameters: AdaptiveStepParameters,
    state: SystemState,
    /// Stage accelerations; `stages[0]` is carried over between steps (FSAL).
    stages: [Vec<DVec3>; rkn434fm::STAGES],
    first_stage_valid: bool,
    stage_positions: Vec<DVec3>,
    stats: AdaptiveStepStats,
}

impl AdaptiveStepInstance {
    pub fn new(parameters: AdaptiveStepParameters, state: SystemState) -> Self {
        let n = state.len();
        Self {
            parameters,
            stages: std::array::from_fn(|_| vec![DVec3::ZERO; n]),
            first_stage_valid: false,
            stage_positions: vec![DVec3::ZERO; n],
            state,
            stats: AdaptiveStepStats::default(),
        }
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    pub fn stats(&self) -> AdaptiveStepStats {
        self.stats
    }

    /// Integrate to `t_final`, calling `on_step` after every accepted step.
    ///
    /// The first step attempted spans the whole interval; rejected steps
    /// shrink it. On error the state holds the last accepted step, which the
    /// caller has already seen through `on_step`.
    pub fn solve<F, S>(&mut self, t_final: f64, mut rhs: F, mut on_step: S) -> Result<AdaptiveStepStats, IntegrationError>
    where
        F: FnMut(f64, &[DVec3], &mut [DVec3]),
        S: FnMut(&SystemState),
    {
        use rkn434fm::{A, B, B_HAT, B_PRIME, B_PRIME_HAT, C, STAGES};

        let exponent = 1.0 / (self.parameters.integrator.lower_order() + 1) as f64;
        let mut h = t_final - self.state.time;
        let mut attempts: u64 = 0;

        while self.state.time < t_final {
            if attempts >= self.parameters.max_steps {
                return Err(IntegrationError::MaxStepsExceeded {
                    max_steps: self.parameters.max_steps,
                    time: self.state.time,
                });
            }
            attempts += 1;

            let t = self.state.time;
            let at_end = t + h >= t_final;
            if at_end {
                h = t_final - t;
            }
            if h.is_nan() || h <= t.abs().max(1.0) * 4.0 * f64::EPSILON {
                return Err(IntegrationError::StepUnderflow { time: t, step: h });
            }

            if !self.first_stage_valid {
                rhs(t, &self.state.positions, &mut self.stages[0]);
                self.first_stage_valid = true;
            }

            for i in 1..STAGES {
                let (done, rest) = self.stages.split_at_mut(i);
                for (k, stage_q) in self.stage_positions.iter_mut().enumerate() {
                    let mut sum = DVec3::ZERO;
                    for (j, stage) in done.iter().enumerate() {
                        sum += stage[k] * A[i][j];
                    }
                    *stage_q = self.state.positions[k] + self.state.velocities[k] * (C[i] * h) + sum * (h * h);
                }
                let stage_time = if at_end && C[i] == 1.0 { t_final } else { t + C[i] * h };
                rhs(stage_time, &self.stage_positions, &mut rest[0]);
            }

            let mut position_error: f64 = 0.0;
            let mut velocity_error: f64 = 0.0;
            for k in 0..self.state.len() {
                let mut dq = DVec3::ZERO;
                let mut dv = DVec3::ZERO;
                for (i, stage) in self.stages.iter().enumerate() {
                    dq += stage[k] * (B_HAT[i] - B[i]);
                    dv += stage[k] * (B_PRIME_HAT[i] - B_PRIME[i]);
                }
                position_error = position_error.max((dq * (h * h)).length());
                velocity_error = velocity_error.max((dv * h).length());
            }
            if !(position_error.is_finite() && velocity_error.is_finite()) {
                return Err(IntegrationError::Singularity { time: t });
            }

            let ratio = (self.parameters.length_integration_tolerance / position_error)
                .min(self.parameters.speed_integration_tolerance / velocity_error);
            let factor = SAFETY_FACTOR * ratio.powf(exponent);

            if ratio < 1.0 {
                self.stats.rejected_steps += 1;
                h *= factor.clamp(MIN_STEP_RATIO, 1.0);
                continue;
            }

            for k in 0..self.state.len() {
                let mut dq = DVec3::ZERO;
                let mut dv = DVec3::ZERO;
                for (i, stage) in self.stages.iter().enumerate() {
                    dq += stage[k] * B_HAT[i];
                    dv += stage[k] * B_PRIME_HAT[i];
                }
                self.state.positions[k] += self.state.velocities[k] * h + dq * (h * h);
                self.state.velocities[k] += dv * h;
            }
            self.state.time = if at_end { t_final } else { t + h };
            if !self.state.is_finite() {
                return Err(IntegrationError::Singularity { time: self.state.time });
            }

            // First same as last: the final stage was evaluated at the new state.
            self.stages.swap(0, STAGES - 1);

            self.stats.accepted_steps += 1;
            on_step(&self.state);

            h *= factor.clamp(MIN_STEP_RATIO, MAX_STEP_RATIO);
        }

        Ok(self.stats)
    }
}

// =============================================================================
// Tests
// =============================================================================
