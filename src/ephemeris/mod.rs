//! The ephemeris: self-consistent trajectories of the massive bodies.
//!
//! The massive bodies are integrated together with a fixed-step symplectic
//! scheme and each body's motion is compressed into a
//! [`ContinuousTrajectory`]. Other trajectories (probes, vessels, test
//! particles) are flowed through the resulting field without acting on it.
//!
//! Coordinate frame:
//! - 3D, one inertial frame per ephemeris, SI units.

mod apsides;

#[cfg(test)]
mod proptest_ephemeris;

pub use apsides::ApsisError;

use std::path::Path;

use bevy::log::{debug, info, warn};
use bevy::math::DVec3;

use crate::body::{BodyError, MassiveBody, Oblateness};
use crate::physics::{
    AdaptiveStepInstance, AdaptiveStepParameters, FixedStepInstance, FixedStepIntegrator, FixedStepParameters,
    IntegrationError, SystemState, compute_mutual_accelerations, compute_test_particle_acceleration,
};
use crate::snapshot::{self, Cursor, SnapshotError, Writer};
use crate::trajectory::{
    BranchMut, ContinuousTrajectory, ContinuousTrajectoryError, DiscreteTrajectoryError, IntrinsicAcceleration,
};
use crate::types::{DegreesOfFreedom, TimedDegreesOfFreedom};

/// Pass as `max_ephemeris_steps` to let a flow prolong the ephemeris as far
/// as it needs.
pub const UNLIMITED_MAX_EPHEMERIS_STEPS: u64 = u64::MAX;

const MAGIC: &[u8; 8] = b"ORREPHM\0";

/// Errors in setting up or prolonging the ephemeris.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EphemerisError {
    #[error("an ephemeris needs at least one massive body")]
    NoBodies,

    #[error("{bodies} bodies but {states} initial states")]
    MismatchedCounts { bodies: usize, states: usize },

    #[error("invalid fitting tolerance: {0} (must be positive and finite)")]
    InvalidFittingTolerance(f64),

    #[error("invalid integration step: {0} (must be positive and finite)")]
    InvalidStep(f64),

    #[error("non-finite initial state for {name}")]
    NonFiniteState { name: String },

    #[error("non-finite time: {0}")]
    NonFiniteTime(f64),

    #[error("duplicate body name: {0}")]
    DuplicateBody(String),

    #[error("invalid body: {0}")]
    Body(#[from] BodyError),

    #[error("trajectory of {name}: {source}")]
    Trajectory {
        name: String,
        #[source]
        source: ContinuousTrajectoryError,
    },
}

/// Outcome of flowing a trajectory through the ephemeris.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("trajectory to flow has no samples")]
    EmptyTrajectory,

    #[error("trajectories end at different times: expected {expected}, found {found}")]
    MismatchedStartTimes { expected: f64, found: f64 },

    #[error("trajectory ends at {time}, before the ephemeris starts at {t_min}")]
    StartsBeforeEphemeris { time: f64, t_min: f64 },

    #[error("ephemeris could only be extended to {reached}, {requested} was requested")]
    InsufficientExtension { reached: f64, requested: f64 },

    #[error("integration failed: {0}")]
    Integration(#[from] IntegrationError),

    #[error("ephemeris error: {0}")]
    Ephemeris(#[from] EphemerisError),

    #[error("trajectory error: {0}")]
    Trajectory(#[from] DiscreteTrajectoryError),

    #[error("body trajectory error: {0}")]
    BodyTrajectory(#[from] ContinuousTrajectoryError),
}

/// Massive bodies, their continuous trajectories and the integration that
/// extends them.
///
/// Every mutating operation takes `&mut self`; queries take `&self` and may
/// run from several threads at once.
#[derive(Clone, Debug, PartialEq)]
pub struct Ephemeris {
    bodies: Vec<MassiveBody>,
    trajectories: Vec<ContinuousTrajectory>,
    fitting_tolerance: f64,
    parameters: FixedStepParameters,
    instance: FixedStepInstance,
}

impl Ephemeris {
    /// Create an ephemeris from initial states of `bodies` at `initial_time`.
    ///
    /// Everything is validated before anything is built. Each body's
    /// trajectory is seeded with its initial state; no segment exists until
    /// the first [`prolong`](Self::prolong).
    pub fn new(
        bodies: Vec<MassiveBody>,
        initial_states: Vec<DegreesOfFreedom>,
        initial_time: f64,
        fitting_tolerance: f64,
        parameters: FixedStepParameters,
    ) -> Result<Self, EphemerisError> {
        if bodies.is_empty() {
            return Err(EphemerisError::NoBodies);
        }
        if bodies.len() != initial_states.len() {
            return Err(EphemerisError::MismatchedCounts {
                bodies: bodies.len(),
                states: initial_states.len(),
            });
        }
        if !(fitting_tolerance.is_finite() && fitting_tolerance > 0.0) {
            return Err(EphemerisError::InvalidFittingTolerance(fitting_tolerance));
        }
        if !(parameters.step.is_finite() && parameters.step > 0.0) {
            return Err(EphemerisError::InvalidStep(parameters.step));
        }
        if !initial_time.is_finite() {
            return Err(EphemerisError::NonFiniteTime(initial_time));
        }
        for (i, (body, state)) in bodies.iter().zip(&initial_states).enumerate() {
            if !state.is_finite() {
                return Err(EphemerisError::NonFiniteState {
                    name: body.name().to_string(),
                });
            }
            if bodies[..i].iter().any(|other| other.name() == body.name()) {
                return Err(EphemerisError::DuplicateBody(body.name().to_string()));
            }
        }

        let mut trajectories = Vec::with_capacity(bodies.len());
        for (body, state) in bodies.iter().zip(&initial_states) {
            let mut trajectory = ContinuousTrajectory::new(parameters.step, fitting_tolerance)
                .map_err(|source| trajectory_error(body, source))?;
            trajectory
                .append(initial_time, *state)
                .map_err(|source| trajectory_error(body, source))?;
            trajectories.push(trajectory);
        }

        let state = SystemState::new(
            initial_time,
            initial_states.iter().map(|s| s.position).collect(),
            initial_states.iter().map(|s| s.velocity).collect(),
        );

        info!(
            "Ephemeris created: {} bodies at t = {}, {} step {} s, tolerance {} m",
            bodies.len(),
            initial_time,
            parameters.integrator.name(),
            parameters.step,
            fitting_tolerance
        );

        Ok(Self {
            bodies,
            trajectories,
            fitting_tolerance,
            parameters,
            instance: FixedStepInstance::new(parameters, state),
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn bodies(&self) -> &[MassiveBody] {
        &self.bodies
    }

    pub fn body(&self, index: usize) -> Option<&MassiveBody> {
        self.bodies.get(index)
    }

    /// Index of the body called `name`.
    pub fn body_index(&self, name: &str) -> Option<usize> {
        self.bodies.iter().position(|b| b.name() == name)
    }

    pub fn trajectory(&self, index: usize) -> Option<&ContinuousTrajectory> {
        self.trajectories.get(index)
    }

    pub fn trajectories(&self) -> &[ContinuousTrajectory] {
        &self.trajectories
    }

    pub fn fitting_tolerance(&self) -> f64 {
        self.fitting_tolerance
    }

    pub fn fixed_step_parameters(&self) -> &FixedStepParameters {
        &self.parameters
    }

    /// Time reached by the integration of the massive bodies. Runs ahead of
    /// [`t_max`](Self::t_max) by the samples not yet fitted.
    pub fn integration_time(&self) -> f64 {
        self.instance.time()
    }

    /// Start of the range over which every body trajectory can be evaluated.
    ///
    /// `+∞` before the first segment is fitted.
    pub fn t_min(&self) -> f64 {
        self.trajectories
            .iter()
            .map(ContinuousTrajectory::t_min)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// End of the range over which every body trajectory can be evaluated.
    ///
    /// `−∞` before the first segment is fitted.
    pub fn t_max(&self) -> f64 {
        self.trajectories
            .iter()
            .map(ContinuousTrajectory::t_max)
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether any body trajectory had to loosen its fitting tolerance.
    pub fn is_unstable(&self) -> bool {
        self.trajectories.iter().any(ContinuousTrajectory::is_unstable)
    }

    /// Positions of all bodies at `t`, in body order.
    pub fn body_positions(&self, t: f64) -> Result<Vec<DVec3>, ContinuousTrajectoryError> {
        let mut positions = vec![DVec3::ZERO; self.bodies.len()];
        self.fill_body_positions(t, &mut positions)?;
        Ok(positions)
    }

    fn fill_body_positions(&self, t: f64, positions: &mut [DVec3]) -> Result<(), ContinuousTrajectoryError> {
        for (position, trajectory) in positions.iter_mut().zip(&self.trajectories) {
            *position = trajectory.evaluate_position(t)?;
        }
        Ok(())
    }

    /// Gravitational acceleration of the massive bodies on a massless point.
    pub fn compute_gravitational_acceleration_on_massless_body(
        &self,
        position: DVec3,
        t: f64,
    ) -> Result<DVec3, ContinuousTrajectoryError> {
        let body_positions = self.body_positions(t)?;
        Ok(compute_test_particle_acceleration(&self.bodies, &body_positions, position))
    }

    // =========================================================================
    // Prolongation
    // =========================================================================

    /// Extend every body trajectory so that `t_max() >= t`.
    ///
    /// Does nothing (and touches no trajectory) when that already holds.
    pub fn prolong(&mut self, t: f64) -> Result<(), EphemerisError> {
        if t.is_nan() {
            return Err(EphemerisError::NonFiniteTime(t));
        }
        if t <= self.t_max() {
            return Ok(());
        }
        if t.is_infinite() {
            return Err(EphemerisError::NonFiniteTime(t));
        }

        let bodies = &self.bodies;
        let mut steps = 0u64;
        while self.trajectories.iter().any(|trajectory| trajectory.t_max() < t) {
            self.instance
                .step(|_, positions, accelerations| compute_mutual_accelerations(bodies, positions, accelerations));
            steps += 1;

            let state = self.instance.state();
            for (i, trajectory) in self.trajectories.iter_mut().enumerate() {
                trajectory
                    .append(
                        state.time,
                        DegreesOfFreedom::new(state.positions[i], state.velocities[i]),
                    )
                    .map_err(|source| trajectory_error(&bodies[i], source))?;
            }
        }

        debug!(
            "Ephemeris prolonged by {} steps to t_max = {}",
            steps,
            self.t_max()
        );
        Ok(())
    }

    /// Earliest time a flow may start from: [`t_min`](Self::t_min), or the
    /// initial time before the first segment is fitted.
    fn earliest_time(&self) -> f64 {
        let t_min = self.t_min();
        if t_min.is_finite() { t_min } else { self.instance.initial_time() }
    }

    /// End of the range a flow may use when it may prolong by at most
    /// `max_ephemeris_steps` steps.
    fn horizon(&self, max_ephemeris_steps: u64) -> f64 {
        let t_max = self.t_max();
        let start = if t_max.is_finite() { t_max } else { self.instance.time() };
        start + max_ephemeris_steps as f64 * self.parameters.step
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Flow `trajectories` to `t` with the ephemeris' own fixed-step
    /// integrator and step, prolonging the ephemeris as needed.
    ///
    /// All trajectories must end at the same time, within the range of the
    /// ephemeris. Steps are taken while they do not pass `t`, so the flow may
    /// stop up to one step short of it.
    pub fn flow_with_fixed_step(&mut self, trajectories: &mut [BranchMut<'_>], t: f64) -> Result<(), FlowError> {
        self.flow_with_fixed_step_bounded(trajectories, t, UNLIMITED_MAX_EPHEMERIS_STEPS)
    }

    /// As [`flow_with_fixed_step`](Self::flow_with_fixed_step), prolonging
    /// the ephemeris by at most `max_ephemeris_steps` steps.
    pub fn flow_with_fixed_step_bounded(
        &mut self,
        trajectories: &mut [BranchMut<'_>],
        t: f64,
        max_ephemeris_steps: u64,
    ) -> Result<(), FlowError> {
        if !t.is_finite() {
            return Err(EphemerisError::NonFiniteTime(t).into());
        }
        let Some(first) = trajectories.first() else {
            return Ok(());
        };
        let t0 = first.last().ok_or(FlowError::EmptyTrajectory)?.time;
        let mut initial = Vec::with_capacity(trajectories.len());
        for trajectory in trajectories.iter() {
            let last = trajectory.last().ok_or(FlowError::EmptyTrajectory)?;
            if last.time != t0 {
                return Err(FlowError::MismatchedStartTimes {
                    expected: t0,
                    found: last.time,
                });
            }
            initial.push(last.degrees_of_freedom);
        }

        let step = self.parameters.step;
        if t0 + step > t {
            return Ok(());
        }

        let t_min = self.earliest_time();
        if t0 < t_min {
            return Err(FlowError::StartsBeforeEphemeris { time: t0, t_min });
        }
        let t_final = t.min(self.horizon(max_ephemeris_steps));
        if t_final > t0 {
            self.prolong(t_final)?;
        }

        let intrinsic: Vec<Option<IntrinsicAcceleration>> =
            trajectories.iter().map(BranchMut::intrinsic_acceleration).collect();
        let mut instance = FixedStepInstance::new(
            self.parameters,
            SystemState::new(
                t0,
                initial.iter().map(|s| s.position).collect(),
                initial.iter().map(|s| s.velocity).collect(),
            ),
        );

        let this = &*self;
        let mut body_positions = vec![DVec3::ZERO; this.bodies.len()];
        while instance.next_time() <= t_final {
            let mut evaluation_error = None;
            instance.step(|time, positions, accelerations| {
                this.accelerations_on_massless_bodies(
                    time,
                    positions,
                    accelerations,
                    &intrinsic,
                    &mut body_positions,
                    &mut evaluation_error,
                )
            });
            if let Some(error) = evaluation_error {
                return Err(FlowError::BodyTrajectory(error));
            }

            let state = instance.state();
            for (k, trajectory) in trajectories.iter_mut().enumerate() {
                trajectory.append(
                    state.time,
                    DegreesOfFreedom::new(state.positions[k], state.velocities[k]),
                )?;
            }
        }

        if t_final < t && instance.next_time() <= t {
            warn!(
                "Fixed-step flow stopped at {} short of {}: ephemeris extension limited to {} steps",
                instance.time(),
                t,
                max_ephemeris_steps
            );
            return Err(FlowError::InsufficientExtension {
                reached: instance.time(),
                requested: t,
            });
        }
        Ok(())
    }

    /// Flow one trajectory to `t` with an adaptive-step integrator.
    ///
    /// `intrinsic_acceleration` overrides the trajectory's own; `None` uses
    /// the trajectory's. The ephemeris is prolonged by at most
    /// `max_ephemeris_steps` steps; if that is not enough to reach `t` the
    /// flow goes as far as it can and returns
    /// [`FlowError::InsufficientExtension`]. Every accepted step is appended,
    /// so progress made before an error is kept.
    pub fn flow_with_adaptive_step(
        &mut self,
        trajectory: &mut BranchMut<'_>,
        intrinsic_acceleration: Option<IntrinsicAcceleration>,
        t: f64,
        parameters: &AdaptiveStepParameters,
        max_ephemeris_steps: u64,
    ) -> Result<(), FlowError> {
        if !t.is_finite() {
            return Err(EphemerisError::NonFiniteTime(t).into());
        }
        let last = *trajectory.last().ok_or(FlowError::EmptyTrajectory)?;
        if t <= last.time {
            return Ok(());
        }

        let t_min = self.earliest_time();
        if last.time < t_min {
            return Err(FlowError::StartsBeforeEphemeris { time: last.time, t_min });
        }
        let t_final = t.min(self.horizon(max_ephemeris_steps));
        if t_final > last.time {
            self.prolong(t_final)?;
        }
        if t_final <= last.time {
            warn!(
                "Adaptive flow cannot leave {}: ephemeris extension limited to {} steps",
                last.time, max_ephemeris_steps
            );
            return Err(FlowError::InsufficientExtension {
                reached: last.time,
                requested: t,
            });
        }

        let intrinsic = [intrinsic_acceleration.or_else(|| trajectory.intrinsic_acceleration())];
        let mut instance = AdaptiveStepInstance::new(
            *parameters,
            SystemState::new(
                last.time,
                vec![last.degrees_of_freedom.position],
                vec![last.degrees_of_freedom.velocity],
            ),
        );

        let this = &*self;
        let mut body_positions = vec![DVec3::ZERO; this.bodies.len()];
        let mut evaluation_error = None;
        let mut append_error = None;
        let outcome = instance.solve(
            t_final,
            |time, positions, accelerations| {
                this.accelerations_on_massless_bodies(
                    time,
                    positions,
                    accelerations,
                    &intrinsic,
                    &mut body_positions,
                    &mut evaluation_error,
                )
            },
            |state| {
                if append_error.is_none() {
                    if let Err(error) = trajectory.append(
                        state.time,
                        DegreesOfFreedom::new(state.positions[0], state.velocities[0]),
                    ) {
                        append_error = Some(error);
                    }
                }
            },
        );

        if let Some(error) = append_error {
            return Err(FlowError::Trajectory(error));
        }
        if let Some(error) = evaluation_error {
            return Err(FlowError::BodyTrajectory(error));
        }
        match outcome {
            Ok(stats) => {
                debug!(
                    "Adaptive flow reached {} ({} steps accepted, {} rejected)",
                    t_final, stats.accepted_steps, stats.rejected_steps
                );
            }
            Err(error) => {
                warn!("Adaptive flow from {} to {} failed: {}", last.time, t_final, error);
                return Err(FlowError::Integration(error));
            }
        }

        if t_final < t {
            warn!(
                "Adaptive flow stopped at {} short of {}: ephemeris extension limited to {} steps",
                t_final, t, max_ephemeris_steps
            );
            return Err(FlowError::InsufficientExtension {
                reached: t_final,
                requested: t,
            });
        }
        Ok(())
    }

    /// Right-hand side shared by the flows. The first failure to evaluate a
    /// body position is kept in `error`; the accelerations are then NaN so the
    /// step cannot be mistaken for a valid one.
    fn accelerations_on_massless_bodies(
        &self,
        time: f64,
        positions: &[DVec3],
        accelerations: &mut [DVec3],
        intrinsic: &[Option<IntrinsicAcceleration>],
        body_positions: &mut [DVec3],
        error: &mut Option<ContinuousTrajectoryError>,
    ) {
        if let Err(e) = self.fill_body_positions(time, body_positions) {
            accelerations.fill(DVec3::NAN);
            error.get_or_insert(e);
            return;
        }
        for ((acceleration, &position), intrinsic) in accelerations.iter_mut().zip(positions).zip(intrinsic) {
            *acceleration = compute_test_particle_acceleration(&self.bodies, body_positions, position);
            if let Some(f) = intrinsic {
                *acceleration += f(time, position);
            }
        }
    }

    // =========================================================================
    // Apsides
    // =========================================================================

    /// Apsides of `points` with respect to the body at `body_index`, appended
    /// chronologically to `apoapsides` and `periapsides`.
    pub fn compute_apsides<I>(
        &self,
        body_index: usize,
        points: I,
        apoapsides: &mut BranchMut<'_>,
        periapsides: &mut BranchMut<'_>,
    ) -> Result<(), ApsisError>
    where
        I: IntoIterator<Item = TimedDegreesOfFreedom>,
    {
        let reference = self
            .trajectories
            .get(body_index)
            .ok_or(ApsisError::UnknownBody(body_index))?;
        apsides::compute_apsides(reference, points, apoapsides, periapsides)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_header(MAGIC);

        w.write_u32(self.parameters.integrator.id());
        w.write_f64(self.parameters.step);
        w.write_f64(self.fitting_tolerance);

        w.write_len(self.bodies.len());
        for (body, trajectory) in self.bodies.iter().zip(&self.trajectories) {
            w.write_str(body.name());
            w.write_f64(body.gravitational_parameter());
            match body.oblateness() {
                None => w.write_bool(false),
                Some(oblateness) => {
                    w.write_bool(true);
                    w.write_f64(oblateness.j2);
                    w.write_f64(oblateness.reference_radius);
                    w.write_dvec3(oblateness.axis);
                }
            }
            trajectory.write_fields(&mut w);
        }

        let state = self.instance.state();
        w.write_f64(self.instance.initial_time());
        w.write_u64(self.instance.steps_taken());
        w.write_f64(state.time);
        for (q, v) in state.positions.iter().zip(&state.velocities) {
            w.write_dvec3(*q);
            w.write_dvec3(*v);
        }

        w.into_bytes()
    }

    /// Restore an ephemeris written by [`to_bytes`](Self::to_bytes). Further
    /// prolongation is bit-identical to that of the original.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let mut r = Cursor::with_header(bytes, MAGIC)?;

        let integrator_id = r.read_u32_le()?;
        let integrator =
            FixedStepIntegrator::from_id(integrator_id).ok_or(SnapshotError::UnknownIntegrator(integrator_id))?;
        let step = r.read_f64_le()?;
        if !(step.is_finite() && step > 0.0) {
            return Err(SnapshotError::invalid("step", step));
        }
        let parameters = FixedStepParameters::new(integrator, step);
        let fitting_tolerance = r.read_f64_le()?;
        if !(fitting_tolerance.is_finite() && fitting_tolerance > 0.0) {
            return Err(SnapshotError::invalid("fitting_tolerance", fitting_tolerance));
        }

        // Name length prefix, μ and the oblateness flag at the very least.
        let body_count = r.read_len(17)?;
        if body_count == 0 {
            return Err(SnapshotError::invalid("bodies", "none"));
        }
        let mut bodies = Vec::with_capacity(body_count);
        let mut trajectories = Vec::with_capacity(body_count);
        for _ in 0..body_count {
            let name = r.read_string()?;
            let gravitational_parameter = r.read_f64_le()?;
            let oblateness = if r.read_bool()? {
                Some(Oblateness {
                    j2: r.read_f64_le()?,
                    reference_radius: r.read_f64_le()?,
                    axis: r.read_dvec3()?,
                })
            } else {
                None
            };
            bodies.push(MassiveBody::from_parts(name, gravitational_parameter, oblateness)?);

            let trajectory = ContinuousTrajectory::read_fields(&mut r)?;
            if trajectory.step() != step || trajectory.tolerance() != fitting_tolerance {
                return Err(SnapshotError::invalid("trajectory", "step or tolerance differs from the ephemeris"));
            }
            trajectories.push(trajectory);
        }

        let initial_time = r.read_f64_le()?;
        let steps_taken = r.read_u64_le()?;
        let time = r.read_f64_le()?;
        let mut positions = Vec::with_capacity(body_count);
        let mut velocities = Vec::with_capacity(body_count);
        for _ in 0..body_count {
            positions.push(r.read_dvec3()?);
            velocities.push(r.read_dvec3()?);
        }
        r.finish()?;

        let instance = FixedStepInstance::resume(
            parameters,
            initial_time,
            steps_taken,
            SystemState::new(time, positions, velocities),
        );

        let ephemeris = Self {
            bodies,
            trajectories,
            fitting_tolerance,
            parameters,
            instance,
        };
        info!(
            "Ephemeris restored: {} bodies, range [{}, {}], integrated to {}",
            ephemeris.bodies.len(),
            ephemeris.t_min(),
            ephemeris.t_max(),
            ephemeris.integration_time()
        );
        Ok(ephemeris)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        snapshot::write_file(path, &self.to_bytes())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let bytes = snapshot::read_file(path)?;
        Self::from_bytes(&bytes)
    }
}

fn trajectory_error(body: &MassiveBody, source: ContinuousTrajectoryError) -> EphemerisError {
    EphemerisError::Trajectory {
        name: body.name().to_string(),
        source,
    }
}
