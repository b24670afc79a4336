//! Piecewise-Chebyshev trajectory of a massive body.
//!
//! Samples arrive at a fixed step. Every `DIVISIONS` intervals the buffered
//! samples are compressed into one Newhall segment; the last sample of a
//! segment is kept as the first sample of the next, so segments are
//! contiguous. The degree of the fit adapts to the requested tolerance.

use std::sync::atomic::{AtomicUsize, Ordering};

use bevy::log::{debug, warn};
use bevy::math::DVec3;

use super::chebyshev::{
    ChebyshevError, ChebyshevSeries, DIVISIONS, MAX_DEGREE, MIN_DEGREE, SAMPLES, newhall_approximation,
};
use crate::snapshot::{Cursor, SnapshotError, Writer};
use crate::types::{DegreesOfFreedom, TimedDegreesOfFreedom};

/// Number of consecutive segments at one degree after which a lower degree
/// is tried.
pub const MAX_DEGREE_AGE: usize = 100;

/// Relative tolerance on the spacing of appended samples.
const SPACING_TOLERANCE: f64 = 1e-6;

const MAGIC: &[u8; 8] = b"ORRCTRJ\0";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ContinuousTrajectoryError {
    #[error("invalid step: {0} (must be positive and finite)")]
    InvalidStep(f64),

    #[error("invalid tolerance: {0} (must be positive and finite)")]
    InvalidTolerance(f64),

    #[error("sample time {time} is not after the last sample at {last}")]
    NonMonotonicTime { time: f64, last: f64 },

    #[error("sample time {time} is not one step ({step}) after {last}")]
    NonUniformSpacing { time: f64, last: f64, step: f64 },

    #[error("non-finite sample at t = {time}")]
    NonFiniteSample { time: f64 },

    #[error("trajectory has no fitted segment yet")]
    Empty,

    #[error("time {time} outside trajectory range [{t_min}, {t_max}]")]
    OutOfRange { time: f64, t_min: f64, t_max: f64 },

    #[error("fit failed: {0}")]
    Fit(#[from] ChebyshevError),
}

/// A body trajectory stored as contiguous Chebyshev segments.
#[derive(Debug)]
pub struct ContinuousTrajectory {
    step: f64,
    tolerance: f64,
    adjusted_tolerance: f64,
    is_unstable: bool,
    degree: usize,
    degree_age: usize,
    segments: Vec<ChebyshevSeries>,
    /// Samples not yet covered by a segment. Once a segment exists, the
    /// first entry is the end point of the last segment.
    last_points: Vec<TimedDegreesOfFreedom>,
    /// Index of the segment that served the last lookup.
    hint: AtomicUsize,
}

impl Clone for ContinuousTrajectory {
    fn clone(&self) -> Self {
        Self {
            step: self.step,
            tolerance: self.tolerance,
            adjusted_tolerance: self.adjusted_tolerance,
            is_unstable: self.is_unstable,
            degree: self.degree,
            degree_age: self.degree_age,
            segments: self.segments.clone(),
            last_points: self.last_points.clone(),
            hint: AtomicUsize::new(self.hint.load(Ordering::Relaxed)),
        }
    }
}

impl PartialEq for ContinuousTrajectory {
    /// Equality of content; the lookup hint is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.step == other.step
            && self.tolerance == other.tolerance
            && self.adjusted_tolerance == other.adjusted_tolerance
            && self.is_unstable == other.is_unstable
            && self.degree == other.degree
            && self.degree_age == other.degree_age
            && self.segments == other.segments
            && self.last_points == other.last_points
    }
}

impl ContinuousTrajectory {
    pub fn new(step: f64, tolerance: f64) -> Result<Self, ContinuousTrajectoryError> {
        if !(step.is_finite() && step > 0.0) {
            return Err(ContinuousTrajectoryError::InvalidStep(step));
        }
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ContinuousTrajectoryError::InvalidTolerance(tolerance));
        }
        Ok(Self {
            step,
            tolerance,
            adjusted_tolerance: tolerance,
            is_unstable: false,
            degree: MIN_DEGREE,
            degree_age: 0,
            segments: Vec::new(),
            last_points: Vec::with_capacity(SAMPLES),
            hint: AtomicUsize::new(0),
        })
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The tolerance actually achieved; equal to `tolerance` unless the
    /// trajectory became unstable.
    pub fn adjusted_tolerance(&self) -> f64 {
        self.adjusted_tolerance
    }

    /// Whether some segment could not meet the requested tolerance. Sticky.
    pub fn is_unstable(&self) -> bool {
        self.is_unstable
    }

    /// Degree that will be tried first for the next segment.
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn degree_age(&self) -> usize {
        self.degree_age
    }

    pub fn segments(&self) -> &[ChebyshevSeries] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Start of the fitted range; `+∞` when empty.
    pub fn t_min(&self) -> f64 {
        self.segments.first().map_or(f64::INFINITY, ChebyshevSeries::t_min)
    }

    /// End of the fitted range; `−∞` when empty.
    pub fn t_max(&self) -> f64 {
        self.segments.last().map_or(f64::NEG_INFINITY, ChebyshevSeries::t_max)
    }

    /// The most recently appended sample.
    pub fn last_sample(&self) -> Option<&TimedDegreesOfFreedom> {
        self.last_points.last()
    }

    /// Append a sample one step after the previous one.
    pub fn append(&mut self, time: f64, degrees_of_freedom: DegreesOfFreedom) -> Result<(), ContinuousTrajectoryError> {
        if !(time.is_finite() && degrees_of_freedom.is_finite()) {
            return Err(ContinuousTrajectoryError::NonFiniteSample { time });
        }
        if let Some(last) = self.last_points.last() {
            if time <= last.time {
                return Err(ContinuousTrajectoryError::NonMonotonicTime { time, last: last.time });
            }
            if ((time - last.time) - self.step).abs() > SPACING_TOLERANCE * self.step {
                return Err(ContinuousTrajectoryError::NonUniformSpacing {
                    time,
                    last: last.time,
                    step: self.step,
                });
            }
        }

        self.last_points.push(TimedDegreesOfFreedom::new(time, degrees_of_freedom));
        if self.last_points.len() == SAMPLES {
            if let Err(error) = self.compute_best_newhall_approximation() {
                self.last_points.pop();
                return Err(error);
            }
            let last = self.last_points[DIVISIONS];
            self.last_points.clear();
            self.last_points.push(last);
        }
        Ok(())
    }

    /// Fit the buffered samples, adjusting the degree to meet the tolerance.
    fn compute_best_newhall_approximation(&mut self) -> Result<(), ContinuousTrajectoryError> {
        let mut q = [DVec3::ZERO; SAMPLES];
        let mut v = [DVec3::ZERO; SAMPLES];
        for (i, point) in self.last_points.iter().enumerate() {
            q[i] = point.position();
            v[i] = point.velocity();
        }
        let t_min = self.last_points[0].time;
        let t_max = self.last_points[DIVISIONS].time;

        // Opportunistically try a lower degree once the current one has aged.
        if self.degree_age >= MAX_DEGREE_AGE && self.degree > MIN_DEGREE {
            let (series, error) = newhall_approximation(self.degree - 1, &q, &v, t_min, t_max)?;
            self.degree_age = 0;
            if error <= self.adjusted_tolerance {
                self.degree -= 1;
                debug!("Lowered Newhall degree to {} at t = {} (error {:.3e} m)", self.degree, t_min, error);
                self.commit(series);
                return Ok(());
            }
        }

        let (mut series, mut error) = newhall_approximation(self.degree, &q, &v, t_min, t_max)?;
        while error > self.adjusted_tolerance {
            if self.degree == MAX_DEGREE {
                self.become_unstable(error, t_min);
                break;
            }
            let (candidate, candidate_error) = newhall_approximation(self.degree + 1, &q, &v, t_min, t_max)?;
            if candidate_error >= error {
                // Higher degrees are fitting noise; keep the better fit.
                self.become_unstable(error, t_min);
                break;
            }
            self.degree += 1;
            self.degree_age = 0;
            series = candidate;
            error = candidate_error;
            debug!("Raised Newhall degree to {} at t = {} (error {:.3e} m)", self.degree, t_min, error);
        }
        self.commit(series);
        Ok(())
    }

    fn commit(&mut self, series: ChebyshevSeries) {
        self.degree_age += 1;
        self.segments.push(series);
    }

    fn become_unstable(&mut self, error: f64, t_min: f64) {
        if !self.is_unstable {
            warn!(
                "Continuous trajectory unstable at t = {}: degree {} error {:.3e} m exceeds tolerance {:.3e} m",
                t_min, self.degree, error, self.tolerance
            );
        }
        self.is_unstable = true;
        self.adjusted_tolerance = self.adjusted_tolerance.max(error);
    }

    /// The segment covering `t`: the first one whose end is at or after `t`.
    fn find_segment(&self, t: f64) -> Result<&ChebyshevSeries, ContinuousTrajectoryError> {
        if self.segments.is_empty() {
            return Err(ContinuousTrajectoryError::Empty);
        }
        let (t_min, t_max) = (self.t_min(), self.t_max());
        if !(t >= t_min && t <= t_max) {
            return Err(ContinuousTrajectoryError::OutOfRange { time: t, t_min, t_max });
        }

        // Queries cluster near the end and advance; try the last hit and its successor.
        let hint = self.hint.load(Ordering::Relaxed);
        for index in [hint, hint + 1] {
            let Some(segment) = self.segments.get(index) else {
                continue;
            };
            if t <= segment.t_max() && (t > segment.t_min() || index == 0) {
                self.hint.store(index, Ordering::Relaxed);
                return Ok(segment);
            }
        }

        let index = self.segments.partition_point(|s| s.t_max() < t);
        self.hint.store(index, Ordering::Relaxed);
        Ok(&self.segments[index])
    }

    fn map_range(&self, error: ChebyshevError) -> ContinuousTrajectoryError {
        match error {
            ChebyshevError::OutOfRange { time, .. } => ContinuousTrajectoryError::OutOfRange {
                time,
                t_min: self.t_min(),
                t_max: self.t_max(),
            },
            other => other.into(),
        }
    }

    pub fn evaluate_position(&self, t: f64) -> Result<DVec3, ContinuousTrajectoryError> {
        self.find_segment(t)?.evaluate(t).map_err(|e| self.map_range(e))
    }

    pub fn evaluate_velocity(&self, t: f64) -> Result<DVec3, ContinuousTrajectoryError> {
        self.find_segment(t)?
            .evaluate_derivative(t)
            .map_err(|e| self.map_range(e))
    }

    pub fn evaluate_acceleration(&self, t: f64) -> Result<DVec3, ContinuousTrajectoryError> {
        self.find_segment(t)?
            .evaluate_second_derivative(t)
            .map_err(|e| self.map_range(e))
    }

    pub fn evaluate_degrees_of_freedom(&self, t: f64) -> Result<DegreesOfFreedom, ContinuousTrajectoryError> {
        let (position, velocity) = self
            .find_segment(t)?
            .evaluate_with_derivative(t)
            .map_err(|e| self.map_range(e))?;
        Ok(DegreesOfFreedom::new(position, velocity))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_header(MAGIC);
        self.write_fields(&mut w);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let mut r = Cursor::with_header(bytes, MAGIC)?;
        let trajectory = Self::read_fields(&mut r)?;
        r.finish()?;
        Ok(trajectory)
    }

    pub(crate) fn write_fields(&self, w: &mut Writer) {
        w.write_f64(self.step);
        w.write_f64(self.tolerance);
        w.write_f64(self.adjusted_tolerance);
        w.write_bool(self.is_unstable);
        w.write_u32(self.degree as u32);
        w.write_u64(self.degree_age as u64);

        w.write_len(self.segments.len());
        for segment in &self.segments {
            w.write_f64(segment.t_min());
            w.write_f64(segment.t_max());
            w.write_len(segment.coefficients().len());
            for &c in segment.coefficients() {
                w.write_dvec3(c);
            }
        }

        w.write_len(self.last_points.len());
        for point in &self.last_points {
            w.write_timed(point);
        }
    }

    pub(crate) fn read_fields(r: &mut Cursor<'_>) -> Result<Self, SnapshotError> {
        let step = r.read_f64_le()?;
        let tolerance = r.read_f64_le()?;
        let mut trajectory = Self::new(step, tolerance).map_err(|e| SnapshotError::invalid("trajectory", e))?;

        let adjusted_tolerance = r.read_f64_le()?;
        if !(adjusted_tolerance >= tolerance && adjusted_tolerance.is_finite()) {
            return Err(SnapshotError::invalid("adjusted_tolerance", adjusted_tolerance));
        }
        trajectory.adjusted_tolerance = adjusted_tolerance;
        trajectory.is_unstable = r.read_bool()?;

        let degree = r.read_u32_le()? as usize;
        if !(MIN_DEGREE..=MAX_DEGREE).contains(&degree) {
            return Err(SnapshotError::invalid("degree", degree));
        }
        trajectory.degree = degree;
        trajectory.degree_age = r.read_u64_le()? as usize;

        let segment_count = r.read_len(24)?;
        for _ in 0..segment_count {
            let t_min = r.read_f64_le()?;
            let t_max = r.read_f64_le()?;
            let n = r.read_len(24)?;
            let coefficients = (0..n).map(|_| r.read_dvec3()).collect::<Result<Vec<_>, _>>()?;
            if trajectory.segments.last().is_some_and(|previous| previous.t_max() != t_min) {
                return Err(SnapshotError::invalid("segments", "not contiguous"));
            }
            trajectory.segments.push(ChebyshevSeries::new(coefficients, t_min, t_max)?);
        }

        // A full buffer is always fitted, and once a segment exists the buffer
        // starts at its end.
        let point_count = r.read_len(56)?;
        let min_points = if trajectory.segments.is_empty() { 0 } else { 1 };
        if !(min_points..SAMPLES).contains(&point_count) {
            return Err(SnapshotError::invalid("last_points", point_count));
        }
        for _ in 0..point_count {
            let point = r.read_timed()?;
            if !(point.time.is_finite() && point.degrees_of_freedom.is_finite()) {
                return Err(SnapshotError::invalid("last_points", "non-finite sample"));
            }
            if let Some(last) = trajectory.last_points.last() {
                if ((point.time - last.time) - step).abs() > SPACING_TOLERANCE * step {
                    return Err(SnapshotError::invalid("last_points", "irregular spacing"));
                }
            }
            trajectory.last_points.push(point);
        }
        if let (Some(segment), Some(first)) = (trajectory.segments.last(), trajectory.last_points.first()) {
            if first.time != segment.t_max() {
                return Err(SnapshotError::invalid("last_points", "not at the end of the last segment"));
            }
        }
        Ok(trajectory)
    }
}
